//! evc Types - Discovery and Connection Data Model
//!
//! Immutable-once-published value types exchanged between the engine
//! and its host application.
//!
//! # Catalog Shape
//!
//! ```text
//! OrganizationList (v)            ServerList (v)
//! ├── Organization                ├── custom: [Server]
//! │   └── secure_internet_home ──┐├── institute: [Server]
//! └── ...                        └┼─▶ secure_internet: Option<Server>
//!                                 │       ├── locations: {nl, de, ...}
//!                                 │       └── profiles: [ServerProfile] + current
//! ```
//!
//! Every list carries a version; a refresh must strictly increase it.
//! Structural problems are reported as [`ModelError`] by `validate()`.

mod error;
mod location;
mod organization;
mod profile;
mod server;
mod server_list;
mod server_type;
mod state;
mod unique;

pub use error::ModelError;
pub use location::ServerLocationSet;
pub use organization::{Organization, OrganizationList};
pub use profile::{ServerProfile, ServerProfiles};
pub use server::{SecureInternetInfo, Server};
pub use server_list::ServerList;
pub use server_type::ServerType;
pub use state::ConnectionState;
