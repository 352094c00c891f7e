//! Structural validation errors for catalog entities.

use crate::server_type::ServerType;

/// Reasons a candidate catalog is rejected before it can be published.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("{entity} is missing required field '{field}'")]
    MissingField {
        entity: &'static str,
        field: &'static str,
    },

    #[error("Duplicate organization id: {0}")]
    DuplicateOrganization(String),

    #[error("Duplicate {server_type} server: {identifier}")]
    DuplicateServer {
        server_type: ServerType,
        identifier: String,
    },

    #[error("Server {identifier} has type {actual} but is stored as {expected}")]
    WrongSlot {
        identifier: String,
        expected: ServerType,
        actual: ServerType,
    },

    #[error("Server {server} has duplicate profile id: {profile}")]
    DuplicateProfile { server: String, profile: String },

    #[error("Server {server} selects profile index {index} but has {len} profiles")]
    ProfileIndexOutOfRange {
        server: String,
        index: usize,
        len: usize,
    },

    #[error("Server {0} is not secure internet but lists gateway locations")]
    UnexpectedLocations(String),

    #[error("Server {0} is not secure internet but carries discovery attributes")]
    UnexpectedSecureInternetInfo(String),

    #[error("Server {server} has an invalid base URL: {url}")]
    InvalidBaseUrl { server: String, url: String },

    #[error("Server {server} has an invalid country code: {code}")]
    InvalidCountryCode { server: String, code: String },

    #[error("Unknown server type code: {0}")]
    UnknownServerType(i32),
}
