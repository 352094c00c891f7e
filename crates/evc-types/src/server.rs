//! VPN servers
//!
//! A [`Server`] is the unit the selector resolves and the connection
//! state machine connects to. Secure internet servers additionally carry
//! their discovery attributes ([`SecureInternetInfo`]) and the set of
//! countries their gateways are hosted in.

use crate::error::ModelError;
use crate::location::ServerLocationSet;
use crate::profile::ServerProfiles;
use crate::server_type::ServerType;
use crate::unique::{dedup_in_order, deserialize_unique};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Discovery-only attributes of a secure internet server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureInternetInfo {
    pub base_url: String,
    /// Template with `@RETURN_TO@` and `@ORG_ID@` placeholders to skip WAYF
    #[serde(default)]
    pub authentication_url_template: Option<String>,
    #[serde(default)]
    pub public_keys: Vec<String>,
    #[serde(default)]
    pub keyword_list: Vec<String>,
}

/// A VPN server as published in a catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub identifier: String,
    pub display_name: String,
    pub server_type: ServerType,
    /// ISO country code, empty for most custom and institute servers
    #[serde(default)]
    pub country_code: String,
    #[serde(default, deserialize_with = "deserialize_unique")]
    support_contact: Vec<String>,
    #[serde(default)]
    pub locations: ServerLocationSet,
    #[serde(default)]
    pub profiles: ServerProfiles,
    /// Epoch seconds, 0 = never expires
    #[serde(default)]
    pub expire_time: u64,
    #[serde(default)]
    pub secure_internet: Option<SecureInternetInfo>,
}

impl Server {
    /// Create a server without profiles, locations or expiry
    pub fn new(
        server_type: ServerType,
        identifier: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: display_name.into(),
            server_type,
            country_code: String::new(),
            support_contact: Vec::new(),
            locations: ServerLocationSet::new(),
            profiles: ServerProfiles::default(),
            expire_time: 0,
            secure_internet: None,
        }
    }

    pub fn with_profiles(mut self, profiles: ServerProfiles) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_country_code(mut self, code: impl Into<String>) -> Self {
        self.country_code = code.into();
        self
    }

    pub fn with_locations(mut self, locations: ServerLocationSet) -> Self {
        self.locations = locations;
        self
    }

    pub fn with_expire_time(mut self, expire_time: u64) -> Self {
        self.expire_time = expire_time;
        self
    }

    pub fn with_secure_internet(mut self, info: SecureInternetInfo) -> Self {
        self.secure_internet = Some(info);
        self
    }

    /// Add support contacts, ignoring ones already present
    pub fn with_support_contact<I, S>(mut self, contacts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let merged = std::mem::take(&mut self.support_contact)
            .into_iter()
            .chain(contacts.into_iter().map(Into::into));
        self.support_contact = dedup_in_order(merged);
        self
    }

    pub fn support_contact(&self) -> &[String] {
        &self.support_contact
    }

    /// Expiry as a wall-clock time
    pub fn expiry(&self) -> Option<SystemTime> {
        if self.expire_time == 0 {
            None
        } else {
            Some(UNIX_EPOCH + Duration::from_secs(self.expire_time))
        }
    }

    /// Has the server's configuration expired at `now_secs` (epoch seconds)?
    pub fn is_expired_at(&self, now_secs: u64) -> bool {
        self.expire_time != 0 && self.expire_time <= now_secs
    }

    /// Keywords usable for search
    pub fn keyword_list(&self) -> &[String] {
        self.secure_internet
            .as_ref()
            .map(|info| info.keyword_list.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn validate(&self) -> Result<(), ModelError> {
        if self.identifier.is_empty() {
            return Err(ModelError::MissingField {
                entity: "server",
                field: "identifier",
            });
        }
        if self.display_name.is_empty() {
            return Err(ModelError::MissingField {
                entity: "server",
                field: "display_name",
            });
        }

        if !self.country_code.is_empty()
            && !(self.country_code.len() == 2
                && self.country_code.chars().all(|c| c.is_ascii_alphabetic()))
        {
            return Err(ModelError::InvalidCountryCode {
                server: self.identifier.clone(),
                code: self.country_code.clone(),
            });
        }

        if self.server_type != ServerType::SecureInternet {
            if !self.locations.is_empty() {
                return Err(ModelError::UnexpectedLocations(self.identifier.clone()));
            }
            if self.secure_internet.is_some() {
                return Err(ModelError::UnexpectedSecureInternetInfo(
                    self.identifier.clone(),
                ));
            }
        }

        if let Some(info) = &self.secure_internet {
            if url::Url::parse(&info.base_url).is_err() {
                return Err(ModelError::InvalidBaseUrl {
                    server: self.identifier.clone(),
                    url: info.base_url.clone(),
                });
            }
        }

        self.profiles.validate(&self.identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ServerProfile;

    fn secure() -> Server {
        Server::new(ServerType::SecureInternet, "srv-si-1", "Secure Internet")
            .with_country_code("nl")
            .with_locations(["nl", "de"].into_iter().collect())
            .with_secure_internet(SecureInternetInfo {
                base_url: "https://nl.example.org/".into(),
                ..Default::default()
            })
    }

    #[test]
    fn test_expiry() {
        let server = Server::new(ServerType::Custom, "https://vpn.example/", "Custom");
        assert!(!server.is_expired_at(u64::MAX));
        assert!(server.expiry().is_none());

        let server = server.with_expire_time(1_000);
        assert!(!server.is_expired_at(999));
        assert!(server.is_expired_at(1_000));
        assert!(server.is_expired_at(5_000));
    }

    #[test]
    fn test_display_name_required() {
        let server = Server::new(ServerType::Custom, "https://vpn.example/", "");
        assert_eq!(
            server.validate(),
            Err(ModelError::MissingField {
                entity: "server",
                field: "display_name",
            })
        );
    }

    #[test]
    fn test_deserialized_support_contact_is_deduplicated() {
        let server: Server = serde_json::from_str(
            r#"{
                "identifier": "https://vpn.example/",
                "display_name": "VPN",
                "server_type": "custom",
                "support_contact": ["mailto:a@example.org", "tel:+31", "mailto:a@example.org"]
            }"#,
        )
        .unwrap();
        assert_eq!(server.support_contact(), ["mailto:a@example.org", "tel:+31"]);
        assert!(server.validate().is_ok());
    }

    #[test]
    fn test_support_contact_is_a_set() {
        let server = Server::new(ServerType::InstituteAccess, "i", "I")
            .with_support_contact(["mailto:a@example.org", "tel:+31"])
            .with_support_contact(["mailto:a@example.org"]);
        assert_eq!(server.support_contact().len(), 2);
    }

    #[test]
    fn test_validate_secure_internet() {
        assert!(secure().validate().is_ok());

        let mut bad_url = secure();
        bad_url.secure_internet.as_mut().unwrap().base_url = "not a url".into();
        assert!(matches!(bad_url.validate(), Err(ModelError::InvalidBaseUrl { .. })));

        let bad_country = secure().with_country_code("nld");
        assert!(matches!(
            bad_country.validate(),
            Err(ModelError::InvalidCountryCode { .. })
        ));
    }

    #[test]
    fn test_locations_only_on_secure_internet() {
        let server = Server::new(ServerType::InstituteAccess, "i", "I")
            .with_locations(["nl"].into_iter().collect());
        assert_eq!(
            server.validate(),
            Err(ModelError::UnexpectedLocations("i".into()))
        );
    }

    #[test]
    fn test_validate_checks_profiles() {
        let server = Server::new(ServerType::Custom, "c", "C").with_profiles(ServerProfiles::new(vec![
            ServerProfile::new("x", "X", false),
            ServerProfile::new("x", "Y", false),
        ]));
        assert!(matches!(
            server.validate(),
            Err(ModelError::DuplicateProfile { .. })
        ));
    }
}
