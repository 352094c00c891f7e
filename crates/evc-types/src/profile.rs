//! Server profiles
//!
//! A profile is a named connection configuration on a server. The
//! `current` index records which profile the user (or the selector)
//! settled on.

use crate::error::ModelError;
use crate::unique::{dedup_in_order, deserialize_unique};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single named connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerProfile {
    pub id: String,
    pub display_name: String,
    /// Route all traffic through the VPN
    #[serde(default)]
    pub default_gateway: bool,
    /// Ordered, deduplicated DNS search domains
    #[serde(default, deserialize_with = "deserialize_unique")]
    dns_search_domains: Vec<String>,
}

impl ServerProfile {
    /// Create a profile
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, default_gateway: bool) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            default_gateway,
            dns_search_domains: Vec::new(),
        }
    }

    /// Set DNS search domains, dropping repeats while keeping first-seen order
    pub fn with_dns_search_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dns_search_domains = dedup_in_order(domains);
        self
    }

    pub fn dns_search_domains(&self) -> &[String] {
        &self.dns_search_domains
    }
}

/// Profiles of one server plus the selected one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerProfiles {
    #[serde(default)]
    profiles: Vec<ServerProfile>,
    /// Selected profile, `None` until a selection is made
    #[serde(default)]
    current: Option<usize>,
}

impl ServerProfiles {
    /// Create with no selection
    pub fn new(profiles: Vec<ServerProfile>) -> Self {
        Self {
            profiles,
            current: None,
        }
    }

    pub fn as_slice(&self) -> &[ServerProfile] {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ServerProfile> {
        self.profiles.get(index)
    }

    /// Index of the profile with this id
    pub fn position(&self, id: &str) -> Option<usize> {
        self.profiles.iter().position(|p| p.id == id)
    }

    /// Selected index if it points at a real profile
    pub fn current(&self) -> Option<usize> {
        self.current.filter(|i| *i < self.profiles.len())
    }

    /// Selected profile
    pub fn current_profile(&self) -> Option<&ServerProfile> {
        self.current().and_then(|i| self.profiles.get(i))
    }

    /// Selected index as handed to hosts: -1 when nothing is selected
    pub fn current_index(&self) -> i64 {
        self.current().map(|i| i as i64).unwrap_or(-1)
    }

    /// Select by index. Returns false (leaving the selection alone) when out of range.
    pub fn set_current(&mut self, index: usize) -> bool {
        if index < self.profiles.len() {
            self.current = Some(index);
            true
        } else {
            false
        }
    }

    /// Select by profile id
    pub fn select(&mut self, id: &str) -> bool {
        match self.position(id) {
            Some(index) => self.set_current(index),
            None => false,
        }
    }

    pub fn clear_current(&mut self) {
        self.current = None;
    }

    /// Indices of profiles flagged as default gateway, in sequence order
    pub fn default_gateway_indices(&self) -> Vec<usize> {
        self.profiles
            .iter()
            .enumerate()
            .filter(|(_, p)| p.default_gateway)
            .map(|(i, _)| i)
            .collect()
    }

    pub(crate) fn validate(&self, server: &str) -> Result<(), ModelError> {
        let mut seen = HashSet::with_capacity(self.profiles.len());
        for profile in &self.profiles {
            if profile.id.is_empty() {
                return Err(ModelError::MissingField {
                    entity: "profile",
                    field: "id",
                });
            }
            if !seen.insert(profile.id.as_str()) {
                return Err(ModelError::DuplicateProfile {
                    server: server.to_string(),
                    profile: profile.id.clone(),
                });
            }
        }
        if let Some(index) = self.current {
            if index >= self.profiles.len() {
                return Err(ModelError::ProfileIndexOutOfRange {
                    server: server.to_string(),
                    index,
                    len: self.profiles.len(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profiles() -> ServerProfiles {
        ServerProfiles::new(vec![
            ServerProfile::new("p1", "Internet", false),
            ServerProfile::new("p2", "Full tunnel", true),
            ServerProfile::new("p3", "Also full", true),
        ])
    }

    #[test]
    fn test_current_index_unset() {
        let p = profiles();
        assert_eq!(p.current(), None);
        assert_eq!(p.current_index(), -1);
    }

    #[test]
    fn test_select_by_id() {
        let mut p = profiles();
        assert!(p.select("p3"));
        assert_eq!(p.current_index(), 2);
        assert_eq!(p.current_profile().unwrap().id, "p3");

        assert!(!p.select("missing"));
        assert_eq!(p.current(), Some(2));
    }

    #[test]
    fn test_default_gateway_indices() {
        assert_eq!(profiles().default_gateway_indices(), vec![1, 2]);
    }

    #[test]
    fn test_dns_domains_deduplicated() {
        let profile = ServerProfile::new("p", "P", false)
            .with_dns_search_domains(["a.example", "b.example", "a.example"]);
        assert_eq!(profile.dns_search_domains(), ["a.example", "b.example"]);
    }

    #[test]
    fn test_deserialized_dns_domains_deduplicated() {
        let json = r#"{
            "id": "p",
            "display_name": "P",
            "dns_search_domains": ["b.example", "a.example", "b.example"]
        }"#;
        let profile: ServerProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.dns_search_domains(), ["b.example", "a.example"]);
    }

    #[test]
    fn test_validate_duplicate_and_range() {
        let dup = ServerProfiles::new(vec![
            ServerProfile::new("p", "A", false),
            ServerProfile::new("p", "B", false),
        ]);
        assert!(matches!(
            dup.validate("srv"),
            Err(ModelError::DuplicateProfile { .. })
        ));

        let json = r#"{"profiles": [{"id": "p", "display_name": "P"}], "current": 3}"#;
        let out_of_range: ServerProfiles = serde_json::from_str(json).unwrap();
        assert_eq!(out_of_range.current(), None);
        assert!(matches!(
            out_of_range.validate("srv"),
            Err(ModelError::ProfileIndexOutOfRange { index: 3, len: 1, .. })
        ));
    }
}
