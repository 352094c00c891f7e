//! Discovery organizations
//!
//! An organization is the entry point for secure internet: users pick
//! their home organization and the engine follows its
//! `secure_internet_home` pointer to the base server.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single discovery organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    display_name: String,
    org_id: String,
    /// Identifier of the secure internet base server, empty when none
    #[serde(default)]
    secure_internet_home: String,
    #[serde(default)]
    keyword_list: Vec<String>,
}

impl Organization {
    /// Create an organization
    pub fn new(
        org_id: impl Into<String>,
        display_name: impl Into<String>,
        secure_internet_home: impl Into<String>,
        keyword_list: Vec<String>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            org_id: org_id.into(),
            secure_internet_home: secure_internet_home.into(),
            keyword_list,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn org_id(&self) -> &str {
        &self.org_id
    }

    /// Secure internet home server, if the organization has one
    pub fn secure_internet_home(&self) -> Option<&str> {
        if self.secure_internet_home.is_empty() {
            None
        } else {
            Some(&self.secure_internet_home)
        }
    }

    pub fn keyword_list(&self) -> &[String] {
        &self.keyword_list
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.org_id.is_empty() {
            return Err(ModelError::MissingField {
                entity: "organization",
                field: "org_id",
            });
        }
        if self.display_name.is_empty() {
            return Err(ModelError::MissingField {
                entity: "organization",
                field: "display_name",
            });
        }
        Ok(())
    }
}

/// Versioned organization catalog
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationList {
    /// Discovery version, used for rollback protection
    pub version: u64,
    #[serde(default)]
    organizations: Vec<Organization>,
}

impl OrganizationList {
    /// Create a list with the given version
    pub fn new(version: u64, organizations: Vec<Organization>) -> Self {
        Self {
            version,
            organizations,
        }
    }

    /// Empty catalog (version 0), the state before the first refresh
    pub fn empty() -> Self {
        Self::default()
    }

    /// Find an organization by id
    pub fn find(&self, org_id: &str) -> Option<&Organization> {
        self.organizations.iter().find(|o| o.org_id == org_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Organization> {
        self.organizations.iter()
    }

    pub fn as_slice(&self) -> &[Organization] {
        &self.organizations
    }

    pub fn len(&self) -> usize {
        self.organizations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.organizations.is_empty()
    }

    /// Check required fields and `org_id` uniqueness
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut seen = HashSet::with_capacity(self.organizations.len());
        for org in &self.organizations {
            org.validate()?;
            if !seen.insert(org.org_id.as_str()) {
                return Err(ModelError::DuplicateOrganization(org.org_id.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org(id: &str) -> Organization {
        Organization::new(id, format!("Org {id}"), "", vec![])
    }

    #[test]
    fn test_secure_internet_home() {
        let with_home = Organization::new("org-a", "A", "srv-si-1", vec![]);
        assert_eq!(with_home.secure_internet_home(), Some("srv-si-1"));
        assert_eq!(org("org-b").secure_internet_home(), None);
    }

    #[test]
    fn test_find() {
        let list = OrganizationList::new(1, vec![org("a"), org("b")]);
        assert_eq!(list.find("b").map(|o| o.org_id()), Some("b"));
        assert!(list.find("c").is_none());
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_duplicate_org_id_rejected() {
        let list = OrganizationList::new(1, vec![org("a"), org("a")]);
        assert_eq!(
            list.validate(),
            Err(ModelError::DuplicateOrganization("a".into()))
        );
    }

    #[test]
    fn test_missing_fields_rejected() {
        let list = OrganizationList::new(1, vec![Organization::new("", "x", "", vec![])]);
        assert!(matches!(
            list.validate(),
            Err(ModelError::MissingField { field: "org_id", .. })
        ));

        let list = OrganizationList::new(1, vec![Organization::new("x", "", "", vec![])]);
        assert!(matches!(
            list.validate(),
            Err(ModelError::MissingField { field: "display_name", .. })
        ));
    }

    #[test]
    fn test_deserialize_defaults() {
        let json = r#"{"version": 4, "organizations": [{"display_name": "A", "org_id": "a"}]}"#;
        let list: OrganizationList = serde_json::from_str(json).unwrap();
        assert_eq!(list.version, 4);
        assert!(list.find("a").unwrap().keyword_list().is_empty());
        assert!(list.validate().is_ok());
    }
}
