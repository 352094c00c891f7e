//! Secure internet gateway locations

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Country codes hosting secure internet gateways for one base server.
///
/// Codes are stored lower-cased so lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ServerLocationSet {
    codes: BTreeSet<String>,
}

impl ServerLocationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a country code
    pub fn insert(&mut self, code: &str) -> bool {
        self.codes.insert(code.to_ascii_lowercase())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains(&code.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.codes.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for ServerLocationSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for code in iter {
            set.insert(code.as_ref());
        }
        set
    }
}

impl From<Vec<String>> for ServerLocationSet {
    fn from(codes: Vec<String>) -> Self {
        codes.iter().collect()
    }
}

impl From<ServerLocationSet> for Vec<String> {
    fn from(set: ServerLocationSet) -> Self {
        set.codes.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive() {
        let set: ServerLocationSet = ["NL", "de", "nl"].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert!(set.contains("nl"));
        assert!(set.contains("DE"));
        assert!(!set.contains("fr"));
    }

    #[test]
    fn test_serde_as_list() {
        let set: ServerLocationSet = serde_json::from_str(r#"["SE", "fi"]"#).unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["fi", "se"]);
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"["fi","se"]"#);
    }
}
