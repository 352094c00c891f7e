//! Order-preserving string sets

use serde::{Deserialize, Deserializer};
use std::collections::HashSet;

/// Drop repeats, keeping the first occurrence of each value
pub(crate) fn dedup_in_order<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = HashSet::new();
    values
        .into_iter()
        .map(Into::into)
        .filter(|v: &String| seen.insert(v.clone()))
        .collect()
}

/// `deserialize_with` helper applying [`dedup_in_order`]
pub(crate) fn deserialize_unique<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<String>::deserialize(deserializer).map(dedup_in_order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_first_seen_order() {
        assert_eq!(dedup_in_order(["b", "a", "b", "c", "a"]), ["b", "a", "c"]);
    }
}
