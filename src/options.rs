//! Case-insensitive option map handed to data source constructors.
//!
//! Keys are lower-cased on insert and on lookup, so `"Path"` and `"path"`
//! name the same entry and a later insert overwrites an earlier one.

use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// String-to-string options with case-insensitive keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct OptionsMap {
    entries: BTreeMap<String, String>,
}

impl OptionsMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing any entry whose key differs only in case.
    ///
    /// Returns the replaced value.
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(normalize(key.as_ref()), value.into())
    }

    /// Look up a value by key, ignoring case.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(&normalize(key)).map(String::as_str)
    }

    /// Check whether a key is present, ignoring case.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&normalize(key))
    }

    /// Remove an entry, ignoring case.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(&normalize(key))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(normalized key, value)` pairs.
    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.entries.iter()
    }
}

fn normalize(key: &str) -> String {
    key.to_lowercase()
}

impl From<BTreeMap<String, String>> for OptionsMap {
    fn from(raw: BTreeMap<String, String>) -> Self {
        raw.into_iter().collect()
    }
}

impl From<OptionsMap> for BTreeMap<String, String> {
    fn from(options: OptionsMap) -> Self {
        options.entries
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for OptionsMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = OptionsMap::new();
        options.extend(iter);
        options
    }
}

impl<K: AsRef<str>, V: Into<String>> Extend<(K, V)> for OptionsMap {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<'a> IntoIterator for &'a OptionsMap {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MsgPackCodec;

    #[test]
    fn test_later_key_overwrites_across_case() {
        let mut options = OptionsMap::new();
        options.insert("Path", "a");
        let replaced = options.insert("path", "b");

        assert_eq!(replaced.as_deref(), Some("a"));
        assert_eq!(options.len(), 1);
        assert_eq!(options.get("PATH"), Some("b"));
        assert_eq!(options.iter().next(), Some((&"path".to_string(), &"b".to_string())));
    }

    #[test]
    fn test_lookup_ignores_case() {
        let options: OptionsMap = [("Header", "true")].into_iter().collect();
        assert!(options.contains_key("HEADER"));
        assert_eq!(options.get("header"), Some("true"));
        assert_eq!(options.get("missing"), None);
    }

    #[test]
    fn test_remove() {
        let mut options: OptionsMap = [("Sep", ";")].into_iter().collect();
        assert_eq!(options.remove("SEP").as_deref(), Some(";"));
        assert!(options.is_empty());
    }

    #[test]
    fn test_deserialize_normalizes_keys() {
        let mut raw = BTreeMap::new();
        raw.insert("MixedCase".to_string(), "v".to_string());
        let encoded = MsgPackCodec::encode(&raw).unwrap();

        let options: OptionsMap = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(options.get("mixedcase"), Some("v"));
        assert!(options.iter().all(|(k, _)| k == "mixedcase"));
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let options: OptionsMap = [("A", "1"), ("b", "2")].into_iter().collect();
        let json = serde_json::to_string(&options).unwrap();
        assert_eq!(json, r#"{"a":"1","b":"2"}"#);
    }
}
