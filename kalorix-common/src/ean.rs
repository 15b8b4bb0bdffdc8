//! EAN code set
//!
//! Products track which external records have been folded into them through
//! a set of EAN codes. The set keeps first-seen order, never holds the same
//! code twice and never holds empty codes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Ordered, duplicate-free set of non-empty product codes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EanSet(Vec<String>);

impl EanSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Set holding a single code (empty if `code` is blank)
    pub fn single(code: impl Into<String>) -> Self {
        let mut set = Self::new();
        set.insert(code);
        set
    }

    /// Insert a code, returning `true` if it was added
    ///
    /// Blank codes and codes already present are ignored. Surrounding
    /// whitespace is trimmed before comparison.
    pub fn insert(&mut self, code: impl Into<String>) -> bool {
        let code = code.into();
        let code = code.trim();
        if code.is_empty() || self.contains(code) {
            return false;
        }
        self.0.push(code.to_string());
        true
    }

    pub fn contains(&self, code: &str) -> bool {
        self.0.iter().any(|c| c == code)
    }

    /// Union of `self` and `other`; codes from `self` come first
    pub fn union(&self, other: &EanSet) -> EanSet {
        let mut merged = self.clone();
        merged.extend(other.iter().cloned());
        merged
    }

    /// Total character length of all codes joined together
    ///
    /// Used as the "richest identifiers" tie-break during automatic merge.
    pub fn concat_len(&self) -> usize {
        self.0.iter().map(|c| c.chars().count()).sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Encode as a JSON array for the `ean` column
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// Decode the `ean` column
    ///
    /// Accepts a JSON array, a bare JSON string, `null`, or an empty column.
    pub fn from_json(raw: &str) -> crate::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::new());
        }
        Ok(serde_json::from_str(raw)?)
    }
}

impl<S: Into<String>> FromIterator<S> for EanSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = EanSet::new();
        set.extend(iter);
        set
    }
}

impl<S: Into<String>> Extend<S> for EanSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for code in iter {
            self.insert(code);
        }
    }
}

impl IntoIterator for EanSet {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Serialize for EanSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

/// Wire shapes accepted for an EAN field
#[derive(Deserialize)]
#[serde(untagged)]
enum RawEan {
    Many(Vec<Option<String>>),
    One(Option<String>),
}

impl<'de> Deserialize<'de> for EanSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let set = match RawEan::deserialize(deserializer)? {
            RawEan::Many(codes) => codes.into_iter().flatten().collect(),
            RawEan::One(code) => code.into_iter().collect(),
        };
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_skips_duplicates_and_blanks() {
        let mut set = EanSet::new();
        assert!(set.insert("111"));
        assert!(!set.insert("111"));
        assert!(!set.insert(""));
        assert!(!set.insert("   "));
        assert!(set.insert("222"));
        assert_eq!(set.as_slice(), &["111".to_string(), "222".to_string()]);
    }

    #[test]
    fn test_union_keeps_first_seen_order() {
        let target: EanSet = ["111", "222"].into_iter().collect();
        let source: EanSet = ["333", "111", ""].into_iter().collect();

        let merged = target.union(&source);
        assert_eq!(merged.as_slice(), &["111", "222", "333"]);
    }

    #[test]
    fn test_concat_len() {
        let set: EanSet = ["8594001", "12"].into_iter().collect();
        assert_eq!(set.concat_len(), 9);
        assert_eq!(EanSet::new().concat_len(), 0);
    }

    #[test]
    fn test_deserialize_accepts_array_with_nulls() {
        let set: EanSet = serde_json::from_str(r#"["111", null, "", "111", "222"]"#).unwrap();
        assert_eq!(set.as_slice(), &["111", "222"]);
    }

    #[test]
    fn test_deserialize_accepts_scalar_and_null() {
        let set: EanSet = serde_json::from_str(r#""999""#).unwrap();
        assert_eq!(set.as_slice(), &["999"]);

        let set: EanSet = serde_json::from_str("null").unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_column_roundtrip_and_empty_column() {
        let set = EanSet::single("4006040");
        let raw = set.to_json().unwrap();
        assert_eq!(raw, r#"["4006040"]"#);
        assert_eq!(EanSet::from_json(&raw).unwrap(), set);
        assert!(EanSet::from_json("").unwrap().is_empty());
    }
}
