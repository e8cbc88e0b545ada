use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants;
use crate::error::MergeError;

/// The independent scraped datasets that feed the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Google,
    Website,
    Facebook,
}

impl Source {
    /// Load order. Row order within the combined set follows this, never priority.
    pub const LOAD_ORDER: [Source; 3] = [Source::Google, Source::Website, Source::Facebook];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Google => constants::GOOGLE_SOURCE,
            Source::Website => constants::WEBSITE_SOURCE,
            Source::Facebook => constants::FACEBOOK_SOURCE,
        }
    }

    /// Rank in the conflict-resolution order `google > facebook > website`.
    /// Lower wins.
    pub fn priority(&self) -> u8 {
        match self {
            Source::Google => 0,
            Source::Facebook => 1,
            Source::Website => 2,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            constants::GOOGLE_SOURCE => Ok(Source::Google),
            constants::WEBSITE_SOURCE => Ok(Source::Website),
            constants::FACEBOOK_SOURCE => Ok(Source::Facebook),
            other => Err(MergeError::Config(format!("unknown source '{}'", other))),
        }
    }
}

/// One row of one source table, keyed by that source's own column names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub fields: Vec<(String, String)>,
}

impl RawRecord {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.fields.iter().any(|(name, _)| name == column)
    }
}

/// Canonical shape every source row is mapped onto.
///
/// Missing source columns become empty strings; only `source` is guaranteed
/// to carry information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub name: String,
    pub phone: String,
    pub category: String,
    pub address: String,
    pub source: Source,
}

impl NormalizedRecord {
    pub fn empty(source: Source) -> Self {
        Self {
            name: String::new(),
            phone: String::new(),
            category: String::new(),
            address: String::new(),
            source,
        }
    }

    /// True when no descriptive field carries a value.
    pub fn is_blank(&self) -> bool {
        self.name.is_empty()
            && self.phone.is_empty()
            && self.category.is_empty()
            && self.address.is_empty()
    }
}

/// The representative record chosen for one dedup group.
pub type MergedRecord = NormalizedRecord;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order_is_google_facebook_website() {
        let mut sources = Source::LOAD_ORDER.to_vec();
        sources.sort_by_key(|s| s.priority());
        assert_eq!(sources, vec![Source::Google, Source::Facebook, Source::Website]);
    }

    #[test]
    fn test_source_round_trips_through_str() {
        for source in Source::LOAD_ORDER {
            assert_eq!(source.as_str().parse::<Source>().unwrap(), source);
        }
        assert!("yelp".parse::<Source>().is_err());
    }

    #[test]
    fn test_raw_record_lookup() {
        let raw = RawRecord::from_pairs([("name", "Acme"), ("phone", "123")]);
        assert_eq!(raw.get("name"), Some("Acme"));
        assert!(raw.has_column("phone"));
        assert_eq!(raw.get("category"), None);
    }

    #[test]
    fn test_blank_ignores_source() {
        let record = NormalizedRecord::empty(Source::Website);
        assert!(record.is_blank());
    }
}
