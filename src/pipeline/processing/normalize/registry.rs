use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::{SchemaNormalizer, SourceNormalizer};
use crate::constants;
use crate::error::{MergeError, Result};
use crate::types::{NormalizedRecord, RawRecord, Source};

/// Declarative column mapping for one source table.
///
/// Adding a source means adding one of these; the merge engine never looks at
/// source-specific column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSchema {
    /// Raw table file name, relative to the data directory
    pub file: String,
    /// Address-enriched variant preferred by the loader when it exists
    #[serde(default)]
    pub enriched_file: Option<String>,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Escape character inside quoted fields of the raw table
    #[serde(default = "default_escape")]
    pub escape: Option<char>,
    /// Name-like columns in order of preference; the first present one is renamed to `name`
    #[serde(default = "default_name_columns")]
    pub name_columns: Vec<String>,
    #[serde(default = "default_phone_column")]
    pub phone_column: String,
    pub category_column: String,
    #[serde(default)]
    pub address_column: Option<String>,
}

fn default_delimiter() -> char {
    ','
}

fn default_escape() -> Option<char> {
    Some('\\')
}

fn default_name_columns() -> Vec<String> {
    vec![
        constants::NAME_COLUMN.to_string(),
        constants::LEGAL_NAME_COLUMN.to_string(),
    ]
}

fn default_phone_column() -> String {
    constants::PHONE_COLUMN.to_string()
}

impl SourceSchema {
    pub fn google() -> Self {
        Self {
            file: constants::GOOGLE_FILE.to_string(),
            enriched_file: None,
            delimiter: ',',
            escape: default_escape(),
            name_columns: default_name_columns(),
            phone_column: default_phone_column(),
            category_column: "category".to_string(),
            address_column: None,
        }
    }

    pub fn website() -> Self {
        Self {
            file: constants::WEBSITE_FILE.to_string(),
            enriched_file: Some(constants::WEBSITE_ENRICHED_FILE.to_string()),
            delimiter: ';',
            escape: default_escape(),
            name_columns: default_name_columns(),
            phone_column: default_phone_column(),
            category_column: "s_category".to_string(),
            address_column: Some(constants::ADDRESS_COLUMN.to_string()),
        }
    }

    pub fn facebook() -> Self {
        Self {
            file: constants::FACEBOOK_FILE.to_string(),
            enriched_file: None,
            delimiter: ',',
            escape: default_escape(),
            name_columns: default_name_columns(),
            phone_column: default_phone_column(),
            category_column: "categories".to_string(),
            address_column: None,
        }
    }

    pub fn default_for(source: Source) -> Self {
        match source {
            Source::Google => Self::google(),
            Source::Website => Self::website(),
            Source::Facebook => Self::facebook(),
        }
    }

    /// Delimiter as the single byte the CSV reader expects
    pub fn delimiter_byte(&self) -> Result<u8> {
        if self.delimiter.is_ascii() {
            Ok(self.delimiter as u8)
        } else {
            Err(MergeError::Config(format!(
                "delimiter '{}' is not a single ASCII character",
                self.delimiter
            )))
        }
    }

    /// Escape character as the byte the CSV reader expects
    pub fn escape_byte(&self) -> Result<Option<u8>> {
        match self.escape {
            None => Ok(None),
            Some(c) if c.is_ascii() => Ok(Some(c as u8)),
            Some(c) => Err(MergeError::Config(format!(
                "escape '{}' is not a single ASCII character",
                c
            ))),
        }
    }

    /// First configured name-like column present in `headers`
    pub fn resolve_name_column<'a, I>(&self, headers: I) -> Option<&str>
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        self.name_columns
            .iter()
            .find(|candidate| headers.clone().into_iter().any(|h| h == candidate.as_str()))
            .map(|c| c.as_str())
    }

    pub fn validate(&self, source: Source) -> Result<()> {
        self.delimiter_byte()?;
        self.escape_byte()?;
        if self.name_columns.is_empty() {
            return Err(MergeError::Config(format!(
                "source '{}': name_columns must not be empty",
                source
            )));
        }
        if self.file.trim().is_empty() {
            return Err(MergeError::Config(format!("source '{}': file must be set", source)));
        }
        Ok(())
    }
}

/// Registry of per-source normalizers, one per configured schema
pub struct NormalizationRegistry {
    normalizers: HashMap<Source, Box<dyn SourceNormalizer>>,
}

impl NormalizationRegistry {
    /// Registry built from the default schema table
    pub fn new() -> Self {
        Self::from_schemas(Source::LOAD_ORDER.iter().map(|s| (*s, SourceSchema::default_for(*s))))
    }

    pub fn from_schemas<I>(schemas: I) -> Self
    where
        I: IntoIterator<Item = (Source, SourceSchema)>,
    {
        let mut registry = Self {
            normalizers: HashMap::new(),
        };
        for (source, schema) in schemas {
            registry.register(Box::new(SchemaNormalizer::new(source, schema)));
        }
        registry
    }

    /// Register a normalizer under the source it tags records with, replacing any existing one
    pub fn register(&mut self, normalizer: Box<dyn SourceNormalizer>) {
        let source = normalizer.source();
        debug!("Registering {} for {}", normalizer.name(), source);
        self.normalizers.insert(source, normalizer);
    }

    pub fn get_normalizer(&self, source: Source) -> Option<&dyn SourceNormalizer> {
        self.normalizers.get(&source).map(|n| n.as_ref())
    }

    /// Normalize a raw row using the normalizer registered for `source`
    pub fn normalize(&self, source: Source, record: &RawRecord) -> Result<NormalizedRecord> {
        match self.get_normalizer(source) {
            Some(normalizer) => normalizer.normalize(record),
            None => Err(MergeError::Config(format!(
                "no normalizer registered for source: {}",
                source
            ))),
        }
    }

    /// Registered sources in load order
    pub fn list_sources(&self) -> Vec<Source> {
        Source::LOAD_ORDER
            .iter()
            .copied()
            .filter(|s| self.normalizers.contains_key(s))
            .collect()
    }
}

impl Default for NormalizationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_all_sources() {
        let registry = NormalizationRegistry::new();
        assert_eq!(
            registry.list_sources(),
            vec![Source::Google, Source::Website, Source::Facebook]
        );
    }

    #[test]
    fn test_registry_returns_error_for_unregistered_source() {
        let registry = NormalizationRegistry::from_schemas([(Source::Google, SourceSchema::google())]);
        let raw = RawRecord::from_pairs([("name", "Acme")]);
        assert!(registry.normalize(Source::Facebook, &raw).is_err());
        assert!(registry.normalize(Source::Google, &raw).is_ok());
    }

    struct UppercaseNames;

    impl SourceNormalizer for UppercaseNames {
        fn normalize(&self, record: &RawRecord) -> Result<NormalizedRecord> {
            let mut normalized = NormalizedRecord::empty(Source::Facebook);
            normalized.name = record.get("name").unwrap_or("").to_uppercase();
            Ok(normalized)
        }

        fn source(&self) -> Source {
            Source::Facebook
        }

        fn name(&self) -> &str {
            "uppercase"
        }
    }

    #[test]
    fn test_register_replaces_normalizer() {
        let mut registry = NormalizationRegistry::new();
        registry.register(Box::new(UppercaseNames));

        let raw = RawRecord::from_pairs([("name", "acme")]);
        let normalized = registry.normalize(Source::Facebook, &raw).unwrap();
        assert_eq!(normalized.name, "ACME");
        assert_eq!(registry.get_normalizer(Source::Facebook).unwrap().name(), "uppercase");
    }

    #[test]
    fn test_default_category_columns() {
        assert_eq!(SourceSchema::google().category_column, "category");
        assert_eq!(SourceSchema::website().category_column, "s_category");
        assert_eq!(SourceSchema::facebook().category_column, "categories");
    }

    #[test]
    fn test_resolve_name_column_prefers_name() {
        let schema = SourceSchema::website();
        assert_eq!(schema.resolve_name_column(["legal_name", "name"]), Some("name"));
        assert_eq!(schema.resolve_name_column(["legal_name", "phone"]), Some("legal_name"));
        assert_eq!(schema.resolve_name_column(["phone"]), None);
    }

    #[test]
    fn test_non_ascii_delimiter_is_rejected() {
        let mut schema = SourceSchema::google();
        schema.delimiter = '§';
        assert!(schema.validate(Source::Google).is_err());
    }

    #[test]
    fn test_schema_deserializes_with_defaults() {
        let schema: SourceSchema = toml::from_str(
            r#"
file = "yelp.csv"
category_column = "kind"
"#,
        )
        .unwrap();
        assert_eq!(schema.delimiter, ',');
        assert_eq!(schema.escape, Some('\\'));
        assert_eq!(schema.phone_column, "phone");
        assert_eq!(schema.name_columns, vec!["name", "legal_name"]);
        assert!(schema.address_column.is_none());
    }
}
