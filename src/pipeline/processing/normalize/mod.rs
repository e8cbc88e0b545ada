//! Field normalization: maps each source's column layout onto [`NormalizedRecord`].
//!
//! Cleaning rules are plain functions so the merge engine can reapply the
//! phone rule after sources are combined.

pub mod registry;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{MergeError, Result};
use crate::types::{NormalizedRecord, RawRecord, Source};

pub use registry::{NormalizationRegistry, SourceSchema};

/// A quote or backslash run together with the whitespace around it
static QUOTE_ARTIFACT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\s*["\\]+\s*"#).unwrap());

static NON_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\D").unwrap());

/// Repair the upstream quoting defect in business names.
///
/// Quote and backslash characters become a single space, then the value is trimmed.
pub fn clean_string(value: &str) -> String {
    QUOTE_ARTIFACT.replace_all(value, " ").trim().to_string()
}

/// Drop the `.0` a spreadsheet export appends to numeric cells
pub fn strip_float_suffix(value: &str) -> &str {
    value.strip_suffix(".0").unwrap_or(value)
}

/// Digits only, prefixed with `+`. A value without digits normalizes to empty.
pub fn ensure_plus_prefix(value: &str) -> String {
    let value = strip_float_suffix(value.trim());
    let digits = NON_DIGIT.replace_all(value, "");
    if digits.is_empty() {
        String::new()
    } else {
        format!("+{}", digits)
    }
}

/// True when `value` is `+` followed by at least one digit and nothing else
pub fn is_normalized_phone(value: &str) -> bool {
    value
        .strip_prefix('+')
        .map(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

/// Trait for mapping a raw source row onto the canonical record shape
pub trait SourceNormalizer: Send + Sync {
    fn normalize(&self, record: &RawRecord) -> Result<NormalizedRecord>;

    /// The source this normalizer tags its records with
    fn source(&self) -> Source;

    fn name(&self) -> &str;
}

/// Normalizer driven entirely by a [`SourceSchema`]
pub struct SchemaNormalizer {
    source: Source,
    schema: SourceSchema,
    name: String,
}

impl SchemaNormalizer {
    pub fn new(source: Source, schema: SourceSchema) -> Self {
        Self {
            source,
            name: format!("{} schema normalizer", source),
            schema,
        }
    }

    fn column<'a>(record: &'a RawRecord, column: Option<&str>) -> &'a str {
        column.and_then(|c| record.get(c)).unwrap_or("").trim()
    }
}

impl SourceNormalizer for SchemaNormalizer {
    fn normalize(&self, record: &RawRecord) -> Result<NormalizedRecord> {
        let name_column = self
            .schema
            .name_columns
            .iter()
            .find(|c| record.has_column(c))
            .ok_or_else(|| MergeError::SourceSchemaMismatch {
                source_name: self.source,
                expected: self.schema.name_columns.clone(),
            })?;

        Ok(NormalizedRecord {
            name: clean_string(record.get(name_column).unwrap_or("")),
            phone: ensure_plus_prefix(Self::column(record, Some(&self.schema.phone_column))),
            category: Self::column(record, Some(&self.schema.category_column)).to_string(),
            address: Self::column(record, self.schema.address_column.as_deref()).to_string(),
            source: self.source,
        })
    }

    fn source(&self) -> Source {
        self.source
    }

    fn name(&self) -> &str {
        &self.name
    }
}
