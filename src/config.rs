use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::constants;
use crate::error::{MergeError, Result};
use crate::pipeline::processing::conflation::MergeConfig;
use crate::pipeline::processing::normalize::SourceSchema;
use crate::types::Source;

pub const DEFAULT_CONFIG_FILE: &str = "listing_merge.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding every source table and the merged output
    pub data_dir: PathBuf,
    pub output_file: String,
    /// Document served verbatim by `GET /static-json`
    pub static_json_file: PathBuf,
    /// Per-source read budget; a source that overruns it is skipped
    pub source_read_timeout_ms: u64,
    pub sources: SourcesConfig,
    pub merge: MergeConfig,
    pub enrich: EnrichConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "SourceSchema::google")]
    pub google: SourceSchema,
    #[serde(default = "SourceSchema::website")]
    pub website: SourceSchema,
    #[serde(default = "SourceSchema::facebook")]
    pub facebook: SourceSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    pub input: String,
    pub output: String,
    /// Locality columns joined into `address`, in output order
    pub sub_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("public"),
            output_file: constants::MERGED_FILE.to_string(),
            static_json_file: PathBuf::from("data/sample_data.json"),
            source_read_timeout_ms: 30_000,
            sources: SourcesConfig::default(),
            merge: MergeConfig::default(),
            enrich: EnrichConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            google: SourceSchema::google(),
            website: SourceSchema::website(),
            facebook: SourceSchema::facebook(),
        }
    }
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            input: constants::WEBSITE_FILE.to_string(),
            output: constants::WEBSITE_ENRICHED_FILE.to_string(),
            sub_fields: vec![
                constants::WEBSITE_CITY_COLUMN.to_string(),
                constants::WEBSITE_REGION_COLUMN.to_string(),
                constants::WEBSITE_COUNTRY_COLUMN.to_string(),
            ],
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 5000 }
    }
}

impl Config {
    /// Load from `path`, or from `listing_merge.toml` when present, else defaults.
    /// Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MergeError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        info!("Loaded configuration from {}", path.display());
        Self::from_toml(&content)
    }

    pub fn from_toml(input: &str) -> Result<Self> {
        let config: Config = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("LISTING_MERGE_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(output) = std::env::var("LISTING_MERGE_OUTPUT") {
            if !output.trim().is_empty() {
                self.output_file = output;
            }
        }
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.source_read_timeout_ms == 0 {
            return Err(MergeError::Config(
                "source_read_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.output_file.trim().is_empty() {
            return Err(MergeError::Config("output_file must be set".into()));
        }
        for source in Source::LOAD_ORDER {
            self.schema(source).validate(source)?;
        }
        Ok(())
    }

    pub fn schema(&self, source: Source) -> &SourceSchema {
        match source {
            Source::Google => &self.sources.google,
            Source::Website => &self.sources.website,
            Source::Facebook => &self.sources.facebook,
        }
    }

    /// Schemas in load order, as owned pairs for building a registry
    pub fn schemas(&self) -> Vec<(Source, SourceSchema)> {
        Source::LOAD_ORDER
            .iter()
            .map(|s| (*s, self.schema(*s).clone()))
            .collect()
    }

    pub fn source_path(&self, source: Source) -> PathBuf {
        self.data_dir.join(&self.schema(source).file)
    }

    pub fn enriched_source_path(&self, source: Source) -> Option<PathBuf> {
        self.schema(source)
            .enriched_file
            .as_ref()
            .map(|f| self.data_dir.join(f))
    }

    pub fn output_path(&self) -> PathBuf {
        self.data_dir.join(&self.output_file)
    }

    pub fn source_read_timeout(&self) -> Duration {
        Duration::from_millis(self.source_read_timeout_ms)
    }

    /// True when some source contributes an address, so the merged table carries the column
    pub fn has_address_dimension(&self) -> bool {
        Source::LOAD_ORDER
            .iter()
            .any(|s| self.schema(*s).address_column.is_some())
    }

    /// Backing file, delimiter and escape byte for a dataset served over HTTP
    pub fn dataset_location(&self, dataset: &str) -> Option<(PathBuf, u8, Option<u8>)> {
        match constants::dataset_to_canonical(dataset)? {
            constants::MERGED_DATASET => Some((self.output_path(), b',', None)),
            name => {
                let source: Source = name.parse().ok()?;
                let schema = self.schema(source);
                let delimiter = schema.delimiter_byte().ok()?;
                let escape = schema.escape_byte().ok()?;
                Some((self.source_path(source), delimiter, escape))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::conflation::{ConflictPolicy, DedupKeyShape, EmptyPhonePolicy};

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.output_path(), PathBuf::from("public/merged_dataset.csv"));
        assert_eq!(config.schema(Source::Website).delimiter, ';');
        assert_eq!(config.merge.key, DedupKeyShape::Phone);
        assert!(config.has_address_dimension());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
data_dir = "fixtures"
source_read_timeout_ms = 250

[merge]
key = "phone_address"
policy = "field_backfill"
empty_phone = "drop"

[sources.google]
file = "g.csv"
category_column = "main_category"
"#,
        )
        .unwrap();

        assert_eq!(config.source_path(Source::Google), PathBuf::from("fixtures/g.csv"));
        assert_eq!(config.schema(Source::Google).category_column, "main_category");
        assert_eq!(config.schema(Source::Facebook), &SourceSchema::facebook());
        assert_eq!(config.merge.key, DedupKeyShape::PhoneAddress);
        assert_eq!(config.merge.policy, ConflictPolicy::FieldBackfill);
        assert_eq!(config.merge.empty_phone, EmptyPhonePolicy::Drop);
        assert!(config.merge.dedup);
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.source_read_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        assert!(Config::from_toml("source_read_timeout_ms = 0").is_err());
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        assert!(Config::from_toml("[merge]\npolicy = \"newest_wins\"").is_err());
    }

    #[test]
    fn test_address_dimension_follows_schemas() {
        let mut config = Config::default();
        config.sources.website.address_column = None;
        assert!(!config.has_address_dimension());
    }

    #[test]
    fn test_dataset_locations() {
        let config = Config::default();
        let (path, delimiter, escape) = config.dataset_location("website").unwrap();
        assert_eq!(path, PathBuf::from("public/website_dataset.csv"));
        assert_eq!(delimiter, b';');
        assert_eq!(escape, Some(b'\\'));

        let (merged, _, merged_escape) = config.dataset_location("combined").unwrap();
        assert_eq!(merged, config.output_path());
        assert_eq!(merged_escape, None);
        assert!(config.dataset_location("yelp").is_none());
    }
}
