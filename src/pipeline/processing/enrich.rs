//! Address enrichment for the website source.
//!
//! Folds the locality sub-fields of each row into a single `address` column
//! and writes the result to the file the loader prefers for that source.

use serde::Serialize;
use std::path::Path;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::constants;
use crate::error::Result;
use crate::observability::metrics;
use crate::pipeline::ingestion::read_table;
use crate::pipeline::storage::write_table_atomically;
use crate::types::Source;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichSummary {
    pub rows_written: usize,
    pub malformed_rows: usize,
    /// Configured sub-fields that were actually present in the header
    pub sub_fields_found: Vec<String>,
}

pub struct AddressEnricher {
    sub_fields: Vec<String>,
    delimiter: u8,
    /// Escape of the raw input; the written file is plain RFC 4180
    escape: Option<u8>,
}

impl AddressEnricher {
    pub fn new(sub_fields: Vec<String>, delimiter: u8, escape: Option<u8>) -> Self {
        Self {
            sub_fields,
            delimiter,
            escape,
        }
    }

    /// Enricher for the website source as configured
    pub fn from_config(config: &Config) -> Result<Self> {
        let schema = config.schema(Source::Website);
        Ok(Self::new(
            config.enrich.sub_fields.clone(),
            schema.delimiter_byte()?,
            schema.escape_byte()?,
        ))
    }

    /// Read `input`, synthesize `address`, drop the sub-field columns and write `output`.
    ///
    /// Output uses the same delimiter as the input and reads back the same
    /// values the loader gets from the raw file. When none of the sub-fields
    /// exist, every row still gets an empty `address`.
    #[instrument(skip(self))]
    pub fn enrich_file(&self, input: &Path, output: &Path) -> Result<EnrichSummary> {
        let table = read_table(input, self.delimiter, self.escape)?;

        let found: Vec<(String, usize)> = self
            .sub_fields
            .iter()
            .filter_map(|field| table.column_index(field).map(|idx| (field.clone(), idx)))
            .collect();
        if found.is_empty() {
            warn!(
                "None of {:?} found in {}, address will be empty",
                self.sub_fields,
                input.display()
            );
        }

        // Columns carried over unchanged; a stale address column is replaced
        let kept: Vec<usize> = (0..table.headers.len())
            .filter(|idx| {
                !found.iter().any(|(_, f)| f == idx)
                    && table.headers[*idx] != constants::ADDRESS_COLUMN
            })
            .collect();

        let mut header: Vec<&str> = kept.iter().map(|&idx| table.headers[idx].as_str()).collect();
        header.push(constants::ADDRESS_COLUMN);

        let rows = table.rows.iter().map(|row| {
            let mut out: Vec<String> = kept.iter().map(|&idx| row[idx].clone()).collect();
            out.push(join_address(found.iter().map(|(_, idx)| row[*idx].as_str())));
            out
        });
        write_table_atomically(output, self.delimiter, &header, rows)?;

        let rows_written = table.rows.len();
        metrics::enrich::rows_written(rows_written);
        info!("File saved as {} ({} rows)", output.display(), rows_written);

        Ok(EnrichSummary {
            rows_written,
            malformed_rows: table.malformed_rows,
            sub_fields_found: found.into_iter().map(|(name, _)| name).collect(),
        })
    }
}

/// Join the non-empty parts with `", "`
pub fn join_address<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(constants::ADDRESS_SEPARATOR)
}

/// Run the enricher over the configured website input and output files
pub fn enrich_website(config: &Config) -> Result<EnrichSummary> {
    let enricher = AddressEnricher::from_config(config)?;
    let input = config.data_dir.join(&config.enrich.input);
    let output = config.data_dir.join(&config.enrich.output);
    enricher.enrich_file(&input, &output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn default_enricher() -> AddressEnricher {
        AddressEnricher::from_config(&Config::default()).unwrap()
    }

    #[test]
    fn test_join_address_skips_empty_parts() {
        assert_eq!(join_address(["Austin", "", "United States"]), "Austin, United States");
        assert_eq!(join_address([" ", ""]), "");
        assert_eq!(join_address(["Lyon"]), "Lyon");
    }

    #[test]
    fn test_enrich_combines_and_drops_sub_fields() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.csv");
        let output = dir.path().join("out.csv");
        fs::write(
            &input,
            "name; main_city ;main_region;main_country;phone\nAcme;Austin;Texas;;15125550100\nBolt;;;France;33100\n",
        )
        .unwrap();

        let summary = default_enricher().enrich_file(&input, &output).unwrap();
        assert_eq!(summary.rows_written, 2);
        assert_eq!(summary.sub_fields_found, vec!["main_city", "main_region", "main_country"]);

        let content = fs::read_to_string(&output).unwrap();
        assert_eq!(
            content,
            "name;phone;address\nAcme;15125550100;Austin, Texas\nBolt;33100;France\n"
        );
    }

    #[test]
    fn test_enrich_without_sub_fields_writes_empty_address() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.csv");
        let output = dir.path().join("out.csv");
        fs::write(&input, "name;phone\nAcme;1\n").unwrap();

        let summary = default_enricher().enrich_file(&input, &output).unwrap();
        assert!(summary.sub_fields_found.is_empty());
        assert_eq!(fs::read_to_string(&output).unwrap(), "name;phone;address\nAcme;1;\n");
    }

    #[test]
    fn test_enrich_replaces_existing_address_column() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.csv");
        let output = dir.path().join("out.csv");
        fs::write(&input, "name;address;main_city\nAcme;stale;Austin\n").unwrap();

        default_enricher().enrich_file(&input, &output).unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "name;address\nAcme;Austin\n");
    }

    #[test]
    fn test_enrich_website_uses_data_dir() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("website_dataset.csv"),
            "name;main_city\nAcme;Austin\n",
        )
        .unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        enrich_website(&config).unwrap();
        assert!(dir.path().join("website_dataset_with_address.csv").is_file());
    }

    #[test]
    fn test_enrich_reads_escaped_quotes_like_the_loader() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.csv");
        let output = dir.path().join("out.csv");
        fs::write(&input, "name;main_city\n\"Joe\\\"s Bar\";Austin\n").unwrap();

        default_enricher().enrich_file(&input, &output).unwrap();
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "name;address\n\"Joe\"\"s Bar\";Austin\n"
        );
    }
}
