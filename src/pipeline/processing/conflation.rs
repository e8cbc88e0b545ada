use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::pipeline::processing::normalize::{ensure_plus_prefix, is_normalized_phone};
use crate::types::{MergedRecord, NormalizedRecord};

/// Which fields decide that two records denote the same business
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupKeyShape {
    /// Normalized phone alone
    #[default]
    Phone,
    /// Phone plus address; separates branches sharing a switchboard number
    PhoneAddress,
    /// Phone plus cleaned name
    PhoneName,
}

/// How a dedup group with more than one member is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Highest-priority record wins outright
    #[default]
    StrictPriority,
    /// Highest-priority record wins, empty fields are filled from the other members
    FieldBackfill,
}

/// What happens to records whose phone normalizes to empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyPhonePolicy {
    /// Each one is kept as its own entity, never grouped with another
    #[default]
    Keep,
    Drop,
}

/// Merge engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub key: DedupKeyShape,
    pub policy: ConflictPolicy,
    pub empty_phone: EmptyPhonePolicy,
    /// When false the combined set is only cleaned, never grouped
    pub dedup: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            key: DedupKeyShape::Phone,
            policy: ConflictPolicy::StrictPriority,
            empty_phone: EmptyPhonePolicy::Keep,
            dedup: true,
        }
    }
}

/// Grouping key derived from a record; ordering drives output order
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DedupKey {
    pub phone: String,
    pub qualifier: Option<String>,
}

impl DedupKey {
    /// `None` when the record has no phone to key on
    pub fn for_record(record: &NormalizedRecord, shape: DedupKeyShape) -> Option<Self> {
        if record.phone.is_empty() {
            return None;
        }
        let qualifier = match shape {
            DedupKeyShape::Phone => None,
            DedupKeyShape::PhoneAddress => Some(record.address.clone()),
            DedupKeyShape::PhoneName => Some(record.name.clone()),
        };
        Some(Self {
            phone: record.phone.clone(),
            qualifier,
        })
    }
}

/// Counters describing one merge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub input_records: usize,
    pub groups: usize,
    /// Records discarded because a higher-priority group member won
    pub duplicates_collapsed: usize,
    pub empty_phone_kept: usize,
    pub empty_phone_dropped: usize,
    pub blank_records_dropped: usize,
    pub fields_backfilled: usize,
    pub output_records: usize,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub records: Vec<MergedRecord>,
    pub stats: MergeStats,
}

/// Trait for collapsing the combined record set into one record per entity
pub trait Conflator {
    fn merge(&self, records: Vec<NormalizedRecord>) -> MergeOutcome;
}

/// Exact-key merge engine with fixed source priority
#[derive(Debug, Clone, Default)]
pub struct MergeEngine {
    config: MergeConfig,
}

impl MergeEngine {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    /// Pick the representative of one group. `members` is non-empty.
    fn resolve_group(&self, mut members: Vec<NormalizedRecord>, stats: &mut MergeStats) -> MergedRecord {
        // Stable: equal priority keeps load order
        members.sort_by_key(|r| r.source.priority());
        let mut rest = members.split_off(1);
        let mut winner = members.remove(0);
        stats.duplicates_collapsed += rest.len();

        if self.config.policy == ConflictPolicy::FieldBackfill && !rest.is_empty() {
            stats.fields_backfilled += backfill(&mut winner, &mut rest);
        }
        winner
    }
}

/// Fill empty descriptive fields on `winner` from the first non-empty value
/// among `donors`, which are already in priority order.
fn backfill(winner: &mut NormalizedRecord, donors: &mut [NormalizedRecord]) -> usize {
    let mut filled = 0;
    let fields: [fn(&mut NormalizedRecord) -> &mut String; 3] = [
        |r| &mut r.name,
        |r| &mut r.category,
        |r| &mut r.address,
    ];
    for field in fields {
        if !field(winner).is_empty() {
            continue;
        }
        if let Some(value) = donors.iter_mut().map(field).find(|v| !v.is_empty()) {
            *field(winner) = std::mem::take(value);
            filled += 1;
        }
    }
    filled
}

impl Conflator for MergeEngine {
    fn merge(&self, records: Vec<NormalizedRecord>) -> MergeOutcome {
        let mut stats = MergeStats {
            input_records: records.len(),
            ..Default::default()
        };

        let mut groups: BTreeMap<DedupKey, Vec<NormalizedRecord>> = BTreeMap::new();
        let mut ungrouped: Vec<NormalizedRecord> = Vec::new();

        if self.config.dedup {
            for record in records {
                match DedupKey::for_record(&record, self.config.key) {
                    Some(key) => groups.entry(key).or_default().push(record),
                    None => match self.config.empty_phone {
                        EmptyPhonePolicy::Keep => {
                            stats.empty_phone_kept += 1;
                            ungrouped.push(record);
                        }
                        EmptyPhonePolicy::Drop => stats.empty_phone_dropped += 1,
                    },
                }
            }
        } else {
            ungrouped = records;
        }

        stats.groups = groups.len();
        debug!(
            "Grouped {} records into {} keys ({} ungrouped)",
            stats.input_records,
            stats.groups,
            ungrouped.len()
        );

        let mut resolved: Vec<MergedRecord> = Vec::with_capacity(groups.len() + ungrouped.len());
        for (_, members) in groups {
            resolved.push(self.resolve_group(members, &mut stats));
        }
        resolved.extend(ungrouped);

        // Combining sources can reintroduce inconsistent phone representations
        let mut output = Vec::with_capacity(resolved.len());
        for mut record in resolved {
            if !record.phone.is_empty() && !is_normalized_phone(&record.phone) {
                debug!("Renormalizing phone {:?} from {}", record.phone, record.source.as_str());
                record.phone = ensure_plus_prefix(&record.phone);
            }
            if record.is_blank() {
                stats.blank_records_dropped += 1;
                continue;
            }
            output.push(record);
        }
        stats.output_records = output.len();

        info!(
            "Merge resolved {} records into {} ({} duplicates collapsed, {} blank dropped)",
            stats.input_records, stats.output_records, stats.duplicates_collapsed, stats.blank_records_dropped
        );

        MergeOutcome {
            records: output,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Source;

    fn record(source: Source, name: &str, phone: &str, category: &str, address: &str) -> NormalizedRecord {
        NormalizedRecord {
            name: name.to_string(),
            phone: phone.to_string(),
            category: category.to_string(),
            address: address.to_string(),
            source,
        }
    }

    #[test]
    fn test_google_wins_over_facebook() {
        let engine = MergeEngine::default();
        let outcome = engine.merge(vec![
            record(Source::Facebook, "Acme Inc", "+12025550123", "", ""),
            record(Source::Google, "Acme", "+12025550123", "", ""),
        ]);

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].source, Source::Google);
        assert_eq!(outcome.records[0].name, "Acme");
        assert_eq!(outcome.stats.duplicates_collapsed, 1);
    }

    #[test]
    fn test_facebook_wins_over_website() {
        let engine = MergeEngine::default();
        let outcome = engine.merge(vec![
            record(Source::Website, "Site", "+1", "", "Austin"),
            record(Source::Facebook, "Page", "+1", "", ""),
        ]);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].source, Source::Facebook);
    }

    #[test]
    fn test_priority_ignores_input_order() {
        let engine = MergeEngine::default();
        let mut records = vec![
            record(Source::Website, "W", "+5", "", ""),
            record(Source::Facebook, "F", "+5", "", ""),
            record(Source::Google, "G", "+5", "", ""),
        ];
        for _ in 0..3 {
            let outcome = engine.merge(records.clone());
            assert_eq!(outcome.records[0].source, Source::Google);
            records.rotate_left(1);
        }
    }

    #[test]
    fn test_phone_address_key_separates_locations() {
        let engine = MergeEngine::new(MergeConfig {
            key: DedupKeyShape::PhoneAddress,
            ..Default::default()
        });
        let outcome = engine.merge(vec![
            record(Source::Website, "North", "+7", "", "Austin"),
            record(Source::Website, "South", "+7", "", "Dallas"),
            record(Source::Facebook, "Page", "+7", "", "Austin"),
        ]);

        assert_eq!(outcome.records.len(), 2);
        let austin = outcome.records.iter().find(|r| r.address == "Austin").unwrap();
        assert_eq!(austin.source, Source::Facebook);
    }

    #[test]
    fn test_phone_name_key() {
        let engine = MergeEngine::new(MergeConfig {
            key: DedupKeyShape::PhoneName,
            ..Default::default()
        });
        let outcome = engine.merge(vec![
            record(Source::Google, "Acme", "+7", "", ""),
            record(Source::Facebook, "Acme", "+7", "", ""),
            record(Source::Facebook, "Other", "+7", "", ""),
        ]);
        assert_eq!(outcome.records.len(), 2);
    }

    #[test]
    fn test_backfill_fills_empty_fields_from_lower_priority() {
        let engine = MergeEngine::new(MergeConfig {
            policy: ConflictPolicy::FieldBackfill,
            ..Default::default()
        });
        let outcome = engine.merge(vec![
            record(Source::Google, "Acme", "+9", "", ""),
            record(Source::Website, "Acme Site", "+9", "Shops", "Austin, Texas"),
            record(Source::Facebook, "", "+9", "Retail", ""),
        ]);

        let merged = &outcome.records[0];
        assert_eq!(merged.source, Source::Google);
        assert_eq!(merged.name, "Acme");
        // facebook outranks website for the category
        assert_eq!(merged.category, "Retail");
        assert_eq!(merged.address, "Austin, Texas");
        assert_eq!(outcome.stats.fields_backfilled, 2);
    }

    #[test]
    fn test_strict_priority_does_not_backfill() {
        let engine = MergeEngine::default();
        let outcome = engine.merge(vec![
            record(Source::Google, "Acme", "+9", "", ""),
            record(Source::Website, "", "+9", "Shops", "Austin"),
        ]);
        assert_eq!(outcome.records[0].category, "");
        assert_eq!(outcome.records[0].address, "");
    }

    #[test]
    fn test_group_without_names_keeps_empty_name() {
        let engine = MergeEngine::new(MergeConfig {
            policy: ConflictPolicy::FieldBackfill,
            ..Default::default()
        });
        let outcome = engine.merge(vec![
            record(Source::Google, "", "+3", "", ""),
            record(Source::Facebook, "", "+3", "Cafe", ""),
        ]);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].name, "");
        assert_eq!(outcome.records[0].category, "Cafe");
    }

    #[test]
    fn test_empty_phone_records_are_never_grouped() {
        let engine = MergeEngine::default();
        let outcome = engine.merge(vec![
            record(Source::Google, "A", "", "", ""),
            record(Source::Facebook, "B", "", "", ""),
        ]);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.stats.empty_phone_kept, 2);
    }

    #[test]
    fn test_empty_phone_records_can_be_dropped() {
        let engine = MergeEngine::new(MergeConfig {
            empty_phone: EmptyPhonePolicy::Drop,
            ..Default::default()
        });
        let outcome = engine.merge(vec![
            record(Source::Google, "A", "", "", ""),
            record(Source::Google, "B", "+1", "", ""),
        ]);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.stats.empty_phone_dropped, 1);
    }

    #[test]
    fn test_blank_records_are_dropped() {
        let engine = MergeEngine::default();
        let outcome = engine.merge(vec![
            record(Source::Website, "", "", "", ""),
            record(Source::Google, "", "+4", "", ""),
        ]);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.stats.blank_records_dropped, 1);
    }

    #[test]
    fn test_phone_is_renormalized() {
        let engine = MergeEngine::new(MergeConfig {
            dedup: false,
            ..Default::default()
        });
        let outcome = engine.merge(vec![record(Source::Google, "A", "4420.0", "", "")]);
        assert_eq!(outcome.records[0].phone, "+4420");
    }

    #[test]
    fn test_dedup_disabled_keeps_everything() {
        let engine = MergeEngine::new(MergeConfig {
            dedup: false,
            ..Default::default()
        });
        let outcome = engine.merge(vec![
            record(Source::Google, "A", "+1", "", ""),
            record(Source::Facebook, "A", "+1", "", ""),
        ]);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.stats.groups, 0);
    }

    #[test]
    fn test_merge_is_deterministic() {
        let engine = MergeEngine::default();
        let input = vec![
            record(Source::Facebook, "B", "+2", "", ""),
            record(Source::Google, "A", "+1", "", ""),
            record(Source::Website, "C", "", "", "x"),
            record(Source::Website, "D", "+2", "", ""),
        ];
        let first = engine.merge(input.clone()).records;
        let second = engine.merge(input).records;
        assert_eq!(first, second);
        assert_eq!(first[0].phone, "+1");
        assert_eq!(first[1].phone, "+2");
        assert_eq!(first[2].name, "C");
    }
}
