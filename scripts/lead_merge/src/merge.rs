//! Merge and Deduplication Module
//!
//! Provides functions to:
//! - Extract and map rows from each export into lead records
//! - Drop leads whose source maps to an exclude rule
//! - Deduplicate leads by phone number, first occurrence wins
//! - Backfill an empty car series with the default model

use crate::error::{MergeError, Result};
use crate::extract::extract_fields;
use crate::rules::{CompiledRules, Mapped};
use crate::types::{LeadRecord, MergeStats, RawRow, SourceFormat, SourceStats};
use std::collections::HashSet;
use tracing::{debug, info};

/// Rows of one export, tagged with their format
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub format: SourceFormat,
    pub rows: Vec<RawRow>,
}

impl SourceBatch {
    pub fn new(format: SourceFormat, rows: Vec<RawRow>) -> Self {
        Self { format, rows }
    }
}

/// Constants stamped onto every merged lead
#[derive(Debug, Clone)]
pub struct LeadDefaults {
    pub brand: String,
    pub default_model: String,
}

/// Turn one batch into lead records, updating its counters.
///
/// Category and channel are mapped first; an excluded lead never has its model mapped.
pub fn build_records(
    batch: &SourceBatch,
    rules: &CompiledRules,
    defaults: &LeadDefaults,
) -> (Vec<LeadRecord>, SourceStats) {
    let mut stats = SourceStats::new(batch.format);
    let mut records = Vec::with_capacity(batch.rows.len());

    for row in &batch.rows {
        stats.rows += 1;

        let fields = match extract_fields(batch.format, row) {
            Some(fields) => fields,
            None => {
                stats.skipped += 1;
                continue;
            }
        };

        let channel = fields.raw_channel.as_deref();
        let (category, detail) = match (rules.map_category(channel), rules.map_detail(channel)) {
            (Mapped::Label(category), Mapped::Label(detail)) => (category, detail),
            _ => {
                stats.excluded += 1;
                continue;
            }
        };

        records.push(LeadRecord {
            name: fields.name,
            phone: fields.phone,
            source_category: category,
            source_channel: detail,
            intent_brand: defaults.brand.clone(),
            intent_series: rules.map_car_series(fields.raw_model.as_deref()),
            ..Default::default()
        });
    }

    stats.kept = records.len();
    debug!(
        source = %batch.format,
        rows = stats.rows,
        skipped = stats.skipped,
        excluded = stats.excluded,
        kept = stats.kept,
        "Built records from source"
    );

    (records, stats)
}

/// Keep the first record seen for each phone number, preserving order
pub fn dedup_by_phone(records: Vec<LeadRecord>) -> Vec<LeadRecord> {
    let mut seen: HashSet<String> = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| seen.insert(record.phone.clone()))
        .collect()
}

/// Rewrite empty car series to the default model; returns how many were rewritten
pub fn backfill_models(records: &mut [LeadRecord], default_model: &str) -> usize {
    let mut repaired = 0;
    for record in records.iter_mut().filter(|r| r.intent_series.trim().is_empty()) {
        record.intent_series = default_model.to_string();
        repaired += 1;
    }
    repaired
}

/// Merge batches in the given order, dedup by phone and backfill models.
///
/// Consultant and unit are left empty for the allocator.
pub fn merge_sources(
    batches: &[SourceBatch],
    rules: &CompiledRules,
    defaults: &LeadDefaults,
) -> Result<(Vec<LeadRecord>, MergeStats)> {
    if batches.is_empty() {
        return Err(MergeError::NoInput);
    }

    let mut stats = MergeStats::default();
    let mut merged = Vec::new();

    for batch in batches {
        let (records, source_stats) = build_records(batch, rules, defaults);
        merged.extend(records);
        stats.sources.push(source_stats);
    }

    if merged.is_empty() {
        return Err(MergeError::NoValidRows {
            skipped: stats.skipped(),
            excluded: stats.excluded(),
        });
    }

    stats.before_dedup = merged.len();
    let mut merged = dedup_by_phone(merged);
    stats.after_dedup = merged.len();
    stats.models_repaired = backfill_models(&mut merged, &defaults.default_model);

    info!(
        before = stats.before_dedup,
        after = stats.after_dedup,
        excluded = stats.excluded(),
        "Merged lead sources"
    );

    Ok((merged, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::DEFAULT_MODEL;
    use crate::types::MappingRules;

    fn defaults() -> LeadDefaults {
        LeadDefaults {
            brand: "别克".to_string(),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    fn rules() -> CompiledRules {
        CompiledRules::compile(&MappingRules::builtin(), DEFAULT_MODEL)
    }

    fn yiche_row(name: &str, phone: &str, model: &str, channel: &str) -> RawRow {
        RawRow::from_pairs([
            ("客户姓名", name),
            ("客户号码", phone),
            ("线索意向车型车系", model),
            ("商业产品来源", channel),
        ])
    }

    fn autohome_row(name: &str, phone: &str, model: &str, channel: &str) -> RawRow {
        RawRow::from_pairs([
            ("客户姓名", name),
            ("客户手机", phone),
            ("意向车系", model),
            ("BMD二级渠道", channel),
        ])
    }

    #[test]
    fn test_build_records_maps_fields() {
        let batch = SourceBatch::new(
            SourceFormat::Yiche,
            vec![yiche_row("王伟/备注", "13800000000/旧号", "别克君越2024款", "易车网")],
        );
        let (records, stats) = build_records(&batch, &rules(), &defaults());

        assert_eq!(stats.kept, 1);
        let lead = &records[0];
        assert_eq!(lead.name, "王伟");
        assert_eq!(lead.phone, "13800000000");
        assert_eq!(lead.intent_series, "全新一代君越");
        assert_eq!(lead.source_category, "垂媒");
        assert_eq!(lead.source_channel, "易车");
        assert_eq!(lead.intent_brand, "别克");
        assert!(lead.consultant.is_empty());
        assert!(lead.gender.is_empty() && lead.note.is_empty() && lead.follow_up.is_empty());
    }

    #[test]
    fn test_excluded_rows_are_counted() {
        let batch = SourceBatch::new(
            SourceFormat::Autohome,
            vec![
                autohome_row("甲", "13000000001", "昂科威S", "经销商市场活动"),
                autohome_row("乙", "13000000002", "昂科威S", "抖音"),
                autohome_row("", "13000000003", "昂科威S", "抖音"),
            ],
        );
        let (records, stats) = build_records(&batch, &rules(), &defaults());

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "乙");
        assert_eq!(stats.rows, 3);
        assert_eq!(stats.excluded, 1);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_cross_source_dedup_keeps_first_source() {
        let batches = vec![
            SourceBatch::new(SourceFormat::Yiche, vec![yiche_row("易车客户", "13900001111", "威朗", "易车网")]),
            SourceBatch::new(
                SourceFormat::Autohome,
                vec![autohome_row("之家客户", "13900001111", "GL8 陆尚", "车商汇")],
            ),
        ];
        let (records, stats) = merge_sources(&batches, &rules(), &defaults()).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "易车客户");
        assert_eq!(records[0].intent_series, "威朗Pro");
        assert_eq!(stats.before_dedup, 2);
        assert_eq!(stats.after_dedup, 1);
        assert_eq!(stats.duplicates_removed(), 1);
    }

    #[test]
    fn test_dedup_is_stable_under_self_concatenation() {
        let rows = vec![
            autohome_row("甲", "13000000001", "君威", "抖音"),
            autohome_row("乙", "13000000002", "世纪", "车商汇"),
            autohome_row("丙", "13000000001", "E5", "抖音"),
        ];
        let once = merge_sources(&[SourceBatch::new(SourceFormat::Autohome, rows.clone())], &rules(), &defaults())
            .unwrap()
            .0;

        let mut doubled = rows.clone();
        doubled.extend(rows);
        let twice = merge_sources(&[SourceBatch::new(SourceFormat::Autohome, doubled)], &rules(), &defaults())
            .unwrap()
            .0;

        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn test_backfill_models() {
        let mut records = vec![
            LeadRecord { intent_series: String::new(), ..Default::default() },
            LeadRecord { intent_series: "世纪".into(), ..Default::default() },
        ];
        assert_eq!(backfill_models(&mut records, DEFAULT_MODEL), 1);
        assert_eq!(records[0].intent_series, DEFAULT_MODEL);
        assert_eq!(records[1].intent_series, "世纪");
    }

    #[test]
    fn test_empty_car_series_rule_target_is_backfilled() {
        let mut mapping = MappingRules::builtin();
        mapping.car_series_mapping.insert(0, crate::types::MappingRule::new(".*试驾.*", ""));
        let rules = CompiledRules::compile(&mapping, DEFAULT_MODEL);
        let batches = vec![SourceBatch::new(
            SourceFormat::Autohome,
            vec![autohome_row("丁", "13000000009", "试驾车", "抖音")],
        )];
        let (records, stats) = merge_sources(&batches, &rules, &defaults()).unwrap();
        assert_eq!(records[0].intent_series, DEFAULT_MODEL);
        assert_eq!(stats.models_repaired, 1);
    }

    #[test]
    fn test_no_input_and_no_valid_rows() {
        assert!(matches!(
            merge_sources(&[], &rules(), &defaults()),
            Err(MergeError::NoInput)
        ));

        let batches = vec![SourceBatch::new(
            SourceFormat::Yiche,
            vec![
                yiche_row("甲", "", "君越", "易车网"),
                yiche_row("乙", "13000000002", "君越", "经销商市场活动"),
            ],
        )];
        match merge_sources(&batches, &rules(), &defaults()) {
            Err(MergeError::NoValidRows { skipped, excluded }) => {
                assert_eq!(skipped, 1);
                assert_eq!(excluded, 1);
            }
            other => panic!("expected NoValidRows, got {:?}", other),
        }
    }
}
