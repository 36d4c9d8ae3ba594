use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One row of an export file, keyed by the source's own column names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    cells: HashMap<String, String>,
}

impl RawRow {
    /// Build a row from `(column, value)` pairs
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            cells: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Cell text for a column, `None` when the column is absent
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    pub fn is_blank(&self) -> bool {
        self.cells.values().all(|v| v.trim().is_empty())
    }
}

/// The two lead export formats the tool understands.
///
/// Declaration order is merge order: Yiche rows always precede Autohome rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Dealer-network spreadsheet export (易车网)
    Yiche,
    /// Car-portal CSV export (汽车之家)
    Autohome,
}

impl SourceFormat {
    pub fn label(&self) -> &'static str {
        match self {
            SourceFormat::Yiche => "Yiche",
            SourceFormat::Autohome => "Autohome",
        }
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A normalized lead, serialized with the CRS import column headers.
///
/// Field order is the export column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRecord {
    #[serde(rename = "姓名")]
    pub name: String,
    #[serde(rename = "手机号")]
    pub phone: String,
    #[serde(rename = "性别")]
    pub gender: String,
    #[serde(rename = "来源分类")]
    pub source_category: String,
    #[serde(rename = "线索来源")]
    pub source_channel: String,
    #[serde(rename = "备注")]
    pub note: String,
    #[serde(rename = "意向品牌")]
    pub intent_brand: String,
    #[serde(rename = "意向车系")]
    pub intent_series: String,
    #[serde(rename = "销售顾问")]
    pub consultant: String,
    #[serde(rename = "单位")]
    pub unit: String,
    #[serde(rename = "跟进内容")]
    pub follow_up: String,
}

impl LeadRecord {
    pub const COLUMNS: [&'static str; 11] = [
        "姓名", "手机号", "性别", "来源分类", "线索来源", "备注",
        "意向品牌", "意向车系", "销售顾问", "单位", "跟进内容",
    ];

    /// Cell values in `COLUMNS` order
    pub fn to_row(&self) -> [&str; 11] {
        [
            &self.name,
            &self.phone,
            &self.gender,
            &self.source_category,
            &self.source_channel,
            &self.note,
            &self.intent_brand,
            &self.intent_series,
            &self.consultant,
            &self.unit,
            &self.follow_up,
        ]
    }
}

fn default_enabled() -> bool {
    true
}

/// A single `(pattern, target, enabled)` mapping rule.
///
/// The Chinese aliases accept rule files exported by the older spreadsheet tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRule {
    #[serde(alias = "原始模式", alias = "原始来源")]
    pub pattern: String,
    #[serde(default, alias = "目标车系", alias = "目标分类", alias = "目标线索来源")]
    pub target: String,
    #[serde(default = "default_enabled", alias = "是否启用")]
    pub enabled: bool,
}

impl MappingRule {
    pub fn new(pattern: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            target: target.into(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// The three operator-editable rule tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRules {
    #[serde(default)]
    pub car_series_mapping: Vec<MappingRule>,
    #[serde(default)]
    pub source_category_mapping: Vec<MappingRule>,
    #[serde(default)]
    pub source_detail_mapping: Vec<MappingRule>,
}

/// Partial rule document; a missing table leaves the current one untouched on import.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingRulesPatch {
    pub car_series_mapping: Option<Vec<MappingRule>>,
    pub source_category_mapping: Option<Vec<MappingRule>>,
    pub source_detail_mapping: Option<Vec<MappingRule>>,
}

impl MappingRules {
    pub fn apply(&mut self, patch: MappingRulesPatch) {
        if let Some(rules) = patch.car_series_mapping {
            self.car_series_mapping = rules;
        }
        if let Some(rules) = patch.source_category_mapping {
            self.source_category_mapping = rules;
        }
        if let Some(rules) = patch.source_detail_mapping {
            self.source_detail_mapping = rules;
        }
    }
}

/// A sales consultant on the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consultant {
    #[serde(alias = "姓名")]
    pub name: String,
    #[serde(default, alias = "单位")]
    pub unit: String,
    #[serde(default = "default_enabled", alias = "是否启用")]
    pub enabled: bool,
}

impl Consultant {
    pub fn new(name: impl Into<String>, unit: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            enabled,
        }
    }
}

/// Per-source counters from one merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub format: SourceFormat,
    pub rows: usize,
    pub skipped: usize,
    pub excluded: usize,
    pub kept: usize,
}

impl SourceStats {
    pub fn new(format: SourceFormat) -> Self {
        Self {
            format,
            rows: 0,
            skipped: 0,
            excluded: 0,
            kept: 0,
        }
    }
}

/// Counters reported by a merge run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub sources: Vec<SourceStats>,
    pub before_dedup: usize,
    pub after_dedup: usize,
    pub models_repaired: usize,
}

impl MergeStats {
    pub fn skipped(&self) -> usize {
        self.sources.iter().map(|s| s.skipped).sum()
    }

    pub fn excluded(&self) -> usize {
        self.sources.iter().map(|s| s.excluded).sum()
    }

    pub fn duplicates_removed(&self) -> usize {
        self.before_dedup - self.after_dedup
    }
}
