//! Rules Engine for lead field mapping
//!
//! Three ordered tables map raw export text onto CRS labels:
//! - car series: regex search (case-insensitive), substring fallback for bad patterns
//! - source category / source detail: bidirectional substring match
//!
//! Evaluation is first-match-wins over enabled rules. Tables are compiled once
//! per run so regex compilation never happens per row.

use crate::types::{MappingRule, MappingRules};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::warn;

/// Target texts that mean "drop this lead" in the category and detail tables
pub const EXCLUDE_TARGETS: &[&str] = &["exclude", "排除"];

/// Category label when no category rule matches
pub const OTHER_CATEGORY: &str = "其他";

/// Model label used when a lead has no recognisable model
pub const DEFAULT_MODEL: &str = "昂科威PLUS";

/// Result of mapping a value through a category or detail table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mapped {
    Label(String),
    Excluded,
}

impl Mapped {
    pub fn is_excluded(&self) -> bool {
        matches!(self, Mapped::Excluded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TableKind {
    CarSeries,
    SourceCategory,
    SourceDetail,
}

impl TableKind {
    pub fn name(&self) -> &'static str {
        match self {
            TableKind::CarSeries => "car_series_mapping",
            TableKind::SourceCategory => "source_category_mapping",
            TableKind::SourceDetail => "source_detail_mapping",
        }
    }

    fn uses_regex(&self) -> bool {
        matches!(self, TableKind::CarSeries)
    }

    fn can_exclude(&self) -> bool {
        !matches!(self, TableKind::CarSeries)
    }

    /// Detail rules may map a source onto an empty channel label
    fn requires_target(&self) -> bool {
        !matches!(self, TableKind::SourceDetail)
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Regex(Regex),
    Substring,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    pattern: String,
    matcher: Matcher,
    target: Mapped,
}

impl CompiledRule {
    fn matches(&self, value: &str) -> bool {
        match &self.matcher {
            Matcher::Regex(re) => re.is_match(value),
            Matcher::Substring => {
                self.pattern == value || value.contains(&self.pattern) || self.pattern.contains(value)
            }
        }
    }
}

/// An ordered, compiled rule table with its fallback label
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<CompiledRule>,
    default: String,
}

impl RuleTable {
    /// Compile the enabled rules of a table.
    ///
    /// Disabled rules and rules with an empty pattern are dropped here. A car
    /// series pattern that is not valid regex falls back to substring matching.
    pub fn compile(kind: TableKind, rules: &[MappingRule], default: impl Into<String>) -> Self {
        let compiled = rules
            .iter()
            .filter(|rule| rule.enabled && !rule.pattern.is_empty())
            .map(|rule| CompiledRule {
                pattern: rule.pattern.clone(),
                matcher: compile_matcher(kind, &rule.pattern),
                target: compile_target(kind, &rule.target),
            })
            .collect();

        Self {
            rules: compiled,
            default: default.into(),
        }
    }

    /// Number of active (enabled, compiled) rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Map a raw value: empty or absent gives the default, otherwise the first
    /// matching rule's target, otherwise the default.
    pub fn map(&self, value: Option<&str>) -> Mapped {
        let value = match value.map(str::trim) {
            Some(v) if !v.is_empty() => v,
            _ => return Mapped::Label(self.default.clone()),
        };

        self.rules
            .iter()
            .find(|rule| rule.matches(value))
            .map(|rule| rule.target.clone())
            .unwrap_or_else(|| Mapped::Label(self.default.clone()))
    }
}

fn compile_matcher(kind: TableKind, pattern: &str) -> Matcher {
    if !kind.uses_regex() {
        return Matcher::Substring;
    }

    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => Matcher::Regex(re),
        Err(e) => {
            warn!(pattern = pattern, error = %e, "Invalid car series pattern, using substring match");
            Matcher::Substring
        }
    }
}

fn compile_target(kind: TableKind, target: &str) -> Mapped {
    if kind.can_exclude() && is_exclude_target(target) {
        Mapped::Excluded
    } else {
        Mapped::Label(target.to_string())
    }
}

pub fn is_exclude_target(target: &str) -> bool {
    EXCLUDE_TARGETS.contains(&target)
}

/// All three tables compiled from one rules snapshot
#[derive(Debug, Clone)]
pub struct CompiledRules {
    pub car_series: RuleTable,
    pub category: RuleTable,
    pub detail: RuleTable,
}

impl CompiledRules {
    pub fn compile(rules: &MappingRules, default_model: &str) -> Self {
        Self {
            car_series: RuleTable::compile(TableKind::CarSeries, &rules.car_series_mapping, default_model),
            category: RuleTable::compile(TableKind::SourceCategory, &rules.source_category_mapping, OTHER_CATEGORY),
            detail: RuleTable::compile(TableKind::SourceDetail, &rules.source_detail_mapping, ""),
        }
    }

    /// Canonical car series label; the car series table never excludes
    pub fn map_car_series(&self, value: Option<&str>) -> String {
        match self.car_series.map(value) {
            Mapped::Label(label) => label,
            Mapped::Excluded => self.car_series.default.clone(),
        }
    }

    pub fn map_category(&self, value: Option<&str>) -> Mapped {
        self.category.map(value)
    }

    pub fn map_detail(&self, value: Option<&str>) -> Mapped {
        self.detail.map(value)
    }
}

/// Enabled/total counts for one table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub kind: TableKind,
    pub enabled: usize,
    pub total: usize,
}

impl std::fmt::Display for TableStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}/{} enabled", self.kind.name(), self.enabled, self.total)
    }
}

impl MappingRules {
    pub fn table(&self, kind: TableKind) -> &[MappingRule] {
        match kind {
            TableKind::CarSeries => &self.car_series_mapping,
            TableKind::SourceCategory => &self.source_category_mapping,
            TableKind::SourceDetail => &self.source_detail_mapping,
        }
    }

    pub fn stats(&self) -> [TableStats; 3] {
        [TableKind::CarSeries, TableKind::SourceCategory, TableKind::SourceDetail].map(|kind| {
            let rules = self.table(kind);
            TableStats {
                kind,
                enabled: rules.iter().filter(|r| r.enabled).count(),
                total: rules.len(),
            }
        })
    }

    /// Stock rules of the dealership; also what "reset to default" restores
    pub fn builtin() -> Self {
        let rules = |pairs: &[(&str, &str)]| -> Vec<MappingRule> {
            pairs.iter().map(|(p, t)| MappingRule::new(*p, *t)).collect()
        };

        Self {
            car_series_mapping: rules(&[
                (".*GL8.*陆尊.*", "GL8 豪华商务车"),
                (".*GL8.*陆上公务舱.*", "GL8 陆上公务舱"),
                (".*GL8.*陆尚.*", "GL8陆尚"),
                (".*GL8.*Avenir.*", "GL8 Avenir"),
                (".*GL8.*豪华商务车.*", "GL8 豪华商务车"),
                (".*君越.*", "全新一代君越"),
                (".*君威.*", "全新一代君威"),
                (".*新君威.*", "全新一代君威"),
                (".*昂科威Plus.*", "昂科威PLUS"),
                (".*昂科威PLUS.*", "昂科威PLUS"),
                (".*昂科威S.*", "昂科威S"),
                (".*威朗.*", "威朗Pro"),
                (".*微蓝6.*", "VELITE 6"),
                (".*VELITE 6.*", "VELITE 6"),
                (".*E5.*", "E 5"),
                (".*E 5.*", "E 5"),
                (".*世纪.*", "世纪"),
                (".*世家.*", "至境世家"),
                (".*L7.*", "至境"),
                (".*昂科旗.*", "昂科威PLUS"),
                (".*别克.*", "昂科威PLUS"),
            ]),
            source_category_mapping: rules(&[
                ("车商汇", "垂媒"),
                ("车商汇（集客号）", "垂媒"),
                ("车商汇（IM会话）", "垂媒"),
                ("车商汇（分期）", "垂媒"),
                ("车商汇（平台活动）", "垂媒"),
                ("智能产品（智能展厅）", "垂媒"),
                ("抖音", "自媒"),
                ("本地通-经销商号", "自媒"),
                ("本地通异地-经销商号", "自媒"),
                ("本地通", "自媒"),
                ("易车网", "垂媒"),
                ("汽车之家", "垂媒"),
                ("别克私域", "主机厂下发"),
                ("iBuick", "主机厂下发"),
                ("总部矩阵号", "主机厂下发"),
                ("经销商市场活动", "排除"),
                ("高德地图", "主机厂下发"),
                ("矩阵号", "主机厂下发"),
            ]),
            source_detail_mapping: rules(&[
                ("车商汇", "汽车之家"),
                ("车商汇(集客号)", "汽车之家"),
                ("车商汇（IM会话）", "汽车之家"),
                ("车商汇（分期）", "汽车之家"),
                ("车商汇（平台活动）", "汽车之家"),
                ("智能产品（智能展厅）", "汽车之家"),
                ("抖音", "抖音"),
                ("本地通-经销商号", "抖音"),
                ("本地通异地-经销商号", "抖音"),
                ("本地", "抖音"),
                ("易车网", "易车"),
                ("汽车之家", "汽车之家"),
                ("别克私域", ""),
                ("iBuick", ""),
                ("总部矩阵号", ""),
                ("经销商市场活动", "排除"),
                ("高德地图", ""),
                ("矩阵号", ""),
            ]),
        }
    }
}

/// Problems found in a rules document
#[derive(Debug, Clone, Default)]
pub struct RuleValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl RuleValidation {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check required text on every rule; invalid regex is only a warning
/// because matching degrades to substring search.
pub fn validate_rules(rules: &MappingRules) -> RuleValidation {
    let mut result = RuleValidation::default();

    for kind in [TableKind::CarSeries, TableKind::SourceCategory, TableKind::SourceDetail] {
        for (idx, rule) in rules.table(kind).iter().enumerate() {
            let position = idx + 1;
            if rule.pattern.trim().is_empty() {
                result.errors.push(format!("{} rule #{} has an empty pattern", kind.name(), position));
            }
            if kind.requires_target() && rule.target.trim().is_empty() {
                result.errors.push(format!(
                    "{} rule #{} ('{}') has an empty target",
                    kind.name(),
                    position,
                    rule.pattern
                ));
            }
            if kind.uses_regex() && !rule.pattern.is_empty() {
                if let Err(e) = Regex::new(&rule.pattern) {
                    result.warnings.push(format!(
                        "{} rule #{} ('{}') is not valid regex, substring matching will be used: {}",
                        kind.name(),
                        position,
                        rule.pattern,
                        e
                    ));
                }
            }
            if kind == TableKind::CarSeries && is_exclude_target(&rule.target) {
                result.warnings.push(format!(
                    "{} rule #{} targets '{}', which is kept as a plain model label",
                    kind.name(),
                    position,
                    rule.target
                ));
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin() -> CompiledRules {
        CompiledRules::compile(&MappingRules::builtin(), DEFAULT_MODEL)
    }

    #[test]
    fn test_car_series_earlier_rule_wins() {
        let rules = builtin();
        // `.*君越.*` precedes the catch-all `.*别克.*`
        assert_eq!(rules.map_car_series(Some("别克君越2024款")), "全新一代君越");
        assert_eq!(rules.map_car_series(Some("别克 GL8 陆尚 2.0T")), "GL8陆尚");
    }

    #[test]
    fn test_car_series_case_insensitive() {
        let rules = builtin();
        assert_eq!(rules.map_car_series(Some("gl8 avenir 四座")), "GL8 Avenir");
        assert_eq!(rules.map_car_series(Some("velite 6 纯电")), "VELITE 6");
    }

    #[test]
    fn test_car_series_default_for_empty_and_unmatched() {
        let rules = builtin();
        assert_eq!(rules.map_car_series(None), DEFAULT_MODEL);
        assert_eq!(rules.map_car_series(Some("   ")), DEFAULT_MODEL);
        assert_eq!(rules.map_car_series(Some("凯迪拉克CT5")), DEFAULT_MODEL);
    }

    #[test]
    fn test_invalid_regex_falls_back_to_substring() {
        let table = vec![MappingRule::new("君越(", "君越特别版"), MappingRule::new(".*", "兜底")];
        let rules = RuleTable::compile(TableKind::CarSeries, &table, DEFAULT_MODEL);

        // pattern contained in value
        assert_eq!(rules.map(Some("别克君越(2024)")), Mapped::Label("君越特别版".into()));
        // value contained in pattern
        assert_eq!(rules.map(Some("君越")), Mapped::Label("君越特别版".into()));
        assert_eq!(rules.map(Some("威朗")), Mapped::Label("兜底".into()));
    }

    #[test]
    fn test_disabled_rules_are_skipped() {
        let table = vec![
            MappingRule::new(".*君越.*", "旧君越").disabled(),
            MappingRule::new(".*君越.*", "全新一代君越"),
        ];
        let rules = RuleTable::compile(TableKind::CarSeries, &table, DEFAULT_MODEL);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules.map(Some("君越")), Mapped::Label("全新一代君越".into()));
    }

    #[test]
    fn test_category_bidirectional_substring() {
        let rules = builtin();
        assert_eq!(rules.map_category(Some("车商汇（IM会话）")), Mapped::Label("垂媒".into()));
        // value is a substring of a rule pattern
        assert_eq!(rules.map_category(Some("本地通异地")), Mapped::Label("自媒".into()));
        assert_eq!(rules.map_category(Some("线下展会")), Mapped::Label(OTHER_CATEGORY.into()));
        assert_eq!(rules.map_category(None), Mapped::Label(OTHER_CATEGORY.into()));
    }

    #[test]
    fn test_category_is_case_sensitive() {
        let rules = builtin();
        assert_eq!(rules.map_category(Some("IBUICK")), Mapped::Label(OTHER_CATEGORY.into()));
        assert_eq!(rules.map_category(Some("iBuick")), Mapped::Label("主机厂下发".into()));
    }

    #[test]
    fn test_exclude_target_maps_to_excluded() {
        let rules = builtin();
        assert_eq!(rules.map_category(Some("经销商市场活动")), Mapped::Excluded);
        assert_eq!(rules.map_detail(Some("经销商市场活动")), Mapped::Excluded);

        let table = vec![MappingRule::new("线下活动", "exclude")];
        let detail = RuleTable::compile(TableKind::SourceDetail, &table, "");
        assert!(detail.map(Some("线下活动")).is_excluded());
    }

    #[test]
    fn test_car_series_never_excludes() {
        let table = vec![MappingRule::new(".*试驾.*", "排除")];
        let rules = CompiledRules::compile(
            &MappingRules {
                car_series_mapping: table,
                ..Default::default()
            },
            DEFAULT_MODEL,
        );
        assert_eq!(rules.map_car_series(Some("试驾车")), "排除");
    }

    #[test]
    fn test_detail_default_is_empty() {
        let rules = builtin();
        assert_eq!(rules.map_detail(None), Mapped::Label(String::new()));
        assert_eq!(rules.map_detail(Some("易车网")), Mapped::Label("易车".into()));
        assert_eq!(rules.map_detail(Some("别克私域")), Mapped::Label(String::new()));
    }

    #[test]
    fn test_stats_counts_enabled() {
        let mut rules = MappingRules::builtin();
        rules.car_series_mapping[0].enabled = false;
        let stats = rules.stats();
        assert_eq!(stats[0].enabled, 20);
        assert_eq!(stats[0].total, 21);
        assert_eq!(stats[1].total, 18);
        assert_eq!(stats[2].enabled, 18);
    }

    #[test]
    fn test_validate_rules() {
        assert!(validate_rules(&MappingRules::builtin()).is_ok());

        let rules = MappingRules {
            car_series_mapping: vec![MappingRule::new("君越(", "全新一代君越"), MappingRule::new("", "x")],
            source_category_mapping: vec![MappingRule::new("抖音", " ")],
            source_detail_mapping: vec![MappingRule::new("高德地图", "")],
        };
        let result = validate_rules(&rules);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.warnings.len(), 1);
    }
}
