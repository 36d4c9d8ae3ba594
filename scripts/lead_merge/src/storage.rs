use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use anyhow::{anyhow, Result, Context};
use chrono::{DateTime, Local};

use crate::config::Settings;
use crate::types::{LeadRecord, MappingRules, MappingRulesPatch};

const SETTINGS_FILE: &str = "Config/settings.yaml";
const RULES_FILE: &str = "Config/mapping_rules.json";

/// UTF-8 byte order mark; spreadsheet tools need it to detect UTF-8 CSV
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Worksheet holding the merged leads in an xlsx export
pub const EXPORT_SHEET: &str = "合并结果";

/// File format of the lead export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
        }
    }

    /// Format implied by a path's extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xlsx" => Ok(ExportFormat::Xlsx),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(format!("unknown export format '{}', expected xlsx or csv", other)),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

pub fn settings_path(root: &str) -> PathBuf {
    PathBuf::from(root).join(SETTINGS_FILE)
}

pub fn rules_path(root: &str) -> PathBuf {
    PathBuf::from(root).join(RULES_FILE)
}

/// Load settings, falling back to the stock settings when the file is absent
pub fn load_settings(root: &str) -> Result<Settings> {
    let path = settings_path(root);

    if !path.exists() {
        return Ok(Settings::default());
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read settings from {:?}", path))?;

    let settings: Settings = serde_yaml::from_str(&content)
        .with_context(|| "Failed to parse settings YAML")?;

    Ok(settings)
}

/// Load the rule tables, falling back to the built-in tables when the file is absent
pub fn load_rules(root: &str) -> Result<MappingRules> {
    let path = rules_path(root);

    if !path.exists() {
        return Ok(MappingRules::builtin());
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read mapping rules from {:?}", path))?;

    rules_from_json(&content, MappingRules::builtin())
        .with_context(|| format!("Failed to parse mapping rules in {:?}", path))
}

pub fn save_rules(root: &str, rules: &MappingRules) -> Result<()> {
    let path = rules_path(root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .context("Failed to create Config directory")?;
    }
    export_rules(&path, rules)
}

/// Serialize rule tables as the three-array interchange document
pub fn rules_to_json(rules: &MappingRules) -> Result<String> {
    serde_json::to_string_pretty(rules).context("Failed to serialize mapping rules")
}

/// Parse an interchange document on top of `base`.
///
/// Tables missing from the document keep their `base` contents.
pub fn rules_from_json(content: &str, base: MappingRules) -> Result<MappingRules> {
    let patch: MappingRulesPatch = serde_json::from_str(content)
        .context("Invalid mapping rules JSON")?;

    let mut rules = base;
    rules.apply(patch);
    Ok(rules)
}

pub fn export_rules(path: &Path, rules: &MappingRules) -> Result<()> {
    let json = rules_to_json(rules)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write mapping rules to {:?}", path))?;
    Ok(())
}

pub fn import_rules(path: &Path, base: MappingRules) -> Result<MappingRules> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read mapping rules from {:?}", path))?;
    rules_from_json(&content, base)
}

/// Default export name, e.g. `CRS线索_20250101_093000.xlsx`
pub fn default_export_name(now: DateTime<Local>, format: ExportFormat) -> String {
    format!("CRS线索_{}.{}", now.format("%Y%m%d_%H%M%S"), format.extension())
}

/// Render leads as BOM-prefixed UTF-8 CSV in export column order
pub fn leads_to_csv(records: &[LeadRecord]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(UTF8_BOM.to_vec());

    writer.write_record(LeadRecord::COLUMNS)
        .context("Failed to write CSV header")?;
    for record in records {
        writer.write_record(record.to_row())
            .context("Failed to write lead row")?;
    }

    writer.into_inner()
        .map_err(|e| anyhow!("Failed to flush CSV: {}", e.error()))
}

pub fn write_leads_csv(path: &Path, records: &[LeadRecord]) -> Result<()> {
    write_leads(path, records, ExportFormat::Csv)
}

/// Render leads as a one-sheet workbook; every cell is text so phones keep their digits
pub fn leads_to_xlsx(records: &[LeadRecord]) -> Result<Vec<u8>> {
    let mut workbook = umya_spreadsheet::new_file();
    let sheet = workbook
        .get_sheet_mut(&0)
        .ok_or_else(|| anyhow!("New workbook has no sheet"))?;
    sheet.set_name(EXPORT_SHEET);

    for (col, header) in LeadRecord::COLUMNS.iter().enumerate() {
        sheet.get_cell_mut((col as u32 + 1, 1)).set_value_string(*header);
    }
    for (row, record) in records.iter().enumerate() {
        for (col, value) in record.to_row().iter().enumerate() {
            if !value.is_empty() {
                sheet
                    .get_cell_mut((col as u32 + 1, row as u32 + 2))
                    .set_value_string(*value);
            }
        }
    }

    let mut buf = Cursor::new(Vec::new());
    umya_spreadsheet::writer::xlsx::write_writer(&workbook, &mut buf)
        .map_err(|e| anyhow!("Failed to write xlsx: {}", e))?;

    Ok(buf.into_inner())
}

pub fn write_leads(path: &Path, records: &[LeadRecord], format: ExportFormat) -> Result<()> {
    let bytes = match format {
        ExportFormat::Xlsx => leads_to_xlsx(records)?,
        ExportFormat::Csv => leads_to_csv(records)?,
    };
    fs::write(path, bytes)
        .with_context(|| format!("Failed to write leads to {:?}", path))?;
    Ok(())
}
