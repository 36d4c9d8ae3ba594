//! Pipeline Driver
//!
//! Runs one merge: extraction, mapping, exclusion, dedup, allocation. All
//! configuration is owned by the request, so a run never observes edits made
//! to the live settings while it is in progress.

use crate::allocate::{allocate, enabled_names, AllocationSummary};
use crate::config::Settings;
use crate::error::{MergeError, Result};
use crate::merge::{merge_sources, LeadDefaults, SourceBatch};
use crate::rules::CompiledRules;
use crate::types::{Consultant, LeadRecord, MappingRules, MergeStats, RawRow, SourceFormat};
use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::info;

/// Snapshot of everything one merge run needs
#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub yiche: Option<Vec<RawRow>>,
    pub autohome: Option<Vec<RawRow>>,
    pub rules: MappingRules,
    pub consultants: Vec<Consultant>,
    pub first_pick: Option<String>,
    pub brand: String,
    pub default_model: String,
}

impl MergeRequest {
    /// Copy the current settings and rules into a new request with no inputs
    pub fn new(settings: &Settings, rules: &MappingRules) -> Self {
        Self {
            yiche: None,
            autohome: None,
            rules: rules.clone(),
            consultants: settings.consultants.clone(),
            first_pick: settings.first_pick.clone(),
            brand: settings.brand.clone(),
            default_model: settings.default_model.clone(),
        }
    }

    pub fn with_yiche(mut self, rows: Vec<RawRow>) -> Self {
        self.yiche = Some(rows);
        self
    }

    pub fn with_autohome(mut self, rows: Vec<RawRow>) -> Self {
        self.autohome = Some(rows);
        self
    }

    pub fn with_first_pick(mut self, first_pick: Option<String>) -> Self {
        self.first_pick = first_pick.filter(|name| !name.trim().is_empty());
        self
    }

    /// Input batches in merge order (Yiche before Autohome)
    fn batches(&mut self) -> Vec<SourceBatch> {
        let mut batches = Vec::with_capacity(2);
        if let Some(rows) = self.yiche.take() {
            batches.push(SourceBatch::new(SourceFormat::Yiche, rows));
        }
        if let Some(rows) = self.autohome.take() {
            batches.push(SourceBatch::new(SourceFormat::Autohome, rows));
        }
        batches
    }
}

/// One operator-facing log line
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub at: DateTime<Local>,
    pub message: String,
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.at.format("%H:%M:%S"), self.message)
    }
}

/// Timestamped summary of a run, shown to the operator
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunLog {
    pub entries: Vec<LogEntry>,
}

impl RunLog {
    pub fn push(&mut self, message: impl Into<String>) {
        self.entries.push(LogEntry {
            at: Local::now(),
            message: message.into(),
        });
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(ToString::to_string).collect()
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.message.as_str())
    }
}

/// Everything a successful run produces
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Final table in export column order
    pub records: Vec<LeadRecord>,
    pub stats: MergeStats,
    pub allocation: AllocationSummary,
    pub log: RunLog,
}

/// Run the full pipeline over a request snapshot
pub fn run_merge(mut request: MergeRequest) -> Result<MergeOutcome> {
    let batches = request.batches();
    if batches.is_empty() {
        return Err(MergeError::NoInput);
    }
    if enabled_names(&request.consultants).is_empty() {
        return Err(MergeError::NoConsultants);
    }

    let mut log = RunLog::default();
    for batch in &batches {
        log.push(format!("Processing {} data: {} rows", batch.format, batch.rows.len()));
    }

    let rules = CompiledRules::compile(&request.rules, &request.default_model);
    let defaults = LeadDefaults {
        brand: request.brand.clone(),
        default_model: request.default_model.clone(),
    };

    let (mut records, stats) = merge_sources(&batches, &rules, &defaults)?;

    if stats.skipped() > 0 {
        log.push(format!("Skipped {} rows missing name or phone", stats.skipped()));
    }
    if stats.excluded() > 0 {
        log.push(format!("Excluded {} leads by source rules", stats.excluded()));
    }
    log.push(format!(
        "Dedup: {} -> {} records",
        stats.before_dedup, stats.after_dedup
    ));
    if stats.models_repaired > 0 {
        log.push(format!(
            "Filled {} empty car series with {}",
            stats.models_repaired, request.default_model
        ));
    }

    let allocation = allocate(&mut records, &request.consultants, request.first_pick.as_deref());
    if allocation.is_even() {
        log.push(format!("Allocation even, max difference {}", allocation.spread()));
    } else {
        log.push(format!("Allocation uneven, max difference {}", allocation.spread()));
    }

    info!(records = records.len(), "Merge run complete");

    Ok(MergeOutcome {
        records,
        stats,
        allocation,
        log,
    })
}
