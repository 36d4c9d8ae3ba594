//! LeadMerge CLI
//!
//! Merges Yiche and Autohome lead exports into one CRM import file, with
//! helpers to repair broken Autohome CSVs and manage the mapping rules.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::info;

use lead_merge::repair::repair_csv;
use lead_merge::rules::validate_rules;
use lead_merge::storage::{self, ExportFormat};
use lead_merge::table;
use lead_merge::{run_merge, LeadReport, MappingRules, MergeRequest, Settings};

#[derive(Parser, Debug)]
#[command(name = "lead-merge")]
#[command(about = "Merge, deduplicate and allocate car-sales leads")]
#[command(version)]
struct Args {
    /// Directory holding Config/settings.yaml and Config/mapping_rules.json
    #[arg(long, default_value = ".", env = "ROOT", global = true)]
    root: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Repair a malformed Autohome CSV export
    Repair {
        input: PathBuf,
        /// Defaults to fixed_<input name> next to the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Merge exports and allocate leads to consultants
    Merge {
        /// Yiche export (.xlsx, .xls or .csv)
        #[arg(long)]
        yiche: Option<PathBuf>,
        /// Autohome export (.csv)
        #[arg(long)]
        autohome: Option<PathBuf>,
        /// Run CSV repair on the Autohome export before reading it
        #[arg(long)]
        repair_autohome: bool,
        /// Consultant who receives the first lead
        #[arg(long)]
        first_pick: Option<String>,
        /// Enable a consultant for this run
        #[arg(long)]
        enable: Vec<String>,
        /// Disable a consultant for this run
        #[arg(long)]
        disable: Vec<String>,
        /// Export format (xlsx or csv); inferred from --output when omitted, else xlsx
        #[arg(long)]
        format: Option<ExportFormat>,
        /// Defaults to CRS线索_<timestamp>.<format> in the current directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Manage mapping rules
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },
}

#[derive(Subcommand, Debug)]
enum RulesAction {
    /// Write the current rules to a JSON file
    Export { path: PathBuf },
    /// Replace the current rules with a JSON file's tables
    Import { path: PathBuf },
    /// Restore the built-in rules
    Reset,
    /// Show enabled/total counts per table
    Stats,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Repair { input, output } => repair(&args.root, &input, output),
        Command::Merge {
            yiche,
            autohome,
            repair_autohome,
            first_pick,
            enable,
            disable,
            format,
            output,
        } => {
            let mut settings = storage::load_settings(&args.root)?;
            for name in &enable {
                if !settings.set_enabled(name, true) {
                    bail!("Unknown consultant: {}", name);
                }
            }
            for name in &disable {
                if !settings.set_enabled(name, false) {
                    bail!("Unknown consultant: {}", name);
                }
            }
            if first_pick.is_some() {
                settings.first_pick = first_pick;
            }
            merge(&args.root, &settings, yiche, autohome, repair_autohome, format, output)
        }
        Command::Rules { action } => rules(&args.root, action),
    }
}

fn delimiter(settings: &Settings) -> Result<u8> {
    match settings.delimiter_byte() {
        Some(delimiter) => Ok(delimiter),
        None => bail!("Delimiter {:?} is not a single ASCII character", settings.delimiter),
    }
}

fn repair(root: &str, input: &Path, output: Option<PathBuf>) -> Result<()> {
    let settings = storage::load_settings(root)?;
    let bytes = fs::read(input).with_context(|| format!("Failed to read {:?}", input))?;
    let label = input.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

    let repaired = repair_csv(&bytes, delimiter(&settings)?, &label)?;

    let output = output.unwrap_or_else(|| input.with_file_name(format!("fixed_{}", label)));
    fs::write(&output, &repaired.text)
        .with_context(|| format!("Failed to write repaired CSV to {:?}", output))?;

    println!(
        "Repaired {} ({}): {} data rows -> {}",
        label,
        repaired.encoding,
        repaired.rows,
        output.display()
    );
    Ok(())
}

fn merge(
    root: &str,
    settings: &Settings,
    yiche: Option<PathBuf>,
    autohome: Option<PathBuf>,
    repair_autohome: bool,
    format: Option<ExportFormat>,
    output: Option<PathBuf>,
) -> Result<()> {
    let rules = storage::load_rules(root)?;
    let delimiter = delimiter(settings)?;

    let mut request = MergeRequest::new(settings, &rules);
    if let Some(path) = &yiche {
        request = request.with_yiche(table::read_table(path, delimiter)?);
    }
    if let Some(path) = &autohome {
        let rows = if repair_autohome {
            table::read_repaired_csv(path, delimiter)?
        } else {
            table::read_csv_file(path, delimiter)?
        };
        request = request.with_autohome(rows);
    }

    let outcome = run_merge(request)?;

    println!("=== Run log ===");
    for line in outcome.log.lines() {
        println!("{}", line);
    }

    println!("\n=== Allocation ===");
    for load in &outcome.allocation.loads {
        println!("  {} ({}): {}", load.name, load.unit, load.count);
    }

    println!("\n=== Report ===");
    print!("{}", LeadReport::build(&outcome.records));

    let format = format
        .or_else(|| output.as_deref().and_then(ExportFormat::from_path))
        .unwrap_or_default();
    let output = output
        .unwrap_or_else(|| PathBuf::from(storage::default_export_name(Local::now(), format)));
    storage::write_leads(&output, &outcome.records, format)?;
    info!(records = outcome.records.len(), %format, path = %output.display(), "Wrote lead export");
    println!("\n✓ Wrote {} leads to {}", outcome.records.len(), output.display());

    Ok(())
}

fn rules(root: &str, action: RulesAction) -> Result<()> {
    match action {
        RulesAction::Export { path } => {
            let rules = storage::load_rules(root)?;
            storage::export_rules(&path, &rules)?;
            println!("✓ Exported rules to {}", path.display());
        }
        RulesAction::Import { path } => {
            let current = storage::load_rules(root)?;
            let imported = storage::import_rules(&path, current)?;

            let validation = validate_rules(&imported);
            for warning in &validation.warnings {
                println!("  ⚠ {}", warning);
            }
            if !validation.is_ok() {
                for error in &validation.errors {
                    println!("  ✗ {}", error);
                }
                bail!("Rules in {:?} are invalid; nothing was imported", path);
            }

            storage::save_rules(root, &imported)?;
            println!("✓ Imported rules from {}", path.display());
        }
        RulesAction::Reset => {
            storage::save_rules(root, &MappingRules::builtin())?;
            println!("✓ Restored built-in rules");
        }
        RulesAction::Stats => {
            let rules = storage::load_rules(root)?;
            for stats in rules.stats() {
                println!("{}", stats);
            }
        }
    }
    Ok(())
}
