//! Rules Validation Binary
//!
//! Validates Config/mapping_rules.json and Config/settings.yaml:
//! - Checks every rule has a pattern and, where required, a target
//! - Warns about car series patterns that are not valid regex
//! - Checks the roster has an enabled consultant and a usable first pick
//! - Reports configuration issues before a merge run

use anyhow::{Context, Result};
use lead_merge::allocate::enabled_names;
use lead_merge::rules::validate_rules;
use lead_merge::storage;

fn main() -> Result<()> {
    let root = std::env::var("ROOT").unwrap_or_else(|_| ".".to_string());

    println!("=== Mapping Rules Validator ===");

    let rules = storage::load_rules(&root)
        .context("Failed to load mapping_rules.json")?;
    let settings = storage::load_settings(&root)
        .context("Failed to load settings.yaml")?;

    let validation = validate_rules(&rules);
    let mut errors = validation.errors;
    let mut warnings = validation.warnings;

    let enabled = enabled_names(&settings.consultants);
    if enabled.is_empty() {
        errors.push("No consultant is enabled in settings.yaml".to_string());
    }

    let mut seen = Vec::new();
    for consultant in &settings.consultants {
        if consultant.name.trim().is_empty() {
            errors.push("Roster has a consultant with an empty name".to_string());
        } else if seen.contains(&consultant.name) {
            warnings.push(format!(
                "Consultant '{}' is listed more than once; only the first entry's unit is used",
                consultant.name
            ));
        } else {
            seen.push(consultant.name.clone());
        }

        if consultant.enabled && consultant.unit.trim().is_empty() {
            warnings.push(format!("Consultant '{}' has no unit", consultant.name));
        }
    }

    if let Some(pick) = &settings.first_pick {
        if settings.effective_first_pick().is_none() {
            warnings.push(format!(
                "first_pick '{}' is not an enabled consultant and will be ignored",
                pick
            ));
        }
    }

    if settings.delimiter_byte().is_none() {
        errors.push(format!(
            "Delimiter {:?} is not a single ASCII character",
            settings.delimiter
        ));
    }

    // Report results
    if errors.is_empty() && warnings.is_empty() {
        for stats in rules.stats() {
            println!("✓ {}", stats);
        }
        println!("✓ {} consultants enabled", enabled.len());
        return Ok(());
    }

    if !errors.is_empty() {
        println!("\n❌ ERRORS (must fix):");
        for error in &errors {
            println!("  - {}", error);
        }
    }

    if !warnings.is_empty() {
        println!("\n⚠️  WARNINGS:");
        for warning in &warnings {
            println!("  - {}", warning);
        }
    }

    if !errors.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}
