//! LeadMerge Library
//!
//! Repairs, merges, deduplicates and allocates car-sales leads exported from
//! the Yiche and Autohome portals into the dealership CRM import format.

pub mod types;
pub mod error;
pub mod repair;
pub mod extract;
pub mod rules;
pub mod merge;
pub mod allocate;
pub mod pipeline;
pub mod config;
pub mod storage;
pub mod table;
pub mod report;

pub use types::*;
pub use error::{MergeError, Result};
pub use config::Settings;
pub use pipeline::{run_merge, MergeOutcome, MergeRequest, RunLog};
pub use report::LeadReport;
