//! Migration file extraction from wrangler output.
//!
//! wrangler reports a new migration with a line of the form
//!
//! ```text
//! ✅ Successfully created Migration '0001_create_user_table.sql'!
//! ```
//!
//! That sentence is the only structured data the workbench reads back from
//! an external tool. If wrangler rewords it, extraction degrades to a miss;
//! the tests below pin the exact wording.

use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info};

use super::steps::StepKind;

/// Pattern for the success line. Group 1 is the file name.
pub const CREATED_MIGRATION_PATTERN: &str = r"Successfully created Migration '(.+\.sql)'";

fn created_migration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CREATED_MIGRATION_PATTERN).expect("pattern is a valid literal"))
}

/// Extract the created migration file name from a run's output.
///
/// Returns `None` when `command` is not a create-migration command, or when
/// the output carries no success line. Neither case is an error.
pub fn extract_artifact(command: &str, output: &str) -> Option<String> {
    if StepKind::classify(command) != Some(StepKind::CreateMigration) {
        debug!("Not a create-migration command, skipping extraction: {}", command);
        return None;
    }

    match created_migration_regex().captures(output) {
        Some(caps) => {
            let file = caps[1].to_string();
            info!("New migration file: {}", file);
            Some(file)
        }
        None => {
            info!("No migration file found in output: {}", output.trim());
            None
        }
    }
}
