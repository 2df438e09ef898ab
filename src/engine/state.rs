//! Workflow state for one workbench session.
//!
//! The state is an explicit value owned by the session controller. The step
//! generator and the output parser only ever see it by reference.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::WorkbenchConfig;

/// Rendered in templates while no migration file has been created yet.
pub const NO_ARTIFACT: &str = "[-]";

/// Migration name used until the user types one.
pub const DEFAULT_MIGRATION_NAME: &str = "create_user_table";

/// Session knowledge: where to run, which database, what to call the next
/// migration, and the last migration file wrangler reported creating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub working_directory: PathBuf,
    pub database_name: String,
    pub migration_name: String,
    /// `None` until a create step succeeds and its output parses.
    latest_artifact: Option<String>,
}

impl WorkflowState {
    pub fn new(
        working_directory: impl Into<PathBuf>,
        database_name: impl Into<String>,
        migration_name: impl Into<String>,
    ) -> Self {
        Self {
            working_directory: working_directory.into(),
            database_name: database_name.into(),
            migration_name: migration_name.into(),
            latest_artifact: None,
        }
    }

    /// Seed a session from loaded configuration.
    pub fn from_config(config: &WorkbenchConfig) -> Self {
        Self::new(
            config.working_directory.clone(),
            config.database_name.clone(),
            config.migration_name.clone(),
        )
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    /// The last migration file reported by a successful create step.
    pub fn latest_artifact(&self) -> Option<&str> {
        self.latest_artifact.as_deref()
    }

    /// The artifact as it appears in command templates.
    pub fn artifact_or_placeholder(&self) -> &str {
        self.latest_artifact.as_deref().unwrap_or(NO_ARTIFACT)
    }

    pub fn has_artifact(&self) -> bool {
        self.latest_artifact.is_some()
    }

    pub fn set_migration_name(&mut self, name: impl Into<String>) {
        self.migration_name = name.into();
    }

    /// Overwrite the latest artifact. Only the session controller calls this,
    /// and only with a file name the output parser extracted.
    pub(crate) fn record_artifact(&mut self, artifact: String) {
        self.latest_artifact = Some(artifact);
    }

    /// Builder-style seeding, for resuming from a known file on the command line.
    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.latest_artifact = Some(artifact.into());
        self
    }
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::new(PathBuf::from("."), String::new(), DEFAULT_MIGRATION_NAME)
    }
}
