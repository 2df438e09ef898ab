//! Step Template Generator
//!
//! Translates the current `WorkflowState` into the ordered list of commands a
//! migration round needs:
//!
//! | # | Kind            | Templated from                  |
//! |---|-----------------|---------------------------------|
//! | 1 | CreateMigration | database name, migration name   |
//! | 2 | DiffFromEmpty   | latest artifact                 |
//! | 3 | DiffFromLocal   | latest artifact                 |
//! | 4 | ApplyLocal      | database name                   |
//! | 5 | GenerateClient  | nothing                         |
//!
//! # Design
//!
//! - **Pure logic**: No I/O. The same state always yields the same steps.
//! - **Total**: An empty database name or missing artifact still renders,
//!   with the placeholder text in the command.
//! - **Fresh**: Every step that mentions the artifact reads it from the state
//!   passed in, so one state change refreshes both diff commands at once.
//!
//! The command texts are the wire format of wrangler and prisma. Do not
//! reformat them.

use serde::Serialize;
use std::fmt;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use super::state::WorkflowState;

/// Prefix every create-migration command starts with. The output parser
/// keys on it to decide whether a run can carry a new artifact.
pub const CREATE_MIGRATION_PREFIX: &str = "npx wrangler d1 migrations create";

const PRISMA_SCHEMA: &str = "./prisma/schema.prisma";
const MIGRATIONS_DIR: &str = "migrations";

/// The five kinds of step, in presentation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StepKind {
    CreateMigration,
    DiffFromEmpty,
    DiffFromLocal,
    ApplyLocal,
    GenerateClient,
}

impl StepKind {
    /// Human-readable description shown beside the command
    pub const fn description(self) -> &'static str {
        match self {
            Self::CreateMigration => "Create a new D1 migration file",
            Self::DiffFromEmpty => "First Generate SQL from Prisma schema",
            Self::DiffFromLocal => "Exist Generate SQL from Prisma schema",
            Self::ApplyLocal => "Apply the migration to your local D1 database",
            Self::GenerateClient => "Generate Prisma client",
        }
    }

    /// What must hold before this step is worth running, if anything.
    pub const fn prerequisite(self) -> Option<Prerequisite> {
        match self {
            Self::DiffFromEmpty | Self::DiffFromLocal => Some(Prerequisite::MigrationFileCreated),
            Self::CreateMigration | Self::ApplyLocal | Self::GenerateClient => None,
        }
    }

    /// Render this step's command text against `state`.
    pub fn render(self, state: &WorkflowState) -> String {
        match self {
            Self::CreateMigration => format!(
                "{} {} {}",
                CREATE_MIGRATION_PREFIX, state.database_name, state.migration_name
            ),
            Self::DiffFromEmpty => prisma_diff("--from-empty", state.artifact_or_placeholder()),
            Self::DiffFromLocal => prisma_diff("--from-local-d1", state.artifact_or_placeholder()),
            Self::ApplyLocal => {
                format!("npx wrangler d1 migrations apply {} --local", state.database_name)
            }
            Self::GenerateClient => "npx prisma generate".to_string(),
        }
    }

    /// Classify arbitrary command text by its leading shape. Only the
    /// create step is recognised; the others never feed state.
    pub fn classify(command: &str) -> Option<Self> {
        command
            .contains(CREATE_MIGRATION_PREFIX)
            .then_some(Self::CreateMigration)
    }
}

fn prisma_diff(from: &str, artifact: &str) -> String {
    format!(
        "npx prisma migrate diff {} --to-schema-datamodel {} --script --output {}/{}",
        from, PRISMA_SCHEMA, MIGRATIONS_DIR, artifact
    )
}

/// A declared precondition on a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Prerequisite {
    /// A create step has succeeded and its migration file name is known
    MigrationFileCreated,
}

impl Prerequisite {
    pub fn is_met(self, state: &WorkflowState) -> bool {
        match self {
            Self::MigrationFileCreated => state.has_artifact(),
        }
    }
}

impl fmt::Display for Prerequisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MigrationFileCreated => write!(f, "create a migration file first"),
        }
    }
}

/// One rendered step: the command to run and what it is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDescriptor {
    pub kind: StepKind,
    pub command: String,
    pub description: String,
    /// False when the step's prerequisite does not hold for the state it was
    /// rendered from. The command is still rendered.
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<Prerequisite>,
}

impl fmt::Display for StepDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        if let Some(prereq) = self.blocked_by {
            write!(f, "  (not ready: {})", prereq)?;
        }
        Ok(())
    }
}

/// Generate the ordered step list for `state`.
pub fn generate_steps(state: &WorkflowState) -> Vec<StepDescriptor> {
    StepKind::iter()
        .map(|kind| {
            let blocked_by = kind.prerequisite().filter(|p| !p.is_met(state));
            StepDescriptor {
                kind,
                command: kind.render(state),
                description: kind.description().to_string(),
                ready: blocked_by.is_none(),
                blocked_by,
            }
        })
        .collect()
}

/// Numbered listing for logs and the terminal front ends.
pub fn steps_summary(steps: &[StepDescriptor]) -> String {
    let mut lines = Vec::with_capacity(steps.len() * 2);
    for (i, step) in steps.iter().enumerate() {
        lines.push(format!("{}. {}", i + 1, step));
        lines.push(format!("   {}", step.description));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::NO_ARTIFACT;

    fn state() -> WorkflowState {
        WorkflowState::new("/srv/app", "ai-common-service-db-dev", "create_user_table")
    }

    #[test]
    fn test_generates_five_steps_in_order() {
        let steps = generate_steps(&state());
        let kinds: Vec<StepKind> = steps.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StepKind::CreateMigration,
                StepKind::DiffFromEmpty,
                StepKind::DiffFromLocal,
                StepKind::ApplyLocal,
                StepKind::GenerateClient,
            ]
        );
    }

    #[test]
    fn test_exact_command_texts() {
        let steps = generate_steps(&state().with_artifact("0001_create_user_table.sql"));
        assert_eq!(
            steps[0].command,
            "npx wrangler d1 migrations create ai-common-service-db-dev create_user_table"
        );
        assert_eq!(
            steps[1].command,
            "npx prisma migrate diff --from-empty --to-schema-datamodel ./prisma/schema.prisma \
             --script --output migrations/0001_create_user_table.sql"
        );
        assert_eq!(
            steps[2].command,
            "npx prisma migrate diff --from-local-d1 --to-schema-datamodel ./prisma/schema.prisma \
             --script --output migrations/0001_create_user_table.sql"
        );
        assert_eq!(
            steps[3].command,
            "npx wrangler d1 migrations apply ai-common-service-db-dev --local"
        );
        assert_eq!(steps[4].command, "npx prisma generate");
    }

    #[test]
    fn test_descriptions() {
        let steps = generate_steps(&state());
        assert_eq!(steps[0].description, "Create a new D1 migration file");
        assert_eq!(steps[3].description, "Apply the migration to your local D1 database");
        assert_eq!(steps[4].description, "Generate Prisma client");
    }

    #[test]
    fn test_placeholder_and_readiness_without_artifact() {
        let steps = generate_steps(&state());
        assert!(steps[1].command.ends_with(&format!("migrations/{}", NO_ARTIFACT)));
        assert!(!steps[1].ready);
        assert!(!steps[2].ready);
        assert_eq!(steps[1].blocked_by, Some(Prerequisite::MigrationFileCreated));
        assert!(steps[0].ready && steps[3].ready && steps[4].ready);
    }

    #[test]
    fn test_diff_steps_ready_once_artifact_known() {
        let steps = generate_steps(&state().with_artifact("0001_init.sql"));
        assert!(steps.iter().all(|s| s.ready));
        assert!(steps.iter().all(|s| s.blocked_by.is_none()));
    }

    #[test]
    fn test_empty_database_name_still_renders() {
        let steps = generate_steps(&WorkflowState::default());
        assert_eq!(steps.len(), 5);
        assert_eq!(steps[3].command, "npx wrangler d1 migrations apply  --local");
    }

    #[test]
    fn test_classify_only_recognises_create() {
        assert_eq!(
            StepKind::classify("npx wrangler d1 migrations create db name"),
            Some(StepKind::CreateMigration)
        );
        assert_eq!(StepKind::classify("npx wrangler d1 migrations apply db --local"), None);
        assert_eq!(StepKind::classify("npx prisma generate"), None);
    }

    #[test]
    fn test_summary_numbers_steps() {
        let summary = steps_summary(&generate_steps(&state()));
        assert!(summary.starts_with("1. npx wrangler d1 migrations create"));
        assert!(summary.contains("5. npx prisma generate"));
        assert!(summary.contains("not ready: create a migration file first"));
    }

    #[test]
    fn test_kind_round_trips_through_strum() {
        for kind in StepKind::iter() {
            let parsed: StepKind = kind.to_string().parse().expect("known kind"); // test: iter is exhaustive
            assert_eq!(parsed, kind);
        }
    }
}
