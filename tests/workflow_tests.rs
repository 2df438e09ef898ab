//! Tests for the migration workflow engine
//!
//! These tests verify:
//! - Step generation is deterministic and refreshes from state
//! - The created migration file flows into both diff steps
//! - Parse misses and failed runs leave state alone
//! - Single-flight dispatch
//! - Editing the migration name only touches the create step

use d1flow::{
    ExecutionResult, NO_ARTIFACT, Session, SessionError, StepKind, WorkflowState,
    extract_artifact, generate_steps,
};

const CREATE_OUTPUT: &str = "Successfully created Migration '0001_init.sql'";

fn state() -> WorkflowState {
    WorkflowState::new(
        "C:\\project\\ai\\ai-common-service",
        "ai-common-service-db-dev",
        "create_user_table",
    )
}

/// Extract the `--output migrations/<file>` segment of a diff command.
fn output_segment(command: &str) -> &str {
    command
        .rsplit_once("--output ")
        .map(|(_, seg)| seg)
        .expect("diff command has --output")
}

// =============================================================================
// Generator
// =============================================================================

#[test]
fn test_generate_is_deterministic() {
    let s = state().with_artifact("0004_x.sql");
    assert_eq!(generate_steps(&s), generate_steps(&s));
}

#[test]
fn test_artifact_flows_into_both_diff_steps() {
    let before = state();
    let steps = generate_steps(&before);
    assert_eq!(output_segment(&steps[1].command), format!("migrations/{}", NO_ARTIFACT));

    let file = extract_artifact(&steps[0].command, CREATE_OUTPUT).expect("success line parses");
    assert_eq!(file, "0001_init.sql");

    let after = before.with_artifact(file);
    let steps = generate_steps(&after);
    assert!(steps[1].command.contains("0001_init.sql"));
    assert!(steps[2].command.contains("0001_init.sql"));
    assert_eq!(output_segment(&steps[1].command), output_segment(&steps[2].command));
}

#[test]
fn test_parse_miss_leaves_steps_unchanged() {
    let mut session = Session::new(state());
    let before = session.steps();

    let run = session.begin_step(0).expect("idle");
    assert_eq!(extract_artifact(&run.command, "no match here"), None);
    let outcome = session
        .complete(run.id, ExecutionResult::success("no match here"))
        .expect("ticket matches");

    assert_eq!(outcome.new_artifact, None);
    let after = session.steps();
    assert_eq!(before[1], after[1]);
    assert_eq!(before[2], after[2]);
}

#[test]
fn test_failure_surfaces_message_and_keeps_state() {
    let mut session = Session::new(state().with_artifact("0001_init.sql"));
    let before = session.state().clone();

    let run = session.begin_step(3).expect("apply is always ready");
    let outcome = session
        .complete(
            run.id,
            ExecutionResult::failure("Command failed: npx", "command not found", Some(127)),
        )
        .expect("ticket matches");

    assert!(!outcome.result.succeeded);
    assert!(outcome.result.output.contains("command not found"));
    assert_eq!(session.state(), &before);
    assert!(!session.is_busy());
}

#[test]
fn test_migration_name_edit_only_changes_create_step() {
    let mut session = Session::new(state().with_artifact("0001_init.sql"));
    let before = session.steps();

    session.set_migration_name("add_index");
    let after = session.steps();

    assert_ne!(before[0].command, after[0].command);
    assert!(after[0].command.ends_with(" add_index"));
    assert_eq!(
        before[0].command.replace("create_user_table", "add_index"),
        after[0].command
    );
    assert_eq!(before[1..], after[1..]);
}

// =============================================================================
// Session
// =============================================================================

#[test]
fn test_single_flight() {
    let mut session = Session::new(state());
    let first = session.begin_step(0).expect("idle");
    assert_eq!(session.begin_step(0), Err(SessionError::Busy));
    assert_eq!(session.begin_command("npx prisma generate"), Err(SessionError::Busy));

    session
        .complete(first.id, ExecutionResult::success(CREATE_OUTPUT))
        .expect("ticket matches");
    assert!(session.begin_step(1).is_ok());
}

#[test]
fn test_mutations_apply_in_dispatch_order() {
    let mut session = Session::new(state());
    for (n, file) in ["0001_a.sql", "0002_b.sql", "0003_c.sql"].iter().enumerate() {
        let run = session.begin_step(0).expect("idle");
        session
            .complete(
                run.id,
                ExecutionResult::success(format!("Successfully created Migration '{}'", file)),
            )
            .expect("ticket matches");
        assert_eq!(session.state().latest_artifact(), Some(*file), "after run {}", n + 1);
    }
}

#[test]
fn test_step_kinds_and_readiness_in_snapshot() {
    let session = Session::new(state());
    let snap = session.snapshot();
    assert_eq!(snap.steps[0].kind, StepKind::CreateMigration);
    assert!(!snap.steps[1].ready);

    let json = serde_json::to_value(&snap).expect("snapshot serializes");
    assert_eq!(json["busy"], false);
    assert_eq!(json["steps"][1]["blockedBy"], "migration_file_created");
    assert_eq!(json["steps"][4]["command"], "npx prisma generate");
    assert!(json["steps"][4].get("blockedBy").is_none());
}
