//! Session controller
//!
//! Owns the `WorkflowState` for one workbench session and enforces
//! single-flight execution.
//!
//! # State Flow
//!
//! ```text
//! Idle --begin_step/begin_command--> Running --complete--> Idle
//! ```
//!
//! `begin_*` hands out a `PendingRun` ticket and marks the session busy; a
//! second `begin_*` while busy is rejected with `SessionError::Busy`. The
//! caller runs the command on whatever execution context it likes and
//! presents the ticket to `complete`, which clears the busy flag whatever
//! the outcome and, for a successful create step, records the migration file
//! the output announces. State is mutated only here, only after a run has
//! fully finished.

use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::parser::extract_artifact;
use super::state::WorkflowState;
use super::steps::{StepDescriptor, StepKind, generate_steps};
use crate::config::WorkbenchConfig;
use crate::error::SessionError;
use crate::runner::ExecutionResult;

/// Identifier for one dispatched run.
pub type RunId = u64;

/// Ticket for the run in flight. Carries everything needed to execute it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRun {
    pub id: RunId,
    pub command: String,
    pub working_directory: PathBuf,
    /// Set when the command was selected from the step list or is recognised
    /// as a create-migration command.
    pub kind: Option<StepKind>,
}

/// What `complete` did with a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub id: RunId,
    pub result: ExecutionResult,
    /// File name recorded into the state by this run, if any
    pub new_artifact: Option<String>,
}

/// The view handed to front ends after every transition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub steps: Vec<StepDescriptor>,
    pub busy: bool,
    pub last_output: String,
    pub latest_artifact: Option<String>,
    pub migration_name: String,
    pub database_name: String,
    pub working_directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Session {
    state: WorkflowState,
    in_flight: Option<PendingRun>,
    last_output: String,
    next_id: RunId,
}

impl Session {
    pub fn new(state: WorkflowState) -> Self {
        info!(
            "Session started: database={:?} workdir={}",
            state.database_name,
            state.working_directory.display()
        );
        Self {
            state,
            in_flight: None,
            last_output: String::new(),
            next_id: 1,
        }
    }

    pub fn from_config(config: &WorkbenchConfig) -> Self {
        Self::new(WorkflowState::from_config(config))
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight(&self) -> Option<&PendingRun> {
        self.in_flight.as_ref()
    }

    /// Output text of the most recently completed run
    pub fn last_output(&self) -> &str {
        &self.last_output
    }

    /// Steps rendered from the current state.
    pub fn steps(&self) -> Vec<StepDescriptor> {
        generate_steps(&self.state)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            steps: self.steps(),
            busy: self.is_busy(),
            last_output: self.last_output.clone(),
            latest_artifact: self.state.latest_artifact().map(str::to_string),
            migration_name: self.state.migration_name.clone(),
            database_name: self.state.database_name.clone(),
            working_directory: self.state.working_directory.clone(),
        }
    }

    /// User edit of the migration name. Allowed while a run is in flight:
    /// it only affects the create step, which the running command has
    /// already been rendered from.
    pub fn set_migration_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        debug!("Migration name set to {:?}", name);
        self.state.set_migration_name(name);
    }

    /// Select step `index` (zero-based) from the current step list.
    pub fn begin_step(&mut self, index: usize) -> Result<PendingRun, SessionError> {
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        let steps = self.steps();
        let count = steps.len();
        let step = steps
            .into_iter()
            .nth(index)
            .ok_or(SessionError::UnknownStep { index, count })?;
        if let Some(prereq) = step.blocked_by {
            return Err(SessionError::StepNotReady {
                index,
                reason: prereq.to_string(),
            });
        }
        let working_directory = self.state.working_directory.clone();
        Ok(self.start(step.command, working_directory, Some(step.kind)))
    }

    /// Dispatch arbitrary command text in the session's working directory.
    pub fn begin_command(&mut self, command: impl Into<String>) -> Result<PendingRun, SessionError> {
        let working_directory = self.state.working_directory.clone();
        self.begin_command_in(command, working_directory)
    }

    /// Dispatch arbitrary command text in an explicit working directory.
    /// No readiness checks apply; the busy gate still does.
    pub fn begin_command_in(
        &mut self,
        command: impl Into<String>,
        working_directory: impl Into<PathBuf>,
    ) -> Result<PendingRun, SessionError> {
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        let command = command.into();
        let kind = StepKind::classify(&command);
        Ok(self.start(command, working_directory.into(), kind))
    }

    fn start(
        &mut self,
        command: String,
        working_directory: PathBuf,
        kind: Option<StepKind>,
    ) -> PendingRun {
        let run = PendingRun {
            id: self.next_id,
            command,
            working_directory,
            kind,
        };
        self.next_id += 1;
        info!(
            "Dispatching run {}: {} in {}",
            run.id,
            run.command,
            run.working_directory.display()
        );
        self.in_flight = Some(run.clone());
        run
    }

    /// Finish the run in flight. Clears the busy flag for any result;
    /// parses create-step output only when the run succeeded.
    pub fn complete(
        &mut self,
        run_id: RunId,
        result: ExecutionResult,
    ) -> Result<RunOutcome, SessionError> {
        let expected = self
            .in_flight
            .as_ref()
            .map(|run| run.id)
            .ok_or(SessionError::NoRunInFlight)?;
        if expected != run_id {
            return Err(SessionError::TicketMismatch {
                expected,
                got: run_id,
            });
        }
        let run = self.in_flight.take().ok_or(SessionError::NoRunInFlight)?;

        let mut new_artifact = None;
        if result.succeeded {
            info!("Run {} succeeded", run.id);
            if let Some(file) = extract_artifact(&run.command, &result.output) {
                self.state.record_artifact(file.clone());
                new_artifact = Some(file);
            }
        } else {
            warn!("Run {} failed: {}", run.id, result.output.trim());
        }

        self.last_output = result.output.clone();
        Ok(RunOutcome {
            id: run.id,
            result,
            new_artifact,
        })
    }
}
