//! d1flow Library
//!
//! Core of the D1 migration workbench: renders the wrangler/prisma command
//! sequence from session state, runs one command at a time, and carries the
//! migration file name wrangler reports into the later steps.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod interactive;
pub mod process_guard;
pub mod runner;
pub mod server;

// Re-export main types for convenience
pub use config::{WorkbenchConfig, fetch_config};
pub use engine::parser::extract_artifact;
pub use engine::session::{PendingRun, RunId, RunOutcome, Session, SessionSnapshot};
pub use engine::state::{NO_ARTIFACT, WorkflowState};
pub use engine::steps::{Prerequisite, StepDescriptor, StepKind, generate_steps};
pub use error::{SessionError, WorkbenchError};
pub use executor::Controller;
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use runner::{CommandRunner, ExecutionResult, ShellRunner};
