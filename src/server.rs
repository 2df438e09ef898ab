//! HTTP surface for the migration workbench
//!
//! Serves the session to a browser dashboard. The session sits behind a
//! mutex that is held only for the begin/complete transitions; the command
//! itself runs on tokio's blocking pool so the server keeps answering
//! (`/api/steps` reports `busy: true` meanwhile).

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::engine::session::{PendingRun, RunOutcome, Session, SessionSnapshot};
use crate::error::{Result, SessionError, WorkbenchError};
use crate::runner::{CommandRunner, ExecutionResult};

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    session: Arc<Mutex<Session>>,
    runner: Arc<dyn CommandRunner>,
}

impl ServerState {
    pub fn new(session: Session, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            runner,
        }
    }

    fn lock_session(&self) -> std::result::Result<MutexGuard<'_, Session>, ApiError> {
        lock(&self.session)
    }

    /// Run `run` off the async executor and fold the result into the session.
    ///
    /// The blocking task owns both the run and its completion, so the gate
    /// clears even when the request future is dropped mid-run.
    async fn execute(&self, run: PendingRun) -> std::result::Result<RunOutcome, ApiError> {
        let session = Arc::clone(&self.session);
        let runner = Arc::clone(&self.runner);
        let id = run.id;
        tokio::task::spawn_blocking(move || run_to_completion(&session, runner.as_ref(), run))
            .await
            .unwrap_or_else(|e| {
                error!("Command task for run {} failed: {}", id, e);
                Err(ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("command task failed: {}", e),
                ))
            })
    }
}

fn lock(session: &Mutex<Session>) -> std::result::Result<MutexGuard<'_, Session>, ApiError> {
    session.lock().map_err(|e| {
        error!("Session mutex poisoned: {}", e);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "session state is unavailable")
    })
}

/// Execute `run` and complete it. A panicking runner still completes the run.
fn run_to_completion(
    session: &Mutex<Session>,
    runner: &dyn CommandRunner,
    run: PendingRun,
) -> std::result::Result<RunOutcome, ApiError> {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        runner.run(&run.command, &run.working_directory)
    }))
    .unwrap_or_else(|_| {
        error!("Runner panicked during run {}", run.id);
        ExecutionResult::failure(&format!("Command failed: {}", run.command), "runner panicked", None)
    });

    let mut session = lock(session)?;
    Ok(session.complete(run.id, result)?)
}

/// Body of `/api/initial-data`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InitialData {
    pub working_directory: PathBuf,
    pub database_name: String,
}

/// Body of `POST /api/run-command`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCommandRequest {
    pub command: String,
    pub working_directory: PathBuf,
}

/// `{"output": ...}`, for success and failure alike
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandOutput {
    pub output: String,
}

/// Body of `PUT /api/migration-name`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationNameRequest {
    pub migration_name: String,
}

/// Body of `POST /api/steps/{number}/run`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRunResponse {
    pub output: String,
    pub succeeded: bool,
    pub new_artifact: Option<String>,
    pub session: SessionSnapshot,
}

/// Error response: a status plus `{"output": "Error: ..."}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn body(&self) -> CommandOutput {
        CommandOutput {
            output: format!("Error: {}", self.message),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let status = match err {
            SessionError::Busy | SessionError::StepNotReady { .. } => StatusCode::CONFLICT,
            SessionError::UnknownStep { .. } => StatusCode::NOT_FOUND,
            SessionError::NoRunInFlight
            | SessionError::TicketMismatch { .. }
            | SessionError::ExecutorGone => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body())).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Build the `/api` router
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/api/hello", get(hello))
        .route("/api/initial-data", get(initial_data))
        .route("/api/run-command", post(run_command))
        .route("/api/steps", get(list_steps))
        .route("/api/migration-name", put(set_migration_name))
        .route("/api/steps/{number}/run", post(run_step))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until the process exits.
pub async fn serve(addr: &str, state: ServerState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| WorkbenchError::server(format!("failed to bind {}: {}", addr, e)))?;
    info!("Migration workbench listening on http://{}", addr);

    axum::serve(listener, router(state))
        .await
        .map_err(|e| WorkbenchError::server(e.to_string()))
}

async fn hello() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Hello d1flow!" }))
}

async fn initial_data(State(state): State<ServerState>) -> ApiResult<Json<InitialData>> {
    let session = state.lock_session()?;
    let wf = session.state();
    Ok(Json(InitialData {
        working_directory: wf.working_directory.clone(),
        database_name: wf.database_name.clone(),
    }))
}

async fn run_command(
    State(state): State<ServerState>,
    Json(req): Json<RunCommandRequest>,
) -> ApiResult<Json<CommandOutput>> {
    info!(
        "Received command: {} in directory: {}",
        req.command,
        req.working_directory.display()
    );
    let run = state
        .lock_session()?
        .begin_command_in(req.command, req.working_directory)
        .inspect_err(|e| warn!("Rejected command: {}", e))?;

    let outcome = state.execute(run).await?;
    if outcome.result.succeeded {
        Ok(Json(CommandOutput {
            output: outcome.result.output,
        }))
    } else {
        Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            outcome.result.output,
        ))
    }
}

async fn list_steps(State(state): State<ServerState>) -> ApiResult<Json<SessionSnapshot>> {
    Ok(Json(state.lock_session()?.snapshot()))
}

async fn set_migration_name(
    State(state): State<ServerState>,
    Json(req): Json<MigrationNameRequest>,
) -> ApiResult<Json<SessionSnapshot>> {
    let mut session = state.lock_session()?;
    session.set_migration_name(req.migration_name);
    Ok(Json(session.snapshot()))
}

async fn run_step(
    State(state): State<ServerState>,
    Path(number): Path<usize>,
) -> ApiResult<(StatusCode, Json<StepRunResponse>)> {
    // Steps are numbered from 1 on the wire, as in the listings.
    let index = number.checked_sub(1).ok_or_else(|| {
        ApiError::new(StatusCode::NOT_FOUND, format!("unknown step {}", number))
    })?;
    let run = state
        .lock_session()?
        .begin_step(index)
        .inspect_err(|e| warn!("Rejected step {}: {}", number, e))?;

    let outcome = state.execute(run).await?;
    let status = if outcome.result.succeeded {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    let session = state.lock_session()?.snapshot();
    Ok((
        status,
        Json(StepRunResponse {
            output: outcome.result.output,
            succeeded: outcome.result.succeeded,
            new_artifact: outcome.new_artifact,
            session,
        }),
    ))
}
