//! executor.rs - Runs workflow commands on a dedicated background thread.
//!
//! `spawn_executor_thread` listens for `RunRequest`s, runs each one to
//! completion through a `CommandRunner` (which blocks), and sends the
//! `RunResponse` back. `Controller` pairs that thread with a `Session`, so the
//! thread that accepts step selections never waits on wrangler or prisma.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::path::PathBuf;
use tracing::{debug, error};

use crate::engine::session::{RunId, RunOutcome, Session, SessionSnapshot};
use crate::error::SessionError;
use crate::runner::{CommandRunner, ExecutionResult};

/// A request to run one command line.
#[derive(Debug)]
pub struct RunRequest {
    pub id: RunId,
    pub command: String,
    pub working_directory: PathBuf,
}

/// The result of a `RunRequest`.
#[derive(Debug)]
pub struct RunResponse {
    pub id: RunId,
    pub result: ExecutionResult,
}

/// Spawns a dedicated thread that executes requests one at a time.
///
/// The thread exits when the request sender is dropped or when the response
/// receiver is gone.
pub fn spawn_executor_thread(
    runner: Arc<dyn CommandRunner>,
    request_rx: Receiver<RunRequest>,
    response_tx: Sender<RunResponse>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        debug!("Command executor thread started.");
        while let Ok(request) = request_rx.recv() {
            debug!("Executing run request: {:?}", request);
            let result = runner.run(&request.command, &request.working_directory);
            if response_tx
                .send(RunResponse {
                    id: request.id,
                    result,
                })
                .is_err()
            {
                error!("Failed to send run response. Receiver probably dropped.");
                break;
            }
        }
        debug!("Command executor thread shut down.");
    })
}

/// A session driven through the executor thread.
pub struct Controller {
    session: Session,
    request_tx: Sender<RunRequest>,
    response_rx: Receiver<RunResponse>,
}

impl Controller {
    pub fn new(session: Session, runner: Arc<dyn CommandRunner>) -> Self {
        let (request_tx, request_rx) = mpsc::channel();
        let (response_tx, response_rx) = mpsc::channel();
        spawn_executor_thread(runner, request_rx, response_tx);
        Self {
            session,
            request_tx,
            response_rx,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    pub fn set_migration_name(&mut self, name: impl Into<String>) {
        self.session.set_migration_name(name);
    }

    /// Dispatch step `index`. Returns immediately.
    pub fn dispatch_step(&mut self, index: usize) -> Result<RunId, SessionError> {
        let run = self.session.begin_step(index)?;
        self.send(run.id, run.command, run.working_directory)
    }

    /// Dispatch raw command text in the session's working directory.
    pub fn dispatch_command(&mut self, command: &str) -> Result<RunId, SessionError> {
        let run = self.session.begin_command(command)?;
        self.send(run.id, run.command, run.working_directory)
    }

    fn send(
        &mut self,
        id: RunId,
        command: String,
        working_directory: PathBuf,
    ) -> Result<RunId, SessionError> {
        let request = RunRequest {
            id,
            command,
            working_directory,
        };
        if self.request_tx.send(request).is_err() {
            return Err(self.executor_gone());
        }
        Ok(id)
    }

    /// The executor thread is gone, so the run in flight will never report.
    /// Release the gate and hand back `ExecutorGone`.
    fn executor_gone(&mut self) -> SessionError {
        if let Some(id) = self.session.in_flight().map(|run| run.id) {
            error!("Command executor stopped during run {}", id);
            let _ = self.session.complete(
                id,
                ExecutionResult::failure("command executor is no longer running", "", None),
            );
        }
        SessionError::ExecutorGone
    }

    /// Apply a finished run if one is ready. Never blocks.
    pub fn poll(&mut self) -> Result<Option<RunOutcome>, SessionError> {
        if !self.session.is_busy() {
            return Ok(None);
        }
        match self.response_rx.try_recv() {
            Ok(response) => self.apply(response).map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(self.executor_gone()),
        }
    }

    /// Block until the run in flight finishes and apply it.
    pub fn wait(&mut self) -> Result<RunOutcome, SessionError> {
        if !self.session.is_busy() {
            return Err(SessionError::NoRunInFlight);
        }
        match self.response_rx.recv() {
            Ok(response) => self.apply(response),
            Err(_) => Err(self.executor_gone()),
        }
    }

    fn apply(&mut self, response: RunResponse) -> Result<RunOutcome, SessionError> {
        self.session.complete(response.id, response.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::WorkflowState;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays canned results and records what it was asked to run.
    struct ScriptedRunner {
        results: Mutex<Vec<ExecutionResult>>,
        calls: Mutex<Vec<(String, PathBuf)>>,
    }

    impl ScriptedRunner {
        fn new(mut results: Vec<ExecutionResult>) -> Arc<Self> {
            results.reverse();
            Arc::new(Self {
                results: Mutex::new(results),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, command: &str, working_directory: &Path) -> ExecutionResult {
            self.calls
                .lock()
                .expect("calls lock") // test: single writer
                .push((command.to_string(), working_directory.to_path_buf()));
            self.results
                .lock()
                .expect("results lock") // test: single writer
                .pop()
                .unwrap_or_else(|| ExecutionResult::success(""))
        }
    }

    fn controller(runner: Arc<dyn CommandRunner>) -> Controller {
        let state = WorkflowState::new("/srv/app", "app-db", "create_user_table");
        Controller::new(Session::new(state), runner)
    }

    #[test]
    fn test_dispatch_then_wait_updates_artifact() {
        let runner = ScriptedRunner::new(vec![ExecutionResult::success(
            "Successfully created Migration '0001_create_user_table.sql'",
        )]);
        let mut ctl = controller(runner.clone());

        ctl.dispatch_step(0).expect("idle");
        let outcome = ctl.wait().expect("executor alive");

        assert_eq!(outcome.new_artifact.as_deref(), Some("0001_create_user_table.sql"));
        assert!(!ctl.session().is_busy());
        let calls = runner.calls.lock().expect("calls lock"); // test: executor idle
        assert_eq!(
            calls[0],
            (
                "npx wrangler d1 migrations create app-db create_user_table".to_string(),
                PathBuf::from("/srv/app")
            )
        );
    }

    #[test]
    fn test_busy_rejects_while_in_flight() {
        let runner = ScriptedRunner::new(vec![]);
        let mut ctl = controller(runner);
        ctl.dispatch_step(4).expect("idle");
        assert_eq!(ctl.dispatch_step(3), Err(SessionError::Busy));
        ctl.wait().expect("executor alive");
        assert!(ctl.dispatch_step(3).is_ok());
    }

    #[test]
    fn test_poll_eventually_completes() {
        let runner = ScriptedRunner::new(vec![ExecutionResult::success("done")]);
        let mut ctl = controller(runner);
        assert_eq!(ctl.poll(), Ok(None));

        ctl.dispatch_command("npx prisma generate").expect("idle");
        let mut outcome = None;
        for _ in 0..200 {
            if let Some(o) = ctl.poll().expect("executor alive") {
                outcome = Some(o);
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        let outcome = outcome.expect("run completes within a second");
        assert_eq!(outcome.result.output, "done");
        assert_eq!(ctl.snapshot().last_output, "done");
    }

    /// Panics on every run, taking the executor thread down with it.
    struct PanickingRunner;

    impl CommandRunner for PanickingRunner {
        fn run(&self, _command: &str, _working_directory: &Path) -> ExecutionResult {
            panic!("runner crashed");
        }
    }

    #[test]
    fn test_dead_executor_releases_gate() {
        let mut ctl = controller(Arc::new(PanickingRunner));
        ctl.dispatch_step(4).expect("idle");

        assert_eq!(ctl.wait().err(), Some(SessionError::ExecutorGone));
        assert!(!ctl.session().is_busy());
        assert!(ctl.snapshot().last_output.starts_with("command executor is no longer running"));

        // Later dispatches fail cleanly instead of reporting busy.
        assert_eq!(ctl.dispatch_step(4), Err(SessionError::ExecutorGone));
        assert!(!ctl.session().is_busy());
    }

    #[test]
    fn test_poll_after_executor_death_releases_gate() {
        let mut ctl = controller(Arc::new(PanickingRunner));
        ctl.dispatch_command("npx prisma generate").expect("idle");

        let mut polled = Ok(None);
        for _ in 0..200 {
            polled = ctl.poll();
            if polled.is_err() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(polled, Err(SessionError::ExecutorGone));
        assert!(!ctl.session().is_busy());
    }

    #[test]
    fn test_wait_when_idle() {
        let mut ctl = controller(ScriptedRunner::new(vec![]));
        assert_eq!(ctl.wait().err(), Some(SessionError::NoRunInFlight));
    }
}
