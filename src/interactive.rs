//! Line-oriented interactive session.
//!
//! Reads one command per line and drives a `Controller`. Runs are dispatched
//! to the executor thread; finished runs are reported before the next prompt,
//! or immediately by `wait`. At end of input any run in flight is waited for
//! so its output is not lost.

use std::io::{BufRead, Write};
use tracing::debug;

use crate::engine::session::{RunId, RunOutcome};
use crate::engine::steps::steps_summary;
use crate::error::{Result, SessionError};
use crate::executor::Controller;

const HELP: &str = "\
Commands:
  list              show the steps for the current state
  name <migration>  set the migration name used by step 1
  run <n>           run step n (1-5)
  exec <command>    run arbitrary command text in the working directory
  wait              wait for the running command to finish
  status            show busy flag, migration name and latest migration file
  help              show this help
  quit              leave (waits for a running command first)";

/// What the loop should do after a line.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct Interactive<R, W> {
    controller: Controller,
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Interactive<R, W> {
    pub fn new(controller: Controller, input: R, output: W) -> Self {
        Self {
            controller,
            input,
            output,
        }
    }

    pub fn into_parts(self) -> (Controller, W) {
        (self.controller, self.output)
    }

    /// Run until `quit` or end of input.
    pub fn run(&mut self) -> Result<()> {
        let state = self.controller.session().state();
        writeln!(self.output, "Working Directory: {}", state.working_directory.display())?;
        writeln!(self.output, "Database Name: {}", state.database_name)?;
        self.print_steps()?;
        writeln!(self.output, "Type 'help' for commands.")?;

        let mut line = String::new();
        loop {
            self.report_finished()?;
            write!(self.output, "> ")?;
            self.output.flush()?;

            line.clear();
            if self.input.read_line(&mut line)? == 0 {
                break;
            }
            if self.handle(line.trim())? == Flow::Quit {
                break;
            }
        }

        if self.controller.session().is_busy() {
            self.wait_and_report()?;
        }
        Ok(())
    }

    fn handle(&mut self, line: &str) -> Result<Flow> {
        let (cmd, rest) = match line.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (line, ""),
        };
        debug!("interactive command: {:?} {:?}", cmd, rest);

        match cmd {
            "" => {}
            "list" | "ls" => self.print_steps()?,
            "name" if !rest.is_empty() => {
                self.controller.set_migration_name(rest);
                self.print_steps()?;
            }
            "run" => match rest.parse::<usize>() {
                Ok(n) if n >= 1 => {
                    let dispatched = self.controller.dispatch_step(n - 1);
                    self.report_dispatch(dispatched)?;
                }
                _ => writeln!(self.output, "usage: run <n>")?,
            },
            "exec" if !rest.is_empty() => {
                let dispatched = self.controller.dispatch_command(rest);
                self.report_dispatch(dispatched)?;
            }
            "wait" => {
                if self.controller.session().is_busy() {
                    self.wait_and_report()?;
                } else {
                    writeln!(self.output, "Nothing is running.")?;
                }
            }
            "status" => self.print_status()?,
            "help" | "?" => writeln!(self.output, "{}", HELP)?,
            "quit" | "exit" | "q" => return Ok(Flow::Quit),
            _ => writeln!(self.output, "Unknown command '{}'. Type 'help'.", line)?,
        }
        Ok(Flow::Continue)
    }

    fn report_dispatch(&mut self, dispatched: std::result::Result<RunId, SessionError>) -> Result<()> {
        match dispatched {
            Ok(id) => {
                let command = self
                    .controller
                    .session()
                    .in_flight()
                    .map(|run| run.command.clone())
                    .unwrap_or_default();
                writeln!(self.output, "[{}] running: {}", id, command)?;
            }
            Err(e) => writeln!(self.output, "Cannot run: {}", e)?,
        }
        Ok(())
    }

    fn report_finished(&mut self) -> Result<()> {
        if let Some(outcome) = self.controller.poll()? {
            self.print_outcome(&outcome)?;
        }
        Ok(())
    }

    fn wait_and_report(&mut self) -> Result<()> {
        let outcome = self.controller.wait()?;
        self.print_outcome(&outcome)
    }

    fn print_outcome(&mut self, outcome: &RunOutcome) -> Result<()> {
        let verdict = if outcome.result.succeeded { "done" } else { "failed" };
        writeln!(self.output, "[{}] {}", outcome.id, verdict)?;
        writeln!(self.output, "Command Output:")?;
        writeln!(self.output, "{}", outcome.result.output.trim_end())?;
        if let Some(file) = &outcome.new_artifact {
            writeln!(self.output, "New migration file: {}", file)?;
            self.print_steps()?;
        }
        Ok(())
    }

    fn print_steps(&mut self) -> Result<()> {
        let steps = self.controller.session().steps();
        writeln!(self.output, "{}", steps_summary(&steps))?;
        Ok(())
    }

    fn print_status(&mut self) -> Result<()> {
        let snap = self.controller.snapshot();
        writeln!(self.output, "busy: {}", snap.busy)?;
        writeln!(self.output, "migration name: {}", snap.migration_name)?;
        writeln!(
            self.output,
            "latest migration file: {}",
            snap.latest_artifact.as_deref().unwrap_or("none")
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::session::Session;
    use crate::engine::state::WorkflowState;
    use crate::runner::{CommandRunner, ExecutionResult};
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::Arc;

    struct FakeWrangler;

    impl CommandRunner for FakeWrangler {
        fn run(&self, command: &str, _working_directory: &Path) -> ExecutionResult {
            if command.contains("migrations create") {
                ExecutionResult::success("Successfully created Migration '0001_add_index.sql'")
            } else {
                ExecutionResult::success(format!("ran: {}", command))
            }
        }
    }

    fn drive(script: &str) -> (Controller, String) {
        let state = WorkflowState::new("/srv/app", "app-db", "create_user_table");
        let controller = Controller::new(Session::new(state), Arc::new(FakeWrangler));
        let mut repl = Interactive::new(controller, Cursor::new(script.to_string()), Vec::new());
        repl.run().expect("in-memory io");
        let (controller, out) = repl.into_parts();
        (controller, String::from_utf8(out).expect("utf8 output"))
    }

    #[test]
    fn test_name_run_wait_propagates_artifact() {
        let (controller, out) = drive("name add_index\nrun 1\nwait\nrun 2\nwait\nquit\n");
        assert!(out.contains("npx wrangler d1 migrations create app-db add_index"));
        assert!(out.contains("New migration file: 0001_add_index.sql"));
        assert!(out.contains("ran: npx prisma migrate diff --from-empty"));
        assert_eq!(
            controller.session().state().latest_artifact(),
            Some("0001_add_index.sql")
        );
    }

    #[test]
    fn test_not_ready_step_is_refused() {
        let (_, out) = drive("run 3\n");
        assert!(out.contains("Cannot run: step 3 is not ready"));
    }

    #[test]
    fn test_eof_waits_for_running_command() {
        let (controller, out) = drive("exec npx prisma generate\n");
        assert!(out.contains("ran: npx prisma generate"));
        assert!(!controller.session().is_busy());
    }

    #[test]
    fn test_usage_and_unknown() {
        let (_, out) = drive("run x\nfrobnicate\nstatus\n");
        assert!(out.contains("usage: run <n>"));
        assert!(out.contains("Unknown command 'frobnicate'"));
        assert!(out.contains("latest migration file: none"));
    }
}
