use std::any::Any;
use std::process::ExitCode;

use crate::cli::{EnrollCommands, OutputMode};
use crate::commands::CommandHandler;
use crate::enrollment::{self, EnrollOutcome};
use crate::errors::AppResult;
use crate::output::render_enroll;

pub struct EnrollHandler {
    command: EnrollCommands,
    run: Box<dyn Fn(&EnrollCommands) -> AppResult<EnrollOutcome> + Send + Sync>,
    render: Box<dyn Fn(&EnrollOutcome, OutputMode, bool) -> AppResult<()> + Send + Sync>,
}

impl EnrollHandler {
    pub fn new(command: EnrollCommands) -> Self {
        Self::with_dependencies(command, enrollment::run_enroll, render_enroll)
    }

    pub fn with_dependencies(
        command: EnrollCommands,
        run: impl Fn(&EnrollCommands) -> AppResult<EnrollOutcome> + Send + Sync + 'static,
        render: impl Fn(&EnrollOutcome, OutputMode, bool) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            command,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for EnrollHandler {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode> {
        let outcome = (self.run)(&self.command)?;
        (self.render)(&outcome, mode, verbose)?;
        if outcome.is_complete() {
            Ok(ExitCode::SUCCESS)
        } else {
            Ok(ExitCode::FAILURE)
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
