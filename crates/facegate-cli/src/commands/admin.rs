use std::any::Any;
use std::process::ExitCode;

use crate::admin::{self, AdminOutcome};
use crate::cli::{AdminCommands, OutputMode};
use crate::commands::CommandHandler;
use crate::errors::AppResult;
use crate::output::render_admin;

pub struct AdminHandler {
    command: AdminCommands,
    run: Box<dyn Fn(&AdminCommands) -> AppResult<AdminOutcome> + Send + Sync>,
    render: Box<dyn Fn(&AdminOutcome, OutputMode, bool) -> AppResult<()> + Send + Sync>,
}

impl AdminHandler {
    pub fn new(command: AdminCommands) -> Self {
        Self::with_dependencies(command, admin::run_admin, render_admin)
    }

    pub fn with_dependencies(
        command: AdminCommands,
        run: impl Fn(&AdminCommands) -> AppResult<AdminOutcome> + Send + Sync + 'static,
        render: impl Fn(&AdminOutcome, OutputMode, bool) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            command,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for AdminHandler {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode> {
        let outcome = (self.run)(&self.command)?;
        (self.render)(&outcome, mode, verbose)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
