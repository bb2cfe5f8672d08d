use std::any::Any;
use std::process::ExitCode;

use crate::cli::{AuthArgs, OutputMode};
use crate::commands::{CommandHandler, REJECTED_EXIT_CODE};
use crate::errors::AppResult;
use crate::identify::{self, LiveAuthReport};
use crate::output::render_live_auth;

pub struct AuthHandler {
    args: AuthArgs,
    run: Box<dyn Fn(&AuthArgs) -> AppResult<LiveAuthReport> + Send + Sync>,
    render: Box<dyn Fn(&LiveAuthReport, OutputMode, bool) -> AppResult<()> + Send + Sync>,
}

impl AuthHandler {
    pub fn new(args: AuthArgs) -> Self {
        Self::with_dependencies(args, identify::run_live_auth, render_live_auth)
    }

    pub fn with_dependencies(
        args: AuthArgs,
        run: impl Fn(&AuthArgs) -> AppResult<LiveAuthReport> + Send + Sync + 'static,
        render: impl Fn(&LiveAuthReport, OutputMode, bool) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for AuthHandler {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode> {
        let report = (self.run)(&self.args)?;
        (self.render)(&report, mode, verbose)?;
        if report.outcome.is_accepted() {
            Ok(ExitCode::SUCCESS)
        } else {
            Ok(ExitCode::from(REJECTED_EXIT_CODE))
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
