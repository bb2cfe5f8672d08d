use std::any::Any;
use std::process::ExitCode;

use crate::cli::{IdentifyArgs, OutputMode};
use crate::commands::{CommandHandler, REJECTED_EXIT_CODE};
use crate::errors::AppResult;
use crate::identify::{self, IdentifyOutcome};
use crate::output::render_identify;

pub struct IdentifyHandler {
    args: IdentifyArgs,
    run: Box<dyn Fn(&IdentifyArgs) -> AppResult<IdentifyOutcome> + Send + Sync>,
    render: Box<dyn Fn(&IdentifyOutcome, OutputMode, bool) -> AppResult<()> + Send + Sync>,
}

impl IdentifyHandler {
    pub fn new(args: IdentifyArgs) -> Self {
        Self::with_dependencies(args, identify::run_identify, render_identify)
    }

    pub fn with_dependencies(
        args: IdentifyArgs,
        run: impl Fn(&IdentifyArgs) -> AppResult<IdentifyOutcome> + Send + Sync + 'static,
        render: impl Fn(&IdentifyOutcome, OutputMode, bool) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for IdentifyHandler {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode> {
        let outcome = (self.run)(&self.args)?;
        (self.render)(&outcome, mode, verbose)?;
        if outcome.decision.accepted {
            Ok(ExitCode::SUCCESS)
        } else {
            Ok(ExitCode::from(REJECTED_EXIT_CODE))
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
