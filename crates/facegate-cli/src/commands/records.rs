use std::any::Any;
use std::process::ExitCode;

use crate::cli::{LogArgs, OutputMode, StoreArgs};
use crate::commands::CommandHandler;
use crate::errors::AppResult;
use crate::output::{render_audit_log, render_identities};
use crate::records::{self, AuditLogOutcome, IdentitiesOutcome};

pub struct IdentitiesHandler {
    args: StoreArgs,
    run: Box<dyn Fn(&StoreArgs) -> AppResult<IdentitiesOutcome> + Send + Sync>,
    render: Box<dyn Fn(&IdentitiesOutcome, OutputMode) -> AppResult<()> + Send + Sync>,
}

impl IdentitiesHandler {
    pub fn new(args: StoreArgs) -> Self {
        Self::with_dependencies(args, records::run_identities, render_identities)
    }

    pub fn with_dependencies(
        args: StoreArgs,
        run: impl Fn(&StoreArgs) -> AppResult<IdentitiesOutcome> + Send + Sync + 'static,
        render: impl Fn(&IdentitiesOutcome, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for IdentitiesHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let outcome = (self.run)(&self.args)?;
        (self.render)(&outcome, mode)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct LogHandler {
    args: LogArgs,
    run: Box<dyn Fn(&LogArgs) -> AppResult<AuditLogOutcome> + Send + Sync>,
    render: Box<dyn Fn(&AuditLogOutcome, OutputMode) -> AppResult<()> + Send + Sync>,
}

impl LogHandler {
    pub fn new(args: LogArgs) -> Self {
        Self::with_dependencies(args, records::run_audit_log, render_audit_log)
    }

    pub fn with_dependencies(
        args: LogArgs,
        run: impl Fn(&LogArgs) -> AppResult<AuditLogOutcome> + Send + Sync + 'static,
        render: impl Fn(&AuditLogOutcome, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for LogHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let outcome = (self.run)(&self.args)?;
        (self.render)(&outcome, mode)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
