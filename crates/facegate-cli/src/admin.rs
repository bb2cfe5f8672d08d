use std::path::PathBuf;

use serde::Serialize;

use crate::cli::{AdminCheckArgs, AdminCommands, AdminSetupArgs};
use crate::config::{load_context, CliContext};
use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminAction {
    Setup,
    Check,
}

#[derive(Debug, Serialize)]
pub struct AdminOutcome {
    pub action: AdminAction,
    pub data_dir: PathBuf,
    /// True when the secret replaced an existing one.
    pub replaced: bool,
    #[serde(skip)]
    pub logs: Vec<String>,
}

pub fn run_admin(command: &AdminCommands) -> AppResult<AdminOutcome> {
    match command {
        AdminCommands::Setup(args) => run_admin_setup_with(args, load_context(&args.store)?),
        AdminCommands::Check(args) => run_admin_check_with(args, load_context(&args.store)?),
    }
}

pub fn run_admin_setup_with(args: &AdminSetupArgs, context: CliContext) -> AppResult<AdminOutcome> {
    let mut gate = context.open_gate()?;
    let mut logs = context.logs;

    let replaced = !gate.needs_setup();
    if replaced {
        let current = args.current_secret.as_deref().ok_or_else(|| {
            AppError::validation("an admin secret already exists; pass --current-secret to replace it")
        })?;
        gate.admin_login(current)?;
        logs.push("Verified current admin secret".to_string());
    }
    gate.setup_admin(&args.secret)?;
    logs.push("Stored new admin secret".to_string());

    Ok(AdminOutcome {
        action: AdminAction::Setup,
        data_dir: context.data_dir,
        replaced,
        logs,
    })
}

pub fn run_admin_check_with(args: &AdminCheckArgs, context: CliContext) -> AppResult<AdminOutcome> {
    let mut gate = context.open_gate()?;
    let mut logs = context.logs;
    if gate.needs_setup() {
        logs.push("No admin secret stored yet; only the bootstrap default is accepted".to_string());
    }
    gate.admin_login(&args.secret)?;

    Ok(AdminOutcome {
        action: AdminAction::Check,
        data_dir: context.data_dir,
        replaced: false,
        logs,
    })
}
