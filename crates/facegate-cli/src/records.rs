use std::path::PathBuf;

use facegate_core::audit::AuditEntry;
use facegate_core::faces::IdentitySummary;
use serde::Serialize;

use crate::cli::{LogArgs, StoreArgs};
use crate::config::{load_context, CliContext};
use crate::errors::AppResult;

#[derive(Debug, Serialize)]
pub struct IdentitiesOutcome {
    pub data_dir: PathBuf,
    pub identities: Vec<IdentitySummary>,
}

#[derive(Debug, Serialize)]
pub struct AuditLogOutcome {
    pub path: PathBuf,
    pub entries: Vec<AuditEntry>,
}

pub fn run_identities(args: &StoreArgs) -> AppResult<IdentitiesOutcome> {
    run_identities_with(load_context(args)?)
}

pub fn run_identities_with(context: CliContext) -> AppResult<IdentitiesOutcome> {
    let gate = context.open_gate()?;
    Ok(IdentitiesOutcome {
        identities: gate.identities()?,
        data_dir: context.data_dir,
    })
}

pub fn run_audit_log(args: &LogArgs) -> AppResult<AuditLogOutcome> {
    run_audit_log_with(args, load_context(&args.store)?)
}

pub fn run_audit_log_with(args: &LogArgs, context: CliContext) -> AppResult<AuditLogOutcome> {
    let gate = context.open_gate()?;
    let mut entries = gate.read_audit_log()?;
    if let Some(tail) = args.tail {
        let skip = entries.len().saturating_sub(tail);
        entries.drain(..skip);
    }
    Ok(AuditLogOutcome {
        path: gate.data_dir().join(facegate_core::faces::store::AUDIT_LOG_FILE),
        entries,
    })
}
