use std::io::{self, Write};

use serde::Serialize;
use serde_json::json;

use crate::admin::{AdminAction, AdminOutcome};
use crate::cli::OutputMode;
use crate::enrollment::EnrollOutcome;
use crate::errors::{AppError, AppResult};
use crate::identify::{IdentifyOutcome, LiveAuthReport};
use crate::records::{AuditLogOutcome, IdentitiesOutcome};

fn write_json<T: Serialize + ?Sized>(payload: &T) -> AppResult<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let payload = serde_json::to_string(payload)?;
    handle.write_all(payload.as_bytes())?;
    handle.write_all(b"\n")?;
    Ok(())
}

fn emit_logs(logs: &[String], verbose: bool) {
    if verbose {
        for line in logs {
            tracing::info!("{line}");
        }
    }
}

fn format_distance(distance: f64) -> String {
    if distance.is_finite() {
        format!("{distance:.4}")
    } else {
        "inf".to_string()
    }
}

pub fn render_admin(outcome: &AdminOutcome, mode: OutputMode, verbose: bool) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            emit_logs(&outcome.logs, verbose);
            match outcome.action {
                AdminAction::Setup if outcome.replaced => println!("Admin secret replaced"),
                AdminAction::Setup => println!("Admin secret stored"),
                AdminAction::Check => println!("Admin secret verified"),
            }
        }
        OutputMode::Json => write_json(outcome)?,
    }
    Ok(())
}

pub fn render_enroll(outcome: &EnrollOutcome, mode: OutputMode, verbose: bool) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            emit_logs(&outcome.logs, verbose);
            let report = &outcome.report;
            if outcome.is_complete() {
                println!(
                    "Enrollment successful: {} template(s) added for {} ({} skipped)",
                    report.added, report.identity, report.skipped
                );
            } else {
                println!(
                    "Enrollment cancelled: {} of {} template(s) kept for {}",
                    report.added, report.target, report.identity
                );
            }
        }
        OutputMode::Json => write_json(outcome)?,
    }
    Ok(())
}

pub fn render_identify(outcome: &IdentifyOutcome, mode: OutputMode, verbose: bool) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            emit_logs(&outcome.logs, verbose);
            let decision = &outcome.decision;
            println!(
                "{} (distance {}, threshold {:.2})",
                decision.identity,
                format_distance(decision.distance),
                outcome.threshold
            );
        }
        OutputMode::Json => write_json(&json!({
            "identity": outcome.decision.identity,
            "distance": outcome.decision.distance.is_finite().then_some(outcome.decision.distance),
            "accepted": outcome.decision.accepted,
            "logged": outcome.decision.logged,
            "threshold": outcome.threshold,
        }))?,
    }
    Ok(())
}

pub fn render_live_auth(report: &LiveAuthReport, mode: OutputMode, verbose: bool) -> AppResult<()> {
    let outcome = &report.outcome;
    match mode {
        OutputMode::Human => {
            emit_logs(&outcome.logs, verbose);
            match &outcome.decision {
                Some(decision) => println!(
                    "Authenticated {} after {} frame(s) (distance {})",
                    decision.identity,
                    outcome.frames,
                    format_distance(decision.distance)
                ),
                None => println!(
                    "Authentication failed after {} frame(s): {} (best distance {})",
                    outcome.frames,
                    outcome
                        .failure_reason
                        .map(|reason| format!("{reason:?}"))
                        .unwrap_or_default(),
                    format_distance(outcome.best_distance)
                ),
            }
        }
        OutputMode::Json => write_json(&json!({
            "accepted": outcome.is_accepted(),
            "identity": outcome.decision.as_ref().map(|d| d.identity.clone()),
            "frames": outcome.frames,
            "best_distance": outcome.best_distance.is_finite().then_some(outcome.best_distance),
            "failure_reason": outcome.failure_reason,
            "threshold": report.threshold,
        }))?,
    }
    Ok(())
}

pub fn render_identities(outcome: &IdentitiesOutcome, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            if outcome.identities.is_empty() {
                println!("No identities enrolled in {}", outcome.data_dir.display());
            }
            for summary in &outcome.identities {
                println!("{}\t{} template(s)", summary.identity, summary.templates);
            }
        }
        OutputMode::Json => write_json(outcome)?,
    }
    Ok(())
}

pub fn render_audit_log(outcome: &AuditLogOutcome, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            if outcome.entries.is_empty() {
                println!("Audit log {} is empty", outcome.path.display());
            }
            for entry in &outcome.entries {
                println!(
                    "{} | {} | {} | {} | {}",
                    entry.timestamp, entry.kind, entry.subject, entry.outcome, entry.detail
                );
            }
        }
        OutputMode::Json => write_json(&outcome.entries)?,
    }
    Ok(())
}

pub fn render_error(err: &AppError, mode: OutputMode) {
    match mode {
        OutputMode::Human => eprintln!("error: {}", err.human_message()),
        OutputMode::Json => {
            let payload = json!({
                "status": "error",
                "message": err.human_message(),
            });
            println!("{payload}");
        }
    }
}
