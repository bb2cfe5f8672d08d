use std::collections::HashMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::Local;
use serde::Serialize;
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::faces::store::AUDIT_LOG_FILE;

pub const FIELD_DELIMITER: &str = " | ";
pub const MAX_FIELD_LEN: usize = 200;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AuditKind {
    #[serde(rename = "AUTH")]
    Auth,
    #[serde(rename = "ENROLL")]
    Enroll,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::Auth => "AUTH",
            AuditKind::Enroll => "ENROLL",
        }
    }
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "AUTH" => Ok(AuditKind::Auth),
            "ENROLL" => Ok(AuditKind::Enroll),
            other => Err(format!("unknown audit event kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub kind: AuditKind,
    pub subject: String,
    /// `success`/`fail` for AUTH, the enrollment channel for ENROLL.
    pub outcome: String,
    pub detail: String,
}

impl AuditEntry {
    pub fn new(
        kind: AuditKind,
        subject: impl Into<String>,
        outcome: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            kind,
            subject: subject.into(),
            outcome: outcome.into(),
            detail: detail.into(),
        }
    }

    pub fn auth(label: &str, accepted: bool, distance: f64) -> Self {
        let outcome = if accepted { "success" } else { "fail" };
        let detail = if distance.is_finite() {
            format!("{distance:.4}")
        } else {
            "inf".to_string()
        };
        Self::new(AuditKind::Auth, label, outcome, detail)
    }

    pub fn enroll(identity: &str, channel: &str, samples: usize) -> Self {
        Self::new(
            AuditKind::Enroll,
            identity,
            channel,
            format!("samples={samples}"),
        )
    }

    /// Parses the `samples=N` detail written by [`AuditEntry::enroll`].
    pub fn samples(&self) -> Option<usize> {
        self.detail.strip_prefix("samples=")?.parse().ok()
    }

    fn to_line(&self) -> String {
        let fields = [
            sanitize(&self.timestamp, MAX_FIELD_LEN),
            self.kind.to_string(),
            sanitize(&self.subject, MAX_FIELD_LEN),
            sanitize(&self.outcome, MAX_FIELD_LEN),
            sanitize(&self.detail, MAX_FIELD_LEN),
        ];
        fields.join(FIELD_DELIMITER)
    }

    fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.splitn(5, FIELD_DELIMITER);
        let timestamp = fields.next()?.to_string();
        let kind = fields.next()?.parse().ok()?;
        let subject = fields.next()?.to_string();
        let outcome = fields.next()?.to_string();
        let detail = fields.next()?.to_string();
        Some(Self {
            timestamp,
            kind,
            subject,
            outcome,
            detail,
        })
    }
}

/// Truncates to `max_len` characters and flattens anything that would break
/// the one-entry-per-line layout.
pub fn sanitize(value: &str, max_len: usize) -> String {
    value
        .chars()
        .take(max_len)
        .map(|ch| match ch {
            '\n' | '\r' => ' ',
            '|' => '/',
            other => other,
        })
        .collect()
}

/// Append-only audit log file.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(AUDIT_LOG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &AuditEntry) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| AppError::StorageWrite {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let mut line = entry.to_line();
        line.push('\n');
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .map_err(|source| AppError::StorageWrite {
                path: self.path.clone(),
                source,
            })?;
        debug!(kind = %entry.kind, subject = %entry.subject, "audit entry appended");
        Ok(())
    }

    /// Reads every well-formed entry; a missing log reads as empty.
    pub fn entries(&self) -> AppResult<Vec<AuditEntry>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(AppError::StorageRead {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        Ok(contents.lines().filter_map(AuditEntry::parse_line).collect())
    }
}

/// Per-label rate limit for AUTH entries.
#[derive(Debug, Clone)]
pub struct AuthThrottle {
    interval: Duration,
    last_write: HashMap<String, Instant>,
}

impl AuthThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_write: HashMap::new(),
        }
    }

    pub fn is_due(&self, label: &str, now: Instant) -> bool {
        match self.last_write.get(label) {
            Some(last) => now.saturating_duration_since(*last) >= self.interval,
            None => true,
        }
    }

    pub fn mark(&mut self, label: &str, now: Instant) {
        self.last_write.insert(label.to_string(), now);
    }
}
