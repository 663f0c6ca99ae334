// ── Report event catalog ──
//
// Immutable tagged-variant catalog of everything the engine reports through
// its fire-and-forget observability channel, with a static severity +
// message-template table. No mutable global state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Kinds of report events emitted by the reconciliation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, Serialize)]
pub enum ReportKind {
    /// A single device failed during read/parse/classification and was
    /// skipped for the pass.
    #[strum(serialize = "device-creation-failure")]
    CreationFailed,
    #[strum(serialize = "device-add")]
    Added,
    #[strum(serialize = "device-update")]
    Updated,
    #[strum(serialize = "device-remove")]
    Removed,
    /// A whole pass aborted; the loop resumes on the next trigger.
    #[strum(serialize = "refresh-failure")]
    RefreshFailed,
}

/// Report severity, used to pick the tracing level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, Serialize)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl ReportKind {
    pub const fn severity(self) -> Severity {
        match self {
            Self::Added | Self::Updated | Self::Removed => Severity::Info,
            Self::CreationFailed => Severity::Warn,
            Self::RefreshFailed => Severity::Error,
        }
    }

    /// Static message template; `{path}` and `{detail}` are substituted
    /// by [`Report::message`].
    pub const fn template(self) -> &'static str {
        match self {
            Self::CreationFailed => "controller at {path} could not be created: {detail}",
            Self::Added => "controller added at {path}",
            Self::Updated => "controller updated at {path}",
            Self::Removed => "controller removed at {path}",
            Self::RefreshFailed => "device refresh pass failed: {detail}",
        }
    }
}

/// One observability event.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub kind: ReportKind,
    /// Device path, for per-device kinds.
    pub path: Option<String>,
    /// Error text, for failure kinds.
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl Report {
    pub(crate) fn device(kind: ReportKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: Some(path.into()),
            detail: None,
            at: Utc::now(),
        }
    }

    pub(crate) fn failure(kind: ReportKind, path: Option<String>, detail: impl fmt::Display) -> Self {
        Self {
            kind,
            path,
            detail: Some(detail.to_string()),
            at: Utc::now(),
        }
    }

    /// Render the catalog template with this report's fields.
    pub fn message(&self) -> String {
        self.kind
            .template()
            .replace("{path}", self.path.as_deref().unwrap_or("<none>"))
            .replace("{detail}", self.detail.as_deref().unwrap_or("<none>"))
    }
}
