use serde::Serialize;
use std::fmt;

/// Kinds of degraded conditions. None of these abort an analysis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    MalformedMerge,
    OverlappingMerge,
    MalformedCell,
    DuplicateSheet,
    TruncatedSheet,
    SheetUnreadable,
    OversizedRange,
    DetectorFailed,
    RecoveryFailed,
    RecoveryTimeout,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::MalformedMerge => "malformed_merge",
            DiagnosticKind::OverlappingMerge => "overlapping_merge",
            DiagnosticKind::MalformedCell => "malformed_cell",
            DiagnosticKind::DuplicateSheet => "duplicate_sheet",
            DiagnosticKind::TruncatedSheet => "truncated_sheet",
            DiagnosticKind::SheetUnreadable => "sheet_unreadable",
            DiagnosticKind::OversizedRange => "oversized_range",
            DiagnosticKind::DetectorFailed => "detector_failed",
            DiagnosticKind::RecoveryFailed => "recovery_failed",
            DiagnosticKind::RecoveryTimeout => "recovery_timeout",
        }
    }
}

/// A specific, visible record of something that was skipped or degraded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub sheet: Option<String>,
    pub location: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            sheet: None,
            location: None,
            message: message.into(),
        }
    }

    pub fn on_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind.as_str())?;
        match (&self.sheet, &self.location) {
            (Some(sheet), Some(loc)) => write!(f, " {}!{}", sheet, loc)?,
            (Some(sheet), None) => write!(f, " {}", sheet)?,
            (None, Some(loc)) => write!(f, " {}", loc)?,
            (None, None) => {}
        }
        write!(f, ": {}", self.message)
    }
}
