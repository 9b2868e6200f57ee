//! Risk alert data model shared by detectors, compression, labelling,
//! impact analysis, triage and export.

use serde::Serialize;
use std::fmt;

use gridlens_engine::engine::{CellAddr, CellRef, UnresolvedReason};

use crate::impact::ImpactProfile;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskType {
    HiddenHardcode,
    CircularReference,
    InconsistentFormula,
    InconsistentValue,
    ValueConflict,
    MergedCellRisk,
    PhantomLink,
    CrossSheetSpaghetti,
    FormulaError,
    TimelineGap,
}

impl RiskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskType::HiddenHardcode => "Hidden Hardcode",
            RiskType::CircularReference => "Circular Reference",
            RiskType::InconsistentFormula => "Inconsistent Formula",
            RiskType::InconsistentValue => "Inconsistent Value",
            RiskType::ValueConflict => "Value Conflict",
            RiskType::MergedCellRisk => "Merged Cell Risk",
            RiskType::PhantomLink => "Phantom Link",
            RiskType::CrossSheetSpaghetti => "Cross-Sheet Spaghetti",
            RiskType::FormulaError => "Formula Error",
            RiskType::TimelineGap => "Timeline Gap",
        }
    }
}

impl fmt::Display for RiskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business-impact tier. Ordered most urgent first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Tier {
    Fatal,
    Integrity,
    Structural,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Fatal => "Fatal",
            Tier::Integrity => "Integrity",
            Tier::Structural => "Structural",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an alert sits on its sheet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Location {
    Cell(CellRef),
    Range {
        first: CellRef,
        last: CellRef,
        count: usize,
    },
}

impl Location {
    pub fn first(&self) -> CellRef {
        match self {
            Location::Cell(c) => *c,
            Location::Range { first, .. } => *first,
        }
    }

    pub fn last(&self) -> CellRef {
        match self {
            Location::Cell(c) => *c,
            Location::Range { last, .. } => *last,
        }
    }

    pub fn count(&self) -> usize {
        match self {
            Location::Cell(_) => 1,
            Location::Range { count, .. } => *count,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Cell(c) => write!(f, "{}", c),
            Location::Range { first, last, .. } if first == last => write!(f, "{}", first),
            Location::Range { first, last, .. } => write!(f, "{}...{}", first, last),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    /// Found by scanning the sheet.
    Rule,
    /// Supplied by the recovery collaborator.
    Recovered,
    /// Neither worked; a coordinate-based stand-in.
    Placeholder,
}

/// Human label attached to a user-facing alert.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContextLabel {
    pub row: Option<String>,
    pub col: Option<String>,
    /// What to show: `row`, or `row @ col` when the column adds information.
    pub display: String,
    pub source: LabelSource,
}

/// Type-specific facts about an alert. Never part of the export schema.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskDetails {
    Hardcode {
        literal: String,
        value: f64,
        formula: String,
        /// Literal is a structurally meaningless constant.
        allowed: bool,
    },
    Cycle {
        path: Vec<CellAddr>,
    },
    CycleOverflow {
        reported: usize,
    },
    InconsistentFormula {
        expected_shape: String,
        actual_shape: String,
        run_length: usize,
        deviations: usize,
    },
    InconsistentValue {
        label: String,
        values: Vec<String>,
    },
    ValueConflict {
        label: String,
        majority: String,
        value: String,
    },
    MergedCell {
        merge: String,
        reference: String,
    },
    PhantomLink {
        reference: String,
        reason: UnresolvedReason,
    },
    CrossSheet {
        sheets: Vec<String>,
    },
    FormulaError {
        code: String,
    },
    TimelineGap {
        expected: String,
        found: String,
        missing: usize,
    },
}

impl RiskDetails {
    /// Alerts only compress together when this key matches, so two
    /// different literals or two different cycles never share a range.
    pub fn group_key(&self) -> String {
        match self {
            RiskDetails::Hardcode { value, .. } => gridlens_engine::engine::format_number(*value),
            RiskDetails::Cycle { path } => path
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(">"),
            RiskDetails::InconsistentValue { label, .. } => label.to_lowercase(),
            RiskDetails::ValueConflict { label, .. } => label.to_lowercase(),
            RiskDetails::FormulaError { code } => code.clone(),
            _ => String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RiskAlert {
    pub risk_type: RiskType,
    pub severity: Severity,
    pub sheet: String,
    pub location: Location,
    /// Every cell the alert covers, row-major.
    pub members: Vec<CellRef>,
    pub tier: Option<Tier>,
    pub context: Option<ContextLabel>,
    pub description: String,
    pub details: RiskDetails,
    pub impact: Option<ImpactProfile>,
    /// Quantitative severity score assigned by triage.
    pub score: f64,
}

impl RiskAlert {
    pub fn new(
        risk_type: RiskType,
        severity: Severity,
        sheet: impl Into<String>,
        cell: CellRef,
        description: impl Into<String>,
        details: RiskDetails,
    ) -> Self {
        RiskAlert {
            risk_type,
            severity,
            sheet: sheet.into(),
            location: Location::Cell(cell),
            members: vec![cell],
            tier: None,
            context: None,
            description: description.into(),
            details,
            impact: None,
            score: 0.0,
        }
    }

    pub fn anchor(&self) -> CellAddr {
        CellAddr::new(self.sheet.clone(), self.location.first())
    }

    pub fn instance_count(&self) -> usize {
        self.location.count()
    }

    pub fn context_display(&self) -> &str {
        self.context.as_ref().map(|c| c.display.as_str()).unwrap_or("")
    }

    pub fn is_allowed_hardcode(&self) -> bool {
        matches!(self.details, RiskDetails::Hardcode { allowed: true, .. })
    }

    pub fn hardcode_value(&self) -> Option<f64> {
        match self.details {
            RiskDetails::Hardcode { value, .. } => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_location_display() {
        let loc = Location::Range {
            first: CellRef::from_str("F4").unwrap(),
            last: CellRef::from_str("F6").unwrap(),
            count: 3,
        };
        assert_eq!(loc.to_string(), "F4...F6");
        assert_eq!(loc.count(), 3);
    }

    #[test]
    fn test_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Medium > Severity::Low);
        assert!(Tier::Fatal < Tier::Structural);
    }

    #[test]
    fn test_hardcode_group_key_is_canonical() {
        let a = RiskDetails::Hardcode {
            literal: "1000.0".into(),
            value: 1000.0,
            formula: "A1*1000.0".into(),
            allowed: true,
        };
        let b = RiskDetails::Hardcode {
            literal: "1E3".into(),
            value: 1000.0,
            formula: "A1*1E3".into(),
            allowed: true,
        };
        assert_eq!(a.group_key(), b.group_key());
    }
}
