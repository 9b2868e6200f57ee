//! Risk detectors.
//!
//! Each detector reads the finished [`CellStore`] and [`DependencyGraph`] and
//! returns raw, uncompressed alerts. Detectors never see each other's output;
//! one failing does not stop the rest.

pub mod circular;
pub mod cross_sheet;
pub mod external;
pub mod formula_error;
pub mod hardcode;
pub mod inconsistent_formula;
pub mod merged;
pub mod timeline_gap;
pub mod value_conflict;

use std::panic::{AssertUnwindSafe, catch_unwind};
use thiserror::Error;
use tracing::{debug, warn};

use gridlens_engine::engine::{CellStore, DependencyGraph, Diagnostic, DiagnosticKind};

use crate::config::AnalysisConfig;
use crate::risk::RiskAlert;

pub use circular::CircularReferenceDetector;
pub use cross_sheet::CrossSheetDetector;
pub use external::PhantomLinkDetector;
pub use formula_error::FormulaErrorDetector;
pub use hardcode::HardcodeDetector;
pub use inconsistent_formula::InconsistentFormulaDetector;
pub use merged::MergedCellDetector;
pub use timeline_gap::TimelineGapDetector;
pub use value_conflict::ValueConflictDetector;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("sheet not found: {0}")]
    MissingSheet(String),

    #[error("{0}")]
    Internal(String),
}

/// Everything a detector may read.
pub struct DetectionContext<'a> {
    pub store: &'a CellStore,
    pub graph: &'a DependencyGraph,
    pub config: &'a AnalysisConfig,
}

pub trait Detector {
    /// Stable name, as used in `disabled_detectors`.
    fn id(&self) -> &'static str;
    fn detect(&self, ctx: &DetectionContext) -> Result<Vec<RiskAlert>, DetectorError>;
}

pub struct DetectorRegistry {
    detectors: Vec<Box<dyn Detector>>,
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        DetectorRegistry {
            detectors: vec![
                Box::new(HardcodeDetector),
                Box::new(CircularReferenceDetector),
                Box::new(InconsistentFormulaDetector),
                Box::new(MergedCellDetector),
                Box::new(PhantomLinkDetector),
                Box::new(CrossSheetDetector),
                Box::new(FormulaErrorDetector),
                Box::new(ValueConflictDetector),
                Box::new(TimelineGapDetector),
            ],
        }
    }
}

impl DetectorRegistry {
    pub fn empty() -> Self {
        DetectorRegistry { detectors: Vec::new() }
    }

    /// Built-in detectors minus the ones the configuration disables.
    pub fn from_config(config: &AnalysisConfig) -> Self {
        let mut registry = Self::default();
        registry.detectors.retain(|d| config.detector_enabled(d.id()));
        registry
    }

    pub fn register(&mut self, detector: Box<dyn Detector>) {
        self.detectors.push(detector);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.id()).collect()
    }

    /// Run every detector. Failures (errors or panics) become
    /// `DetectorFailed` diagnostics and the remaining detectors still run.
    pub fn run(&self, ctx: &DetectionContext) -> (Vec<RiskAlert>, Vec<Diagnostic>) {
        let mut alerts = Vec::new();
        let mut diagnostics = Vec::new();
        for detector in &self.detectors {
            let outcome = catch_unwind(AssertUnwindSafe(|| detector.detect(ctx)));
            let failure = match outcome {
                Ok(Ok(found)) => {
                    debug!(detector = detector.id(), alerts = found.len(), "detector finished");
                    alerts.extend(found);
                    continue;
                }
                Ok(Err(err)) => err.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };
            warn!(detector = detector.id(), error = %failure, "detector failed");
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::DetectorFailed,
                format!("{}: {}", detector.id(), failure),
            ));
        }
        (alerts, diagnostics)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
