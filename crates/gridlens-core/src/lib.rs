//! gridlens-core - Risk detection, context labelling, impact ranking and keyed
//! diff for workbook snapshots.

pub mod analyzer;
pub mod compress;
pub mod config;
pub mod context;
pub mod detectors;
pub mod diff;
pub mod error;
pub mod impact;
pub mod model;
pub mod risk;
pub mod storage;
pub mod triage;

pub use analyzer::Analyzer;
pub use config::{AnalysisConfig, DominanceScope, RecoveryConfig, RecoveryProvider, load_config};
pub use diff::{Change, ChangeCategory, ChangeKind, ChangeSet, DiffConfig, DiffEngine, RowStatus};
pub use error::{GridlensError, Result};
pub use impact::{ImpactProfile, Prescription, Volatility};
pub use model::ModelAnalysis;
pub use risk::{ContextLabel, LabelSource, Location, RiskAlert, RiskDetails, RiskType, Severity, Tier};
pub use storage::load_workbook;

pub use gridlens_engine::engine::{CellAddr, CellRef, Diagnostic, DiagnosticKind};
