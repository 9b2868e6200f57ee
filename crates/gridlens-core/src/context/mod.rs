//! Context labels for user-facing alerts.
//!
//! Rule-based lookup first (text to the left, header above). When that finds
//! nothing usable the recovery collaborator is asked, once per distinct
//! masked neighborhood; its answers are cached on the labeler instance.

pub mod recovery;
pub mod rules;

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

use gridlens_engine::engine::{CellRef, CellStore, Diagnostic, DiagnosticKind};

use crate::config::RecoveryConfig;
use crate::risk::{ContextLabel, LabelSource, RiskAlert};

pub use recovery::{
    CommandRecovery, ContextRecovery, NoRecovery, RecoveryError, RecoveryRequest,
    RecoveryResponse, provider_from_config,
};

pub struct ContextLabeler {
    recovery: Arc<dyn ContextRecovery>,
    header_rows: usize,
    window_rows: usize,
    window_cols: usize,
    retries: u32,
    /// Masked neighborhood -> recovered label (None for "no answer").
    cache: DashMap<String, Option<String>>,
    calls: AtomicUsize,
}

impl ContextLabeler {
    pub fn new(recovery: Arc<dyn ContextRecovery>, header_rows: usize, config: &RecoveryConfig) -> Self {
        ContextLabeler {
            recovery,
            header_rows,
            window_rows: config.window_rows,
            window_cols: config.window_cols,
            retries: config.retries,
            cache: DashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of times the recovery collaborator was actually invoked.
    pub fn recovery_calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Label one cell. A diagnostic is returned when recovery failed and the
    /// placeholder was used because of it.
    pub fn label(&self, store: &CellStore, sheet_name: &str, cell: CellRef) -> (ContextLabel, Option<Diagnostic>) {
        let Some(sheet) = store.sheet(sheet_name) else {
            return (placeholder(cell, None), None);
        };
        let row = rules::row_label(sheet, cell);
        let col = rules::col_label(sheet, cell, self.header_rows);

        if let Some(row) = row.as_deref().filter(|r| !rules::is_poor_quality(r)) {
            return (
                ContextLabel {
                    row: Some(row.to_string()),
                    display: rules::format_display(row, col.as_deref()),
                    col,
                    source: LabelSource::Rule,
                },
                None,
            );
        }

        let request = RecoveryRequest::build(sheet, cell, self.window_rows, self.window_cols);
        let key = request.shape_key();
        if let Some(cached) = self.cache.get(&key) {
            debug!(sheet = %sheet_name, cell = %cell, "recovered label served from cache");
            return (self.finish(cell, cached.value().clone(), col), None);
        }

        let (answer, diagnostic) = match self.ask(&request) {
            Ok(answer) => (answer, None),
            Err(err) => {
                warn!(sheet = %sheet_name, cell = %cell, error = %err, "context recovery failed");
                let kind = match err {
                    RecoveryError::Timeout(_) => DiagnosticKind::RecoveryTimeout,
                    _ => DiagnosticKind::RecoveryFailed,
                };
                let diag = Diagnostic::new(kind, format!("{}; placeholder label used", err))
                    .on_sheet(sheet_name)
                    .at(cell.to_string());
                // Failures are not cached so a later cell may still succeed.
                return (placeholder(cell, col), Some(diag));
            }
        };
        self.cache.insert(key, answer.clone());
        (self.finish(cell, answer, col), diagnostic)
    }

    fn ask(&self, request: &RecoveryRequest) -> Result<Option<String>, RecoveryError> {
        let mut attempt = 0;
        loop {
            self.calls.fetch_add(1, Ordering::Relaxed);
            match self.recovery.recover(request) {
                Ok(RecoveryResponse::Label(label)) => {
                    debug!(provider = self.recovery.name(), target = %request.target, label = %label, "label recovered");
                    return Ok(Some(rules::normalize_label(&label)));
                }
                Ok(RecoveryResponse::NoAnswer) => return Ok(None),
                Err(err) if attempt < self.retries => {
                    debug!(provider = self.recovery.name(), error = %err, attempt, "retrying context recovery");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn finish(&self, cell: CellRef, recovered: Option<String>, col: Option<String>) -> ContextLabel {
        match recovered.filter(|l| !l.is_empty()) {
            Some(row) => ContextLabel {
                display: rules::format_display(&row, col.as_deref()),
                row: Some(row),
                col,
                source: LabelSource::Recovered,
            },
            None => placeholder(cell, col),
        }
    }

    /// Attach labels to compressed alerts, using each alert's first member.
    pub fn label_alerts(&self, store: &CellStore, alerts: Vec<RiskAlert>) -> (Vec<RiskAlert>, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();
        let labelled: Vec<RiskAlert> = alerts
            .into_iter()
            .map(|alert| {
                let (label, diag) = self.label(store, &alert.sheet, alert.location.first());
                diagnostics.extend(diag);
                RiskAlert {
                    context: Some(label),
                    ..alert
                }
            })
            .collect();
        info!(
            alerts = labelled.len(),
            recovery_calls = self.recovery_calls(),
            cached = self.cache.len(),
            "context labels attached"
        );
        (labelled, diagnostics)
    }
}

/// Deterministic stand-in when no label can be found or recovered.
pub fn placeholder(cell: CellRef, col: Option<String>) -> ContextLabel {
    ContextLabel {
        row: None,
        col,
        display: format!("[Unlabeled {}]", cell),
        source: LabelSource::Placeholder,
    }
}
