//! The analysis pipeline.
//!
//! graph -> detectors -> compression -> context labels -> inconsistent-value
//! pass -> impact -> triage. Each stage consumes the previous stage's alerts
//! and returns a new list.

use std::sync::Arc;
use tracing::{info, warn};

use gridlens_engine::engine::{CellStore, Diagnostic, DiagnosticKind, GraphBuilder};

use crate::compress::compress;
use crate::config::AnalysisConfig;
use crate::context::{ContextLabeler, ContextRecovery, NoRecovery, provider_from_config};
use crate::detectors::{DetectionContext, DetectorRegistry};
use crate::impact::ImpactAnalyzer;
use crate::model::ModelAnalysis;
use crate::triage::{health_score, reclassify_inconsistent_values, triage};

pub struct Analyzer {
    config: AnalysisConfig,
    registry: DetectorRegistry,
    recovery: Arc<dyn ContextRecovery>,
    /// Problems found while setting up, repeated on every analysis.
    setup_diagnostics: Vec<Diagnostic>,
}

impl Analyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        let mut setup_diagnostics = Vec::new();
        let recovery = match provider_from_config(&config.recovery) {
            Ok(provider) => provider,
            Err(err) => {
                warn!(error = %err, "context recovery disabled");
                setup_diagnostics.push(Diagnostic::new(
                    DiagnosticKind::RecoveryFailed,
                    format!("{}; placeholder labels will be used", err),
                ));
                Arc::new(NoRecovery)
            }
        };
        Analyzer {
            registry: DetectorRegistry::from_config(&config),
            config,
            recovery,
            setup_diagnostics,
        }
    }

    pub fn with_recovery(mut self, recovery: Arc<dyn ContextRecovery>) -> Self {
        self.recovery = recovery;
        self.setup_diagnostics
            .retain(|d| d.kind != DiagnosticKind::RecoveryFailed);
        self
    }

    pub fn with_registry(mut self, registry: DetectorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn analyze(&self, filename: impl Into<String>, store: CellStore) -> ModelAnalysis {
        let filename = filename.into();
        let graph = GraphBuilder::new()
            .with_max_range_cells(self.config.max_range_cells)
            .build(&store);
        info!(
            file = %filename,
            sheets = store.sheets().len(),
            cells = store.cell_count(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "workbook loaded"
        );

        let mut diagnostics: Vec<Diagnostic> = store.diagnostics().to_vec();
        diagnostics.extend(graph.diagnostics().iter().cloned());
        diagnostics.extend(self.setup_diagnostics.iter().cloned());

        let (raw, detector_diags) = self.registry.run(&DetectionContext {
            store: &store,
            graph: &graph,
            config: &self.config,
        });
        diagnostics.extend(detector_diags);
        let raw_count = raw.len();

        let compressed = compress(raw);

        // A fresh labeler per analysis keeps recovered labels from leaking
        // between workbooks.
        let labeler = ContextLabeler::new(
            Arc::clone(&self.recovery),
            self.config.header_rows,
            &self.config.recovery,
        );
        let (labelled, label_diags) = labeler.label_alerts(&store, compressed);
        diagnostics.extend(label_diags);

        let reclassified = compress(reclassify_inconsistent_values(labelled));
        let impact = ImpactAnalyzer::new(&store, &graph, &self.config);
        let with_impact = impact.attach(reclassified);
        let alerts = triage(with_impact);
        let health_score = health_score(&alerts);

        info!(
            file = %filename,
            raw = raw_count,
            alerts = alerts.len(),
            health = health_score,
            diagnostics = diagnostics.len(),
            "analysis complete"
        );
        ModelAnalysis {
            filename,
            store,
            graph,
            alerts,
            health_score,
            diagnostics,
        }
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Analyzer::new(AnalysisConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RecoveryConfig, RecoveryProvider};
    use crate::risk::{RiskType, Tier};
    use gridlens_engine::engine::RawSheet;

    #[test]
    fn test_empty_command_degrades_to_placeholders() {
        let config = AnalysisConfig {
            recovery: RecoveryConfig {
                provider: RecoveryProvider::Command,
                ..RecoveryConfig::default()
            },
            ..AnalysisConfig::default()
        };
        let analysis = Analyzer::new(config).analyze(
            "t.grd",
            CellStore::from_raw(vec![RawSheet::new("S").with_cell("C3", "=B3*7.5")]),
        );
        assert_eq!(analysis.alerts.len(), 1);
        assert_eq!(analysis.alerts[0].context_display(), "[Unlabeled C3]");
        assert!(analysis
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::RecoveryFailed));
    }

    #[test]
    fn test_pipeline_orders_by_tier() {
        let analysis = Analyzer::default().analyze(
            "t.grd",
            CellStore::from_raw(vec![
                RawSheet::new("S")
                    .with_cell("A1", "Rate")
                    .with_cell("B1", "=C1*3.5")
                    .with_cell("C1", "=B1"),
            ]),
        );
        assert_eq!(analysis.alerts[0].risk_type, RiskType::CircularReference);
        assert_eq!(analysis.alerts[0].tier, Some(Tier::Fatal));
        assert_eq!(analysis.alerts.last().map(|a| a.tier), Some(Some(Tier::Structural)));
        assert!(analysis.health_score < 100);
    }
}
