use gridlens_engine::engine::detect_cycles;

use super::{DetectionContext, Detector, DetectorError};
use crate::risk::{RiskAlert, RiskDetails, RiskType, Severity};

/// One Critical alert per simple cycle. When enumeration stops at
/// `max_cycles`, one extra alert says so.
pub struct CircularReferenceDetector;

impl Detector for CircularReferenceDetector {
    fn id(&self) -> &'static str {
        "circular_reference"
    }

    fn detect(&self, ctx: &DetectionContext) -> Result<Vec<RiskAlert>, DetectorError> {
        let report = detect_cycles(ctx.graph, ctx.config.max_cycles);
        let mut alerts = Vec::with_capacity(report.cycles.len() + 1);
        for path in &report.cycles {
            let Some(head) = path.first() else {
                continue;
            };
            let mut shown: Vec<String> = path.iter().map(|a| a.to_string()).collect();
            shown.push(head.to_string());
            alerts.push(RiskAlert::new(
                RiskType::CircularReference,
                Severity::Critical,
                head.sheet.clone(),
                head.cell,
                format!("Circular reference detected: {}", shown.join(" -> ")),
                RiskDetails::Cycle { path: path.clone() },
            ));
        }
        if report.truncated {
            if let Some(head) = report.cycles.first().and_then(|p| p.first()) {
                alerts.push(RiskAlert::new(
                    RiskType::CircularReference,
                    Severity::High,
                    head.sheet.clone(),
                    head.cell,
                    format!(
                        "{}+ circular references detected (showing first {})",
                        report.cycles.len(),
                        report.cycles.len()
                    ),
                    RiskDetails::CycleOverflow {
                        reported: report.cycles.len(),
                    },
                ));
            }
        }
        Ok(alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use gridlens_engine::engine::{CellStore, DependencyGraph, RawSheet};

    fn run(raw: RawSheet, max_cycles: usize) -> Vec<RiskAlert> {
        let store = CellStore::from_raw(vec![raw]);
        let graph = DependencyGraph::build(&store);
        let config = AnalysisConfig {
            max_cycles,
            ..AnalysisConfig::default()
        };
        CircularReferenceDetector
            .detect(&DetectionContext {
                store: &store,
                graph: &graph,
                config: &config,
            })
            .unwrap()
    }

    #[test]
    fn test_two_cell_cycle() {
        let alerts = run(RawSheet::new("S").with_cell("A1", "=B1").with_cell("B1", "=A1"), 100);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert!(alerts[0].description.contains("S!A1 -> S!B1 -> S!A1"));
    }

    #[test]
    fn test_overflow_alert() {
        let raw = RawSheet::new("S")
            .with_cell("A1", "=A1")
            .with_cell("B1", "=B1")
            .with_cell("C1", "=C1");
        let alerts = run(raw, 2);
        assert_eq!(alerts.len(), 3);
        assert!(matches!(alerts[2].details, RiskDetails::CycleOverflow { reported: 2 }));
    }
}
