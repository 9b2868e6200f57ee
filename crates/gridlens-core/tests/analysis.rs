//! End-to-end analysis and diff behaviour on small in-memory workbooks.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use gridlens_core::context::{ContextRecovery, RecoveryError, RecoveryRequest, RecoveryResponse};
use gridlens_core::detectors::{DetectionContext, Detector, HardcodeDetector};
use gridlens_core::diff::{DiffConfig, DiffEngine, RowStatus};
use gridlens_core::storage::grd::parse_grd_content;
use gridlens_core::{
    AnalysisConfig, Analyzer, ChangeKind, DiagnosticKind, LabelSource, Location, RiskType, Tier,
};
use gridlens_engine::engine::{
    CellAddr, CellRef, CellStore, DependencyGraph, Diagnostic, RawSheet, RawWorkbook, TraversalScope,
};

fn sheet(name: &str, cells: &[(&str, &str)]) -> RawSheet {
    cells
        .iter()
        .fold(RawSheet::new(name), |raw, (a1, input)| raw.with_cell(a1, input))
}

fn at(a1: &str) -> CellRef {
    CellRef::from_str(a1).unwrap()
}

#[test]
fn test_repeated_hardcode_compresses_with_full_dominance() {
    let store = CellStore::from_raw(vec![sheet(
        "Model",
        &[
            ("A4", "Revenue"),
            ("F4", "=201.26"),
            ("F5", "=201.26"),
            ("F6", "=201.26"),
            ("F10", "=F4*1000"),
            ("F11", "=F10*2"),
            ("F12", "=F11+F5"),
        ],
    )]);
    let analysis = Analyzer::default().analyze("model.grd", store);

    let revenue: Vec<_> = analysis
        .alerts
        .iter()
        .filter(|a| a.hardcode_value() == Some(201.26))
        .collect();
    assert_eq!(revenue.len(), 1);
    let alert = revenue[0];
    assert_eq!(
        alert.location,
        Location::Range {
            first: at("F4"),
            last: at("F6"),
            count: 3
        }
    );
    assert_eq!(alert.location.to_string(), "F4...F6");
    assert_eq!(alert.instance_count(), 3);

    let impact = alert.impact.as_ref().unwrap();
    assert_eq!(impact.diffusion, 3);
    // F10, F11 and F12 all sit downstream of the repeated constant.
    assert_eq!(impact.dominance, 3);
    let f4 = CellAddr::new("Model", at("F4"));
    assert!(impact.dominance >= analysis.dependents(&f4).len());
}

#[test]
fn test_every_literal_is_reported() {
    let store = CellStore::from_raw(vec![sheet(
        "S",
        &[
            ("A1", "=B1*1.5+2-SUM(C1:C3)/3"),
            ("A2", "=Sheet2!B7+0.07"),
            ("A3", "=IF(B1>12,\"12 months\",B1)"),
        ],
    )]);
    let graph = DependencyGraph::build(&store);
    let config = AnalysisConfig::default();
    let alerts = HardcodeDetector
        .detect(&DetectionContext {
            store: &store,
            graph: &graph,
            config: &config,
        })
        .unwrap();
    // 1.5, 2, 3 | 0.07 | 12
    assert_eq!(alerts.len(), 5);
    assert!(alerts.iter().all(|a| a.risk_type == RiskType::HiddenHardcode));
}

#[test]
fn test_cycle_is_fatal_and_dominance_terminates() {
    let store = CellStore::from_raw(vec![sheet("S", &[("A1", "=B1*3.5"), ("B1", "=A1")])]);
    let analysis = Analyzer::default().analyze("cycle.grd", store);

    let cycle = analysis
        .alerts
        .iter()
        .find(|a| a.risk_type == RiskType::CircularReference)
        .unwrap();
    assert_eq!(cycle.tier, Some(Tier::Fatal));
    assert_eq!(analysis.alerts[0].risk_type, RiskType::CircularReference);

    let descendants = analysis
        .graph
        .descendants(&CellAddr::new("S", at("A1")), TraversalScope::AllSheets);
    assert_eq!(descendants.len(), 2);
}

#[test]
fn test_adjacency_rules_for_compression() {
    let store = CellStore::from_raw(vec![sheet(
        "S",
        &[("F4", "=A4*7.25"), ("F5", "=A5*7.25"), ("F8", "=A8*7.25"), ("BN4", "=A4*7.25")],
    )]);
    let analysis = Analyzer::default().analyze("adj.grd", store);
    let mut locations: Vec<String> = analysis
        .alerts
        .iter()
        .filter(|a| a.hardcode_value() == Some(7.25))
        .map(|a| a.location.to_string())
        .collect();
    locations.sort();
    assert_eq!(locations, vec!["BN4", "F4...F5", "F8"]);
}

#[test]
fn test_composite_key_follows_content_not_position() {
    let old = Analyzer::default().analyze(
        "v1.grd",
        CellStore::from_raw(vec![sheet(
            "Data",
            &[("A1", "A"), ("B1", "10"), ("A2", "B"), ("B2", "20"), ("A3", "C"), ("B3", "30")],
        )]),
    );
    let new = Analyzer::default().analyze(
        "v2.grd",
        CellStore::from_raw(vec![sheet(
            "Data",
            &[
                ("A1", "A"),
                ("B1", "10"),
                ("A2", "C"),
                ("B2", "30"),
                ("A3", "B"),
                ("B3", "20"),
                ("A4", "D"),
                ("B4", "40"),
            ],
        )]),
    );
    let changes = DiffEngine::new(&old, &new, DiffConfig::new("Data", &["A"]))
        .unwrap()
        .run();

    let pairs: Vec<(String, Option<usize>, Option<usize>)> = changes
        .rows
        .iter()
        .map(|r| (r.key.clone(), r.old_row, r.new_row))
        .collect();
    assert!(pairs.contains(&("a".into(), Some(1), Some(1))));
    assert!(pairs.contains(&("b".into(), Some(2), Some(3))));
    assert!(pairs.contains(&("c".into(), Some(3), Some(2))));
    assert!(pairs.contains(&("d".into(), None, Some(4))));
    assert_eq!(changes.count_rows(RowStatus::Inserted), 1);
    assert_eq!(changes.count_rows(RowStatus::Deleted), 0);
    assert_eq!(changes.count(ChangeKind::InputUpdate), 0);
    assert_eq!(changes.count(ChangeKind::RowInserted), 1);
}

#[test]
fn test_key_uniqueness_ratio() {
    let analysis = Analyzer::default().analyze(
        "keys.grd",
        CellStore::from_raw(vec![sheet("Data", &[("A1", "X"), ("A2", "X"), ("A3", "Y")])]),
    );
    let changes = DiffEngine::new(&analysis, &analysis, DiffConfig::new("Data", &["A"]))
        .unwrap()
        .run();
    assert!((changes.old_keys.uniqueness - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(changes.old_keys.duplicates.len(), 1);
    assert_eq!(changes.old_keys.duplicates[0].key, "x");
    assert_eq!(changes.old_keys.duplicates[0].count, 2);
}

#[test]
fn test_damaged_grd_region_is_analysed_around() {
    let content = "\
[Inputs]
A1: \"Growth\"
B1: 0.05
[Scratch
A1: =1/0
B1: junk line
[Report]
A2: \"Revenue\"
B2: =Inputs!B1*1200
C2 oops
";
    let store = CellStore::from_workbook(parse_grd_content(content));
    let names: Vec<_> = store.sheets().iter().map(|s| s.name().to_string()).collect();
    assert_eq!(names, vec!["Inputs", "Report"]);

    let analysis = Analyzer::default().analyze("damaged.grd", store);
    let kinds: Vec<_> = analysis.diagnostics.iter().map(|d| d.kind).collect();
    assert!(kinds.contains(&DiagnosticKind::SheetUnreadable));
    assert!(kinds.contains(&DiagnosticKind::MalformedCell));
    let header = analysis
        .diagnostics
        .iter()
        .find(|d| d.kind == DiagnosticKind::SheetUnreadable)
        .unwrap();
    assert_eq!(header.location.as_deref(), Some("line 4"));

    let hardcode = analysis
        .alerts
        .iter()
        .find(|a| a.hardcode_value() == Some(1200.0))
        .unwrap();
    assert_eq!(hardcode.sheet, "Report");
    assert_eq!(hardcode.context.as_ref().unwrap().display, "Revenue");
    assert!(analysis.alerts.iter().all(|a| a.sheet != "Scratch"));
}

#[test]
fn test_unreadable_sheet_diagnostic_reaches_analysis() {
    let store = CellStore::from_workbook(RawWorkbook {
        sheets: vec![sheet("Calc", &[("A1", "Cost"), ("B1", "=A9*1.2")])],
        issues: vec![
            Diagnostic::new(DiagnosticKind::SheetUnreadable, "sheet skipped: bad xml").on_sheet("Rates"),
        ],
    });
    let analysis = Analyzer::default().analyze("partial.xlsx", store);
    assert_eq!(analysis.diagnostics[0].kind, DiagnosticKind::SheetUnreadable);
    assert_eq!(analysis.diagnostics[0].sheet.as_deref(), Some("Rates"));
    assert!(analysis.alerts.iter().any(|a| a.hardcode_value() == Some(1.2)));
}

/// A provider that never answers in time.
struct AlwaysTimesOut {
    calls: AtomicUsize,
}

impl ContextRecovery for AlwaysTimesOut {
    fn name(&self) -> &'static str {
        "always-times-out"
    }

    fn recover(&self, _request: &RecoveryRequest) -> Result<RecoveryResponse, RecoveryError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(RecoveryError::Timeout(250))
    }
}

#[test]
fn test_recovery_timeout_degrades_to_placeholder() {
    let store = CellStore::from_raw(vec![sheet("S", &[("C3", "=B3*7.5")])]);
    let provider = Arc::new(AlwaysTimesOut {
        calls: AtomicUsize::new(0),
    });
    let analysis = Analyzer::new(AnalysisConfig::default())
        .with_recovery(provider.clone())
        .analyze("unlabeled.grd", store);

    let alert = analysis
        .alerts
        .iter()
        .find(|a| a.hardcode_value() == Some(7.5))
        .unwrap();
    let label = alert.context.as_ref().unwrap();
    assert_eq!(label.source, LabelSource::Placeholder);
    assert_eq!(label.display, "[Unlabeled C3]");
    assert!(analysis
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::RecoveryTimeout && d.location.as_deref() == Some("C3")));
    // One try plus the configured retry.
    assert_eq!(provider.calls.load(Ordering::Relaxed), 2);
}
