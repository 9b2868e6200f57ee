//! Impact of a finding, measured on the dependency graph.
//!
//! - diffusion: how many authored formula cells hold the same literal
//! - dominance: how many distinct cells depend, transitively, on any of them
//!
//! High diffusion with zero dominance is reported as `copy_pasted`: the
//! constant was pasted around rather than referenced.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

use gridlens_engine::engine::{
    CellAddr, CellStore, DependencyGraph, TraversalScope, format_number, numeric_literals,
};

use crate::config::AnalysisConfig;
use crate::risk::{RiskAlert, RiskDetails};

/// Distinct hardcoded literals a row needs before it reads as scenario data.
const VOLATILE_ROW_LITERALS: usize = 3;
const DRIVER_DOMINANCE: usize = 50;
const SCATTERED_DIFFUSION: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Volatility {
    Low,
    High,
}

/// Suggested remedy for a hardcoded constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Prescription {
    /// Row holds several different constants: model them as scenarios.
    ScenarioPlanning,
    /// Much of the model hangs off this constant: give it an input cell.
    DriverDecomposition,
    /// Same constant scattered around: centralize it.
    Centralization,
    BasicRefactoring,
}

impl Prescription {
    pub fn as_str(&self) -> &'static str {
        match self {
            Prescription::ScenarioPlanning => "Scenario Planning",
            Prescription::DriverDecomposition => "Driver Decomposition",
            Prescription::Centralization => "Centralization",
            Prescription::BasicRefactoring => "Basic Refactoring",
        }
    }

    pub fn choose(diffusion: usize, dominance: usize, volatility: Volatility) -> Self {
        if volatility == Volatility::High {
            Prescription::ScenarioPlanning
        } else if dominance > DRIVER_DOMINANCE {
            Prescription::DriverDecomposition
        } else if diffusion > SCATTERED_DIFFUSION {
            Prescription::Centralization
        } else {
            Prescription::BasicRefactoring
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ImpactProfile {
    pub diffusion: usize,
    pub dominance: usize,
    /// Dominance was counted within a fixed radius because the graph is large.
    pub bounded: bool,
    pub volatility: Volatility,
    /// Only hardcodes get a prescription.
    pub prescription: Option<Prescription>,
    pub copy_pasted: bool,
}

/// Computes impact profiles for one analysed snapshot.
pub struct ImpactAnalyzer<'a> {
    graph: &'a DependencyGraph,
    scope: TraversalScope,
    radius: Option<usize>,
    /// Canonical literal -> every authored formula cell holding it.
    occurrences: HashMap<String, BTreeSet<CellAddr>>,
    /// (sheet, row) -> distinct literals in that row's formulas.
    row_literals: HashMap<(String, usize), HashSet<String>>,
}

impl<'a> ImpactAnalyzer<'a> {
    pub fn new(store: &CellStore, graph: &'a DependencyGraph, config: &AnalysisConfig) -> Self {
        let mut occurrences: HashMap<String, BTreeSet<CellAddr>> = HashMap::new();
        let mut row_literals: HashMap<(String, usize), HashSet<String>> = HashMap::new();
        for sheet in store.sheets() {
            for (cell_ref, cell) in sheet.formula_cells() {
                if cell.is_virtual() {
                    continue;
                }
                let Some(formula) = cell.formula.as_deref() else {
                    continue;
                };
                for literal in numeric_literals(formula) {
                    let key = format_number(literal.value);
                    occurrences
                        .entry(key.clone())
                        .or_default()
                        .insert(CellAddr::new(sheet.name(), *cell_ref));
                    if !config.is_allowed_constant(literal.value) {
                        row_literals
                            .entry((sheet.name().to_string(), cell_ref.row))
                            .or_default()
                            .insert(key);
                    }
                }
            }
        }
        let bounded = graph.node_count() > config.neighborhood_threshold;
        if bounded {
            debug!(
                nodes = graph.node_count(),
                radius = config.neighborhood_radius,
                "large graph, dominance bounded to a neighborhood"
            );
        }
        ImpactAnalyzer {
            graph,
            scope: config.dominance_scope.into(),
            radius: bounded.then_some(config.neighborhood_radius),
            occurrences,
            row_literals,
        }
    }

    /// Cells holding `value` as a literal somewhere in their formula.
    pub fn occurrences_of(&self, value: f64) -> Vec<CellAddr> {
        self.occurrences
            .get(&format_number(value))
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn diffusion(&self, value: f64) -> usize {
        self.occurrences
            .get(&format_number(value))
            .map_or(0, BTreeSet::len)
    }

    /// Size of the union of the full descendant sets of `sources`.
    pub fn dominance<'b>(&self, sources: impl IntoIterator<Item = &'b CellAddr>) -> usize {
        let mut reached: HashSet<CellAddr> = HashSet::new();
        for source in sources {
            let descendants = match self.radius {
                Some(radius) => self.graph.descendants_within(source, self.scope, radius),
                None => self.graph.descendants(source, self.scope),
            };
            reached.extend(descendants);
        }
        reached.len()
    }

    pub fn volatility(&self, addr: &CellAddr) -> Volatility {
        let distinct = self
            .row_literals
            .get(&(addr.sheet.clone(), addr.cell.row))
            .map_or(0, HashSet::len);
        if distinct >= VOLATILE_ROW_LITERALS {
            Volatility::High
        } else {
            Volatility::Low
        }
    }

    pub fn profile(&self, alert: &RiskAlert) -> ImpactProfile {
        let anchor = alert.anchor();
        match &alert.details {
            RiskDetails::Hardcode { value, .. } => {
                let sources = self.occurrences.get(&format_number(*value));
                let diffusion = sources.map_or(0, BTreeSet::len);
                let dominance = sources.map_or(0, |s| self.dominance(s.iter()));
                let volatility = self.volatility(&anchor);
                ImpactProfile {
                    diffusion,
                    dominance,
                    bounded: self.radius.is_some(),
                    volatility,
                    prescription: Some(Prescription::choose(diffusion, dominance, volatility)),
                    copy_pasted: dominance == 0 && diffusion > 1,
                }
            }
            _ => {
                let members: Vec<CellAddr> = alert
                    .members
                    .iter()
                    .map(|c| CellAddr::new(alert.sheet.clone(), *c))
                    .collect();
                ImpactProfile {
                    diffusion: members.len(),
                    dominance: self.dominance(members.iter()),
                    bounded: self.radius.is_some(),
                    volatility: Volatility::Low,
                    prescription: None,
                    copy_pasted: false,
                }
            }
        }
    }

    pub fn attach(&self, alerts: Vec<RiskAlert>) -> Vec<RiskAlert> {
        alerts
            .into_iter()
            .map(|alert| RiskAlert {
                impact: Some(self.profile(&alert)),
                ..alert
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::{RiskType, Severity};
    use gridlens_engine::engine::{CellRef, RawSheet};

    fn build(raw: RawSheet) -> (CellStore, DependencyGraph) {
        let store = CellStore::from_raw(vec![raw]);
        let graph = DependencyGraph::build(&store);
        (store, graph)
    }

    fn addr(a1: &str) -> CellAddr {
        CellAddr::new("S", CellRef::from_str(a1).unwrap())
    }

    #[test]
    fn test_one_cell_feeding_two_has_dominance_two() {
        let (store, graph) = build(
            RawSheet::new("S")
                .with_cell("A1", "=5*7")
                .with_cell("B1", "=A1+1")
                .with_cell("C1", "=A1+2"),
        );
        let impact = ImpactAnalyzer::new(&store, &graph, &AnalysisConfig::default());
        assert_eq!(impact.dominance([&addr("A1")]), 2);
    }

    #[test]
    fn test_dominance_counts_full_closure() {
        let (store, graph) = build(
            RawSheet::new("S")
                .with_cell("A1", "=201.26")
                .with_cell("A2", "=A1*2")
                .with_cell("A3", "=A2*2")
                .with_cell("A4", "=A3*2"),
        );
        let impact = ImpactAnalyzer::new(&store, &graph, &AnalysisConfig::default());
        assert_eq!(impact.dominance([&addr("A1")]), 3);
        assert!(impact.dominance([&addr("A1")]) >= graph.dependents(&addr("A1")).len());
    }

    #[test]
    fn test_cycle_terminates() {
        let (store, graph) = build(RawSheet::new("S").with_cell("A1", "=B1+3").with_cell("B1", "=A1"));
        let impact = ImpactAnalyzer::new(&store, &graph, &AnalysisConfig::default());
        assert_eq!(impact.dominance([&addr("A1")]), 2);
        assert_eq!(impact.dominance([&addr("B1")]), 2);
    }

    #[test]
    fn test_copy_pasted_constant() {
        let (store, graph) = build(
            RawSheet::new("S")
                .with_cell("A1", "=X1*0.19")
                .with_cell("C5", "=X5*0.19")
                .with_cell("E9", "=X9*0.19"),
        );
        let impact = ImpactAnalyzer::new(&store, &graph, &AnalysisConfig::default());
        let alert = RiskAlert::new(
            RiskType::HiddenHardcode,
            Severity::High,
            "S",
            CellRef::from_str("A1").unwrap(),
            "",
            RiskDetails::Hardcode {
                literal: "0.19".into(),
                value: 0.19,
                formula: "X1*0.19".into(),
                allowed: false,
            },
        );
        let profile = impact.profile(&alert);
        assert_eq!(profile.diffusion, 3);
        assert_eq!(profile.dominance, 0);
        assert!(profile.copy_pasted);
        assert_eq!(profile.prescription, Some(Prescription::BasicRefactoring));
    }

    #[test]
    fn test_volatile_row_prescribes_scenarios() {
        let (store, graph) = build(
            RawSheet::new("S")
                .with_cell("B2", "=A2*1.05")
                .with_cell("C2", "=B2*1.07")
                .with_cell("D2", "=C2*1.1"),
        );
        let impact = ImpactAnalyzer::new(&store, &graph, &AnalysisConfig::default());
        assert_eq!(impact.volatility(&addr("C2")), Volatility::High);
        assert_eq!(impact.volatility(&addr("C3")), Volatility::Low);
    }

    #[test]
    fn test_bounded_mode_above_threshold() {
        let (store, graph) = build(
            RawSheet::new("S")
                .with_cell("A1", "=9*9")
                .with_cell("A2", "=A1")
                .with_cell("A3", "=A2")
                .with_cell("A4", "=A3"),
        );
        let config = AnalysisConfig {
            neighborhood_threshold: 1,
            neighborhood_radius: 1,
            ..AnalysisConfig::default()
        };
        let impact = ImpactAnalyzer::new(&store, &graph, &config);
        assert_eq!(impact.dominance([&addr("A1")]), 1);
    }

    #[test]
    fn test_same_sheet_scope() {
        let store = CellStore::from_raw(vec![
            RawSheet::new("S").with_cell("A1", "=3*3").with_cell("A2", "=A1"),
            RawSheet::new("T").with_cell("A1", "=S!A1"),
        ]);
        let graph = DependencyGraph::build(&store);
        let all = ImpactAnalyzer::new(&store, &graph, &AnalysisConfig::default());
        assert_eq!(all.dominance([&addr("A1")]), 2);
        let config = AnalysisConfig {
            dominance_scope: crate::config::DominanceScope::SameSheet,
            ..AnalysisConfig::default()
        };
        let same = ImpactAnalyzer::new(&store, &graph, &config);
        assert_eq!(same.dominance([&addr("A1")]), 1);
    }
}
