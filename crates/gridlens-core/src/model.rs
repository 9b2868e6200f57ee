//! The result of analysing one workbook snapshot.

use std::collections::BTreeMap;

use gridlens_engine::engine::{CellAddr, CellStore, DependencyGraph, Diagnostic, Neighborhood};

use crate::risk::{RiskAlert, Severity, Tier};

/// Everything known about one snapshot. Built once by the analyzer and never
/// modified afterwards.
pub struct ModelAnalysis {
    pub filename: String,
    pub store: CellStore,
    pub graph: DependencyGraph,
    /// Triaged alerts, Fatal tier first.
    pub alerts: Vec<RiskAlert>,
    pub health_score: u32,
    /// Every degraded condition met while loading and analysing.
    pub diagnostics: Vec<Diagnostic>,
}

impl ModelAnalysis {
    pub fn precedents(&self, addr: &CellAddr) -> Vec<CellAddr> {
        self.graph.precedents(addr)
    }

    pub fn dependents(&self, addr: &CellAddr) -> Vec<CellAddr> {
        self.graph.dependents(addr)
    }

    /// The root inputs a cell ultimately depends on.
    pub fn trace_to_drivers(&self, addr: &CellAddr) -> Vec<CellAddr> {
        self.graph.roots_of(addr)
    }

    /// Bounded local view for large graphs.
    pub fn neighborhood(&self, addr: &CellAddr, radius: usize) -> Neighborhood {
        self.graph.neighborhood(addr, radius)
    }

    pub fn alerts_in(&self, tier: Tier) -> impl Iterator<Item = &RiskAlert> {
        self.alerts.iter().filter(move |a| a.tier == Some(tier))
    }

    pub fn tier_counts(&self) -> BTreeMap<Tier, usize> {
        let mut counts = BTreeMap::new();
        for alert in &self.alerts {
            if let Some(tier) = alert.tier {
                *counts.entry(tier).or_default() += 1;
            }
        }
        counts
    }

    pub fn severity_counts(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for alert in &self.alerts {
            *counts.entry(alert.severity).or_default() += 1;
        }
        counts
    }
}
