//! Directed dependency graph over cell addresses.
//!
//! Edges run precedent -> dependent: `=F4*1000` in F10 adds F4 -> F10.
//! Every edge endpoint is a cell stored in the [`CellStore`]; references that
//! cannot be resolved to stored cells are kept as [`UnresolvedReference`]s.

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

use super::cell_ref::{CellAddr, CellRef, RangeBounds};
use super::cell::CellOrigin;
use super::deps::{MAX_DEPENDENCY_RANGE_CELLS, RefTarget, extract_references};
use super::diagnostic::{Diagnostic, DiagnosticKind};
use super::store::{CellStore, Sheet};

/// Ranges up to this size are walked coordinate by coordinate; larger ones
/// scan the sheet's stored cells instead.
const DENSE_RANGE_WALK: usize = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    ExternalWorkbook,
    UnknownSheet,
    InvalidAddress,
    OversizedRange,
}

impl UnresolvedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnresolvedReason::ExternalWorkbook => "external workbook",
            UnresolvedReason::UnknownSheet => "unknown sheet",
            UnresolvedReason::InvalidAddress => "invalid address",
            UnresolvedReason::OversizedRange => "oversized range",
        }
    }
}

/// A reference operand that produced no edge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UnresolvedReference {
    pub from: CellAddr,
    pub reference: String,
    pub reason: UnresolvedReason,
}

/// Which descendants a traversal may visit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TraversalScope {
    #[default]
    AllSheets,
    /// Only follow edges into the starting cell's own sheet.
    SameSheet,
}

/// A bounded local view of the graph around one cell.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Neighborhood {
    pub center: Option<CellAddr>,
    pub nodes: Vec<CellAddr>,
    pub edges: Vec<(CellAddr, CellAddr)>,
}

pub struct GraphBuilder {
    max_range_cells: usize,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        GraphBuilder {
            max_range_cells: MAX_DEPENDENCY_RANGE_CELLS,
        }
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_range_cells(mut self, max: usize) -> Self {
        self.max_range_cells = max;
        self
    }

    pub fn build(&self, store: &CellStore) -> DependencyGraph {
        let mut graph = DependencyGraph::default();
        for sheet in store.sheets() {
            for (cell_ref, cell) in sheet.cells() {
                let here = CellAddr::new(sheet.name(), *cell_ref);
                if let CellOrigin::Virtual { anchor } = cell.origin {
                    graph.add_edge(CellAddr::new(sheet.name(), anchor), here);
                    continue;
                }
                let Some(formula) = cell.formula.as_deref() else {
                    continue;
                };
                graph.node(here.clone());
                self.add_formula_edges(store, sheet, &here, formula, &mut graph);
            }
        }
        debug!(
            nodes = graph.graph.node_count(),
            edges = graph.graph.edge_count(),
            unresolved = graph.unresolved.len(),
            "dependency graph built"
        );
        graph
    }

    fn add_formula_edges(
        &self,
        store: &CellStore,
        home: &Sheet,
        here: &CellAddr,
        formula: &str,
        graph: &mut DependencyGraph,
    ) {
        for reference in extract_references(formula) {
            let unresolved = |reason| UnresolvedReference {
                from: here.clone(),
                reference: reference.text.clone(),
                reason,
            };
            if reference.is_external() {
                graph.unresolved.push(unresolved(UnresolvedReason::ExternalWorkbook));
                continue;
            }
            if reference.target == RefTarget::Invalid {
                graph.unresolved.push(unresolved(UnresolvedReason::InvalidAddress));
                continue;
            }
            let target = match reference.sheet.as_deref() {
                Some(name) => match store.sheet(name) {
                    Some(sheet) => sheet,
                    None => {
                        graph.unresolved.push(unresolved(UnresolvedReason::UnknownSheet));
                        continue;
                    }
                },
                None => home,
            };
            let Some(bounds) = reference.bounds(Some(target.extent())) else {
                debug!(
                    cell = %here,
                    reference = %reference.text,
                    sheet = %target.name(),
                    "whole row or column on an empty sheet; no precedents"
                );
                continue;
            };
            let count = bounds.cell_count().unwrap_or(usize::MAX);
            if count > self.max_range_cells {
                warn!(cell = %here, reference = %reference.text, count, "range too large to expand");
                graph.diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::OversizedRange,
                        format!("{} covers {} cells; not expanded", reference.text, count),
                    )
                    .on_sheet(&here.sheet)
                    .at(here.cell.to_string()),
                );
                graph.unresolved.push(unresolved(UnresolvedReason::OversizedRange));
                continue;
            }
            for precedent in stored_cells_in(target, &bounds, count) {
                graph.add_edge(CellAddr::new(target.name(), precedent), here.clone());
            }
        }
    }
}

fn stored_cells_in(sheet: &Sheet, bounds: &RangeBounds, count: usize) -> Vec<CellRef> {
    if count <= DENSE_RANGE_WALK {
        bounds.cells().filter(|c| sheet.get(c).is_some()).collect()
    } else {
        (bounds.start.row..=bounds.end.row.min(sheet.extent().0.saturating_sub(1)))
            .flat_map(|row| sheet.row(row))
            .map(|(c, _)| *c)
            .filter(|c| bounds.contains(c))
            .collect()
    }
}

#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<CellAddr, ()>,
    index: HashMap<CellAddr, NodeIndex>,
    unresolved: Vec<UnresolvedReference>,
    diagnostics: Vec<Diagnostic>,
}

impl DependencyGraph {
    pub fn build(store: &CellStore) -> DependencyGraph {
        GraphBuilder::new().build(store)
    }

    fn node(&mut self, addr: CellAddr) -> NodeIndex {
        if let Some(&idx) = self.index.get(&addr) {
            return idx;
        }
        let idx = self.graph.add_node(addr.clone());
        self.index.insert(addr, idx);
        idx
    }

    /// Idempotent: a repeated precedent collapses onto one edge.
    fn add_edge(&mut self, precedent: CellAddr, dependent: CellAddr) {
        let a = self.node(precedent);
        let b = self.node(dependent);
        self.graph.update_edge(a, b, ());
    }

    pub fn inner(&self) -> &DiGraph<CellAddr, ()> {
        &self.graph
    }

    pub fn node_index(&self, addr: &CellAddr) -> Option<NodeIndex> {
        self.index.get(addr).copied()
    }

    pub fn contains(&self, addr: &CellAddr) -> bool {
        self.index.contains_key(addr)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn edges(&self) -> impl Iterator<Item = (&CellAddr, &CellAddr)> {
        self.graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| (&self.graph[a], &self.graph[b]))
    }

    pub fn unresolved(&self) -> &[UnresolvedReference] {
        &self.unresolved
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    fn adjacent(&self, addr: &CellAddr, dir: Direction) -> Vec<CellAddr> {
        let Some(idx) = self.node_index(addr) else {
            return Vec::new();
        };
        let mut out: Vec<CellAddr> = self
            .graph
            .neighbors_directed(idx, dir)
            .map(|n| self.graph[n].clone())
            .collect();
        out.sort();
        out
    }

    /// Cells this cell's formula reads directly.
    pub fn precedents(&self, addr: &CellAddr) -> Vec<CellAddr> {
        self.adjacent(addr, Direction::Incoming)
    }

    /// Cells whose formulas read this cell directly.
    pub fn dependents(&self, addr: &CellAddr) -> Vec<CellAddr> {
        self.adjacent(addr, Direction::Outgoing)
    }

    /// Breadth-first walk from `start` in one direction. The start itself is
    /// only included if it is reachable from itself.
    fn walk(
        &self,
        start: NodeIndex,
        dir: Direction,
        scope: TraversalScope,
        radius: Option<usize>,
    ) -> HashSet<NodeIndex> {
        let sheet = &self.graph[start].sheet;
        let mut seen: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::new();
        queue.push_back((start, 0));
        while let Some((node, depth)) = queue.pop_front() {
            if radius.is_some_and(|r| depth >= r) {
                continue;
            }
            for next in self.graph.neighbors_directed(node, dir) {
                if scope == TraversalScope::SameSheet && &self.graph[next].sheet != sheet {
                    continue;
                }
                if seen.insert(next) {
                    queue.push_back((next, depth + 1));
                }
            }
        }
        seen
    }

    /// Full transitive closure forward from `addr`.
    pub fn descendants(&self, addr: &CellAddr, scope: TraversalScope) -> HashSet<CellAddr> {
        self.collect(addr, Direction::Outgoing, scope, None)
    }

    /// Forward closure cut off after `radius` hops.
    pub fn descendants_within(
        &self,
        addr: &CellAddr,
        scope: TraversalScope,
        radius: usize,
    ) -> HashSet<CellAddr> {
        self.collect(addr, Direction::Outgoing, scope, Some(radius))
    }

    pub fn ancestors(&self, addr: &CellAddr) -> HashSet<CellAddr> {
        self.collect(addr, Direction::Incoming, TraversalScope::AllSheets, None)
    }

    fn collect(
        &self,
        addr: &CellAddr,
        dir: Direction,
        scope: TraversalScope,
        radius: Option<usize>,
    ) -> HashSet<CellAddr> {
        let Some(start) = self.node_index(addr) else {
            return HashSet::new();
        };
        self.walk(start, dir, scope, radius)
            .into_iter()
            .map(|n| self.graph[n].clone())
            .collect()
    }

    /// Precedents with no precedents of their own, reachable backward from `addr`.
    pub fn roots_of(&self, addr: &CellAddr) -> Vec<CellAddr> {
        let Some(start) = self.node_index(addr) else {
            return Vec::new();
        };
        let mut roots: Vec<CellAddr> = self
            .walk(start, Direction::Incoming, TraversalScope::AllSheets, None)
            .into_iter()
            .filter(|n| {
                self.graph
                    .neighbors_directed(*n, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|n| self.graph[n].clone())
            .collect();
        roots.sort();
        roots
    }

    /// Nodes within `radius` hops of `addr` in either direction, with the
    /// edges among them.
    pub fn neighborhood(&self, addr: &CellAddr, radius: usize) -> Neighborhood {
        let Some(start) = self.node_index(addr) else {
            return Neighborhood::default();
        };
        let mut members = self.walk(start, Direction::Outgoing, TraversalScope::AllSheets, Some(radius));
        members.extend(self.walk(start, Direction::Incoming, TraversalScope::AllSheets, Some(radius)));
        members.insert(start);

        let mut nodes: Vec<CellAddr> = members.iter().map(|n| self.graph[*n].clone()).collect();
        nodes.sort();
        let mut edges: Vec<(CellAddr, CellAddr)> = members
            .iter()
            .flat_map(|&a| {
                self.graph
                    .neighbors_directed(a, Direction::Outgoing)
                    .filter(|b| members.contains(b))
                    .map(move |b| (a, b))
            })
            .map(|(a, b)| (self.graph[a].clone(), self.graph[b].clone()))
            .collect();
        edges.sort();
        Neighborhood {
            center: Some(addr.clone()),
            nodes,
            edges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::store::RawSheet;

    fn addr(sheet: &str, a1: &str) -> CellAddr {
        CellAddr::new(sheet, CellRef::from_str(a1).unwrap())
    }

    fn store(cells: &[(&str, &str)]) -> CellStore {
        let mut raw = RawSheet::new("S");
        for (a1, input) in cells {
            raw = raw.with_cell(a1, input);
        }
        CellStore::from_raw(vec![raw])
    }

    #[test]
    fn test_edges_run_precedent_to_dependent() {
        let store = store(&[("A1", "5"), ("B1", "=A1*2"), ("C1", "=B1+A1")]);
        let graph = DependencyGraph::build(&store);
        assert_eq!(graph.dependents(&addr("S", "A1")), vec![addr("S", "B1"), addr("S", "C1")]);
        assert_eq!(graph.precedents(&addr("S", "C1")), vec![addr("S", "A1"), addr("S", "B1")]);
    }

    #[test]
    fn test_duplicate_references_collapse() {
        let store = store(&[("A1", "5"), ("B1", "=A1+A1+SUM(A1:A1)")]);
        let graph = DependencyGraph::build(&store);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_edges_only_to_stored_cells() {
        let store = store(&[("A1", "5"), ("B1", "=SUM(A1:A50)+Z99")]);
        let graph = DependencyGraph::build(&store);
        assert_eq!(graph.edge_count(), 1);
        assert!(!graph.contains(&addr("S", "Z99")));
    }

    #[test]
    fn test_whole_column_on_empty_sheet_has_no_edges() {
        let store = CellStore::from_raw(vec![
            RawSheet::new("Calc").with_cell("A1", "=SUM(Blank!A:A)+SUM(Blank!3:3)"),
            RawSheet::new("Blank"),
        ]);
        let graph = DependencyGraph::build(&store);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.unresolved().is_empty());
        assert!(graph.diagnostics().is_empty());
    }

    #[test]
    fn test_unresolved_references_recorded() {
        let store = store(&[("A1", "=[Other.xlsx]Rates!B2+Missing!A1+#REF!")]);
        let graph = DependencyGraph::build(&store);
        let reasons: Vec<_> = graph.unresolved().iter().map(|u| u.reason).collect();
        assert_eq!(
            reasons,
            vec![
                UnresolvedReason::ExternalWorkbook,
                UnresolvedReason::UnknownSheet,
                UnresolvedReason::InvalidAddress,
            ]
        );
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_cross_sheet_edges_use_canonical_sheet_name() {
        let store = CellStore::from_raw(vec![
            RawSheet::new("Inputs").with_cell("B2", "0.2"),
            RawSheet::new("Calc").with_cell("A1", "=inputs!B2*100"),
        ]);
        let graph = DependencyGraph::build(&store);
        assert_eq!(graph.dependents(&addr("Inputs", "B2")), vec![addr("Calc", "A1")]);
    }

    #[test]
    fn test_descendants_are_transitive() {
        let store = store(&[("A1", "1"), ("A2", "=A1"), ("A3", "=A2"), ("A4", "=A3")]);
        let graph = DependencyGraph::build(&store);
        assert_eq!(graph.descendants(&addr("S", "A1"), TraversalScope::AllSheets).len(), 3);
        assert_eq!(
            graph
                .descendants_within(&addr("S", "A1"), TraversalScope::AllSheets, 1)
                .len(),
            1
        );
        assert_eq!(graph.roots_of(&addr("S", "A4")), vec![addr("S", "A1")]);
    }

    #[test]
    fn test_descendants_terminate_on_cycle() {
        let store = store(&[("A1", "=B1+1"), ("B1", "=A1*2")]);
        let graph = DependencyGraph::build(&store);
        let desc = graph.descendants(&addr("S", "A1"), TraversalScope::AllSheets);
        assert_eq!(desc.len(), 2);
    }

    #[test]
    fn test_same_sheet_scope() {
        let store = CellStore::from_raw(vec![
            RawSheet::new("A").with_cell("A1", "1").with_cell("A2", "=A1"),
            RawSheet::new("B").with_cell("A1", "=A!A1"),
        ]);
        let graph = DependencyGraph::build(&store);
        assert_eq!(graph.descendants(&addr("A", "A1"), TraversalScope::AllSheets).len(), 2);
        assert_eq!(graph.descendants(&addr("A", "A1"), TraversalScope::SameSheet).len(), 1);
    }

    #[test]
    fn test_virtual_cells_hang_off_anchor() {
        let store = CellStore::from_raw(vec![
            RawSheet::new("S")
                .with_cell("A1", "7")
                .with_merge("A1:A2")
                .with_cell("B2", "=A2*3"),
        ]);
        let graph = DependencyGraph::build(&store);
        let desc = graph.descendants(&addr("S", "A1"), TraversalScope::AllSheets);
        assert!(desc.contains(&addr("S", "A2")));
        assert!(desc.contains(&addr("S", "B2")));
    }

    #[test]
    fn test_oversized_range_is_unresolved() {
        let store = store(&[("A1", "1"), ("A300", "2"), ("B1", "=SUM(A1:A300)")]);
        let graph = GraphBuilder::new().with_max_range_cells(100).build(&store);
        assert_eq!(graph.unresolved()[0].reason, UnresolvedReason::OversizedRange);
        assert_eq!(graph.diagnostics()[0].kind, DiagnosticKind::OversizedRange);
    }

    #[test]
    fn test_large_whole_column_range_scans_stored_cells() {
        let store = store(&[("A1", "1"), ("A9000", "2"), ("B1", "=SUM(A:A)")]);
        let graph = DependencyGraph::build(&store);
        assert_eq!(graph.precedents(&addr("S", "B1")).len(), 2);
    }

    #[test]
    fn test_neighborhood_is_bounded() {
        let store = store(&[("A1", "1"), ("A2", "=A1"), ("A3", "=A2"), ("A4", "=A3")]);
        let graph = DependencyGraph::build(&store);
        let hood = graph.neighborhood(&addr("S", "A2"), 1);
        assert_eq!(hood.nodes, vec![addr("S", "A1"), addr("S", "A2"), addr("S", "A3")]);
        assert_eq!(hood.edges.len(), 2);
    }
}
