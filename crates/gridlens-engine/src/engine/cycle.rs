use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::NodeIndex;
use std::collections::{HashMap, HashSet, VecDeque};

use super::cell_ref::CellAddr;
use super::graph::DependencyGraph;

/// Upper bound on DFS steps spent enumerating cycles in one workbook.
const MAX_CYCLE_SEARCH_STEPS: usize = 2_000_000;

/// Simple cycles found in a graph, each listed in edge order
/// (each cell feeds the next, the last feeds the first).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycles: Vec<Vec<CellAddr>>,
    /// More cycles exist than were enumerated.
    pub truncated: bool,
}

/// Enumerate simple cycles, at most `max_cycles` of them.
///
/// Each strongly connected component is searched separately. A cycle is
/// reported once, starting from its lowest node index, using an explicit
/// stack so pathological workbooks cannot exhaust the call stack.
pub fn detect_cycles(graph: &DependencyGraph, max_cycles: usize) -> CycleReport {
    let g = graph.inner();
    let mut report = CycleReport::default();
    let mut steps = 0usize;

    for component in tarjan_scc(g) {
        let self_loop = component.len() == 1 && g.contains_edge(component[0], component[0]);
        if component.len() < 2 && !self_loop {
            continue;
        }
        let members: HashSet<NodeIndex> = component.iter().copied().collect();
        let mut starts = component.clone();
        starts.sort();

        for &start in &starts {
            let mut path: Vec<NodeIndex> = vec![start];
            let mut on_path: HashSet<NodeIndex> = HashSet::from([start]);
            let mut stack: Vec<(Vec<NodeIndex>, usize)> = vec![(successors(graph, start, &members), 0)];

            while let Some((succs, pos)) = stack.last_mut() {
                steps += 1;
                if steps > MAX_CYCLE_SEARCH_STEPS {
                    report.truncated = true;
                    return finish(report);
                }
                if *pos >= succs.len() {
                    stack.pop();
                    if let Some(node) = path.pop() {
                        on_path.remove(&node);
                    }
                    continue;
                }
                let next = succs[*pos];
                *pos += 1;
                if next == start {
                    if report.cycles.len() >= max_cycles {
                        report.truncated = true;
                        return finish(report);
                    }
                    report
                        .cycles
                        .push(path.iter().map(|n| g[*n].clone()).collect());
                } else if next > start && !on_path.contains(&next) {
                    path.push(next);
                    on_path.insert(next);
                    stack.push((successors(graph, next, &members), 0));
                }
            }
        }
    }
    finish(report)
}

fn successors(graph: &DependencyGraph, node: NodeIndex, members: &HashSet<NodeIndex>) -> Vec<NodeIndex> {
    let mut out: Vec<NodeIndex> = graph
        .inner()
        .neighbors_directed(node, Direction::Outgoing)
        .filter(|n| members.contains(n))
        .collect();
    out.sort();
    out.dedup();
    out
}

fn finish(mut report: CycleReport) -> CycleReport {
    report.cycles.sort();
    report
}

/// Detect circular dependencies starting from a cell.
/// Returns Some(cycle_path) if the cell sits on a cycle, None otherwise.
pub fn detect_cycle(start: &CellAddr, graph: &DependencyGraph) -> Option<Vec<CellAddr>> {
    let idx = graph.node_index(start)?;
    let g = graph.inner();
    // Breadth-first with parent links; the first edge back into `start`
    // closes the shortest cycle through it.
    let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut queue = VecDeque::from([idx]);
    while let Some(node) = queue.pop_front() {
        for next in g.neighbors_directed(node, Direction::Outgoing) {
            if next == idx {
                let mut path = vec![g[node].clone()];
                let mut cur = node;
                while let Some(&prev) = parent.get(&cur) {
                    path.push(g[prev].clone());
                    cur = prev;
                }
                path.reverse();
                return Some(path);
            }
            if next != idx && !parent.contains_key(&next) {
                parent.insert(next, node);
                queue.push_back(next);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cell_ref::CellRef;
    use crate::engine::store::{CellStore, RawSheet};

    fn graph(cells: &[(&str, &str)]) -> DependencyGraph {
        let mut raw = RawSheet::new("S");
        for (a1, input) in cells {
            raw = raw.with_cell(a1, input);
        }
        DependencyGraph::build(&CellStore::from_raw(vec![raw]))
    }

    fn addr(a1: &str) -> CellAddr {
        CellAddr::new("S", CellRef::from_str(a1).unwrap())
    }

    #[test]
    fn test_two_cell_cycle() {
        let g = graph(&[("A1", "=B1+1"), ("B1", "=A1*2")]);
        let report = detect_cycles(&g, 100);
        assert_eq!(report.cycles.len(), 1);
        assert_eq!(report.cycles[0].len(), 2);
        assert!(!report.truncated);
    }

    #[test]
    fn test_self_reference() {
        let g = graph(&[("A1", "=A1+1")]);
        let report = detect_cycles(&g, 100);
        assert_eq!(report.cycles, vec![vec![addr("A1")]]);
    }

    #[test]
    fn test_acyclic_graph_has_no_cycles() {
        let g = graph(&[("A1", "1"), ("A2", "=A1"), ("A3", "=A1+A2")]);
        assert!(detect_cycles(&g, 100).cycles.is_empty());
        assert!(detect_cycle(&addr("A3"), &g).is_none());
    }

    #[test]
    fn test_overlapping_cycles_each_reported_once() {
        // A1 -> B1 -> A1 and A1 -> C1 -> A1
        let g = graph(&[("A1", "=B1+C1"), ("B1", "=A1"), ("C1", "=A1")]);
        let report = detect_cycles(&g, 100);
        assert_eq!(report.cycles.len(), 2);
    }

    #[test]
    fn test_cap_truncates() {
        let g = graph(&[("A1", "=B1+C1+D1"), ("B1", "=A1"), ("C1", "=A1"), ("D1", "=A1")]);
        let report = detect_cycles(&g, 2);
        assert_eq!(report.cycles.len(), 2);
        assert!(report.truncated);
    }

    #[test]
    fn test_detect_cycle_from_member() {
        let g = graph(&[("A1", "=C1"), ("B1", "=A1"), ("C1", "=B1")]);
        let path = detect_cycle(&addr("B1"), &g).unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path[0], addr("B1"));
    }
}
