//! Spatial compression of raw alerts.
//!
//! Alerts of one type on one sheet (and, where it matters, with the same
//! literal, label or cycle) are merged when they touch: some pair of their
//! cells has both the row gap and the column gap at most 1. Touching is
//! transitive, so F4, F5 and F6 form one run. F4/F8 and F4/BN4 stay apart.

use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use gridlens_engine::engine::CellRef;

use crate::risk::{Location, RiskAlert, RiskDetails, RiskType};

const MAX_GAP: usize = 1;

pub fn compress(alerts: Vec<RiskAlert>) -> Vec<RiskAlert> {
    let raw = alerts.len();
    let mut groups: BTreeMap<(RiskType, String, String), Vec<RiskAlert>> = BTreeMap::new();
    for alert in alerts {
        let key = (alert.risk_type, alert.sheet.clone(), alert.details.group_key());
        groups.entry(key).or_default().push(alert);
    }

    let mut out = Vec::new();
    for (_, mut group) in groups {
        group.sort_by_key(|a| a.location.first());
        out.extend(clusters(group).into_iter().map(merge));
    }
    debug!(raw, compressed = out.len(), "alerts compressed");
    out
}

/// Split a group into touching clusters (8-neighbour connectivity over member
/// cells). Cluster order and member order follow the sorted input.
fn clusters(group: Vec<RiskAlert>) -> Vec<Vec<RiskAlert>> {
    let mut parent: Vec<usize> = (0..group.len()).collect();
    let mut owner: HashMap<CellRef, usize> = HashMap::new();
    for (i, alert) in group.iter().enumerate() {
        for cell in &alert.members {
            for neighbour in neighbours(*cell) {
                if let Some(&j) = owner.get(&neighbour) {
                    union(&mut parent, i, j);
                }
            }
        }
        for cell in &alert.members {
            owner.entry(*cell).or_insert(i);
        }
    }

    let mut by_root: BTreeMap<usize, Vec<RiskAlert>> = BTreeMap::new();
    let mut order: Vec<usize> = Vec::new();
    for (i, alert) in group.into_iter().enumerate() {
        let root = find(&mut parent, i);
        let cluster = by_root.entry(root).or_default();
        if cluster.is_empty() {
            order.push(root);
        }
        cluster.push(alert);
    }
    order
        .into_iter()
        .filter_map(|root| by_root.remove(&root))
        .collect()
}

fn neighbours(cell: CellRef) -> impl Iterator<Item = CellRef> {
    let rows = cell.row.saturating_sub(MAX_GAP)..=cell.row + MAX_GAP;
    rows.flat_map(move |row| {
        (cell.col.saturating_sub(MAX_GAP)..=cell.col + MAX_GAP).map(move |col| CellRef::new(row, col))
    })
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        let (low, high) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[high] = low;
    }
}

/// Fold a touching cluster into one alert. The first member supplies the
/// details and context label.
fn merge(mut cluster: Vec<RiskAlert>) -> RiskAlert {
    if cluster.len() == 1 {
        return cluster.remove(0);
    }
    let count: usize = cluster.iter().map(RiskAlert::instance_count).sum();
    let severity = cluster.iter().map(|a| a.severity).max().unwrap_or(cluster[0].severity);
    let mut members: Vec<_> = cluster.iter().flat_map(|a| a.members.iter().copied()).collect();
    members.sort();
    members.dedup();
    let last = cluster
        .iter()
        .map(|a| a.location.last())
        .max()
        .unwrap_or(cluster[0].location.last());

    let first = cluster.swap_remove(0);
    let description = compressed_description(&first, count);
    RiskAlert {
        severity,
        location: Location::Range {
            first: first.location.first(),
            last,
            count,
        },
        members,
        description,
        ..first
    }
}

fn compressed_description(first: &RiskAlert, count: usize) -> String {
    match (&first.risk_type, &first.details) {
        (RiskType::HiddenHardcode, RiskDetails::Hardcode { literal, .. }) => {
            format!("Hardcoded value '{}' ({} instances)", literal, count)
        }
        (RiskType::PhantomLink, _) => format!("External link detected ({} instances)", count),
        (RiskType::InconsistentFormula, _) => {
            format!("Inconsistent formula pattern ({} instances)", count)
        }
        (RiskType::InconsistentValue | RiskType::ValueConflict, _) => {
            format!("Conflicting values detected ({} instances)", count)
        }
        (kind, _) => format!("{} ({} instances)", kind, count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::Severity;

    fn hardcode(a1: &str, value: f64) -> RiskAlert {
        RiskAlert::new(
            RiskType::HiddenHardcode,
            Severity::High,
            "S",
            CellRef::from_str(a1).unwrap(),
            "raw",
            RiskDetails::Hardcode {
                literal: value.to_string(),
                value,
                formula: value.to_string(),
                allowed: false,
            },
        )
    }

    #[test]
    fn test_adjacent_rows_merge() {
        let out = compress(vec![hardcode("F5", 201.26), hardcode("F4", 201.26)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].location.to_string(), "F4...F5");
        assert_eq!(out[0].instance_count(), 2);
    }

    #[test]
    fn test_far_row_does_not_merge() {
        let out = compress(vec![hardcode("F4", 201.26), hardcode("F8", 201.26)]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_far_column_same_row_does_not_merge() {
        let out = compress(vec![hardcode("F4", 201.26), hardcode("BN4", 201.26)]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_diagonal_neighbours_merge() {
        let out = compress(vec![hardcode("F4", 7.0), hardcode("G5", 7.0)]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_different_values_stay_apart() {
        let out = compress(vec![hardcode("F4", 201.26), hardcode("F5", 7.0)]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_run_of_three_keeps_ends_and_count() {
        let out = compress(vec![
            hardcode("F6", 201.26),
            hardcode("F4", 201.26),
            hardcode("F5", 201.26),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].location,
            Location::Range {
                first: CellRef::from_str("F4").unwrap(),
                last: CellRef::from_str("F6").unwrap(),
                count: 3,
            }
        );
        assert_eq!(out[0].description, "Hardcoded value '201.26' (3 instances)");
        assert_eq!(out[0].members.len(), 3);
    }

    #[test]
    fn test_unrelated_alert_between_neighbours_in_row_order() {
        // Row-major order is F4, BN4, F5; F4 and F5 still touch.
        let out = compress(vec![
            hardcode("F5", 3.3),
            hardcode("BN4", 3.3),
            hardcode("F4", 3.3),
        ]);
        let mut locations: Vec<String> = out.iter().map(|a| a.location.to_string()).collect();
        locations.sort();
        assert_eq!(locations, vec!["BN4", "F4...F5"]);
    }

    #[test]
    fn test_other_types_compress_too() {
        let merged = |a1: &str| {
            RiskAlert::new(
                RiskType::MergedCellRisk,
                Severity::Medium,
                "S",
                CellRef::from_str(a1).unwrap(),
                "raw",
                RiskDetails::MergedCell {
                    merge: "A1:A3".into(),
                    reference: "A1:A5".into(),
                },
            )
        };
        let out = compress(vec![merged("B1"), merged("B2"), merged("D9")]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].description, "Merged Cell Risk (2 instances)");
    }
}
