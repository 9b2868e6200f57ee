//! gridlens_engine - Workbook model: cells, virtual fill, formula references
//! and the cell dependency graph.

pub mod engine;

#[cfg(test)]
mod tests {
    use crate::engine::*;

    fn store(cells: &[(&str, &str)]) -> CellStore {
        let mut raw = RawSheet::new("Sheet1");
        for (a1, input) in cells {
            raw = raw.with_cell(a1, input);
        }
        CellStore::from_raw(vec![raw])
    }

    fn addr(a1: &str) -> CellAddr {
        CellAddr::new("Sheet1", CellRef::from_str(a1).unwrap())
    }

    #[test]
    fn test_from_str_single_letter_columns() {
        let a1 = CellRef::from_str("A1").unwrap();
        assert_eq!(a1.row, 0);
        assert_eq!(a1.col, 0);

        let b1 = CellRef::from_str("B1").unwrap();
        assert_eq!(b1.row, 0);
        assert_eq!(b1.col, 1);

        let z1 = CellRef::from_str("Z1").unwrap();
        assert_eq!(z1.col, 25);
    }

    #[test]
    fn test_from_str_multi_letter_columns() {
        assert_eq!(CellRef::from_str("AA1").unwrap().col, 26);
        assert_eq!(CellRef::from_str("AZ1").unwrap().col, 51);
        assert_eq!(CellRef::from_str("BN4").unwrap().col, 65);
    }

    #[test]
    fn test_from_str_case_insensitive() {
        let lower = CellRef::from_str("f4").unwrap();
        assert_eq!(lower, CellRef::new(3, 5));
    }

    #[test]
    fn test_from_str_invalid_inputs() {
        assert!(CellRef::from_str("").is_none());
        assert!(CellRef::from_str("A").is_none());
        assert!(CellRef::from_str("1").is_none());
        assert!(CellRef::from_str("A0").is_none());
        assert!(CellRef::from_str("1A").is_none());
        assert!(CellRef::from_str("A1B").is_none());
    }

    #[test]
    fn test_display_round_trip() {
        for name in ["A1", "Z9", "AA10", "BN4", "XFD1048576"] {
            assert_eq!(CellRef::from_str(name).unwrap().to_string(), name);
        }
    }

    #[test]
    fn test_extract_dependencies_empty() {
        assert!(extract_dependencies("1 + 2").is_empty());
    }

    #[test]
    fn test_extract_dependencies_duplicates() {
        let deps = extract_dependencies("A1 + A1");
        assert_eq!(deps.len(), 2);
    }

    #[test]
    fn test_detect_cycle_indirect() {
        let store = store(&[("A1", "=B1"), ("B1", "=C1"), ("C1", "=A1")]);
        let graph = DependencyGraph::build(&store);
        let cycle = detect_cycle(&addr("A1"), &graph).unwrap();
        assert_eq!(cycle.len(), 3);
        assert_eq!(detect_cycles(&graph, 100).cycles.len(), 1);
    }

    #[test]
    fn test_merged_formula_feeds_references_into_covered_cells() {
        let store = CellStore::from_raw(vec![
            RawSheet::new("Sheet1")
                .with_cell("A1", "100")
                .with_cell("B1", "=A1*2")
                .with_merge("B1:B3")
                .with_cell("C3", "=B3+1"),
        ]);
        let graph = DependencyGraph::build(&store);
        let desc = graph.descendants(&addr("A1"), TraversalScope::AllSheets);
        assert!(desc.contains(&addr("B1")));
        assert!(desc.contains(&addr("B3")));
        assert!(desc.contains(&addr("C3")));
    }

    #[test]
    fn test_every_edge_endpoint_is_stored() {
        let store = store(&[
            ("A1", "1"),
            ("A2", "=A1+Z50+SUM(A1:C9)"),
            ("B2", "=Other!A1"),
        ]);
        let graph = DependencyGraph::build(&store);
        for (from, to) in graph.edges() {
            assert!(store.get(from).is_some(), "{} missing", from);
            assert!(store.get(to).is_some(), "{} missing", to);
        }
        assert_eq!(graph.unresolved().len(), 1);
    }

    #[test]
    fn test_one_cell_feeding_two_has_two_descendants() {
        let store = store(&[("A1", "=5*2"), ("B1", "=A1+1"), ("C1", "=A1-1")]);
        let graph = DependencyGraph::build(&store);
        assert_eq!(graph.descendants(&addr("A1"), TraversalScope::AllSheets).len(), 2);
    }
}
