//! Workbook model API: cells, references, storage and the dependency graph.

mod cell;
mod cell_ref;
mod cycle;
mod deps;
mod diagnostic;
mod graph;
mod lexer;
mod shape;
mod store;

pub use cell::{Cell, CellOrigin, CellValue, ERROR_CODES, ValueKind, format_number};
pub use cell_ref::{A1Ref, CellAddr, CellRef, MAX_COLUMNS, MAX_ROWS, RangeBounds, unquote_sheet};
pub use cycle::{CycleReport, detect_cycle, detect_cycles};
pub use deps::{
    Literal, MAX_DEPENDENCY_RANGE_CELLS, RefTarget, Reference, extract_dependencies,
    extract_references, is_dynamic_formula, numeric_literals, parse_range,
};
pub use diagnostic::{Diagnostic, DiagnosticKind};
pub use graph::{
    DependencyGraph, GraphBuilder, Neighborhood, TraversalScope, UnresolvedReason,
    UnresolvedReference,
};
pub use lexer::{RefToken, Token, tokenize};
pub use shape::{formula_pattern, formula_shape};
pub use store::{CellStore, RawSheet, RawWorkbook, Resolved, Sheet};
