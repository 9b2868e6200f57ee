//! Normalized per-snapshot cell storage.
//!
//! [`CellStore::from_raw`] takes the cells and merged ranges a reader produced
//! and resolves every merge into virtual cells, so any coordinate inside a
//! sheet's extent resolves to exactly one cell (stored or blank). Damaged
//! merges are skipped one at a time and recorded as [`Diagnostic`]s.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use super::cell::Cell;
use super::cell_ref::{CellAddr, CellRef, RangeBounds};
use super::deps::MAX_DEPENDENCY_RANGE_CELLS;
use super::diagnostic::{Diagnostic, DiagnosticKind};

/// One sheet as a reader produced it, before merges are resolved.
#[derive(Clone, Debug, Default)]
pub struct RawSheet {
    pub name: String,
    pub cells: Vec<(CellRef, Cell)>,
    /// Merged ranges as A1 text ("B2:D2").
    pub merges: Vec<String>,
    /// Declared (rows, cols), if the source format records one.
    pub extent: Option<(usize, usize)>,
    /// Problems the reader already hit for this sheet.
    pub issues: Vec<Diagnostic>,
}

impl RawSheet {
    pub fn new(name: impl Into<String>) -> Self {
        RawSheet {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_cell(mut self, a1: &str, input: &str) -> Self {
        if let Some(cell_ref) = CellRef::from_str(a1) {
            self.cells.push((cell_ref, Cell::from_input(input)));
        }
        self
    }

    pub fn with_merge(mut self, range: &str) -> Self {
        self.merges.push(range.to_string());
        self
    }
}

/// Everything a reader produced for one workbook. `issues` holds problems
/// that belong to no surviving sheet (a header that would not parse, a sheet
/// the reader could not open).
#[derive(Clone, Debug, Default)]
pub struct RawWorkbook {
    pub sheets: Vec<RawSheet>,
    pub issues: Vec<Diagnostic>,
}

/// How a coordinate resolves.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Resolved<'a> {
    Stored(&'a Cell),
    /// Inside the extent but nothing stored.
    Blank,
    OutOfExtent,
}

#[derive(Clone, Debug)]
pub struct Sheet {
    name: String,
    cells: BTreeMap<CellRef, Cell>,
    merges: Vec<RangeBounds>,
    rows: usize,
    cols: usize,
}

impl Sheet {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// (rows, cols)
    pub fn extent(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn get(&self, cell: &CellRef) -> Option<&Cell> {
        self.cells.get(cell)
    }

    pub fn resolve(&self, cell: &CellRef) -> Resolved<'_> {
        if let Some(stored) = self.cells.get(cell) {
            return Resolved::Stored(stored);
        }
        if cell.row < self.rows && cell.col < self.cols {
            Resolved::Blank
        } else {
            Resolved::OutOfExtent
        }
    }

    /// Row-major iteration over stored cells.
    pub fn cells(&self) -> impl Iterator<Item = (&CellRef, &Cell)> {
        self.cells.iter()
    }

    pub fn formula_cells(&self) -> impl Iterator<Item = (&CellRef, &Cell)> {
        self.cells.iter().filter(|(_, c)| c.is_formula())
    }

    /// Stored cells of one row, left to right.
    pub fn row(&self, row: usize) -> impl Iterator<Item = (&CellRef, &Cell)> {
        self.cells
            .range(CellRef::new(row, 0)..CellRef::new(row + 1, 0))
    }

    pub fn merges(&self) -> &[RangeBounds] {
        &self.merges
    }

    pub fn merge_containing(&self, cell: &CellRef) -> Option<&RangeBounds> {
        self.merges.iter().find(|m| m.contains(cell))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// All sheets of one workbook snapshot. Immutable once built.
#[derive(Clone, Debug, Default)]
pub struct CellStore {
    sheets: Vec<Sheet>,
    index: HashMap<String, usize>,
    diagnostics: Vec<Diagnostic>,
}

impl CellStore {
    pub fn from_raw(raw_sheets: Vec<RawSheet>) -> CellStore {
        CellStore::from_workbook(RawWorkbook {
            sheets: raw_sheets,
            issues: Vec::new(),
        })
    }

    pub fn from_workbook(workbook: RawWorkbook) -> CellStore {
        let mut store = CellStore {
            diagnostics: workbook.issues,
            ..Default::default()
        };
        for raw in workbook.sheets {
            let key = raw.name.to_lowercase();
            store.diagnostics.extend(raw.issues.iter().cloned());
            if store.index.contains_key(&key) {
                warn!(sheet = %raw.name, "duplicate sheet name, skipping");
                store.diagnostics.push(
                    Diagnostic::new(DiagnosticKind::DuplicateSheet, "sheet name already used; later sheet skipped")
                        .on_sheet(&raw.name),
                );
                continue;
            }
            let sheet = build_sheet(raw, &mut store.diagnostics);
            store.index.insert(key, store.sheets.len());
            store.sheets.push(sheet);
        }
        store
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    /// Case-insensitive sheet lookup, as spreadsheet references are.
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.index
            .get(&name.to_lowercase())
            .map(|&idx| &self.sheets[idx])
    }

    pub fn get(&self, addr: &CellAddr) -> Option<&Cell> {
        self.sheet(&addr.sheet)?.get(&addr.cell)
    }

    pub fn resolve(&self, addr: &CellAddr) -> Resolved<'_> {
        match self.sheet(&addr.sheet) {
            Some(sheet) => sheet.resolve(&addr.cell),
            None => Resolved::OutOfExtent,
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn cell_count(&self) -> usize {
        self.sheets.iter().map(Sheet::len).sum()
    }
}

fn build_sheet(raw: RawSheet, diagnostics: &mut Vec<Diagnostic>) -> Sheet {
    let mut cells: BTreeMap<CellRef, Cell> = BTreeMap::new();
    for (cell_ref, cell) in raw.cells {
        if cells.insert(cell_ref, cell).is_some() {
            diagnostics.push(
                Diagnostic::new(DiagnosticKind::MalformedCell, "cell defined twice; last value kept")
                    .on_sheet(&raw.name)
                    .at(cell_ref.to_string()),
            );
        }
    }

    let (mut rows, mut cols) = raw.extent.unwrap_or((0, 0));
    if let Some((last, _)) = cells.last_key_value() {
        rows = rows.max(last.row + 1);
    }
    cols = cols.max(cells.keys().map(|c| c.col + 1).max().unwrap_or(0));

    let mut merges: Vec<RangeBounds> = Vec::new();
    for text in &raw.merges {
        let Some(range) = RangeBounds::parse(text) else {
            warn!(sheet = %raw.name, merge = %text, "unparsable merged range, skipping");
            diagnostics.push(
                Diagnostic::new(DiagnosticKind::MalformedMerge, "merged range could not be parsed")
                    .on_sheet(&raw.name)
                    .at(text.as_str()),
            );
            continue;
        };
        let count = range.cell_count().unwrap_or(usize::MAX);
        if count < 2 {
            warn!(sheet = %raw.name, merge = %text, "zero-size merged range, skipping");
            diagnostics.push(
                Diagnostic::new(DiagnosticKind::MalformedMerge, "merged range covers no other cells")
                    .on_sheet(&raw.name)
                    .at(text.as_str()),
            );
            continue;
        }
        if count > MAX_DEPENDENCY_RANGE_CELLS {
            warn!(sheet = %raw.name, merge = %text, count, "oversized merged range, skipping");
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::OversizedRange,
                    format!("merged range covers {} cells", count),
                )
                .on_sheet(&raw.name)
                .at(text.as_str()),
            );
            continue;
        }
        if let Some(existing) = merges.iter().find(|m| m.intersects(&range)) {
            warn!(sheet = %raw.name, merge = %text, other = %existing, "overlapping merged range, skipping");
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::OverlappingMerge,
                    format!("overlaps merged range {}", existing),
                )
                .on_sheet(&raw.name)
                .at(text.as_str()),
            );
            continue;
        }
        merges.push(range);
    }

    for range in &merges {
        rows = rows.max(range.end.row + 1);
        cols = cols.max(range.end.col + 1);
        let anchor = range.start;
        let Some(anchor_cell) = cells.get(&anchor).cloned() else {
            continue;
        };
        for covered in range.cells().filter(|c| *c != anchor) {
            let filled = anchor_cell.virtual_copy(anchor);
            if let Some(previous) = cells.insert(covered, filled) {
                if !previous.is_virtual() {
                    debug!(sheet = %raw.name, cell = %covered, "authored cell hidden under merge replaced");
                }
            }
        }
    }

    Sheet {
        name: raw.name,
        cells,
        merges,
        rows,
        cols,
    }
}
