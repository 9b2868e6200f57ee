//! Spreadsheet import via calamine (xlsx, xlsm, xlsb, xls, ods).
//!
//! Cached values come from the value range and formula text from the formula
//! range; the two may start at different offsets. Merged regions are read for
//! xlsx only. Dates are kept as ISO text.
//!
//! A sheet whose cells cannot be read is dropped with a diagnostic; the
//! others are still imported. Only a workbook with no readable sheet at all
//! is an error.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use calamine::{Data, Reader, Sheets, open_workbook_auto};
use chrono::{NaiveDateTime, NaiveTime};
use tracing::{debug, warn};

use gridlens_engine::engine::{
    Cell, CellRef, CellValue, Diagnostic, DiagnosticKind, MAX_COLUMNS, MAX_ROWS, RangeBounds,
    RawSheet, RawWorkbook,
};

use crate::error::{GridlensError, Result};

/// Read every sheet of a workbook file.
pub fn read_workbook(path: &Path) -> Result<RawWorkbook> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| GridlensError::Workbook(format!("{}: {}", path.display(), e)))?;
    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    if sheet_names.is_empty() {
        return Err(GridlensError::NoSheets);
    }

    let merges_loaded = match &mut workbook {
        Sheets::Xlsx(xlsx) => match xlsx.load_merged_regions() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "merged regions unreadable; continuing without merges");
                false
            }
        },
        _ => false,
    };

    let mut outcomes = Vec::with_capacity(sheet_names.len());
    for name in &sheet_names {
        let outcome = read_sheet(&mut workbook, name, merges_loaded);
        outcomes.push((name.clone(), outcome));
    }
    collect_sheets(outcomes)
}

fn read_sheet(workbook: &mut Sheets<BufReader<File>>, name: &str, merges_loaded: bool) -> Result<RawSheet> {
    let mut raw = RawSheet::new(name);
    read_values(workbook, name, &mut raw)?;
    read_formulas(workbook, name, &mut raw);
    if merges_loaded {
        if let Sheets::Xlsx(xlsx) = &*workbook {
            for (_, _, dims) in xlsx.merged_regions_by_sheet(name) {
                let bounds = RangeBounds::new(
                    CellRef::new(dims.start.0 as usize, dims.start.1 as usize),
                    CellRef::new(dims.end.0 as usize, dims.end.1 as usize),
                );
                raw.merges.push(bounds.to_string());
            }
        }
    }
    debug!(sheet = %name, cells = raw.cells.len(), merges = raw.merges.len(), "sheet imported");
    Ok(raw)
}

/// Keep the sheets that read cleanly and turn each failure into a
/// `SheetUnreadable` diagnostic.
fn collect_sheets(outcomes: Vec<(String, Result<RawSheet>)>) -> Result<RawWorkbook> {
    let mut workbook = RawWorkbook::default();
    for (name, outcome) in outcomes {
        match outcome {
            Ok(raw) => workbook.sheets.push(raw),
            Err(e) => {
                warn!(sheet = %name, error = %e, "sheet unreadable; skipped");
                workbook.issues.push(
                    Diagnostic::new(DiagnosticKind::SheetUnreadable, format!("sheet skipped: {}", e))
                        .on_sheet(name),
                );
            }
        }
    }
    if workbook.sheets.is_empty() {
        return Err(GridlensError::NoSheets);
    }
    Ok(workbook)
}

fn in_limits(row: usize, col: usize) -> bool {
    row < MAX_ROWS && col < MAX_COLUMNS
}

fn read_values(workbook: &mut Sheets<BufReader<File>>, name: &str, raw: &mut RawSheet) -> Result<()> {
    let range = workbook
        .worksheet_range(name)
        .map_err(|e| GridlensError::Workbook(format!("sheet '{}': {}", name, e)))?;
    let (height, width) = range.get_size();
    if height == 0 || width == 0 {
        return Ok(());
    }
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    let mut truncated = false;

    for (row_idx, row) in range.rows().enumerate() {
        let target_row = start_row as usize + row_idx;
        for (col_idx, data) in row.iter().enumerate() {
            let target_col = start_col as usize + col_idx;
            if !in_limits(target_row, target_col) {
                truncated = true;
                continue;
            }
            let value = match data {
                Data::Empty => continue,
                Data::String(s) => CellValue::Text(s.clone()),
                Data::Float(n) => CellValue::Number(*n),
                Data::Int(n) => CellValue::Number(*n as f64),
                Data::Bool(b) => CellValue::Bool(*b),
                Data::Error(e) => CellValue::Error(e.to_string()),
                Data::DateTime(dt) => match dt.as_datetime() {
                    Some(when) => CellValue::Text(date_text(when)),
                    None => CellValue::Number(dt.as_f64()),
                },
                Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
            };
            raw.cells
                .push((CellRef::new(target_row, target_col), Cell::with_value(value)));
        }
    }

    if truncated {
        raw.issues.push(
            Diagnostic::new(
                DiagnosticKind::TruncatedSheet,
                format!("cells beyond {} rows or {} columns skipped", MAX_ROWS, MAX_COLUMNS),
            )
            .on_sheet(name),
        );
    }
    Ok(())
}

/// Midnight timestamps print as a bare date.
fn date_text(when: NaiveDateTime) -> String {
    if when.time() == NaiveTime::MIN {
        when.format("%Y-%m-%d").to_string()
    } else {
        when.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Layer formula text over the cached values. A sheet whose formulas cannot
/// be read keeps its values.
fn read_formulas(workbook: &mut Sheets<BufReader<File>>, name: &str, raw: &mut RawSheet) {
    let formulas = match workbook.worksheet_formula(name) {
        Ok(range) => range,
        Err(e) => {
            debug!(sheet = %name, error = %e, "no formulas read");
            return;
        }
    };
    let mut index: HashMap<CellRef, usize> = raw
        .cells
        .iter()
        .enumerate()
        .map(|(i, (r, _))| (*r, i))
        .collect();
    let (start_row, start_col) = formulas.start().unwrap_or((0, 0));
    for (row_idx, row) in formulas.rows().enumerate() {
        let target_row = start_row as usize + row_idx;
        for (col_idx, formula) in row.iter().enumerate() {
            let target_col = start_col as usize + col_idx;
            if formula.is_empty() || !in_limits(target_row, target_col) {
                continue;
            }
            let cell_ref = CellRef::new(target_row, target_col);
            let formula = strip_ods_prefix(formula);
            match index.get(&cell_ref) {
                Some(&i) => {
                    let cell = &mut raw.cells[i].1;
                    let cached = std::mem::replace(&mut cell.value, CellValue::Empty);
                    *cell = Cell::new_formula(&formula, cached);
                }
                None => {
                    index.insert(cell_ref, raw.cells.len());
                    raw.cells.push((cell_ref, Cell::new_formula(&formula, CellValue::Empty)));
                }
            }
        }
    }
}

/// ODS formulas carry an `of:` namespace and bracketed references
/// (`of:=SUM([.A1:.A3])`); reduce them to plain A1 text.
fn strip_ods_prefix(formula: &str) -> String {
    let formula = formula.strip_prefix("of:").unwrap_or(formula);
    if !formula.contains("[.") {
        return formula.to_string();
    }
    formula
        .replace("[.", "")
        .replace(":.", ":")
        .replace(']', "")
        .replace(';', ",")
}
