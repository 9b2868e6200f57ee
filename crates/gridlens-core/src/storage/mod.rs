//! Workbook readers and report writers.

pub mod export;
pub mod grd;
pub mod xlsx;

use std::path::Path;
use tracing::info;

use gridlens_engine::engine::CellStore;

use crate::error::{GridlensError, Result};

pub use export::{RiskRecord, export_risks, risk_records, write_changes_json, write_risks_csv, write_risks_json};

/// Load a workbook, choosing the reader by file extension.
pub fn load_workbook(path: &Path) -> Result<CellStore> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let raw = match ext.as_str() {
        "grd" => grd::parse_grd(path)?,
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => xlsx::read_workbook(path)?,
        _ => return Err(GridlensError::UnsupportedFormat(path.display().to_string())),
    };
    if raw.sheets.is_empty() {
        return Err(GridlensError::NoSheets);
    }
    let store = CellStore::from_workbook(raw);
    info!(
        path = %path.display(),
        sheets = store.sheets().len(),
        cells = store.cell_count(),
        "workbook read"
    );
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_grd() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.grd");
        std::fs::write(&path, "[Inputs]\nA1: 1\nB1: =A1*2\n").unwrap();
        let store = load_workbook(&path).unwrap();
        assert_eq!(store.sheets().len(), 1);
        assert_eq!(store.cell_count(), 2);
    }

    #[test]
    fn test_unknown_extension() {
        let err = load_workbook(Path::new("model.txt")).unwrap_err();
        assert!(matches!(err, GridlensError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_empty_grd_has_no_sheets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.grd");
        std::fs::write(&path, "# nothing here\n").unwrap();
        assert!(matches!(load_workbook(&path), Err(GridlensError::NoSheets)));
    }

    #[test]
    fn test_damaged_region_reaches_store_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.grd");
        std::fs::write(&path, "[Inputs]\nA1: 1\n[Calc\nA1: =Inputs!A1\n").unwrap();
        let store = load_workbook(&path).unwrap();
        assert_eq!(store.sheets().len(), 1);
        assert_eq!(store.diagnostics().len(), 1);
        assert_eq!(store.diagnostics()[0].kind, gridlens_engine::engine::DiagnosticKind::SheetUnreadable);
    }
}
