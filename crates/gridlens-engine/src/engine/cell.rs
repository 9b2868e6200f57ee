//! Cell data structures for a workbook snapshot.
//!
//! - [`CellValue`] - the raw value a cell displays (empty, text, number, boolean, error code)
//! - [`CellOrigin`] - whether the cell was authored or filled in from a merged range
//! - [`Cell`] - value, optional formula text and origin, immutable once stored

use serde::{Deserialize, Serialize};

use super::cell_ref::CellRef;
use super::deps::is_dynamic_formula;

/// Error codes a spreadsheet may display in place of a value.
pub const ERROR_CODES: &[&str] = &[
    "#REF!", "#DIV/0!", "#VALUE!", "#NAME?", "#N/A", "#NUM!", "#NULL!",
];

/// The raw value of a cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Error(String),
}

impl CellValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            CellValue::Empty => ValueKind::Empty,
            CellValue::Text(_) => ValueKind::Text,
            CellValue::Number(_) => ValueKind::Numeric,
            CellValue::Bool(_) => ValueKind::Boolean,
            CellValue::Error(_) => ValueKind::Error,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Parse a displayed value: error codes, booleans and numbers are recognized,
    /// anything else is text.
    pub fn parse(raw: &str) -> CellValue {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CellValue::Empty;
        }
        if let Some(code) = ERROR_CODES.iter().find(|c| c.eq_ignore_ascii_case(trimmed)) {
            return CellValue::Error((*code).to_string());
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return CellValue::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return CellValue::Bool(false);
        }
        if let Ok(n) = trimmed.parse::<f64>() {
            return CellValue::Number(n);
        }
        CellValue::Text(raw.to_string())
    }

    pub fn display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::Error(e) => e.clone(),
        }
    }
}

/// Coarse classification of a cell value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Empty,
    Text,
    Numeric,
    Boolean,
    Error,
}

/// Where a stored cell came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellOrigin {
    Authored,
    /// Filled in from the anchor (top-left) cell of a merged range.
    Virtual { anchor: CellRef },
}

/// A cell in a workbook snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub value: CellValue,
    /// Formula text without the leading '='.
    pub formula: Option<String>,
    pub origin: CellOrigin,
    /// Formula uses INDIRECT/OFFSET/ADDRESS, so its references are only partly static.
    pub dynamic: bool,
}

impl Cell {
    pub fn new_empty() -> Cell {
        Cell::with_value(CellValue::Empty)
    }

    pub fn new_text(text: &str) -> Cell {
        Cell::with_value(CellValue::Text(text.to_string()))
    }

    pub fn new_number(n: f64) -> Cell {
        Cell::with_value(CellValue::Number(n))
    }

    pub fn with_value(value: CellValue) -> Cell {
        Cell {
            value,
            formula: None,
            origin: CellOrigin::Authored,
            dynamic: false,
        }
    }

    /// Create a formula cell. `cached` is the last value the producing
    /// application computed, if the file carried one.
    pub fn new_formula(formula: &str, cached: CellValue) -> Cell {
        let formula = formula.trim();
        let formula = formula.strip_prefix('=').unwrap_or(formula).to_string();
        Cell {
            dynamic: is_dynamic_formula(&formula),
            value: cached,
            formula: Some(formula),
            origin: CellOrigin::Authored,
        }
    }

    /// Parse user input and create appropriate cell type.
    /// - Empty string or whitespace -> Empty
    /// - Starts with '=' -> formula (without the '=')
    /// - Quoted string -> Text (without quotes)
    /// - Error code, boolean or number -> that value
    /// - Otherwise -> Text
    pub fn from_input(input: &str) -> Cell {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Cell::new_empty();
        }

        if trimmed.starts_with('=') {
            return Cell::new_formula(trimmed, CellValue::Empty);
        }

        if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
            let text = &trimmed[1..trimmed.len() - 1];
            return Cell::new_text(text);
        }

        Cell::with_value(CellValue::parse(trimmed))
    }

    /// Copy of this cell placed under a merge anchored at `anchor`.
    pub fn virtual_copy(&self, anchor: CellRef) -> Cell {
        Cell {
            origin: CellOrigin::Virtual { anchor },
            ..self.clone()
        }
    }

    pub fn is_formula(&self) -> bool {
        self.formula.is_some()
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self.origin, CellOrigin::Virtual { .. })
    }

    pub fn kind(&self) -> ValueKind {
        self.value.kind()
    }

    /// A plain numeric input: authored, no formula, numeric value.
    pub fn is_numeric_input(&self) -> bool {
        !self.is_formula() && !self.is_virtual() && matches!(self.value, CellValue::Number(_))
    }

    /// Get a display string for the cell content (for editing).
    pub fn to_input_string(&self) -> String {
        match &self.formula {
            Some(f) => format!("={}", f),
            None => self.value.display(),
        }
    }
}

/// Format a number the way it is written in a formula: integers without a
/// trailing ".0", everything else with the shortest round-tripping repr.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_input_kinds() {
        assert_eq!(Cell::from_input("  ").kind(), ValueKind::Empty);
        assert_eq!(Cell::from_input("12.5").value, CellValue::Number(12.5));
        assert_eq!(Cell::from_input("\"42\"").value, CellValue::Text("42".into()));
        assert_eq!(Cell::from_input("TRUE").value, CellValue::Bool(true));
        assert_eq!(Cell::from_input("#div/0!").value, CellValue::Error("#DIV/0!".into()));
        assert_eq!(Cell::from_input("Revenue").kind(), ValueKind::Text);
    }

    #[test]
    fn test_formula_strips_equals() {
        let cell = Cell::from_input("=F4*1000");
        assert_eq!(cell.formula.as_deref(), Some("F4*1000"));
        assert!(!cell.dynamic);
        assert_eq!(cell.to_input_string(), "=F4*1000");
    }

    #[test]
    fn test_dynamic_flag() {
        let cell = Cell::from_input("=SUM(INDIRECT(\"A\"&B1))");
        assert!(cell.dynamic);
    }

    #[test]
    fn test_virtual_copy_keeps_content() {
        let anchor = CellRef::new(0, 0);
        let cell = Cell::from_input("=A2*3").virtual_copy(anchor);
        assert!(cell.is_virtual());
        assert_eq!(cell.formula.as_deref(), Some("A2*3"));
        assert!(!cell.is_numeric_input());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1000.0), "1000");
        assert_eq!(format_number(201.26), "201.26");
        assert_eq!(format_number(-0.5), "-0.5");
    }
}
