//! Rule-based label lookup and the label quality check.

use regex::Regex;
use std::sync::OnceLock;

use gridlens_engine::engine::{Cell, CellRef, CellValue, Sheet};

/// Row labels longer than this are shown without the column label.
const LONG_ROW_LABEL: usize = 30;
const MIN_LABEL_CHARS: usize = 2;
const MAX_LABEL_CHARS: usize = 50;

const STOPWORDS: &[&str] = &[
    "Total", "Sum", "Subtotal", "Check", "Val", "Value", "Amount", "Number", "Item", "Row",
    "Column", "合計", "小計", "計", "チェック", "検証", "値", "金額",
];

fn cell_address_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z]+[0-9]+$").expect("cell address regex must compile"))
}

fn symbols_only_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[-0-9\s]+$").expect("symbols regex must compile"))
}

fn operator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[+*/]").expect("operator regex must compile"))
}

fn period_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)^(?:
                \d{2}-\d{4}
              | \d{4}-\d{2}(?:-\d{2})?
              | \d{4}
              | [A-Z][a-z]{2}\s+\d{4}
              | Q\d(?:\s*\d{4})?
              | FY\s*\d{2,4}
            )$",
        )
        .expect("period regex must compile")
    })
}

/// Full-width spaces count as whitespace in labels.
pub fn normalize_label(text: &str) -> String {
    text.replace('\u{3000}', " ").trim().to_string()
}

fn is_year_like(n: f64) -> bool {
    n.fract() == 0.0 && (1900.0..=2100.0).contains(&n)
}

/// The label text a cell offers, if it may serve as a label at all.
/// Formulas and bare numbers are rejected; 4-digit years are kept.
pub fn label_candidate(cell: &Cell) -> Option<String> {
    if cell.is_formula() {
        return None;
    }
    match &cell.value {
        CellValue::Text(s) => {
            let text = normalize_label(s);
            if text.is_empty() || text.starts_with('=') {
                return None;
            }
            match text.replace(',', "").parse::<f64>() {
                Ok(n) if is_year_like(n) => Some(text),
                Ok(_) => None,
                Err(_) => Some(text),
            }
        }
        CellValue::Number(n) if is_year_like(*n) => Some(format!("{}", *n as i64)),
        _ => None,
    }
}

/// Nearest label to the left on the same row.
pub fn row_label(sheet: &Sheet, cell: CellRef) -> Option<String> {
    (0..cell.col)
        .rev()
        .filter_map(|col| sheet.get(&CellRef::new(cell.row, col)))
        .find_map(label_candidate)
}

/// Nearest label above the cell within the first `header_rows` rows.
pub fn col_label(sheet: &Sheet, cell: CellRef, header_rows: usize) -> Option<String> {
    (0..cell.row.min(header_rows))
        .rev()
        .filter_map(|row| sheet.get(&CellRef::new(row, cell.col)))
        .find_map(label_candidate)
}

/// True when a label carries no usable meaning and recovery should be tried.
pub fn is_poor_quality(label: &str) -> bool {
    let text = normalize_label(label);
    if text.is_empty() || text.starts_with('=') {
        return true;
    }
    if operator_re().is_match(&text) && !text.contains(' ') {
        return true;
    }
    if cell_address_re().is_match(&text) {
        return true;
    }
    if STOPWORDS.contains(&text.as_str()) {
        return true;
    }
    if symbols_only_re().is_match(&text) {
        return true;
    }
    let len = text.chars().count();
    !(MIN_LABEL_CHARS..=MAX_LABEL_CHARS).contains(&len)
}

pub fn is_period(text: &str) -> bool {
    period_re().is_match(text.trim())
}

/// `row @ col`, or just `row` when the column label is redundant, a bare
/// period, or the row label is already long.
pub fn format_display(row: &str, col: Option<&str>) -> String {
    let Some(col) = col.filter(|c| !c.is_empty()) else {
        return row.to_string();
    };
    let row_lower = row.to_lowercase();
    let col_lower = col.to_lowercase();
    let redundant = row_lower.contains(&col_lower) || col_lower.contains(&row_lower);
    if redundant || is_period(col) || row.chars().count() > LONG_ROW_LABEL {
        row.to_string()
    } else {
        format!("{} @ {}", row, col)
    }
}
