//! Cell reference parsing and formatting.
//!
//! Provides bidirectional conversion between spreadsheet-style cell references
//! (e.g., "A1", "$B$2", "AA100") and zero-indexed column/row coordinates, plus
//! the sheet-qualified [`CellAddr`] used as a graph node and the rectangular
//! [`RangeBounds`] used for merges and range operands.
//!
//! # Examples
//!
//! ```ignore
//! let cell = CellRef::from_str("B3").unwrap();
//! assert_eq!(cell.col, 1);  // 0-indexed
//! assert_eq!(cell.row, 2);
//! assert_eq!(cell.to_string(), "B3");
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Columns beyond XFD do not exist in any spreadsheet format we read.
pub const MAX_COLUMNS: usize = 16_384;
/// Rows beyond 1,048,576 do not exist in any spreadsheet format we read.
pub const MAX_ROWS: usize = 1_048_576;

/// A reference to a cell by column and row indices (0-indexed).
///
/// Ordering is row-major, which is the order every scan in the crate uses.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

impl CellRef {
    pub fn new(row: usize, col: usize) -> CellRef {
        CellRef { row, col }
    }

    /// Parse a cell reference from spreadsheet notation (e.g., "A1", "B2", "$AA$10").
    /// Absolute markers are accepted and discarded. Returns None if the input is invalid.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(name: &str) -> Option<CellRef> {
        A1Ref::parse(name).map(|r| r.cell)
    }

    /// Convert column letters to a 0-indexed column ("A" -> 0, "AA" -> 26).
    pub fn col_from_letters(letters: &str) -> Option<usize> {
        if letters.is_empty() || !letters.bytes().all(|b| b.is_ascii_alphabetic()) {
            return None;
        }
        let mut col_acc = 0usize;
        for c in letters.to_ascii_uppercase().bytes() {
            let digit = (c - b'A') as usize + 1;
            col_acc = col_acc.checked_mul(26)?.checked_add(digit)?;
        }
        let col = col_acc.checked_sub(1)?;
        (col < MAX_COLUMNS).then_some(col)
    }

    /// Convert column index to spreadsheet-style letters (0 -> A, 25 -> Z, 26 -> AA).
    pub fn col_to_letters(col: usize) -> String {
        let mut result = String::new();
        let mut n = col as u128 + 1;
        while n > 0 {
            n -= 1;
            result.insert(0, (b'A' + (n % 26) as u8) as char);
            n /= 26;
        }
        result
    }

    /// Chebyshev distance components between two cells.
    pub fn gap(&self, other: &CellRef) -> (usize, usize) {
        (self.row.abs_diff(other.row), self.col.abs_diff(other.col))
    }
}

impl std::str::FromStr for CellRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CellRef::from_str(s).ok_or_else(|| format!("Invalid cell reference: {}", s))
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", CellRef::col_to_letters(self.col), self.row + 1)
    }
}

fn a1_re() -> &'static Regex {
    static A1_RE: OnceLock<Regex> = OnceLock::new();
    A1_RE.get_or_init(|| {
        Regex::new(r"^(?<col_abs>\$?)(?<letters>[A-Za-z]{1,3})(?<row_abs>\$?)(?<numbers>[0-9]+)$")
            .expect("A1 reference regex must compile")
    })
}

/// An A1 reference that remembers which components were anchored with `$`.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct A1Ref {
    pub cell: CellRef,
    pub col_abs: bool,
    pub row_abs: bool,
}

impl A1Ref {
    pub fn parse(name: &str) -> Option<A1Ref> {
        let caps = a1_re().captures(name)?;
        let col = CellRef::col_from_letters(&caps["letters"])?;
        let row = caps["numbers"].parse::<usize>().ok()?.checked_sub(1)?;
        if row >= MAX_ROWS {
            return None;
        }
        Some(A1Ref {
            cell: CellRef::new(row, col),
            col_abs: !caps["col_abs"].is_empty(),
            row_abs: !caps["row_abs"].is_empty(),
        })
    }

    pub fn is_fully_absolute(&self) -> bool {
        self.col_abs && self.row_abs
    }
}

/// A cell address qualified by its sheet name; the node identity of the
/// dependency graph.
#[derive(Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellAddr {
    pub sheet: String,
    pub cell: CellRef,
}

impl CellAddr {
    pub fn new(sheet: impl Into<String>, cell: CellRef) -> Self {
        CellAddr {
            sheet: sheet.into(),
            cell,
        }
    }

    /// Parse `Sheet!A1` or `'My Sheet'!A1`.
    pub fn parse(text: &str) -> Option<CellAddr> {
        let (sheet, cell) = text.rsplit_once('!')?;
        let sheet = unquote_sheet(sheet);
        if sheet.is_empty() {
            return None;
        }
        Some(CellAddr::new(sheet, CellRef::from_str(cell)?))
    }
}

impl fmt::Display for CellAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sheet.chars().all(|c| c.is_alphanumeric() || c == '_') {
            write!(f, "{}!{}", self.sheet, self.cell)
        } else {
            write!(f, "'{}'!{}", self.sheet.replace('\'', "''"), self.cell)
        }
    }
}

/// Strip the single quotes Excel puts around sheet names with spaces.
pub fn unquote_sheet(sheet: &str) -> String {
    let sheet = sheet.trim();
    if sheet.len() >= 2 && sheet.starts_with('\'') && sheet.ends_with('\'') {
        sheet[1..sheet.len() - 1].replace("''", "'")
    } else {
        sheet.to_string()
    }
}

/// Inclusive rectangular range, normalized so `start` is the top-left corner.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RangeBounds {
    pub start: CellRef,
    pub end: CellRef,
}

impl RangeBounds {
    pub fn new(a: CellRef, b: CellRef) -> Self {
        RangeBounds {
            start: CellRef::new(a.row.min(b.row), a.col.min(b.col)),
            end: CellRef::new(a.row.max(b.row), a.col.max(b.col)),
        }
    }

    /// Parse "A1:B5" (or a single "A1" as a 1x1 range).
    pub fn parse(range: &str) -> Option<RangeBounds> {
        match range.split_once(':') {
            Some((a, b)) => Some(RangeBounds::new(
                CellRef::from_str(a.trim())?,
                CellRef::from_str(b.trim())?,
            )),
            None => {
                let cell = CellRef::from_str(range.trim())?;
                Some(RangeBounds::new(cell, cell))
            }
        }
    }

    pub fn rows(&self) -> usize {
        self.end.row - self.start.row + 1
    }

    pub fn cols(&self) -> usize {
        self.end.col - self.start.col + 1
    }

    /// Number of cells covered, or None on overflow.
    pub fn cell_count(&self) -> Option<usize> {
        self.rows().checked_mul(self.cols())
    }

    pub fn contains(&self, cell: &CellRef) -> bool {
        cell.row >= self.start.row
            && cell.row <= self.end.row
            && cell.col >= self.start.col
            && cell.col <= self.end.col
    }

    pub fn intersects(&self, other: &RangeBounds) -> bool {
        self.start.row <= other.end.row
            && other.start.row <= self.end.row
            && self.start.col <= other.end.col
            && other.start.col <= self.end.col
    }

    /// Row-major iteration over every covered cell.
    pub fn cells(&self) -> impl Iterator<Item = CellRef> + '_ {
        (self.start.row..=self.end.row)
            .flat_map(move |row| (self.start.col..=self.end.col).map(move |col| CellRef::new(row, col)))
    }
}

impl fmt::Display for RangeBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}
