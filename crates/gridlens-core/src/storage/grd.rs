//! Reader for the .grd workbook text format.
//!
//! ```text
//! # comment
//! [Inputs]
//! merge: A1:C1
//! A1: "Revenue"
//! B2: 201.26
//! C2: =B2*1000
//! ```
//!
//! Cells before the first `[Sheet]` header belong to `Sheet1`.
//!
//! A damaged line never stops the read. A line without a `CELLREF: VALUE`
//! shape, or with a key that is not a cell reference, is skipped with a
//! diagnostic. A header that does not parse loses its whole region: every
//! line up to the next good header is skipped, so its cells cannot land on
//! the sheet above.

use std::fs;
use std::path::Path;

use tracing::warn;

use gridlens_engine::engine::{Cell, CellRef, Diagnostic, DiagnosticKind, RawSheet, RawWorkbook};

use crate::error::Result;

const DEFAULT_SHEET: &str = "Sheet1";

/// Parse a .grd file into raw sheets.
pub fn parse_grd(path: &Path) -> Result<RawWorkbook> {
    let content = fs::read_to_string(path)?;
    Ok(parse_grd_content(&content))
}

/// A region under a header that did not parse.
struct SkippedRegion {
    line: usize,
    header: String,
    lines: usize,
}

impl SkippedRegion {
    fn into_diagnostic(self) -> Diagnostic {
        warn!(line = self.line, header = %self.header, skipped = self.lines, "unreadable sheet header");
        Diagnostic::new(
            DiagnosticKind::SheetUnreadable,
            format!(
                "line {}: invalid sheet header '{}'; {} line(s) skipped until the next header",
                self.line, self.header, self.lines
            ),
        )
        .at(format!("line {}", self.line))
    }
}

/// Parse .grd content from a string.
pub fn parse_grd_content(content: &str) -> RawWorkbook {
    let mut workbook = RawWorkbook::default();
    let mut skipping: Option<SkippedRegion> = None;

    for (line_num, line) in content.lines().enumerate() {
        let line_no = line_num + 1;
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(header) = line.strip_prefix('[') {
            if let Some(region) = skipping.take() {
                workbook.issues.push(region.into_diagnostic());
            }
            match header.strip_suffix(']').map(str::trim).filter(|n| !n.is_empty()) {
                Some(name) => workbook.sheets.push(RawSheet::new(name)),
                None => {
                    skipping = Some(SkippedRegion {
                        line: line_no,
                        header: line.to_string(),
                        lines: 0,
                    })
                }
            }
            continue;
        }

        if let Some(region) = skipping.as_mut() {
            region.lines += 1;
            continue;
        }

        if workbook.sheets.is_empty() {
            workbook.sheets.push(RawSheet::new(DEFAULT_SHEET));
        }
        let Some(sheet) = workbook.sheets.last_mut() else {
            continue;
        };

        let Some((key, value)) = line.split_once(':') else {
            sheet.issues.push(
                Diagnostic::new(
                    DiagnosticKind::MalformedCell,
                    format!("line {}: expected 'CELLREF: VALUE'; line skipped", line_no),
                )
                .on_sheet(sheet.name.clone()),
            );
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        if key.eq_ignore_ascii_case("merge") {
            sheet.merges.push(value.to_string());
            continue;
        }

        match CellRef::from_str(key) {
            Some(cell_ref) => sheet.cells.push((cell_ref, parse_cell_value(value))),
            None => {
                let issue = Diagnostic::new(
                    DiagnosticKind::MalformedCell,
                    format!("line {}: invalid cell reference '{}'; line skipped", line_no, key),
                )
                .on_sheet(sheet.name.clone());
                sheet.issues.push(issue);
            }
        }
    }

    if let Some(region) = skipping {
        workbook.issues.push(region.into_diagnostic());
    }
    workbook
}

fn parse_cell_value(value: &str) -> Cell {
    if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
        return Cell::new_text(&unescape_grd_text(&value[1..value.len() - 1]));
    }
    Cell::from_input(value)
}

fn unescape_grd_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}
