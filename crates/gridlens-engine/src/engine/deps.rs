use super::cell_ref::{A1Ref, CellRef, RangeBounds, unquote_sheet};
use super::lexer::{RefToken, Token, tokenize};

/// Maximum number of cells a single range operand may expand to.
pub const MAX_DEPENDENCY_RANGE_CELLS: usize = 1_000_000;

/// Functions whose result address is computed at evaluation time.
const DYNAMIC_FUNCTIONS: &[&str] = &["INDIRECT", "OFFSET", "ADDRESS"];

/// What a reference operand points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefTarget {
    Cell(A1Ref),
    Range { start: A1Ref, end: A1Ref },
    /// Whole columns, 0-indexed inclusive.
    Columns { start: usize, end: usize },
    /// Whole rows, 0-indexed inclusive.
    Rows { start: usize, end: usize },
    /// `#REF!` or an address that could not be parsed.
    Invalid,
}

/// A reference found in a formula.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference {
    pub workbook: Option<String>,
    pub sheet: Option<String>,
    pub target: RefTarget,
    /// The operand as written, for messages.
    pub text: String,
}

impl Reference {
    pub fn is_external(&self) -> bool {
        self.workbook.is_some()
    }

    /// Rectangle covered by this reference, given the target sheet's extent
    /// as (rows, cols). Whole-row/column references are clipped to the extent.
    pub fn bounds(&self, extent: Option<(usize, usize)>) -> Option<RangeBounds> {
        match &self.target {
            RefTarget::Cell(a) => Some(RangeBounds::new(a.cell, a.cell)),
            RefTarget::Range { start, end } => Some(RangeBounds::new(start.cell, end.cell)),
            RefTarget::Columns { start, end } => {
                let (rows, _) = extent?;
                let last = rows.checked_sub(1)?;
                Some(RangeBounds::new(
                    CellRef::new(0, *start),
                    CellRef::new(last, *end),
                ))
            }
            RefTarget::Rows { start, end } => {
                let (_, cols) = extent?;
                let last = cols.checked_sub(1)?;
                Some(RangeBounds::new(
                    CellRef::new(*start, 0),
                    CellRef::new(*end, last),
                ))
            }
            RefTarget::Invalid => None,
        }
    }

    pub fn is_range(&self) -> bool {
        !matches!(self.target, RefTarget::Cell(_) | RefTarget::Invalid)
    }
}

/// A numeric literal written directly in a formula.
#[derive(Clone, Debug, PartialEq)]
pub struct Literal {
    /// As written, e.g. "201.26" or "1E+3".
    pub text: String,
    pub value: f64,
}

/// Extract every reference operand from a formula (without the leading '=').
pub fn extract_references(formula: &str) -> Vec<Reference> {
    tokenize(formula)
        .into_iter()
        .filter_map(|token| match token {
            Token::Reference(r) => Some(to_reference(r)),
            Token::Error(code) if code == "#REF!" => Some(Reference {
                workbook: None,
                sheet: None,
                target: RefTarget::Invalid,
                text: code,
            }),
            _ => None,
        })
        .collect()
}

/// Extract all cell references from a formula as dependencies, ignoring
/// sheet qualifiers. Ranges are expanded up to [`MAX_DEPENDENCY_RANGE_CELLS`].
pub fn extract_dependencies(formula: &str) -> Vec<CellRef> {
    let mut deps = Vec::new();
    for reference in extract_references(formula) {
        if let Some(bounds) = reference.bounds(None) {
            if bounds.cell_count().is_some_and(|n| n <= MAX_DEPENDENCY_RANGE_CELLS) {
                deps.extend(bounds.cells());
            }
        }
    }
    deps
}

/// Every numeric literal operand in a formula. Digits that belong to
/// references, strings or function names are not literals.
pub fn numeric_literals(formula: &str) -> Vec<Literal> {
    tokenize(formula)
        .into_iter()
        .filter_map(|token| match token {
            Token::Number(text) => {
                let value = text.parse::<f64>().ok()?;
                Some(Literal { text, value })
            }
            _ => None,
        })
        .collect()
}

pub fn is_dynamic_formula(formula: &str) -> bool {
    tokenize(formula)
        .iter()
        .any(|t| matches!(t, Token::Function(name) if DYNAMIC_FUNCTIONS.contains(&name.as_str())))
}

/// Parse a cell range like "A1:B5".
pub fn parse_range(range: &str) -> Option<RangeBounds> {
    let (start, end) = range.split_once(':')?;
    Some(RangeBounds::new(
        CellRef::from_str(start)?,
        CellRef::from_str(end)?,
    ))
}

fn to_reference(token: RefToken) -> Reference {
    let text = match (&token.workbook, &token.sheet) {
        (Some(book), Some(sheet)) => format!("[{}]{}!{}", book, sheet, token.body),
        (Some(book), None) => format!("[{}]{}", book, token.body),
        (None, Some(sheet)) => format!("{}!{}", sheet, token.body),
        (None, None) => token.body.clone(),
    };
    Reference {
        workbook: token.workbook,
        sheet: token.sheet.map(|s| unquote_sheet(&s)),
        target: parse_target(&token.body),
        text,
    }
}

pub(crate) fn parse_target(body: &str) -> RefTarget {
    match body.split_once(':') {
        None => A1Ref::parse(body).map_or(RefTarget::Invalid, RefTarget::Cell),
        Some((a, b)) => {
            if let (Some(start), Some(end)) = (A1Ref::parse(a), A1Ref::parse(b)) {
                return RefTarget::Range { start, end };
            }
            let cols = (
                CellRef::col_from_letters(a.trim_start_matches('$')),
                CellRef::col_from_letters(b.trim_start_matches('$')),
            );
            if let (Some(x), Some(y)) = cols {
                return RefTarget::Columns {
                    start: x.min(y),
                    end: x.max(y),
                };
            }
            let rows = (
                a.trim_start_matches('$').parse::<usize>().ok().and_then(|r| r.checked_sub(1)),
                b.trim_start_matches('$').parse::<usize>().ok().and_then(|r| r.checked_sub(1)),
            );
            if let (Some(x), Some(y)) = rows {
                return RefTarget::Rows {
                    start: x.min(y),
                    end: x.max(y),
                };
            }
            RefTarget::Invalid
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_dependencies_expands_ranges() {
        let deps = extract_dependencies("SUM(A1:B2)+C3");
        assert_eq!(deps.len(), 5);
        assert!(deps.contains(&CellRef::new(1, 1)));
        assert!(deps.contains(&CellRef::new(2, 2)));
    }

    #[test]
    fn test_extract_dependencies_skips_huge_ranges() {
        let deps = extract_dependencies("SUM(A1:ZZ1000000)");
        assert!(deps.is_empty());
    }

    #[test]
    fn test_extract_dependencies_ignores_string_literals() {
        let deps = extract_dependencies("IF(A1>0,\"B2\",C3)");
        assert_eq!(deps, vec![CellRef::new(0, 0), CellRef::new(2, 2)]);
    }

    #[test]
    fn test_references_keep_qualifiers() {
        let refs = extract_references("Inputs!$B$2*'Cost Model'!C3:C4+[Ext.xlsx]Rates!A1");
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0].sheet.as_deref(), Some("Inputs"));
        assert!(matches!(refs[0].target, RefTarget::Cell(a) if a.is_fully_absolute()));
        assert_eq!(refs[1].sheet.as_deref(), Some("Cost Model"));
        assert!(refs[1].is_range());
        assert!(refs[2].is_external());
        assert_eq!(refs[2].text, "[Ext.xlsx]Rates!A1");
    }

    #[test]
    fn test_ref_error_is_invalid_reference() {
        let refs = extract_references("#REF!*2+Old!#REF!");
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().all(|r| r.target == RefTarget::Invalid));
    }

    #[test]
    fn test_whole_column_bounds_use_extent() {
        let refs = extract_references("SUM(B:C)");
        let bounds = refs[0].bounds(Some((10, 5))).unwrap();
        assert_eq!(bounds.start, CellRef::new(0, 1));
        assert_eq!(bounds.end, CellRef::new(9, 2));
        assert!(refs[0].bounds(None).is_none());
    }

    #[test]
    fn test_numeric_literals_every_occurrence() {
        let lits = numeric_literals("F4*1000+ROUND(A1,2)-1000/1.5E2");
        let values: Vec<f64> = lits.iter().map(|l| l.value).collect();
        assert_eq!(values, vec![1000.0, 2.0, 1000.0, 150.0]);
    }

    #[test]
    fn test_numeric_literals_ignore_reference_digits() {
        assert!(numeric_literals("A1+Sheet2!B22+SUM(3:4)").is_empty());
    }

    #[test]
    fn test_dynamic_functions() {
        assert!(is_dynamic_formula("OFFSET(A1,1,0)"));
        assert!(is_dynamic_formula("indirect(\"A\"&B1)"));
        assert!(!is_dynamic_formula("SUM(A1:A3)"));
    }

    #[test]
    fn test_parse_range() {
        let r = parse_range("A1:B5").unwrap();
        assert_eq!(r.rows(), 5);
        assert_eq!(r.cols(), 2);
        assert!(parse_range("A1").is_none());
    }
}
