//! Formula shape: a formula rewritten in R1C1 form relative to its own cell.
//!
//! `=B4*1.1` in C4 and `=B5*1.1` in C5 share the shape `R[0]C[-1]*1.1`.
//! Anchored (`$`) components are written as fixed coordinates, so an absolute
//! reference repeated down a column contributes the same text in every cell.
//!
//! [`formula_pattern`] is the looser form used to compare neighbouring cells:
//! anchored components become `R$`/`C$` whatever they point at, so a row
//! where one cell anchors `$Z$2` instead of `$Z$1` still reads as one pattern.

use super::cell::format_number;
use super::cell_ref::{A1Ref, CellRef};
use super::deps::{RefTarget, parse_target};
use super::lexer::{RefToken, Token, tokenize};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Anchors {
    Fixed,
    Masked,
}

pub fn formula_shape(formula: &str, host: CellRef) -> String {
    render(formula, host, Anchors::Fixed)
}

/// Like [`formula_shape`] with anchored coordinates masked out.
pub fn formula_pattern(formula: &str, host: CellRef) -> String {
    render(formula, host, Anchors::Masked)
}

fn render(formula: &str, host: CellRef, anchors: Anchors) -> String {
    let mut out = String::with_capacity(formula.len() + 16);
    for token in tokenize(formula) {
        match token {
            Token::Number(text) => match text.parse::<f64>() {
                Ok(n) => out.push_str(&format_number(n)),
                Err(_) => out.push_str(&text),
            },
            Token::Text(s) => {
                out.push('"');
                out.push_str(&s.replace('"', "\"\""));
                out.push('"');
            }
            Token::Bool(b) => out.push_str(if b { "TRUE" } else { "FALSE" }),
            Token::Error(e) => out.push_str(&e),
            Token::Reference(r) => out.push_str(&reference_shape(r, host, anchors)),
            Token::Function(name) => out.push_str(&name),
            Token::Name(name) => out.push_str(&name.to_lowercase()),
            Token::Operator(op) => out.push_str(&op),
            Token::OpenParen => out.push('('),
            Token::CloseParen => out.push(')'),
            Token::Separator => out.push(','),
            Token::OpenBrace => out.push('{'),
            Token::CloseBrace => out.push('}'),
        }
    }
    out
}

fn reference_shape(token: RefToken, host: CellRef, anchors: Anchors) -> String {
    let mut prefix = String::new();
    if let Some(book) = &token.workbook {
        prefix.push_str(&format!("[{}]", book.to_lowercase()));
    }
    if let Some(sheet) = &token.sheet {
        prefix.push_str(&sheet.to_lowercase());
        prefix.push('!');
    }
    let body = match parse_target(&token.body) {
        RefTarget::Cell(a) => cell_shape(&a, host, anchors),
        RefTarget::Range { start, end } => {
            format!("{}:{}", cell_shape(&start, host, anchors), cell_shape(&end, host, anchors))
        }
        RefTarget::Columns { start, end } => {
            format!("C[{}]:C[{}]", offset(start, host.col), offset(end, host.col))
        }
        RefTarget::Rows { start, end } => {
            format!("R[{}]:R[{}]", offset(start, host.row), offset(end, host.row))
        }
        RefTarget::Invalid => token.body.to_uppercase(),
    };
    prefix + &body
}

fn cell_shape(a: &A1Ref, host: CellRef, anchors: Anchors) -> String {
    let row = match (a.row_abs, anchors) {
        (true, Anchors::Fixed) => format!("R{}", a.cell.row + 1),
        (true, Anchors::Masked) => "R$".to_string(),
        (false, _) => format!("R[{}]", offset(a.cell.row, host.row)),
    };
    let col = match (a.col_abs, anchors) {
        (true, Anchors::Fixed) => format!("C{}", a.cell.col + 1),
        (true, Anchors::Masked) => "C$".to_string(),
        (false, _) => format!("C[{}]", offset(a.cell.col, host.col)),
    };
    row + &col
}

fn offset(target: usize, host: usize) -> i64 {
    target as i64 - host as i64
}
