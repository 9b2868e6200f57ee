//! Formula tokenizer.
//!
//! Splits formula text (without the leading '=') into operands and operators.
//! Never fails: characters it does not understand come back as single-char
//! operators so callers can keep going on damaged input.

use super::cell::ERROR_CODES;
use super::cell_ref::{A1Ref, CellRef};

/// A reference operand as written, split into its qualifiers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefToken {
    /// External workbook name from a `[Book.xlsx]` prefix.
    pub workbook: Option<String>,
    /// Sheet qualifier, unquoted.
    pub sheet: Option<String>,
    /// The address part: `A1`, `$A$1:B5`, `A:C`, `1:3`, or `#REF!`.
    pub body: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    /// Numeric literal, kept as written.
    Number(String),
    Text(String),
    Bool(bool),
    Error(String),
    Reference(RefToken),
    /// Function name (uppercased), always followed by `OpenParen`.
    Function(String),
    /// Defined name, table reference or anything else identifier-shaped.
    Name(String),
    Operator(String),
    OpenParen,
    CloseParen,
    Separator,
    OpenBrace,
    CloseBrace,
}

pub fn tokenize(formula: &str) -> Vec<Token> {
    Lexer {
        chars: formula.chars().collect(),
        pos: 0,
    }
    .run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.' || c == '$' || c == '\\'
}

fn is_body_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '$' || c == ':'
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn run(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek() {
            let token = match c {
                c if c.is_whitespace() => {
                    self.pos += 1;
                    continue;
                }
                '"' => Token::Text(self.string_literal()),
                '\'' => self.quoted_reference(),
                '[' => self.external_reference(),
                '#' => self.error_literal(),
                '(' => self.single(Token::OpenParen),
                ')' => self.single(Token::CloseParen),
                ',' | ';' => self.single(Token::Separator),
                '{' => self.single(Token::OpenBrace),
                '}' => self.single(Token::CloseBrace),
                c if c.is_ascii_digit() => self.number_or_rows(),
                '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.number_or_rows(),
                c if is_word_char(c) => self.word(),
                _ => self.operator(),
            };
            tokens.push(token);
        }
        tokens
    }

    fn single(&mut self, token: Token) -> Token {
        self.pos += 1;
        token
    }

    fn string_literal(&mut self) -> String {
        self.pos += 1;
        let mut out = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == '"' {
                if self.peek() == Some('"') {
                    out.push('"');
                    self.pos += 1;
                } else {
                    return out;
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    fn quoted_reference(&mut self) -> Token {
        self.pos += 1;
        let mut name = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == '\'' {
                if self.peek() == Some('\'') {
                    name.push('\'');
                    self.pos += 1;
                } else {
                    break;
                }
            } else {
                name.push(c);
            }
        }
        let (workbook, sheet) = split_workbook(&name);
        if self.peek() == Some('!') {
            self.pos += 1;
            let body = self.reference_body();
            Token::Reference(RefToken {
                workbook,
                sheet: Some(sheet),
                body,
            })
        } else {
            Token::Name(name)
        }
    }

    fn external_reference(&mut self) -> Token {
        let prefix = self.take_while(|c| c != ']');
        if self.peek() == Some(']') {
            self.pos += 1;
        }
        let workbook = prefix.trim_start_matches('[').to_string();
        let sheet = self.take_while(|c| c != '!' && is_word_char(c));
        if self.peek() == Some('!') {
            self.pos += 1;
            let body = self.reference_body();
            Token::Reference(RefToken {
                workbook: Some(workbook),
                sheet: (!sheet.is_empty()).then_some(sheet),
                body,
            })
        } else {
            Token::Reference(RefToken {
                workbook: Some(workbook),
                sheet: None,
                body: sheet,
            })
        }
    }

    fn reference_body(&mut self) -> String {
        if self.peek() == Some('#') {
            if let Token::Error(code) = self.error_literal() {
                return code;
            }
        }
        self.take_while(is_body_char)
    }

    fn error_literal(&mut self) -> Token {
        let rest: String = self.chars[self.pos..].iter().collect();
        let upper = rest.to_ascii_uppercase();
        for code in ERROR_CODES {
            if upper.starts_with(code) {
                self.pos += code.chars().count();
                return Token::Error((*code).to_string());
            }
        }
        self.single(Token::Operator("#".to_string()))
    }

    fn number_or_rows(&mut self) -> Token {
        let start = self.pos;
        let int_part = self.take_while(|c| c.is_ascii_digit());
        // Whole-row range like 1:3
        if !int_part.is_empty()
            && self.peek() == Some(':')
            && self.peek_at(1).is_some_and(|c| c.is_ascii_digit() || c == '$')
        {
            self.pos += 1;
            let end = self.take_while(|c| c.is_ascii_digit() || c == '$');
            return Token::Reference(RefToken {
                workbook: None,
                sheet: None,
                body: format!("{}:{}", int_part, end),
            });
        }
        if self.peek() == Some('.') {
            self.pos += 1;
            self.take_while(|c| c.is_ascii_digit());
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += digit_at;
                self.take_while(|c| c.is_ascii_digit());
            }
        }
        Token::Number(self.chars[start..self.pos].iter().collect())
    }

    fn word(&mut self) -> Token {
        let word = self.take_while(is_word_char);
        match self.peek() {
            Some('!') => {
                self.pos += 1;
                let body = self.reference_body();
                return Token::Reference(RefToken {
                    workbook: None,
                    sheet: Some(word),
                    body,
                });
            }
            Some('(') => return Token::Function(word.to_ascii_uppercase()),
            Some('[') => {
                let mut name = word;
                let mut depth = 0usize;
                while let Some(c) = self.peek() {
                    name.push(c);
                    self.pos += 1;
                    match c {
                        '[' => depth += 1,
                        ']' => {
                            depth = depth.saturating_sub(1);
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                }
                return Token::Name(name);
            }
            _ => {}
        }

        if word.eq_ignore_ascii_case("TRUE") {
            return Token::Bool(true);
        }
        if word.eq_ignore_ascii_case("FALSE") {
            return Token::Bool(false);
        }

        let is_cell = A1Ref::parse(&word).is_some();
        let is_column = is_column_word(&word);
        if (is_cell || is_column) && self.peek() == Some(':') {
            let save = self.pos;
            self.pos += 1;
            let end = self.take_while(is_word_char);
            let ok = if is_cell {
                A1Ref::parse(&end).is_some()
            } else {
                is_column_word(&end)
            };
            if ok {
                return Token::Reference(RefToken {
                    workbook: None,
                    sheet: None,
                    body: format!("{}:{}", word, end),
                });
            }
            self.pos = save;
        }
        if is_cell {
            return Token::Reference(RefToken {
                workbook: None,
                sheet: None,
                body: word,
            });
        }
        Token::Name(word)
    }

    fn operator(&mut self) -> Token {
        let c = self.chars[self.pos];
        self.pos += 1;
        let two = match (c, self.peek()) {
            ('<', Some('=')) | ('>', Some('=')) | ('<', Some('>')) => self.peek(),
            _ => None,
        };
        match two {
            Some(second) => {
                self.pos += 1;
                Token::Operator(format!("{}{}", c, second))
            }
            None => Token::Operator(c.to_string()),
        }
    }
}

fn is_column_word(word: &str) -> bool {
    CellRef::col_from_letters(word.trim_start_matches('$')).is_some()
        && word.matches('$').count() <= 1
}

/// Split `[Book.xlsx]Sheet` into its workbook and sheet parts.
fn split_workbook(name: &str) -> (Option<String>, String) {
    if let Some(rest) = name.strip_prefix('[') {
        if let Some((book, sheet)) = rest.split_once(']') {
            return (Some(book.to_string()), sheet.to_string());
        }
    }
    // Path-qualified form: 'C:\dir\[Book.xlsx]Sheet'
    if let (Some(open), Some(close)) = (name.find('['), name.find(']')) {
        if open < close {
            return (
                Some(name[..close].replace('[', "")),
                name[close + 1..].to_string(),
            );
        }
    }
    (None, name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(sheet: Option<&str>, body: &str) -> Token {
        Token::Reference(RefToken {
            workbook: None,
            sheet: sheet.map(str::to_string),
            body: body.to_string(),
        })
    }

    #[test]
    fn test_simple_arithmetic() {
        let tokens = tokenize("201.26*E4");
        assert_eq!(
            tokens,
            vec![
                Token::Number("201.26".into()),
                Token::Operator("*".into()),
                reference(None, "E4"),
            ]
        );
    }

    #[test]
    fn test_function_and_range() {
        let tokens = tokenize("SUM($A$1:B5, 3)");
        assert_eq!(tokens[0], Token::Function("SUM".into()));
        assert_eq!(tokens[1], Token::OpenParen);
        assert_eq!(tokens[2], reference(None, "$A$1:B5"));
        assert_eq!(tokens[3], Token::Separator);
        assert_eq!(tokens[4], Token::Number("3".into()));
    }

    #[test]
    fn test_sheet_qualifiers() {
        let tokens = tokenize("Inputs!B2+'Cost Model'!C3:C9");
        assert_eq!(tokens[0], reference(Some("Inputs"), "B2"));
        assert_eq!(tokens[2], reference(Some("Cost Model"), "C3:C9"));
    }

    #[test]
    fn test_external_workbook() {
        let tokens = tokenize("[Budget.xlsx]Sheet1!A1*2");
        assert_eq!(
            tokens[0],
            Token::Reference(RefToken {
                workbook: Some("Budget.xlsx".into()),
                sheet: Some("Sheet1".into()),
                body: "A1".into(),
            })
        );

        let quoted = tokenize("'[Old Plan.xlsx]Q1 Data'!B4");
        assert_eq!(
            quoted[0],
            Token::Reference(RefToken {
                workbook: Some("Old Plan.xlsx".into()),
                sheet: Some("Q1 Data".into()),
                body: "B4".into(),
            })
        );
    }

    #[test]
    fn test_string_literal_hides_references() {
        let tokens = tokenize("IF(A1=\"B2 \"\"x\"\"\",1,0)");
        assert!(tokens.contains(&Token::Text("B2 \"x\"".into())));
        let refs = tokens
            .iter()
            .filter(|t| matches!(t, Token::Reference(_)))
            .count();
        assert_eq!(refs, 1);
    }

    #[test]
    fn test_row_and_column_ranges() {
        assert_eq!(tokenize("SUM(A:C)")[2], reference(None, "A:C"));
        assert_eq!(tokenize("SUM(2:4)")[2], reference(None, "2:4"));
    }

    #[test]
    fn test_exponent_and_errors() {
        assert_eq!(tokenize("1E+3")[0], Token::Number("1E+3".into()));
        assert_eq!(tokenize("#REF!+1")[0], Token::Error("#REF!".into()));
        assert_eq!(tokenize("Sheet2!#REF!")[0], reference(Some("Sheet2"), "#REF!"));
    }

    #[test]
    fn test_function_names_with_digits_are_not_refs() {
        assert_eq!(tokenize("LOG10(A1)")[0], Token::Function("LOG10".into()));
    }

    #[test]
    fn test_comparison_operators() {
        let tokens = tokenize("A1<>B1");
        assert_eq!(tokens[1], Token::Operator("<>".into()));
    }

    #[test]
    fn test_never_panics_on_garbage() {
        let tokens = tokenize("'unterminated [[ ### @@ \"open");
        assert!(!tokens.is_empty());
    }
}
