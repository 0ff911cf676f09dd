//! Tokenizer for formula text
//!
//! Longest match wins for operators, so `<=` is never split into `<` `=`,
//! and `=` inside a string literal stays literal text.

use super::error::{CompileError, SyntaxError};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `{{field}}`
    Field(String),
    /// `{{Collection.field}}`
    ForeignField { collection: String, field: String },
    Number(f64),
    Str(String),
    /// Function names and the words AND, OR, NOT, TRUE, FALSE, NULL
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Bang,
    LParen,
    RParen,
    Comma,
}

impl Token {
    /// Description used in syntax errors
    pub fn describe(&self) -> String {
        match self {
            Token::Field(name) => format!("field {{{{{}}}}}", name),
            Token::ForeignField { collection, field } => {
                format!("field {{{{{}.{}}}}}", collection, field)
            }
            Token::Number(n) => format!("number {}", n),
            Token::Str(s) => format!("string \"{}\"", s),
            Token::Ident(name) => format!("'{}'", name),
            Token::Plus => "'+'".into(),
            Token::Minus => "'-'".into(),
            Token::Star => "'*'".into(),
            Token::Slash => "'/'".into(),
            Token::Percent => "'%'".into(),
            Token::Eq => "'='".into(),
            Token::NotEq => "'<>'".into(),
            Token::Lt => "'<'".into(),
            Token::Le => "'<='".into(),
            Token::Gt => "'>'".into(),
            Token::Ge => "'>='".into(),
            Token::Bang => "'!'".into(),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
            Token::Comma => "','".into(),
        }
    }

    /// True for an identifier matching `word`, ignoring case
    pub fn is_word(&self, word: &str) -> bool {
        matches!(self, Token::Ident(name) if name.eq_ignore_ascii_case(word))
    }
}

/// A token and its byte offset in the formula
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

/// Splits `formula` into tokens
pub fn tokenize(formula: &str) -> Result<Vec<Spanned>, CompileError> {
    let bytes = formula.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    let err = |position: usize, kind: SyntaxError| CompileError::new(formula, position, kind);

    while pos < bytes.len() {
        let c = bytes[pos];
        let start = pos;

        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        // Field references
        if formula[pos..].starts_with("{{") {
            let close = formula[pos + 2..]
                .find("}}")
                .ok_or_else(|| err(start, SyntaxError::InvalidFieldRef(formula[pos..].to_string())))?;
            let inner = formula[pos + 2..pos + 2 + close].trim();
            let token = field_token(inner)
                .ok_or_else(|| err(start, SyntaxError::InvalidFieldRef(inner.to_string())))?;
            tokens.push(Spanned { token, position: start });
            pos += close + 4;
            continue;
        }

        // String literals (double quotes, backslash escapes)
        if c == b'"' {
            let (text, next) = read_string(formula, pos)
                .ok_or_else(|| err(start, SyntaxError::UnterminatedString))?;
            tokens.push(Spanned {
                token: Token::Str(text),
                position: start,
            });
            pos = next;
            continue;
        }

        // Numbers: 12, 12.5, .5, 1e3
        if c.is_ascii_digit() || (c == b'.' && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit)) {
            let next = scan_number(bytes, pos);
            let text = &formula[pos..next];
            let value: f64 = text
                .parse()
                .map_err(|_| err(start, SyntaxError::InvalidNumber(text.to_string())))?;
            tokens.push(Spanned {
                token: Token::Number(value),
                position: start,
            });
            pos = next;
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            let mut next = pos;
            while next < bytes.len() && (bytes[next].is_ascii_alphanumeric() || bytes[next] == b'_') {
                next += 1;
            }
            tokens.push(Spanned {
                token: Token::Ident(formula[pos..next].to_string()),
                position: start,
            });
            pos = next;
            continue;
        }

        let two = formula.get(pos..pos + 2).unwrap_or("");
        let (token, width) = match two {
            "<=" => (Token::Le, 2),
            ">=" => (Token::Ge, 2),
            "<>" | "!=" => (Token::NotEq, 2),
            "==" => (Token::Eq, 2),
            _ => match c {
                b'+' => (Token::Plus, 1),
                b'-' => (Token::Minus, 1),
                b'*' => (Token::Star, 1),
                b'/' => (Token::Slash, 1),
                b'%' => (Token::Percent, 1),
                b'=' => (Token::Eq, 1),
                b'<' => (Token::Lt, 1),
                b'>' => (Token::Gt, 1),
                b'!' => (Token::Bang, 1),
                b'(' => (Token::LParen, 1),
                b')' => (Token::RParen, 1),
                b',' => (Token::Comma, 1),
                _ => {
                    let ch = formula[pos..].chars().next().unwrap_or('?');
                    return Err(err(start, SyntaxError::UnexpectedChar(ch)));
                }
            },
        };

        tokens.push(Spanned {
            token,
            position: start,
        });
        pos += width;
    }

    Ok(tokens)
}

fn is_name(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn field_token(inner: &str) -> Option<Token> {
    match inner.split_once('.') {
        None if is_name(inner) => Some(Token::Field(inner.to_string())),
        Some((collection, field)) if is_name(collection) && is_name(field) => {
            Some(Token::ForeignField {
                collection: collection.to_string(),
                field: field.to_string(),
            })
        }
        _ => None,
    }
}

/// Reads a string literal starting at the opening quote. Returns the
/// unescaped text and the offset just past the closing quote.
fn read_string(formula: &str, open: usize) -> Option<(String, usize)> {
    let mut text = String::new();
    let mut chars = formula[open + 1..].char_indices();

    while let Some((offset, ch)) = chars.next() {
        match ch {
            '"' => return Some((text, open + 1 + offset + 1)),
            '\\' => {
                let (_, escaped) = chars.next()?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
            }
            other => text.push(other),
        }
    }

    None
}

fn scan_number(bytes: &[u8], start: usize) -> usize {
    let mut pos = start;
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    if pos < bytes.len() && bytes[pos] == b'.' {
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
        let mut exp = pos + 1;
        if exp < bytes.len() && (bytes[exp] == b'+' || bytes[exp] == b'-') {
            exp += 1;
        }
        if exp < bytes.len() && bytes[exp].is_ascii_digit() {
            pos = exp;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
        }
    }
    pos
}
