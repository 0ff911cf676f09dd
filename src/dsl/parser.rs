//! Recursive-descent parser
//!
//! Precedence, loosest first:
//!
//! | Level | Operators |
//! |-------|-----------|
//! | or | `OR` |
//! | and | `AND` |
//! | not | `NOT`, `!` (prefix) |
//! | comparison | `=` `<>` `!=` `<` `<=` `>` `>=` |
//! | additive | `+` `-` |
//! | multiplicative | `*` `/` `%` |
//! | unary | `-` `+` (prefix) |
//! | primary | literals, fields, calls, parentheses |
//!
//! `NOT` binds looser than comparison, so `NOT {{a}} = 1` reads as
//! `NOT ({{a}} = 1)`. `AND`, `OR` and `NOT` directly followed by `(` in
//! operand position are calls to the function forms.

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::builtins;
use super::error::{CompileError, SyntaxError};
use super::lexer::{tokenize, Spanned, Token};
use crate::domain::value::Value;

/// Parses formula text into an expression tree.
///
/// Blank formulas parse to a `null` literal.
pub fn parse(formula: &str) -> Result<Expr, CompileError> {
    let tokens = tokenize(formula)?;
    if tokens.is_empty() {
        return Ok(Expr::Literal(Value::Null));
    }

    let mut parser = Parser {
        formula,
        tokens,
        pos: 0,
    };
    let expr = parser.or_expr()?;

    if let Some(extra) = parser.peek() {
        return Err(parser.error_at(
            extra.position,
            SyntaxError::UnexpectedToken {
                found: extra.token.describe(),
                expected: "end of formula".into(),
            },
        ));
    }

    Ok(expr)
}

struct Parser<'a> {
    formula: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|s| &s.token)
    }

    fn peek_is_word(&self, word: &str) -> bool {
        self.peek_token().is_some_and(|t| t.is_word(word))
    }

    fn next_is(&self, offset: usize, token: &Token) -> bool {
        self.tokens.get(self.pos + offset).is_some_and(|s| &s.token == token)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let spanned = self.tokens.get(self.pos).cloned();
        if spanned.is_some() {
            self.pos += 1;
        }
        spanned
    }

    fn error_at(&self, position: usize, kind: SyntaxError) -> CompileError {
        CompileError::new(self.formula, position, kind)
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        match self.peek() {
            Some(spanned) => self.error_at(
                spanned.position,
                SyntaxError::UnexpectedToken {
                    found: spanned.token.describe(),
                    expected: expected.to_string(),
                },
            ),
            None => self.error_at(self.formula.len(), SyntaxError::UnexpectedEnd(expected.to_string())),
        }
    }

    fn expect(&mut self, token: Token, expected: &str) -> Result<(), CompileError> {
        if self.peek_token() == Some(&token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn or_expr(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.and_expr()?;
        while self.peek_is_word("OR") {
            self.pos += 1;
            let right = self.and_expr()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.not_expr()?;
        while self.peek_is_word("AND") {
            self.pos += 1;
            let right = self.not_expr()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, CompileError> {
        let is_not_word = self.peek_is_word("NOT") && !self.next_is(1, &Token::LParen);
        if is_not_word || self.peek_token() == Some(&Token::Bang) {
            self.pos += 1;
            let operand = self.not_expr()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::NotEq,
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.additive()?;
            left = binary(op, left, right);
        }
    }

    fn additive(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = binary(op, left, right);
        }
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        let op = match self.peek_token() {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => UnaryOp::Plus,
            _ => return self.primary(),
        };
        self.pos += 1;
        let operand = self.unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn primary(&mut self) -> Result<Expr, CompileError> {
        let Some(spanned) = self.advance() else {
            return Err(self.unexpected("an operand"));
        };

        match spanned.token {
            Token::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Field(name) => Ok(Expr::Field(name)),
            Token::ForeignField { collection, field } => Ok(Expr::ForeignField { collection, field }),
            Token::LParen => {
                let inner = self.or_expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if self.peek_token() == Some(&Token::LParen) {
                    return self.call(name, spanned.position);
                }
                match name.to_ascii_lowercase().as_str() {
                    "true" => Ok(Expr::Literal(Value::Bool(true))),
                    "false" => Ok(Expr::Literal(Value::Bool(false))),
                    "null" => Ok(Expr::Literal(Value::Null)),
                    _ => Err(self.error_at(spanned.position, SyntaxError::UnknownIdentifier(name))),
                }
            }
            _ => {
                self.pos -= 1;
                Err(self.unexpected("an operand"))
            }
        }
    }

    fn call(&mut self, name: String, position: usize) -> Result<Expr, CompileError> {
        let function = builtins::lookup(&name)
            .ok_or_else(|| self.error_at(position, SyntaxError::UnknownFunction(name.to_uppercase())))?;

        self.expect(Token::LParen, "'('")?;
        let mut args = Vec::new();
        if self.peek_token() == Some(&Token::RParen) {
            self.pos += 1;
        } else {
            loop {
                args.push(self.or_expr()?);
                match self.peek_token() {
                    Some(Token::Comma) => self.pos += 1,
                    Some(Token::RParen) => {
                        self.pos += 1;
                        break;
                    }
                    _ => return Err(self.unexpected("',' or ')'")),
                }
            }
        }

        if !function.accepts(args.len()) {
            return Err(self.error_at(
                position,
                SyntaxError::Arity {
                    name: function.name.to_string(),
                    expected: function.arity_label(),
                    got: args.len(),
                },
            ));
        }

        Ok(Expr::Call { function, args })
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str) -> Expr {
        Expr::Field(name.into())
    }

    fn num(n: f64) -> Expr {
        Expr::Literal(Value::Number(n))
    }

    #[test]
    fn arithmetic_precedence() {
        let expr = parse("{{a}} + {{b}} * 2").unwrap();
        assert_eq!(
            expr,
            binary(BinaryOp::Add, field("a"), binary(BinaryOp::Mul, field("b"), num(2.0)))
        );
    }

    #[test]
    fn parentheses_override_precedence() {
        let expr = parse("({{a}} + {{b}}) * 2").unwrap();
        assert_eq!(
            expr,
            binary(BinaryOp::Mul, binary(BinaryOp::Add, field("a"), field("b")), num(2.0))
        );
    }

    #[test]
    fn logical_words_are_case_insensitive() {
        let expr = parse("{{a}} > 1 and {{b}} < 2 Or {{c}}").unwrap();
        let Expr::Binary { op, left, .. } = expr else {
            panic!("expected OR at the root");
        };
        assert_eq!(op, BinaryOp::Or);
        assert!(matches!(*left, Expr::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn not_binds_looser_than_comparison() {
        let expr = parse("NOT {{a}} = 1").unwrap();
        assert_eq!(
            expr,
            Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(binary(BinaryOp::Eq, field("a"), num(1.0))),
            }
        );
    }

    #[test]
    fn logical_function_forms() {
        let expr = parse("and({{a}}, {{b}})").unwrap();
        assert!(matches!(expr, Expr::Call { function, .. } if function.name == "AND"));

        let expr = parse("NOT({{a}})").unwrap();
        assert!(matches!(expr, Expr::Call { function, .. } if function.name == "NOT"));
    }

    #[test]
    fn function_names_are_case_insensitive() {
        let expr = parse("upper({{name}})").unwrap();
        assert!(matches!(expr, Expr::Call { function, .. } if function.name == "UPPER"));
    }

    #[test]
    fn literals() {
        assert_eq!(parse("TRUE").unwrap(), Expr::Literal(Value::Bool(true)));
        assert_eq!(parse("null").unwrap(), Expr::Literal(Value::Null));
        assert_eq!(parse("\"x\"").unwrap(), Expr::Literal(Value::from("x")));
        assert_eq!(parse("   ").unwrap(), Expr::Literal(Value::Null));
    }

    #[test]
    fn unbalanced_parentheses() {
        let err = parse("({{a}} + 1").unwrap_err();
        assert!(matches!(err.kind, SyntaxError::UnexpectedEnd(_)));
        assert!(err.to_string().contains("({{a}} + 1"));

        let err = parse("{{a}} + 1)").unwrap_err();
        assert!(matches!(err.kind, SyntaxError::UnexpectedToken { .. }));
    }

    #[test]
    fn unknown_function() {
        let err = parse("FROBNICATE({{a}})").unwrap_err();
        assert_eq!(err.kind, SyntaxError::UnknownFunction("FROBNICATE".into()));
    }

    #[test]
    fn arity_is_checked() {
        let err = parse("IF({{a}})").unwrap_err();
        assert!(matches!(err.kind, SyntaxError::Arity { got: 1, .. }));

        let err = parse("TODAY(1)").unwrap_err();
        assert!(matches!(err.kind, SyntaxError::Arity { got: 1, .. }));
    }

    #[test]
    fn bare_word_is_rejected() {
        let err = parse("{{a}} + price").unwrap_err();
        assert_eq!(err.kind, SyntaxError::UnknownIdentifier("price".into()));
    }

    #[test]
    fn field_collection() {
        let expr = parse("IF({{a}} > 0, {{b}} + {{a}}, {{Other.c}})").unwrap();
        assert_eq!(expr.fields(), vec!["a".to_string(), "b".to_string()]);
    }
}
