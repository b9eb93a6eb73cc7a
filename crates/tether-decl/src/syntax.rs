//! Type and constant-expression grammar used inside declaration strings.
//!
//! ```text
//! type   := prefix '*'*
//! prefix := '*' type | 'fn' '(' [type (',' type)*] ')' ['->' type] | ident+
//! expr   := sum ('<<' sum)*
//! sum    := atom (('+' | '-') atom)*
//! atom   := integer | ident | '(' expr ')'
//! ```
//!
//! Consecutive identifiers form one name, so C spellings like `unsigned long` work.

use std::iter::Peekable;
use std::str::CharIndices;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TypeExpr {
    Named(String),
    Pointer(Box<TypeExpr>),
    Fn {
        params: Vec<TypeExpr>,
        ret: Box<TypeExpr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Int(i64),
    Const(String),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Shl(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Star,
    LParen,
    RParen,
    Comma,
    Arrow,
    Plus,
    Minus,
    Shl,
}

fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars: Peekable<CharIndices<'_>> = src.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '*' => Token::Star,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            '+' => Token::Plus,
            '-' if matches!(chars.peek(), Some((_, '>'))) => {
                chars.next();
                Token::Arrow
            }
            '-' => Token::Minus,
            '<' if matches!(chars.peek(), Some((_, '<'))) => {
                chars.next();
                Token::Shl
            }
            c if c.is_ascii_digit() => {
                let mut end = start + c.len_utf8();
                while let Some((i, d)) = chars.peek().copied() {
                    if !d.is_ascii_alphanumeric() {
                        break;
                    }
                    end = i + d.len_utf8();
                    chars.next();
                }
                Token::Int(parse_int(&src[start..end])?)
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = start + c.len_utf8();
                while let Some((i, d)) = chars.peek().copied() {
                    if !(d.is_alphanumeric() || d == '_') {
                        break;
                    }
                    end = i + d.len_utf8();
                    chars.next();
                }
                Token::Ident(src[start..end].to_string())
            }
            other => return Err(format!("unexpected character `{}` at {}", other, start)),
        };
        tokens.push(token);
    }
    Ok(tokens)
}

fn parse_int(text: &str) -> Result<i64, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|_| format!("invalid integer `{}`", text))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(src: &str) -> Result<Self, String> {
        Ok(Parser {
            tokens: tokenize(src)?,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), String> {
        match self.next() {
            Some(found) if found == token => Ok(()),
            Some(found) => Err(format!("expected {:?}, found {:?}", token, found)),
            None => Err(format!("expected {:?}, found end of input", token)),
        }
    }

    fn finish(&self) -> Result<(), String> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(format!("unexpected trailing {:?}", token)),
        }
    }

    fn ty(&mut self) -> Result<TypeExpr, String> {
        let mut ty = self.prefix()?;
        while self.eat(&Token::Star) {
            ty = TypeExpr::Pointer(Box::new(ty));
        }
        Ok(ty)
    }

    fn prefix(&mut self) -> Result<TypeExpr, String> {
        if self.eat(&Token::Star) {
            return Ok(TypeExpr::Pointer(Box::new(self.ty()?)));
        }
        if self.peek() == Some(&Token::Ident("fn".to_string())) {
            self.pos += 1;
            return self.fn_type();
        }
        let mut words = Vec::new();
        while let Some(Token::Ident(word)) = self.peek() {
            words.push(word.clone());
            self.pos += 1;
        }
        if words.is_empty() {
            return Err(match self.peek() {
                Some(token) => format!("expected a type, found {:?}", token),
                None => "expected a type, found end of input".to_string(),
            });
        }
        Ok(TypeExpr::Named(words.join(" ")))
    }

    fn fn_type(&mut self) -> Result<TypeExpr, String> {
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                params.push(self.ty()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(Token::Comma)?;
            }
        }
        let ret = if self.eat(&Token::Arrow) {
            self.ty()?
        } else {
            TypeExpr::Named("void".to_string())
        };
        Ok(TypeExpr::Fn {
            params,
            ret: Box::new(ret),
        })
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.sum()?;
        while self.eat(&Token::Shl) {
            lhs = Expr::Shl(Box::new(lhs), Box::new(self.sum()?));
        }
        Ok(lhs)
    }

    fn sum(&mut self) -> Result<Expr, String> {
        let mut lhs = self.atom()?;
        loop {
            if self.eat(&Token::Plus) {
                lhs = Expr::Add(Box::new(lhs), Box::new(self.atom()?));
            } else if self.eat(&Token::Minus) {
                lhs = Expr::Sub(Box::new(lhs), Box::new(self.atom()?));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn atom(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Int(value)) => Ok(Expr::Int(value)),
            Some(Token::Ident(name)) => Ok(Expr::Const(name)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(token) => Err(format!("expected a number or constant, found {:?}", token)),
            None => Err("expected a number or constant, found end of input".to_string()),
        }
    }
}

pub(crate) fn parse_type(src: &str) -> Result<TypeExpr, String> {
    let mut parser = Parser::new(src)?;
    let ty = parser.ty()?;
    parser.finish()?;
    Ok(ty)
}

pub(crate) fn parse_expr(src: &str) -> Result<Expr, String> {
    let mut parser = Parser::new(src)?;
    let expr = parser.expr()?;
    parser.finish()?;
    Ok(expr)
}
