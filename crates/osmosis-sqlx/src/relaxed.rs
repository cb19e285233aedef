//! Recursive-descent parser for the relaxed object syntax
//!
//! ```text
//! value   := object | array | string | number | true | false | null
//! object  := '{' [ member (',' member)* [','] ] '}'
//! member  := key ':' value
//! key     := identifier | string | number
//! array   := '[' [ value (',' value)* [','] ] ']'
//! ```
//!
//! Duplicate keys keep the position of their first occurrence and the value
//! of their last, the same as a JavaScript object literal.

use crate::error::FragmentError;
use crate::lexer::{Lexer, Token, TokenKind};
use serde_json::{Map, Number, Value};

/// Nesting limit for objects and arrays
const MAX_DEPTH: usize = 128;

/// Parse one value starting at byte `start` of `src`
///
/// Returns the value and the byte offset just past it.
pub fn parse_value(src: &str, start: usize) -> Result<(Value, usize), FragmentError> {
    let mut parser = Parser {
        lexer: Lexer::new(src, start),
        peeked: None,
        depth: 0,
    };
    let value = parser.value()?;
    Ok((value, parser.lexer.position()))
}

/// Parse `src` as exactly one value with nothing but trivia after it
pub fn parse_str(src: &str) -> Result<Value, FragmentError> {
    let mut parser = Parser {
        lexer: Lexer::new(src, 0),
        peeked: None,
        depth: 0,
    };
    let value = parser.value()?;
    if let Some(tok) = parser.next()? {
        return Err(FragmentError::syntax(tok.start, "unexpected content after value"));
    }
    Ok(value)
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    peeked: Option<Token>,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn next(&mut self) -> Result<Option<Token>, FragmentError> {
        match self.peeked.take() {
            Some(tok) => Ok(Some(tok)),
            None => self.lexer.next_token(),
        }
    }

    fn peek(&mut self) -> Result<Option<&Token>, FragmentError> {
        if self.peeked.is_none() {
            self.peeked = self.lexer.next_token()?;
        }
        Ok(self.peeked.as_ref())
    }

    fn expect_next(&mut self, what: &str) -> Result<Token, FragmentError> {
        let offset = self.lexer.position();
        self.next()?
            .ok_or_else(|| FragmentError::syntax(offset, format!("unexpected end of input, expected {}", what)))
    }

    fn enter(&mut self, offset: usize) -> Result<(), FragmentError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(FragmentError::syntax(offset, "nesting too deep"));
        }
        Ok(())
    }

    fn value(&mut self) -> Result<Value, FragmentError> {
        let tok = self.expect_next("a value")?;
        match tok.kind {
            TokenKind::LBrace => self.object(tok.start),
            TokenKind::LBracket => self.array(tok.start),
            TokenKind::Str(s) => Ok(Value::String(s)),
            TokenKind::Number(text) => parse_number(&text, tok.start),
            TokenKind::Word(word) => match word.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                "null" => Ok(Value::Null),
                _ => Err(FragmentError::syntax(
                    tok.start,
                    format!("unquoted value `{}`", word),
                )),
            },
            other => Err(unexpected(&other, tok.start, "a value")),
        }
    }

    fn object(&mut self, open: usize) -> Result<Value, FragmentError> {
        self.enter(open)?;
        let mut map = Map::new();

        loop {
            let tok = self.expect_next("a key or `}`")?;
            let key = match tok.kind {
                TokenKind::RBrace => break,
                TokenKind::Word(w) => w,
                TokenKind::Str(s) => s,
                TokenKind::Number(n) => n,
                other => return Err(unexpected(&other, tok.start, "a key or `}`")),
            };

            let colon = self.expect_next("`:`")?;
            if colon.kind != TokenKind::Colon {
                return Err(unexpected(&colon.kind, colon.start, "`:`"));
            }

            let value = self.value()?;
            map.insert(key, value);

            let sep = self.expect_next("`,` or `}`")?;
            match sep.kind {
                TokenKind::Comma => {
                    if matches!(self.peek()?, Some(Token { kind: TokenKind::RBrace, .. })) {
                        self.next()?;
                        break;
                    }
                }
                TokenKind::RBrace => break,
                other => return Err(unexpected(&other, sep.start, "`,` or `}`")),
            }
        }

        self.depth -= 1;
        Ok(Value::Object(map))
    }

    fn array(&mut self, open: usize) -> Result<Value, FragmentError> {
        self.enter(open)?;
        let mut items = Vec::new();

        if matches!(self.peek()?, Some(Token { kind: TokenKind::RBracket, .. })) {
            self.next()?;
            self.depth -= 1;
            return Ok(Value::Array(items));
        }

        loop {
            items.push(self.value()?);

            let sep = self.expect_next("`,` or `]`")?;
            match sep.kind {
                TokenKind::Comma => {
                    if matches!(self.peek()?, Some(Token { kind: TokenKind::RBracket, .. })) {
                        self.next()?;
                        break;
                    }
                }
                TokenKind::RBracket => break,
                other => return Err(unexpected(&other, sep.start, "`,` or `]`")),
            }
        }

        self.depth -= 1;
        Ok(Value::Array(items))
    }
}

fn parse_number(text: &str, offset: usize) -> Result<Value, FragmentError> {
    serde_json::from_str::<Number>(text)
        .map(Value::Number)
        .map_err(|e| FragmentError::syntax(offset, format!("invalid number `{}`: {}", text, e)))
}

fn unexpected(kind: &TokenKind, offset: usize, expected: &str) -> FragmentError {
    let found = match kind {
        TokenKind::LBrace => "`{`".to_string(),
        TokenKind::RBrace => "`}`".to_string(),
        TokenKind::LBracket => "`[`".to_string(),
        TokenKind::RBracket => "`]`".to_string(),
        TokenKind::Colon => "`:`".to_string(),
        TokenKind::Comma => "`,`".to_string(),
        TokenKind::Str(s) => format!("string {:?}", s),
        TokenKind::Number(n) => format!("number {}", n),
        TokenKind::Word(w) => format!("`{}`", w),
        TokenKind::Other(c) => format!("`{}`", c),
    };
    FragmentError::syntax(offset, format!("expected {}, found {}", expected, found))
}
