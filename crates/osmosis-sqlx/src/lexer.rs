//! Tokenizer for the relaxed object syntax used inside `config { ... }`
//!
//! The syntax is a JavaScript object literal restricted to data: unquoted or
//! quoted keys, single- or double-quoted strings, numbers, `true`/`false`/`null`,
//! arrays, nested objects, trailing commas and `//` / `/* */` comments.

use crate::error::FragmentError;

/// Kind of a lexed token
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Colon,
    Comma,

    /// String literal, escapes already resolved
    Str(String),

    /// Numeric literal in JSON number syntax
    Number(String),

    /// Bare identifier (`type`, `true`, `bigqueryPolicyTags`, ...)
    Word(String),

    /// Any other character; only an error if the parser meets it
    Other(char),
}

/// A token with its byte span in the source text
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

/// Streaming tokenizer over a string slice
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Start lexing `src` at byte offset `pos`
    pub fn new(src: &'a str, pos: usize) -> Self {
        Self { src, pos }
    }

    /// Current byte offset
    pub fn position(&self) -> usize {
        self.pos
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.src[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_trivia(&mut self) -> Result<(), FragmentError> {
        loop {
            match (self.peek(), self.peek_second()) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.pos;
                    self.pos += 2;
                    match self.src[self.pos..].find("*/") {
                        Some(end) => self.pos += end + 2,
                        None => {
                            return Err(FragmentError::syntax(start, "unterminated block comment"));
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Next token, or `None` at end of input
    pub fn next_token(&mut self) -> Result<Option<Token>, FragmentError> {
        self.skip_trivia()?;

        let start = self.pos;
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let kind = match c {
            '{' => {
                self.bump();
                TokenKind::LBrace
            }
            '}' => {
                self.bump();
                TokenKind::RBrace
            }
            '[' => {
                self.bump();
                TokenKind::LBracket
            }
            ']' => {
                self.bump();
                TokenKind::RBracket
            }
            ':' => {
                self.bump();
                TokenKind::Colon
            }
            ',' => {
                self.bump();
                TokenKind::Comma
            }
            '"' | '\'' => TokenKind::Str(self.string(c)?),
            c if is_bare_char(c) => self.bare(start)?,
            other => {
                self.bump();
                TokenKind::Other(other)
            }
        };

        Ok(Some(Token {
            kind,
            start,
            end: self.pos,
        }))
    }

    fn bare(&mut self, start: usize) -> Result<TokenKind, FragmentError> {
        while let Some(c) = self.peek() {
            if !is_bare_char(c) {
                break;
            }
            self.bump();
        }

        let text = &self.src[start..self.pos];
        if serde_json::from_str::<serde_json::Number>(text).is_ok() {
            Ok(TokenKind::Number(text.to_string()))
        } else if text.chars().all(is_ident_char) {
            Ok(TokenKind::Word(text.to_string()))
        } else {
            Err(FragmentError::syntax(start, format!("unexpected `{}`", text)))
        }
    }

    fn string(&mut self, quote: char) -> Result<String, FragmentError> {
        let start = self.pos;
        self.bump();
        let mut out = String::new();

        loop {
            let Some(c) = self.bump() else {
                return Err(FragmentError::syntax(start, "unterminated string"));
            };

            match c {
                c if c == quote => return Ok(out),
                '\n' => return Err(FragmentError::syntax(start, "unterminated string")),
                '\\' => {
                    let Some(escaped) = self.bump() else {
                        return Err(FragmentError::syntax(start, "unterminated string"));
                    };
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        'b' => out.push('\u{8}'),
                        'f' => out.push('\u{c}'),
                        'u' => out.push(self.unicode_escape()?),
                        // Escaped line break continues the string
                        '\n' => {}
                        // `\'`, `\"`, `\\`, `\/` and unknown escapes keep the character
                        other => out.push(other),
                    }
                }
                other => out.push(other),
            }
        }
    }

    fn hex4(&mut self) -> Result<u32, FragmentError> {
        let start = self.pos;
        let digits = self
            .src
            .get(self.pos..self.pos + 4)
            .filter(|d| d.chars().all(|c| c.is_ascii_hexdigit()))
            .ok_or_else(|| FragmentError::syntax(start, "invalid \\u escape"))?;
        self.pos += 4;
        u32::from_str_radix(digits, 16).map_err(|_| FragmentError::syntax(start, "invalid \\u escape"))
    }

    fn unicode_escape(&mut self) -> Result<char, FragmentError> {
        let start = self.pos;
        let high = self.hex4()?;

        let code = if (0xD800..0xDC00).contains(&high) {
            if !self.src[self.pos..].starts_with("\\u") {
                return Err(FragmentError::syntax(start, "unpaired surrogate in \\u escape"));
            }
            self.pos += 2;
            let low = self.hex4()?;
            if !(0xDC00..0xE000).contains(&low) {
                return Err(FragmentError::syntax(start, "unpaired surrogate in \\u escape"));
            }
            0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
        } else {
            high
        };

        char::from_u32(code).ok_or_else(|| FragmentError::syntax(start, "invalid \\u escape"))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn is_bare_char(c: char) -> bool {
    is_ident_char(c) || matches!(c, '.' | '+' | '-')
}
