//! Locating the `config { ... }` block inside a definition file

use crate::error::FragmentError;
use crate::lexer::{Lexer, TokenKind};
use std::ops::Range;

/// Keyword that introduces the configuration block
pub const CONFIG_KEYWORD: &str = "config";

/// Byte ranges of a configuration block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBlock {
    /// From the keyword to the closing brace, inclusive
    pub span: Range<usize>,

    /// From the opening brace to the closing brace, inclusive
    pub body: Range<usize>,
}

impl ConfigBlock {
    /// Find the first `config { ... }` block in `text`
    ///
    /// Brace matching runs on tokens, so braces inside string literals and
    /// comments are ignored and nesting depth is unbounded. Returns `Ok(None)`
    /// when the file has no block at all.
    pub fn locate(text: &str) -> Result<Option<Self>, FragmentError> {
        let Some((keyword, open)) = find_keyword(text) else {
            return Ok(None);
        };

        let mut lexer = Lexer::new(text, open);
        let mut depth = 0usize;

        while let Some(tok) = lexer.next_token()? {
            match tok.kind {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(Some(Self {
                            span: keyword..tok.end,
                            body: open..tok.end,
                        }));
                    }
                }
                _ => {}
            }
        }

        Err(FragmentError::syntax(open, "config block is never closed"))
    }

    /// The block text including the keyword
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.clone()]
    }

    /// The `{ ... }` part of the block
    pub fn body_text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.body.clone()]
    }
}

/// First `config` keyword (on a word boundary) followed by optional
/// whitespace and `{`. Returns the keyword offset and the brace offset.
fn find_keyword(text: &str) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(found) = text[from..].find(CONFIG_KEYWORD) {
        let start = from + found;
        let after = start + CONFIG_KEYWORD.len();
        from = after;

        let boundary_before = text[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_' || c == '$'));
        if !boundary_before {
            continue;
        }

        let rest = &text[after..];
        let trimmed = rest.trim_start();
        if trimmed.starts_with('{') {
            return Some((start, after + (rest.len() - trimmed.len())));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locates_simple_block() {
        let text = "config { type: \"table\" }\nselect 1";
        let block = ConfigBlock::locate(text).unwrap().unwrap();
        assert_eq!(block.text(text), "config { type: \"table\" }");
        assert_eq!(block.body_text(text), "{ type: \"table\" }");
    }

    #[test]
    fn nested_braces() {
        let text = "config {\n  columns: {\n    name: { description: \"n\", x: { y: {} } }\n  }\n}\nselect 1";
        let block = ConfigBlock::locate(text).unwrap().unwrap();
        assert!(block.text(text).ends_with("}\n}"));
        assert_eq!(&text[block.span.end..], "\nselect 1");
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let text = "config { description: \"a } b { c\" }\nselect '${x}'";
        let block = ConfigBlock::locate(text).unwrap().unwrap();
        assert_eq!(block.text(text), "config { description: \"a } b { c\" }");
    }

    #[test]
    fn leading_content_and_no_whitespace() {
        let text = "-- header\nconfig{type: 'view'}\nselect 1";
        let block = ConfigBlock::locate(text).unwrap().unwrap();
        assert_eq!(block.span.start, 10);
        assert_eq!(block.text(text), "config{type: 'view'}");
    }

    #[test]
    fn keyword_needs_word_boundary() {
        let text = "select myconfig { }";
        assert_eq!(ConfigBlock::locate(text).unwrap(), None);

        let text = "-- configuration notes\nconfig { }";
        let block = ConfigBlock::locate(text).unwrap().unwrap();
        assert_eq!(block.text(text), "config { }");
    }

    #[test]
    fn missing_block() {
        assert_eq!(ConfigBlock::locate("select 1").unwrap(), None);
    }

    #[test]
    fn unclosed_block_is_an_error() {
        assert!(ConfigBlock::locate("config { type: 'table'").is_err());
        assert!(ConfigBlock::locate("config { description: 'open }").is_err());
    }
}
