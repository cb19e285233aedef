//! A definition file together with its parsed config block

use crate::block::ConfigBlock;
use crate::error::FragmentError;
use crate::fragment::ConfigFragment;
use crate::relaxed;

/// Source text of a definition file and its structured config
#[derive(Debug, Clone)]
pub struct SqlxDocument {
    text: String,
    block: Option<ConfigBlock>,
    fragment: ConfigFragment,
}

impl SqlxDocument {
    /// Parse a definition file
    ///
    /// A file without a config block gets an in-memory `{ type: "table" }`
    /// fragment; [`SqlxDocument::has_block`] tells the two cases apart.
    pub fn parse(text: impl Into<String>) -> Result<Self, FragmentError> {
        let text = text.into();

        let Some(block) = ConfigBlock::locate(&text)? else {
            return Ok(Self {
                text,
                block: None,
                fragment: ConfigFragment::empty_table(),
            });
        };

        let (value, end) = relaxed::parse_value(&text, block.body.start)?;
        if end != block.body.end {
            return Err(FragmentError::syntax(end, "unexpected content in config block"));
        }
        let fragment = ConfigFragment::from_value(value)?;

        Ok(Self {
            text,
            block: Some(block),
            fragment,
        })
    }

    pub fn has_block(&self) -> bool {
        self.block.is_some()
    }

    pub fn block(&self) -> Option<&ConfigBlock> {
        self.block.as_ref()
    }

    pub fn fragment(&self) -> &ConfigFragment {
        &self.fragment
    }

    pub fn fragment_mut(&mut self) -> &mut ConfigFragment {
        &mut self.fragment
    }

    /// Original file text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// File text with the block replaced by the current fragment
    ///
    /// Everything outside the block is kept byte for byte. Returns `None`
    /// for files that had no block to replace.
    pub fn render(&self) -> Result<Option<String>, FragmentError> {
        let Some(block) = &self.block else {
            return Ok(None);
        };

        let rendered = self.fragment.render()?;
        let mut out = String::with_capacity(self.text.len() + rendered.len());
        out.push_str(&self.text[..block.span.start]);
        out.push_str(&rendered);
        out.push_str(&self.text[block.span.end..]);
        Ok(Some(out))
    }
}
