//! Config fragment errors

/// Errors raised while locating, parsing or rendering a config block
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FragmentError {
    /// Byte offset is relative to the whole definition file
    #[error("Syntax error at byte {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to render config: {0}")]
    Render(String),
}

impl FragmentError {
    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}
