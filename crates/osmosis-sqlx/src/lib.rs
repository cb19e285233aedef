//! SQLX definition files
//!
//! Locates the `config { ... }` block at the head of a `.sqlx` file, parses its
//! relaxed object syntax into a structured [`ConfigFragment`] and splices the
//! normalized block back without touching the rest of the file.

pub mod block;
pub mod document;
pub mod error;
pub mod fragment;
pub mod lexer;
pub mod relaxed;

pub use block::{ConfigBlock, CONFIG_KEYWORD};
pub use document::SqlxDocument;
pub use error::FragmentError;
pub use fragment::{ColumnRecord, Columns, ConfigFragment, TableKind};
