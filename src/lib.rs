mod chat_template;
mod encoding;
mod error;
mod handle;
mod options;
mod tokenizer;

pub mod ffi;
pub mod log;

pub use chat_template::{ChatTemplate, Message};
pub use encoding::{EncodeResult, Offset, Tokens};
pub use error::{Error, Result};
pub use handle::Tokenizer;
pub use options::{EncodeOptions, OffsetsMode, TokenizerOptions, Truncation, TruncationDirection};
pub use tokenizer::utok;

/// Package version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Revision of the C structs and signatures, bumped on any layout change.
pub const ABI_VERSION: u32 = 1;
