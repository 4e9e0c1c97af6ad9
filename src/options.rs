use crate::{Error, Result};
use serde::Deserialize;

/// Instance-level switches, fixed when the tokenizer is built.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TokenizerOptions {
    /// Treat special-token literals found in the input as plain text.
    pub encode_special_tokens: bool,
}

/// Unit used to measure [`Offset`](crate::Offset)s.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetsMode {
    /// UTF-8 byte positions.
    #[default]
    Byte,
    /// Unicode scalar value positions.
    Char,
}

/// Per-call switches. Every output except `ids` is off unless asked for.
///
/// Unknown fields are ignored on deserialization, so a newer engine reading
/// an older caller's options keeps every new output disabled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EncodeOptions {
    pub add_special_tokens: bool,
    pub return_type_ids: bool,
    pub return_tokens: bool,
    pub return_special_tokens_mask: bool,
    pub return_attention_mask: bool,
    pub return_offsets: bool,
    pub offsets_mode: OffsetsMode,
}

impl EncodeOptions {
    /// Requests every optional output.
    pub fn all() -> Self {
        Self {
            add_special_tokens: false,
            return_type_ids: true,
            return_tokens: true,
            return_special_tokens_mask: true,
            return_attention_mask: true,
            return_offsets: true,
            offsets_mode: OffsetsMode::Byte,
        }
    }

    #[inline]
    pub fn with_special_tokens(mut self, add_special_tokens: bool) -> Self {
        self.add_special_tokens = add_special_tokens;
        self
    }

    #[inline]
    pub fn with_offsets_mode(mut self, mode: OffsetsMode) -> Self {
        self.offsets_mode = mode;
        self
    }
}

/// Which end of an overlong sequence is discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum TruncationDirection {
    /// Drop tokens from the start.
    Left = 0,
    /// Drop tokens from the end.
    Right = 1,
}

impl TryFrom<u8> for TruncationDirection {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Left),
            1 => Ok(Self::Right),
            _ => Err(Error::InvalidArgument(format!(
                "invalid truncation direction: {value}"
            ))),
        }
    }
}

impl From<TruncationDirection> for tokenizers::tokenizer::TruncationDirection {
    fn from(value: TruncationDirection) -> Self {
        match value {
            TruncationDirection::Left => Self::Left,
            TruncationDirection::Right => Self::Right,
        }
    }
}

/// Construction-time length cap applied to every encode call on a handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Truncation {
    max_len: usize,
    direction: TruncationDirection,
}

impl Truncation {
    pub fn new(max_len: usize, direction: TruncationDirection) -> Result<Self> {
        if max_len == 0 {
            return Err(Error::InvalidArgument(
                "truncation max_len must be positive".into(),
            ));
        }
        Ok(Self { max_len, direction })
    }

    #[inline]
    pub const fn max_len(&self) -> usize {
        self.max_len
    }

    #[inline]
    pub const fn direction(&self) -> TruncationDirection {
        self.direction
    }
}
