use crate::{EncodeOptions, OffsetsMode, TokenizerOptions};
use std::{mem::size_of, ptr};

/// Instance options. `size` must be `sizeof(tokenizers_options)` as the
/// caller compiled it.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct tokenizers_options {
    pub size: u32,
    pub encode_special_tokens: bool,
}

/// Per-call options. `size` must be `sizeof(tokenizers_encode_options)` as
/// the caller compiled it; fields past that size read as `false`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct tokenizers_encode_options {
    pub size: u32,
    pub add_special_tokens: bool,
    pub return_type_ids: bool,
    pub return_tokens: bool,
    pub return_special_tokens_mask: bool,
    pub return_attention_mask: bool,
    pub return_offsets: bool,
    pub with_offsets_char_mode: bool,
}

/// Structs whose first field is their own size in bytes.
pub(super) trait SizePrefixed: Copy + Default {
    /// Copies at most `size` leading bytes of `*ptr`; the rest keeps its default.
    ///
    /// # Safety
    ///
    /// `ptr` is null or points to at least `size` readable bytes, `size` being
    /// the leading `u32`.
    unsafe fn read(ptr: *const Self) -> Self {
        let mut ans = Self::default();
        if ptr.is_null() {
            return ans;
        }
        let size = ptr.cast::<u32>().read_unaligned() as usize;
        ptr::copy_nonoverlapping(
            ptr.cast::<u8>(),
            ptr::addr_of_mut!(ans).cast::<u8>(),
            size.min(size_of::<Self>()),
        );
        ans
    }
}

impl SizePrefixed for tokenizers_options {}
impl SizePrefixed for tokenizers_encode_options {}

impl From<tokenizers_options> for TokenizerOptions {
    fn from(value: tokenizers_options) -> Self {
        Self {
            encode_special_tokens: value.encode_special_tokens,
        }
    }
}

impl From<tokenizers_encode_options> for EncodeOptions {
    fn from(value: tokenizers_encode_options) -> Self {
        Self {
            add_special_tokens: value.add_special_tokens,
            return_type_ids: value.return_type_ids,
            return_tokens: value.return_tokens,
            return_special_tokens_mask: value.return_special_tokens_mask,
            return_attention_mask: value.return_attention_mask,
            return_offsets: value.return_offsets,
            offsets_mode: if value.with_offsets_char_mode {
                OffsetsMode::Char
            } else {
                OffsetsMode::Byte
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_on(size: u32) -> tokenizers_encode_options {
        tokenizers_encode_options {
            size,
            add_special_tokens: true,
            return_type_ids: true,
            return_tokens: true,
            return_special_tokens_mask: true,
            return_attention_mask: true,
            return_offsets: true,
            with_offsets_char_mode: true,
        }
    }

    #[test]
    fn null_and_zero_are_defaults() {
        let options = unsafe { tokenizers_encode_options::read(ptr::null()) };
        assert_eq!(EncodeOptions::from(options), EncodeOptions::default());

        let zero = all_on(0);
        let options = unsafe { tokenizers_encode_options::read(&zero) };
        assert_eq!(EncodeOptions::from(options), EncodeOptions::default());
    }

    #[test]
    fn older_caller_prefix() {
        // a caller built before `return_offsets` existed
        let old = all_on(4 + 5);
        let options = EncodeOptions::from(unsafe { tokenizers_encode_options::read(&old) });
        assert!(options.add_special_tokens);
        assert!(options.return_attention_mask);
        assert!(!options.return_offsets);
        assert_eq!(options.offsets_mode, OffsetsMode::Byte);

        let full = all_on(size_of::<tokenizers_encode_options>() as _);
        let options = EncodeOptions::from(unsafe { tokenizers_encode_options::read(&full) });
        assert_eq!(
            options,
            EncodeOptions::all()
                .with_special_tokens(true)
                .with_offsets_mode(OffsetsMode::Char)
        );
    }

    #[test]
    fn newer_caller_is_clamped() {
        let mut bytes = [0xffu8; 64];
        bytes[..4].copy_from_slice(&64u32.to_ne_bytes());
        bytes[4] = 1;
        bytes[5..12].fill(0);
        let options = unsafe { tokenizers_options::read(bytes.as_ptr().cast()) };
        assert!(options.encode_special_tokens);
    }
}
