use crate::{EncodeResult, Offset};
use std::ptr::{self, null_mut};

/// One encoding handed to C.
///
/// Every array holds `len` entries. An array that was not requested is null;
/// a requested one is non-null even when `len` is 0. `tokens` holds all token
/// strings back to back (UTF-8, no terminator) over `tokens_len` bytes, and
/// `token_ends[i]` is the end of token `i` within it.
#[repr(C)]
#[derive(Debug)]
pub struct tokenizers_buffer {
    pub ids: *mut u32,
    pub type_ids: *mut u32,
    pub special_tokens_mask: *mut u32,
    pub attention_mask: *mut u32,
    pub tokens: *mut u8,
    pub tokens_len: usize,
    pub token_ends: *mut usize,
    pub offsets: *mut Offset,
    pub len: usize,
}

/// `len` buffers, each released with its owner.
#[repr(C)]
#[derive(Debug)]
pub struct tokenizers_batch_buffer {
    pub buffers: *mut tokenizers_buffer,
    pub len: usize,
}

fn leak<T>(vec: Vec<T>) -> *mut T {
    Box::into_raw(vec.into_boxed_slice()).cast()
}

fn leak_opt<T>(vec: Option<Vec<T>>) -> *mut T {
    vec.map_or(null_mut(), leak)
}

/// # Safety
///
/// `ptr` is null or came from [`leak`] with `len` elements.
unsafe fn reclaim<T>(ptr: *mut T, len: usize) {
    if !ptr.is_null() {
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(ptr, len)));
    }
}

impl tokenizers_buffer {
    /// All null, what a failed encode returns.
    pub const fn empty() -> Self {
        Self {
            ids: null_mut(),
            type_ids: null_mut(),
            special_tokens_mask: null_mut(),
            attention_mask: null_mut(),
            tokens: null_mut(),
            tokens_len: 0,
            token_ends: null_mut(),
            offsets: null_mut(),
            len: 0,
        }
    }

    /// # Safety
    ///
    /// `self` was built by `From<EncodeResult>` or [`empty`](Self::empty) and
    /// has not been released before.
    pub(super) unsafe fn release(self) {
        let len = self.len;
        reclaim(self.ids, len);
        reclaim(self.type_ids, len);
        reclaim(self.special_tokens_mask, len);
        reclaim(self.attention_mask, len);
        reclaim(self.tokens, self.tokens_len);
        reclaim(self.token_ends, len);
        reclaim(self.offsets, len);
    }
}

impl From<EncodeResult> for tokenizers_buffer {
    fn from(value: EncodeResult) -> Self {
        let len = value.len();
        let (tokens, tokens_len, token_ends) = match value.tokens {
            Some(tokens) => {
                let (text, ends) = tokens.into_parts();
                let text_len = text.len();
                (leak(text.into_bytes()), text_len, leak(ends))
            }
            None => (null_mut(), 0, null_mut()),
        };
        Self {
            ids: leak(value.ids),
            type_ids: leak_opt(value.type_ids),
            special_tokens_mask: leak_opt(value.special_tokens_mask),
            attention_mask: leak_opt(value.attention_mask),
            tokens,
            tokens_len,
            token_ends,
            offsets: leak_opt(value.offsets),
            len,
        }
    }
}

impl tokenizers_batch_buffer {
    pub const fn empty() -> Self {
        Self {
            buffers: null_mut(),
            len: 0,
        }
    }

    /// # Safety
    ///
    /// Same as [`tokenizers_buffer::release`], for the batch and every buffer in it.
    pub(super) unsafe fn release(self) {
        if self.buffers.is_null() {
            return;
        }
        let buffers = Box::from_raw(ptr::slice_from_raw_parts_mut(self.buffers, self.len));
        for buffer in buffers.into_vec() {
            buffer.release();
        }
    }
}

impl From<Vec<EncodeResult>> for tokenizers_batch_buffer {
    fn from(value: Vec<EncodeResult>) -> Self {
        let buffers = value.into_iter().map(tokenizers_buffer::from).collect::<Vec<_>>();
        Self {
            len: buffers.len(),
            buffers: leak(buffers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tokens;

    #[test]
    fn ids_only() {
        let buffer = tokenizers_buffer::from(EncodeResult {
            ids: vec![0, 1, 2],
            ..Default::default()
        });
        assert_eq!(buffer.len, 3);
        assert!(!buffer.ids.is_null());
        assert!(buffer.type_ids.is_null());
        assert!(buffer.tokens.is_null());
        assert!(buffer.token_ends.is_null());
        assert!(buffer.offsets.is_null());
        unsafe { buffer.release() };
        unsafe { tokenizers_buffer::empty().release() };
    }

    #[test]
    fn requested_empty_fields_are_not_null() {
        let buffer = tokenizers_buffer::from(EncodeResult {
            ids: vec![],
            type_ids: Some(vec![]),
            tokens: Some(Tokens::default()),
            offsets: Some(vec![]),
            ..Default::default()
        });
        assert_eq!(buffer.len, 0);
        assert!(!buffer.ids.is_null());
        assert!(!buffer.type_ids.is_null());
        assert!(!buffer.tokens.is_null());
        assert!(!buffer.token_ends.is_null());
        assert!(!buffer.offsets.is_null());
        assert!(buffer.attention_mask.is_null());
        unsafe { buffer.release() };
    }

    #[test]
    fn tokens_layout() {
        let buffer = tokenizers_buffer::from(EncodeResult {
            ids: vec![0, 1],
            tokens: Some(["hi", "thére"].into_iter().collect()),
            ..Default::default()
        });
        let (text, ends) = unsafe {
            (
                std::slice::from_raw_parts(buffer.tokens, buffer.tokens_len),
                std::slice::from_raw_parts(buffer.token_ends, buffer.len),
            )
        };
        assert_eq!(text, "hithére".as_bytes());
        assert_eq!(ends, [2, 8]);
        unsafe { buffer.release() };
    }

    #[test]
    fn batch() {
        let batch = tokenizers_batch_buffer::from(vec![
            EncodeResult {
                ids: vec![1],
                attention_mask: Some(vec![1]),
                ..Default::default()
            },
            EncodeResult::default(),
        ]);
        assert_eq!(batch.len, 2);
        let second = unsafe { &*batch.buffers.add(1) };
        assert_eq!(second.len, 0);
        assert!(!second.ids.is_null());
        unsafe { batch.release() };
        unsafe { tokenizers_batch_buffer::empty().release() };
    }
}
