use crate::{tokenizer::utok, EncodeOptions};

/// Source span of one token, `start <= end`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Offset {
    pub start: usize,
    pub end: usize,
}

impl Offset {
    #[inline]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

impl From<(usize, usize)> for Offset {
    #[inline]
    fn from((start, end): (usize, usize)) -> Self {
        Self { start, end }
    }
}

/// Everything an engine knows about one encoded text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Encoding {
    pub ids: Vec<utok>,
    pub type_ids: Vec<u32>,
    pub tokens: Vec<String>,
    pub special_tokens_mask: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub offsets: Vec<Offset>,
}

/// Token surface forms stored back to back, with the end of each one recorded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tokens {
    text: String,
    ends: Vec<usize>,
}

impl Tokens {
    #[inline]
    pub fn len(&self) -> usize {
        self.ends.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    /// All tokens concatenated.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Exclusive byte end of each token inside [`as_str`](Self::as_str).
    #[inline]
    pub fn ends(&self) -> &[usize] {
        &self.ends
    }

    pub fn get(&self, i: usize) -> Option<&str> {
        let end = *self.ends.get(i)?;
        let start = if i == 0 { 0 } else { self.ends[i - 1] };
        Some(&self.text[start..end])
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }

    pub(crate) fn into_parts(self) -> (String, Vec<usize>) {
        (self.text, self.ends)
    }
}

impl<S: AsRef<str>> FromIterator<S> for Tokens {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut ans = Self::default();
        for token in iter {
            ans.text.push_str(token.as_ref());
            ans.ends.push(ans.text.len());
        }
        ans
    }
}

/// Result of one encode call: `ids` plus whichever outputs were requested.
///
/// A field that was not requested is `None`; a requested field always holds
/// exactly `len()` entries, including zero for empty input.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncodeResult {
    pub ids: Vec<utok>,
    pub type_ids: Option<Vec<u32>>,
    pub tokens: Option<Tokens>,
    pub special_tokens_mask: Option<Vec<u32>>,
    pub attention_mask: Option<Vec<u32>>,
    pub offsets: Option<Vec<Offset>>,
}

impl EncodeResult {
    pub(crate) fn select(encoding: Encoding, options: &EncodeOptions) -> Self {
        let Encoding {
            ids,
            type_ids,
            tokens,
            special_tokens_mask,
            attention_mask,
            offsets,
        } = encoding;
        let len = ids.len();
        debug_assert!([
            type_ids.len(),
            tokens.len(),
            special_tokens_mask.len(),
            attention_mask.len(),
            offsets.len(),
        ]
        .iter()
        .all(|&n| n == len));

        Self {
            ids,
            type_ids: options.return_type_ids.then_some(type_ids),
            tokens: options.return_tokens.then(|| tokens.into_iter().collect()),
            special_tokens_mask: options
                .return_special_tokens_mask
                .then_some(special_tokens_mask),
            attention_mask: options.return_attention_mask.then_some(attention_mask),
            offsets: options.return_offsets.then_some(offsets),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Rewrites byte offsets of `text` as char offsets in place.
///
/// A position inside a multi-byte char maps to the index of the next char.
pub(crate) fn byte_to_char_offsets(text: &str, offsets: &mut [Offset]) {
    let starts = text.char_indices().map(|(i, _)| i).collect::<Vec<_>>();
    let to_char = |b: usize| starts.partition_point(|&s| s < b);
    for offset in offsets {
        offset.start = to_char(offset.start);
        offset.end = to_char(offset.end);
    }
}
