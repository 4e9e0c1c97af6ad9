use super::utok;
use patricia_tree::PatriciaMap;
use rustc_hash::FxHashSet;

/// Special-token literals, matched longest first.
pub(super) struct SpecialTokens {
    trie: PatriciaMap<utok>,
    ids: FxHashSet<utok>,
}

pub(super) enum Segment<'a> {
    /// Ordinary text starting at byte `start` of the input.
    Text { start: usize, text: &'a str },
    Special { start: usize, end: usize, id: utok },
}

impl SpecialTokens {
    pub fn new() -> Self {
        Self {
            trie: PatriciaMap::new(),
            ids: FxHashSet::default(),
        }
    }

    /// Registers a matchable literal.
    pub fn insert(&mut self, content: &str, id: utok) {
        self.trie.insert(content, id);
        self.ids.insert(id);
    }

    /// Registers an id that is special but never matched in text.
    pub fn reserve(&mut self, id: utok) {
        self.ids.insert(id);
    }

    #[inline]
    pub fn contains_id(&self, id: utok) -> bool {
        self.ids.contains(&id)
    }

    #[inline]
    pub fn get(&self, content: &str) -> Option<utok> {
        self.trie.get(content).copied()
    }

    pub fn split<'a>(&self, text: &'a str) -> Vec<Segment<'a>> {
        let mut segments = Vec::new();
        let mut last = 0;
        let mut pos = 0;
        while pos < text.len() {
            let rest = &text[pos..];
            match self.trie.get_longest_common_prefix(rest) {
                Some((pre, &id)) if !pre.is_empty() => {
                    if last < pos {
                        segments.push(Segment::Text {
                            start: last,
                            text: &text[last..pos],
                        });
                    }
                    let end = pos + pre.len();
                    segments.push(Segment::Special { start: pos, end, id });
                    pos = end;
                    last = end;
                }
                _ => pos += rest.chars().next().map_or(1, char::len_utf8),
            }
        }
        if last < text.len() {
            segments.push(Segment::Text {
                start: last,
                text: &text[last..],
            });
        }
        segments
    }
}

#[test]
fn test_split() {
    let mut special = SpecialTokens::new();
    special.insert("<|a|>", 10);
    special.insert("<|a|><|a|>", 11);
    special.insert("<|é|>", 12);
    special.reserve(13);

    let segments = special.split("x<|a|><|a|>y<|é|><|a");
    let parts = segments
        .iter()
        .map(|s| match s {
            Segment::Text { start, text } => format!("{start}:{text}"),
            Segment::Special { start, end, id } => format!("{start}-{end}#{id}"),
        })
        .collect::<Vec<_>>();
    assert_eq!(parts, ["0:x", "1-11#11", "11:y", "12-18#12", "18:<|a"]);

    assert!(special.contains_id(13));
    assert!(!special.contains_id(14));
    assert_eq!(special.get("<|é|>"), Some(12));
    assert_eq!(special.get("<|b|>"), None);
    assert!(special.split("").is_empty());
}
