use super::{
    map_file,
    special::{Segment, SpecialTokens},
    utok, Engine,
};
use crate::{
    encoding::{byte_to_char_offsets, Encoding, Offset},
    Error, OffsetsMode, Result,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::{collections::BTreeMap, path::Path};
use tiktoken_rs::CoreBPE;

/// Most ids a config may leave unassigned below its largest id.
const MAX_RESERVED: usize = 1 << 16;

/// `tiktoken` byte-pair encoder over a base64 rank file, a
/// `tokenizer_config.json` and a split pattern.
pub(crate) struct Tiktoken {
    bpe: CoreBPE,
    encoder: FxHashMap<Vec<u8>, utok>,
    /// Bytes of every id below the vocab size.
    decoder: Vec<Vec<u8>>,
    /// Single bytes with a rank of their own.
    byte_ranked: [bool; 256],
    special: SpecialTokens,
    bos: Option<utok>,
    eos: Option<utok>,
}

#[derive(Deserialize)]
struct TokenizerConfig {
    #[serde(default)]
    added_tokens_decoder: BTreeMap<String, AddedToken>,
    #[serde(default)]
    add_bos_token: bool,
    #[serde(default)]
    add_eos_token: bool,
    #[serde(default)]
    bos_token: Option<TokenLiteral>,
    #[serde(default)]
    eos_token: Option<TokenLiteral>,
}

#[derive(Deserialize)]
struct AddedToken {
    content: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TokenLiteral {
    Plain(String),
    Added { content: String },
}

impl TokenLiteral {
    fn content(&self) -> &str {
        match self {
            Self::Plain(s) => s,
            Self::Added { content } => content,
        }
    }
}

impl Tiktoken {
    pub fn from_files(model_file: &Path, config_file: &Path, pattern: &str) -> Result<Self> {
        let mmap = map_file(model_file)?;
        let text = std::str::from_utf8(&mmap)
            .map_err(|e| Error::MalformedConfig(format!("model file is not UTF-8: {e}")))?;
        let encoder = parse_ranks(text)?;

        let config = serde_json::from_slice::<TokenizerConfig>(&map_file(config_file)?)
            .map_err(|e| Error::MalformedConfig(format!("tokenizer config: {e}")))?;
        let mut added = Vec::with_capacity(config.added_tokens_decoder.len());
        for (id, token) in config.added_tokens_decoder {
            let id = id
                .parse::<utok>()
                .map_err(|e| Error::MalformedConfig(format!("added token id {id:?}: {e}")))?;
            if token.content.is_empty() {
                return Err(Error::MalformedConfig(format!("added token {id} is empty")));
            }
            added.push((id, token.content));
        }

        let max_rank = encoder.values().copied().max();
        let max_special = added.iter().map(|(id, _)| *id).max();
        let vocab_size = match (max_rank, max_special) {
            (None, _) => return Err(Error::MalformedConfig("model file has no ranks".into())),
            (Some(r), s) => r.max(s.unwrap_or(0)) as usize + 1,
        };
        if vocab_size > encoder.len() + added.len() + MAX_RESERVED {
            return Err(Error::MalformedConfig(format!(
                "id {} leaves more than {MAX_RESERVED} ids unassigned",
                vocab_size - 1
            )));
        }

        let mut decoder = vec![None::<Vec<u8>>; vocab_size];
        for (bytes, &rank) in &encoder {
            if decoder[rank as usize].replace(bytes.clone()).is_some() {
                return Err(Error::MalformedConfig(format!("rank {rank} is assigned twice")));
            }
        }

        let mut special = SpecialTokens::new();
        let mut special_encoder = FxHashMap::default();
        for (id, content) in added {
            match encoder.get(content.as_bytes()) {
                // listed again as an added token, still ordinary text
                Some(&rank) if rank == id => continue,
                Some(&rank) => {
                    return Err(Error::MalformedConfig(format!(
                        "special token {content:?} is {id} but ranked {rank}"
                    )))
                }
                None => {}
            }
            let slot = &mut decoder[id as usize];
            if slot.is_some() {
                return Err(Error::MalformedConfig(format!(
                    "special token {content:?} collides with rank {id}"
                )));
            }
            *slot = Some(content.clone().into_bytes());
            special.insert(&content, id);
            special_encoder.insert(content, id);
        }

        let mut reserved = 0;
        let decoder = decoder
            .into_iter()
            .enumerate()
            .map(|(id, bytes)| {
                bytes.unwrap_or_else(|| {
                    special.reserve(id as _);
                    reserved += 1;
                    format!("<|reserved_special_token_{}|>", reserved - 1).into_bytes()
                })
            })
            .collect::<Vec<_>>();

        let lookup = |literal: Option<&TokenLiteral>, enabled: bool| -> Result<Option<utok>> {
            match literal {
                Some(literal) if enabled => special
                    .get(literal.content())
                    .map(Some)
                    .ok_or_else(|| {
                        Error::MalformedConfig(format!(
                            "{:?} is not an added token",
                            literal.content()
                        ))
                    }),
                _ => Ok(None),
            }
        };
        let bos = lookup(config.bos_token.as_ref(), config.add_bos_token)?;
        let eos = lookup(config.eos_token.as_ref(), config.add_eos_token)?;

        let mut byte_ranked = [false; 256];
        for bytes in encoder.keys() {
            if let [b] = bytes.as_slice() {
                byte_ranked[*b as usize] = true;
            }
        }

        let bpe = CoreBPE::new(encoder.clone(), special_encoder, pattern)
            .map_err(|e| Error::MalformedConfig(format!("invalid pattern: {e}")))?;

        Ok(Self {
            bpe,
            encoder,
            decoder,
            byte_ranked,
            special,
            bos,
            eos,
        })
    }

    /// Splits `text` with the pattern and merges every piece by rank.
    fn encode_ordinary(&self, text: &str, base: usize, out: &mut Pieces) -> Result<()> {
        if let Some(b) = text.bytes().find(|&b| !self.byte_ranked[b as usize]) {
            return Err(Error::InternalEngine(format!("no rank for byte {b:#04x}")));
        }
        let mut pos = base;
        for id in self.bpe.encode_ordinary(text) {
            let len = self
                .decoder
                .get(id as usize)
                .ok_or_else(|| Error::InternalEngine(format!("rank {id} out of range")))?
                .len();
            out.push(id, Offset::new(pos, pos + len), false);
            pos += len;
        }
        Ok(())
    }
}

#[derive(Default)]
struct Pieces {
    ids: Vec<utok>,
    offsets: Vec<Offset>,
    special_tokens_mask: Vec<u32>,
}

impl Pieces {
    #[inline]
    fn push(&mut self, id: utok, offset: Offset, special: bool) {
        self.ids.push(id);
        self.offsets.push(offset);
        self.special_tokens_mask.push(special as _);
    }
}

impl Engine for Tiktoken {
    fn name(&self) -> &'static str {
        "tiktoken"
    }

    fn encode(&self, text: &str, add_special_tokens: bool, mode: OffsetsMode) -> Result<Encoding> {
        let mut pieces = Pieces::default();
        if add_special_tokens {
            if let Some(id) = self.bos {
                pieces.push(id, Offset::new(0, 0), true);
            }
            for segment in self.special.split(text) {
                match segment {
                    Segment::Text { start, text } => {
                        self.encode_ordinary(text, start, &mut pieces)?
                    }
                    Segment::Special { start, end, id } => {
                        pieces.push(id, Offset::new(start, end), true)
                    }
                }
            }
            if let Some(id) = self.eos {
                pieces.push(id, Offset::new(text.len(), text.len()), true);
            }
        } else {
            self.encode_ordinary(text, 0, &mut pieces)?;
        }

        let Pieces {
            ids,
            mut offsets,
            special_tokens_mask,
        } = pieces;
        if mode == OffsetsMode::Char {
            byte_to_char_offsets(text, &mut offsets);
        }
        let len = ids.len();
        Ok(Encoding {
            tokens: ids
                .iter()
                .map(|&id| String::from_utf8_lossy(&self.decoder[id as usize]).into_owned())
                .collect(),
            ids,
            type_ids: vec![0; len],
            special_tokens_mask,
            attention_mask: vec![1; len],
            offsets,
        })
    }

    fn decode(&self, ids: &[utok], skip_special_tokens: bool) -> Result<String> {
        let mut bytes = Vec::with_capacity(ids.len() * 4);
        let mut ends = Vec::with_capacity(ids.len());
        for &id in ids {
            let piece = self.decoder.get(id as usize).ok_or(Error::InvalidTokenId {
                id,
                vocab_size: self.decoder.len(),
            })?;
            if skip_special_tokens && self.special.contains_id(id) {
                continue;
            }
            bytes.extend_from_slice(piece);
            ends.push(bytes.len());
        }

        match String::from_utf8(bytes) {
            Ok(text) => Ok(text),
            Err(e) => {
                // keep the longest run of whole tokens that decodes, then one
                // replacement char per remaining token
                let valid = e.utf8_error().valid_up_to();
                let kept = ends.partition_point(|&end| end <= valid);
                let mut bytes = e.into_bytes();
                bytes.truncate(if kept == 0 { 0 } else { ends[kept - 1] });
                let mut text = String::from_utf8(bytes)
                    .map_err(|e| Error::InternalEngine(e.to_string()))?;
                text.extend(std::iter::repeat('\u{FFFD}').take(ends.len() - kept));
                Ok(text)
            }
        }
    }

    #[inline]
    fn vocab_size(&self) -> usize {
        self.decoder.len()
    }

    fn id_to_token(&self, id: utok) -> Option<String> {
        self.decoder
            .get(id as usize)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    fn token_to_id(&self, token: &str) -> Option<utok> {
        self.special
            .get(token)
            .or_else(|| self.encoder.get(token.as_bytes()).copied())
    }
}

/// Parses `<base64 bytes> <rank>` lines.
fn parse_ranks(text: &str) -> Result<FxHashMap<Vec<u8>, utok>> {
    let mut encoder = FxHashMap::default();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let malformed =
            |what: String| Error::MalformedConfig(format!("model file line {}: {what}", i + 1));

        let mut parts = line.split_ascii_whitespace();
        let token = parts
            .next()
            .ok_or_else(|| malformed("missing token".into()))?;
        let token = STANDARD
            .decode(token)
            .map_err(|e| malformed(format!("bad base64: {e}")))?;
        let rank = parts
            .next()
            .ok_or_else(|| malformed("missing rank".into()))?
            .parse::<utok>()
            .map_err(|e| malformed(format!("bad rank: {e}")))?;
        if encoder.insert(token, rank).is_some() {
            return Err(malformed("token listed twice".into()));
        }
    }
    Ok(encoder)
}
