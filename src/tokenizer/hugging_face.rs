use super::{utok, Engine};
use crate::{
    encoding::{Encoding, Offset},
    Error, OffsetsMode, Result, TokenizerOptions, Truncation,
};
use serde::Deserialize;
use tokenizers::tokenizer::TruncationParams;

/// The only `tokenizer.json` schema the wrapped library reads.
const SCHEMA_VERSION: &str = "1.0";

/// A `tokenizer.json` model run by the `tokenizers` library.
pub(crate) struct HuggingFace {
    tokenizer: tokenizers::Tokenizer,
    /// Distinct tokens in the model and added vocabularies.
    vocab_size: usize,
}

#[derive(Deserialize)]
struct SchemaHeader {
    #[serde(default)]
    version: Option<serde_json::Value>,
}

impl HuggingFace {
    pub fn from_bytes(
        bytes: &[u8],
        options: &TokenizerOptions,
        truncation: Option<&Truncation>,
    ) -> Result<Self> {
        let header = serde_json::from_slice::<SchemaHeader>(bytes)
            .map_err(|e| Error::MalformedConfig(e.to_string()))?;
        match header.version {
            None => {}
            Some(serde_json::Value::String(v)) if v == SCHEMA_VERSION => {}
            Some(v) => return Err(Error::UnsupportedSchema(v.to_string())),
        }

        let mut tokenizer = tokenizers::Tokenizer::from_bytes(bytes)
            .map_err(|e| Error::MalformedConfig(e.to_string()))?;
        tokenizer.set_encode_special_tokens(options.encode_special_tokens);
        if let Some(truncation) = truncation {
            tokenizer
                .with_truncation(Some(TruncationParams {
                    max_length: truncation.max_len(),
                    direction: truncation.direction().into(),
                    ..Default::default()
                }))
                .map_err(|e| Error::InvalidArgument(e.to_string()))?;
        }
        let vocab_size = tokenizer.get_vocab(true).len();
        Ok(Self {
            tokenizer,
            vocab_size,
        })
    }
}

impl Engine for HuggingFace {
    fn name(&self) -> &'static str {
        "huggingface"
    }

    fn encode(&self, text: &str, add_special_tokens: bool, mode: OffsetsMode) -> Result<Encoding> {
        let encoding = match mode {
            OffsetsMode::Byte => self.tokenizer.encode(text, add_special_tokens),
            OffsetsMode::Char => self.tokenizer.encode_char_offsets(text, add_special_tokens),
        }
        .map_err(|e| Error::InternalEngine(e.to_string()))?;

        Ok(Encoding {
            ids: encoding.get_ids().to_vec(),
            type_ids: encoding.get_type_ids().to_vec(),
            tokens: encoding.get_tokens().to_vec(),
            special_tokens_mask: encoding.get_special_tokens_mask().to_vec(),
            attention_mask: encoding.get_attention_mask().to_vec(),
            offsets: encoding
                .get_offsets()
                .iter()
                .copied()
                .map(Offset::from)
                .collect(),
        })
    }

    fn decode(&self, ids: &[utok], skip_special_tokens: bool) -> Result<String> {
        // the library drops unknown ids silently, and a sparse vocab has
        // known ids at or above its size
        if let Some(&id) = ids.iter().find(|&&id| {
            id as usize >= self.vocab_size || self.tokenizer.id_to_token(id).is_none()
        }) {
            return Err(Error::InvalidTokenId {
                id,
                vocab_size: self.vocab_size(),
            });
        }
        self.tokenizer
            .decode(ids, skip_special_tokens)
            .map_err(|e| Error::InternalEngine(e.to_string()))
    }

    #[inline]
    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    #[inline]
    fn id_to_token(&self, id: utok) -> Option<String> {
        self.tokenizer.id_to_token(id)
    }

    #[inline]
    fn token_to_id(&self, token: &str) -> Option<utok> {
        self.tokenizer.token_to_id(token)
    }
}
