use crate::{
    encoding::EncodeResult,
    tokenizer::{map_file, utok, Engine, HuggingFace, Tiktoken},
    EncodeOptions, Result, TokenizerOptions, Truncation,
};
use rayon::prelude::*;
use std::path::Path;
use tracing::{debug, trace};

/// A loaded tokenizer.
///
/// Read-only once built: every method takes `&self`, so one instance may
/// serve any number of threads.
pub struct Tokenizer {
    engine: Box<dyn Engine>,
}

impl Tokenizer {
    fn new(engine: impl Engine + 'static) -> Self {
        debug!(
            engine = engine.name(),
            vocab_size = engine.vocab_size(),
            "tokenizer loaded"
        );
        Self {
            engine: Box::new(engine),
        }
    }

    /// Loads a `tokenizer.json` blob.
    pub fn from_bytes(bytes: &[u8], options: &TokenizerOptions) -> Result<Self> {
        HuggingFace::from_bytes(bytes, options, None).map(Self::new)
    }

    /// Loads a `tokenizer.json` blob and truncates every encoding to `truncation`.
    pub fn from_bytes_with_truncation(bytes: &[u8], truncation: Truncation) -> Result<Self> {
        HuggingFace::from_bytes(bytes, &Default::default(), Some(&truncation)).map(Self::new)
    }

    /// Loads a `tokenizer.json` file.
    pub fn from_path(path: impl AsRef<Path>, options: &TokenizerOptions) -> Result<Self> {
        let path = path.as_ref();
        let mmap = map_file(path)?;
        Self::from_bytes(&mmap, options)
    }

    /// Loads a rank file, its `tokenizer_config.json` and a split pattern.
    pub fn from_model_files(
        model_file: impl AsRef<Path>,
        config_file: impl AsRef<Path>,
        pattern: &str,
    ) -> Result<Self> {
        Tiktoken::from_files(model_file.as_ref(), config_file.as_ref(), pattern).map(Self::new)
    }

    #[inline]
    pub fn vocab_size(&self) -> usize {
        self.engine.vocab_size()
    }

    pub fn encode(&self, text: &str, options: &EncodeOptions) -> Result<EncodeResult> {
        if text.is_empty() {
            return Ok(EncodeResult::select(Default::default(), options));
        }
        let encoding = self
            .engine
            .encode(text, options.add_special_tokens, options.offsets_mode)?;
        Ok(EncodeResult::select(encoding, options))
    }

    /// Ids only.
    pub fn encode_ids(&self, text: &str, add_special_tokens: bool) -> Result<Vec<utok>> {
        let options = EncodeOptions::default().with_special_tokens(add_special_tokens);
        self.encode(text, &options).map(|result| result.ids)
    }

    /// Encodes every text in parallel, in input order.
    ///
    /// Fails as a whole on the first failing item, reported as
    /// [`Error::Batch`](crate::Error::Batch).
    pub fn encode_batch<S>(&self, texts: &[S], options: &EncodeOptions) -> Result<Vec<EncodeResult>>
    where
        S: AsRef<str> + Sync,
    {
        trace!(len = texts.len(), "encode batch");
        // collected in order first so the reported item is the lowest failing index
        texts
            .par_iter()
            .map(|text| self.encode(text.as_ref(), options))
            .collect::<Vec<_>>()
            .into_iter()
            .enumerate()
            .map(|(i, result)| result.map_err(|e| e.in_batch(i)))
            .collect()
    }

    pub fn decode(&self, ids: &[utok], skip_special_tokens: bool) -> Result<String> {
        self.engine.decode(ids, skip_special_tokens)
    }

    #[inline]
    pub fn id_to_token(&self, id: utok) -> Option<String> {
        self.engine.id_to_token(id)
    }

    #[inline]
    pub fn token_to_id(&self, token: &str) -> Option<utok> {
        self.engine.token_to_id(token)
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("engine", &self.engine.name())
            .field("vocab_size", &self.vocab_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        tokenizer::fixtures::{rank_file, write_model, CONFIG, PATTERN, WORD_LEVEL},
        Error, Offset, OffsetsMode, TruncationDirection,
    };

    fn word_level() -> Tokenizer {
        Tokenizer::from_bytes(WORD_LEVEL.as_bytes(), &Default::default()).unwrap()
    }

    #[test]
    fn hi_there() {
        let tokenizer = word_level();
        let options = EncodeOptions {
            add_special_tokens: true,
            return_special_tokens_mask: true,
            ..Default::default()
        };
        let result = tokenizer.encode("hi there", &options).unwrap();
        assert_eq!(result.ids, [0, 1, 2]);
        assert_eq!(result.special_tokens_mask.as_deref(), Some(&[1, 0, 0][..]));
        assert!(result.tokens.is_none());
        assert_eq!(tokenizer.decode(&result.ids, true).unwrap(), "hi there");
        assert_eq!(tokenizer.encode_ids("hi there", false).unwrap(), [1, 2]);
    }

    #[test]
    fn empty_text() {
        let tokenizer = word_level();
        let options = EncodeOptions::all().with_special_tokens(true);
        let result = tokenizer.encode("", &options).unwrap();
        assert_eq!(result.len(), 0);
        assert_eq!(result.type_ids, Some(vec![]));
        assert_eq!(result.special_tokens_mask, Some(vec![]));
        assert_eq!(result.attention_mask, Some(vec![]));
        assert_eq!(result.offsets, Some(vec![]));
        assert!(result.tokens.is_some_and(|t| t.is_empty()));
    }

    #[test]
    fn offsets_are_ordered() {
        let tokenizer = word_level();
        for mode in [OffsetsMode::Byte, OffsetsMode::Char] {
            let options = EncodeOptions::all().with_special_tokens(true).with_offsets_mode(mode);
            let result = tokenizer.encode("hi  there hé hi", &options).unwrap();
            let offsets = result.offsets.unwrap();
            assert_eq!(offsets.len(), result.ids.len());
            assert!(offsets.iter().all(|o| o.start <= o.end));
            assert!(offsets.windows(2).all(|w| w[0].end <= w[1].start));
        }
    }

    #[test]
    fn batch_matches_single() {
        let tokenizer = word_level();
        let options = EncodeOptions::all().with_special_tokens(true);
        let texts = ["hi there", "", "there hi hi"];
        let batch = tokenizer.encode_batch(&texts, &options).unwrap();
        assert_eq!(batch.len(), texts.len());
        for (text, result) in texts.iter().zip(&batch) {
            assert_eq!(&tokenizer.encode(text, &options).unwrap(), result);
        }
    }

    #[test]
    fn batch_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let (model, config) = write_model(dir.path(), &rank_file(0..128, &[]), "{}");
        let tokenizer = Tokenizer::from_model_files(model, config, PATTERN).unwrap();
        let err = tokenizer
            .encode_batch(&["ok", "still ok", "not ok é", "é"], &Default::default())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Batch { index: 2, ref source } if matches!(**source, Error::InternalEngine(_))
        ));
    }

    #[test]
    fn truncation() {
        let truncation = Truncation::new(2, TruncationDirection::Left).unwrap();
        let tokenizer =
            Tokenizer::from_bytes_with_truncation(WORD_LEVEL.as_bytes(), truncation).unwrap();
        assert_eq!(tokenizer.encode_ids("hi there hi", false).unwrap(), [2, 1]);
    }

    #[test]
    fn from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");
        std::fs::write(&path, WORD_LEVEL).unwrap();
        let tokenizer = Tokenizer::from_path(&path, &Default::default()).unwrap();
        assert_eq!(tokenizer.vocab_size(), 4);

        assert!(matches!(
            Tokenizer::from_path(dir.path().join("nope.json"), &Default::default()),
            Err(Error::NotFound(_))
        ));
        std::fs::write(&path, &WORD_LEVEL[..40]).unwrap();
        assert!(matches!(
            Tokenizer::from_path(&path, &Default::default()),
            Err(Error::MalformedConfig(_))
        ));
    }

    #[test]
    fn model_files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (model, config) = write_model(dir.path(), &rank_file(0..=255, &[]), CONFIG);
        let tokenizer = Tokenizer::from_model_files(&model, &config, PATTERN).unwrap();
        assert_eq!(tokenizer.vocab_size(), 264);

        let text = "Grüße, 世界! <|eot|>";
        let result = tokenizer.encode(text, &EncodeOptions::all()).unwrap();
        assert_eq!(tokenizer.decode(&result.ids, false).unwrap(), text);
        assert_eq!(
            result.offsets.unwrap().last(),
            Some(&Offset::new(text.len() - 1, text.len()))
        );
        assert_eq!(tokenizer.token_to_id("<|eot|>"), Some(263));
        assert_eq!(tokenizer.id_to_token(263).as_deref(), Some("<|eot|>"));
    }

    #[test]
    fn shared_between_threads() {
        let tokenizer = word_level();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..100 {
                        assert_eq!(tokenizer.encode_ids("hi there", true).unwrap(), [0, 1, 2]);
                    }
                });
            }
        });
    }
}
