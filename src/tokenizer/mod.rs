mod hugging_face;
mod special;
mod tiktoken;

use crate::{encoding::Encoding, Error, OffsetsMode, Result};
use memmap2::Mmap;
use std::{fs::File, path::Path};

/// `utok` for token id.
#[allow(non_camel_case_types)]
pub type utok = u32;

/// A loaded segmentation model. Read-only once built.
pub(crate) trait Engine: Send + Sync {
    fn name(&self) -> &'static str;
    fn encode(&self, text: &str, add_special_tokens: bool, mode: OffsetsMode) -> Result<Encoding>;
    fn decode(&self, ids: &[utok], skip_special_tokens: bool) -> Result<String>;
    fn vocab_size(&self) -> usize;
    fn id_to_token(&self, id: utok) -> Option<String>;
    fn token_to_id(&self, token: &str) -> Option<utok>;
}

pub(crate) use hugging_face::HuggingFace;
pub(crate) use tiktoken::Tiktoken;

/// Maps a whole file read-only. Empty files carry no configuration.
pub(crate) fn map_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path).map_err(|e| Error::open(path, e))?;
    if file.metadata()?.len() == 0 {
        return Err(Error::MalformedConfig(format!(
            "{} is empty",
            path.display()
        )));
    }
    Ok(unsafe { Mmap::map(&file) }?)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::{fmt::Write, fs, path::PathBuf};
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    /// Word-level vocabulary `<s>:0 hi:1 there:2 <unk>:3`, `<s>` prepended
    /// when special tokens are added.
    pub const WORD_LEVEL: &str = r#"{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [
    {"id": 0, "content": "<s>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
  ],
  "normalizer": null,
  "pre_tokenizer": {"type": "Whitespace"},
  "post_processor": {
    "type": "TemplateProcessing",
    "single": [{"SpecialToken": {"id": "<s>", "type_id": 0}}, {"Sequence": {"id": "A", "type_id": 0}}],
    "pair": [{"SpecialToken": {"id": "<s>", "type_id": 0}}, {"Sequence": {"id": "A", "type_id": 0}}, {"Sequence": {"id": "B", "type_id": 1}}],
    "special_tokens": {"<s>": {"id": "<s>", "ids": [0], "tokens": ["<s>"]}}
  },
  "decoder": null,
  "model": {"type": "WordLevel", "vocab": {"<s>": 0, "hi": 1, "there": 2, "<unk>": 3}, "unk_token": "<unk>"}
}"#;

    /// GPT-2 style split pattern.
    pub const PATTERN: &str =
        r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+";

    /// Merges on top of the 256 byte ranks: `he re " t" " the" " there" hi`.
    pub const MERGES: [&str; 6] = ["he", "re", " t", " the", " there", "hi"];

    pub const BOS: u32 = 262;
    pub const EOT: u32 = 263;

    pub const CONFIG: &str = r#"{
  "added_tokens_decoder": {
    "262": {"content": "<|bos|>", "special": true},
    "263": {"content": "<|eot|>", "special": true}
  },
  "add_bos_token": true,
  "bos_token": "<|bos|>"
}"#;

    /// One `<base64> <rank>` line per byte in `bytes`, then per merge.
    pub fn rank_file(bytes: impl IntoIterator<Item = u8>, merges: &[&str]) -> String {
        let mut ans = String::new();
        let mut rank = 0;
        for b in bytes {
            writeln!(ans, "{} {}", STANDARD.encode([b]), b).unwrap();
            rank = rank.max(b as u32 + 1);
        }
        for (i, merge) in merges.iter().enumerate() {
            writeln!(ans, "{} {}", STANDARD.encode(merge), rank + i as u32).unwrap();
        }
        ans
    }

    /// Writes a model file and a config file into `dir`.
    pub fn write_model(dir: &std::path::Path, ranks: &str, config: &str) -> (PathBuf, PathBuf) {
        let model = dir.join("tiktoken.model");
        let config_path = dir.join("tokenizer_config.json");
        fs::write(&model, ranks).unwrap();
        fs::write(&config_path, config).unwrap();
        (model, config_path)
    }
}

#[test]
fn test_map_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.json");
    assert!(matches!(map_file(&missing), Err(Error::NotFound(p)) if p == missing));

    let empty = dir.path().join("empty.json");
    std::fs::write(&empty, b"").unwrap();
    assert!(matches!(map_file(&empty), Err(Error::MalformedConfig(_))));

    let full = dir.path().join("full.json");
    std::fs::write(&full, b"{}").unwrap();
    assert_eq!(&map_file(&full).unwrap()[..], b"{}");
}
