use std::{io, path::Path, path::PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed config: {0}")]
    MalformedConfig(String),

    #[error("unsupported schema version: {0}")]
    UnsupportedSchema(String),

    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid token id {id} (vocab size {vocab_size})")]
    InvalidTokenId { id: u32, vocab_size: usize },

    #[error("engine error: {0}")]
    InternalEngine(String),

    #[error("batch item {index}: {source}")]
    Batch {
        index: usize,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Splits "the file is not there" from every other open failure.
    pub(crate) fn open(path: &Path, e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io(e)
        }
    }

    pub(crate) fn in_batch(self, index: usize) -> Self {
        Self::Batch {
            index,
            source: Box::new(self),
        }
    }
}

#[test]
fn test_open_kinds() {
    let path = Path::new("missing.json");
    let e = Error::open(path, io::Error::from(io::ErrorKind::NotFound));
    assert!(matches!(&e, Error::NotFound(p) if p == path));
    assert_eq!(e.to_string(), "file not found: missing.json");

    let e = Error::open(path, io::Error::from(io::ErrorKind::PermissionDenied));
    assert!(matches!(e, Error::Io(_)));
}

#[test]
fn test_batch_message() {
    let e = Error::InvalidTokenId {
        id: 7,
        vocab_size: 4,
    }
    .in_batch(2);
    assert_eq!(
        e.to_string(),
        "batch item 2: invalid token id 7 (vocab size 4)"
    );
    assert!(std::error::Error::source(&e).is_some());
}
