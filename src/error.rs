use std::path::PathBuf;

/// Error taxonomy for every fallible operation in this crate.
///
/// Variants map 1:1 onto the tag list in the component design: header
/// validation, dataset/index build failures, and the small set of
/// programmer-facing conflicts a coordinator can report. Scan-time
/// malformed symbols are *not* represented here — they are a silent
/// data decision (the automaton resets to state 0) surfaced only
/// through logging and the optional observability hook.
#[derive(Debug, thiserror::Error)]
pub enum SeedCoreError {
    #[error("bad magic bytes in {path:?}: expected {expected:?}, found {found:?}")]
    BadMagic {
        path: Option<PathBuf>,
        expected: [u8; 3],
        found: [u8; 3],
    },

    #[error("incompatible version in {path:?}: expected {expected}, found {found}")]
    IncompatibleVersion {
        path: Option<PathBuf>,
        expected: u64,
        found: u64,
    },

    #[error("duplicate sequence id {id} while building dataset")]
    DuplicateId { id: u64 },

    #[error("checksum mismatch for sequence {id} at {path:?}: expected {expected}, found {found}")]
    ChecksumMismatch {
        id: u64,
        path: Option<PathBuf>,
        expected: u16,
        found: u16,
    },

    #[error("short read at {path:?}, position {position:?}: needed {needed} bytes, got {got}")]
    ShortRead {
        path: Option<PathBuf>,
        position: Option<u64>,
        needed: usize,
        got: usize,
    },

    #[error("io error at {path:?}: {source}")]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    #[error("memory budget of {limit_bytes} bytes exceeded (wanted {wanted_bytes})")]
    MemoryBudget { limit_bytes: u64, wanted_bytes: u64 },

    #[error("symbol {symbol:?} at position {position} is not in the declared alphabet")]
    InvalidAlphabet { symbol: u8, position: u64 },

    #[error("word length {word_length} over alphabet of size {alphabet_size} overflows trie state capacity; fall back to a compressed automaton")]
    WordlenOverflow {
        word_length: u32,
        alphabet_size: u32,
    },

    #[error("mode conflict: {detail}")]
    ModeConflict { detail: String },

    #[error("cannot add_query to a Seeder after prepare() has been called")]
    AfterPrepare,
}

impl SeedCoreError {
    pub(crate) fn io(path: impl Into<Option<PathBuf>>, source: std::io::Error) -> Self {
        SeedCoreError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<std::io::Error> for SeedCoreError {
    fn from(source: std::io::Error) -> Self {
        SeedCoreError::Io { path: None, source }
    }
}

pub type Result<T> = std::result::Result<T, SeedCoreError>;
