use thiserror::Error;

#[derive(Error, Debug)]
pub enum JparqueError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file magic")]
    InvalidMagic,

    #[error("Page {page} has invalid role flags {flags:#06x}")]
    InvalidPageRole { page: u64, flags: u16 },

    #[error("Page out of bounds: page {page} requested, but file has {total} pages")]
    PageOutOfBounds { page: u64, total: u64 },

    #[error("Unexpected end of data while reading {context}")]
    UnexpectedEof { context: &'static str },

    #[error("Corrupt page {page}: {reason}")]
    CorruptPage { page: u64, reason: &'static str },

    #[error("Cycle in overflow chain at page {page}")]
    OverflowCycle { page: u64 },

    #[error("Overflow chain exceeds {limit} bytes")]
    OverflowTooLarge { limit: usize },

    #[error("Size mismatch in {context}: expected {expected}, got {actual}")]
    SizeMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Compression codec {0:?} is not supported")]
    UnsupportedCodec(crate::parquet::CompressionCodec),

    #[error("Unknown compression codec tag {0}")]
    UnknownCodec(i32),

    #[error("In-place update would change value length ({old} -> {new}); delete and re-insert instead")]
    ValueLengthChanged { old: usize, new: usize },

    #[error("Key of {actual} bytes exceeds the {max}-byte limit for this page size")]
    KeyTooLarge { actual: usize, max: usize },

    #[error("Missing required field '{0}'")]
    MissingRequiredField(String),

    #[error("Type mismatch for field '{field}': expected {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
    },

    #[error("Repeated field '{0}' requires a list value")]
    RepeatedNotList(String),

    #[error("Physical type {0:?} is not supported by the record codec")]
    UnsupportedType(crate::parquet::PhysicalType),

    #[error("Page id space exhausted")]
    RootExhausted,

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, JparqueError>;
