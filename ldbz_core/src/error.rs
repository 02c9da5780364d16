use crate::format::CompressionVariant;

/// Result alias used throughout the ldbz crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the block layer can report.
///
/// All of these are fatal for the block that produced them. Inputs are
/// deterministic (table files are immutable once written), so nothing here is
/// ever retried internally; recovery policy belongs to the caller.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A trailer named a variant id outside {0, 1, 2, 4}.
    #[error("unknown compression codec id {id}")]
    UnknownCodec { id: u8 },

    /// The byte source returned fewer bytes than the block needs.
    #[error("incomplete read at offset {offset}: expected {expected} bytes, got {actual}")]
    IncompleteRead {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    #[error("{variant} decompression failed for block at offset {offset} (size {size}): {message}")]
    DecompressionFailure {
        variant: CompressionVariant,
        offset: u64,
        size: u64,
        message: String,
    },

    #[error("decompression buffer needs {required} bytes, above the maximum of {max}")]
    BufferTooLarge { required: usize, max: usize },

    #[error("{variant} compression failed: {message}")]
    CompressionFailure {
        variant: CompressionVariant,
        message: String,
    },

    #[error("checksum mismatch at offset {offset}: trailer {expected:08x}, computed {actual:08x}")]
    ChecksumMismatch {
        offset: u64,
        expected: u32,
        actual: u32,
    },

    #[error("corruption: {message}")]
    Corruption { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Decompression failure raised by a codec, before the reader knows
    /// where the block lives. [`Error::at_block`] fills in the location.
    pub fn decompression(variant: CompressionVariant, message: impl Into<String>) -> Self {
        Error::DecompressionFailure {
            variant,
            offset: 0,
            size: 0,
            message: message.into(),
        }
    }

    pub fn compression(variant: CompressionVariant, message: impl Into<String>) -> Self {
        Error::CompressionFailure {
            variant,
            message: message.into(),
        }
    }

    /// Annotate a decompression failure with the block it came from.
    /// Other variants pass through untouched.
    pub fn at_block(self, block_offset: u64, block_size: u64) -> Self {
        match self {
            Error::DecompressionFailure {
                variant, message, ..
            } => Error::DecompressionFailure {
                variant,
                offset: block_offset,
                size: block_size,
                message,
            },
            other => other,
        }
    }
}
