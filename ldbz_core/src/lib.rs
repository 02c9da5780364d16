pub mod buffer;
pub mod checksum;
pub mod codec;
pub mod error;
pub mod filename;
pub mod format;
pub mod options;
pub mod reader;
pub mod source;
pub mod writer;

pub use buffer::{DecompressBuffer, SharedScratch};
pub use codec::{Codec, CodecSet};
pub use error::{Error, Result};
pub use format::{BlockHandle, BlockTrailer, CompressionVariant, TRAILER_SIZE};
pub use options::Options;
pub use reader::{open_table, BlockReader};
pub use source::ByteSource;
pub use writer::BlockWriter;
