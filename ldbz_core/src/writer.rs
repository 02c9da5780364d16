use std::io::Write;

use tracing::trace;

use crate::checksum::block_checksum;
use crate::codec::CodecSet;
use crate::error::Result;
use crate::format::{BlockHandle, BlockTrailer, CompressionVariant};
use crate::options::Options;

/// Appends compressed blocks, each followed by its trailer.
///
/// # Layout written
/// ```text
/// [PAYLOAD 0][TRAILER 0][PAYLOAD 1][TRAILER 1] ...
/// ```
/// Every call to [`write_block`] returns the [`BlockHandle`] for the block it
/// wrote. Keeping those handles (in an index block, a sidecar, wherever) is
/// the caller's job.
///
/// A block that compresses to more than 7/8 of its raw size is stored
/// uncompressed instead.
///
/// [`write_block`]: BlockWriter::write_block
pub struct BlockWriter<W: Write> {
    dst: W,
    codecs: CodecSet,
    variant: CompressionVariant,
    /// Current write position (mirrors the bytes handed to `dst`).
    offset: u64,
}

impl<W: Write> BlockWriter<W> {
    pub fn new(dst: W, codecs: CodecSet, options: &Options) -> Self {
        Self::with_start_offset(dst, codecs, options, 0)
    }

    /// Start writing at `offset` within a file that already holds data.
    pub fn with_start_offset(dst: W, codecs: CodecSet, options: &Options, offset: u64) -> Self {
        Self {
            dst,
            codecs,
            variant: options.compression,
            offset,
        }
    }

    /// Override the configured compression variant.
    pub fn with_variant(mut self, variant: CompressionVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn variant(&self) -> CompressionVariant {
        self.variant
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Compress `raw`, write payload and trailer, return the block's handle.
    pub fn write_block(&mut self, raw: &[u8]) -> Result<BlockHandle> {
        let (variant, compressed) = self.compress(raw)?;
        let payload: &[u8] = match &compressed {
            Some(bytes) => bytes,
            None => raw,
        };

        let handle = BlockHandle::new(self.offset, payload.len() as u64);
        let next_offset = handle.end()?;

        let trailer = BlockTrailer::new(variant, block_checksum(payload, variant));
        self.dst.write_all(payload)?;
        self.dst.write_all(&trailer.to_bytes())?;
        self.offset = next_offset;
        trace!(
            offset = handle.offset,
            size = handle.size,
            raw_len = raw.len(),
            %variant,
            "wrote block"
        );
        Ok(handle)
    }

    fn compress(&self, raw: &[u8]) -> Result<(CompressionVariant, Option<Vec<u8>>)> {
        if self.variant == CompressionVariant::None {
            return Ok((CompressionVariant::None, None));
        }
        let compressed = self.codecs.get(self.variant).compress_block(raw)?;
        if compressed.len() < raw.len() - raw.len() / 8 {
            Ok((self.variant, Some(compressed)))
        } else {
            Ok((CompressionVariant::None, None))
        }
    }

    /// Flush and hand back the sink.
    pub fn finish(mut self) -> Result<W> {
        self.dst.flush()?;
        Ok(self.dst)
    }
}
