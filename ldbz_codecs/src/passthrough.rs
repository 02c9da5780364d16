use ldbz_core::{Codec, CompressionVariant, DecompressBuffer, Result};

/// No-op codec: blocks are stored verbatim.
///
/// Also what the block writer falls back to when compression would not
/// shrink a block enough to be worth it.
pub struct PassThroughCodec;

impl Codec for PassThroughCodec {
    fn variant(&self) -> CompressionVariant {
        CompressionVariant::None
    }

    fn compress_block(&self, raw: &[u8]) -> Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decompress_block(
        &self,
        compressed: &[u8],
        _scratch: &mut DecompressBuffer,
    ) -> Result<Vec<u8>> {
        Ok(compressed.to_vec())
    }
}
