use ldbz_core::{Codec, CompressionVariant, DecompressBuffer, Error, Result};
use snap::raw::{decompress_len, Decoder, Encoder};

/// Largest expansion a snappy element can produce: a 3-byte copy tag that
/// emits 64 bytes.
const MAX_EXPANSION_NUM: usize = 64;
const MAX_EXPANSION_DEN: usize = 3;

/// Upper bound on the output `compressed_len` bytes of snappy can decode to.
fn max_decompressed_len(compressed_len: usize) -> usize {
    compressed_len
        .saturating_mul(MAX_EXPANSION_NUM)
        .div_ceil(MAX_EXPANSION_DEN)
}

/// Snappy raw-format block codec.
///
/// The decompressed length is read from the varint prefix snappy puts at
/// the front of every block, and the scratch buffer is sized to it before
/// decoding. A prefix larger than the payload could ever expand to is
/// rejected before anything is allocated.
pub struct SnappyCodec;

impl Codec for SnappyCodec {
    fn variant(&self) -> CompressionVariant {
        CompressionVariant::Snappy
    }

    fn compress_block(&self, raw: &[u8]) -> Result<Vec<u8>> {
        Encoder::new()
            .compress_vec(raw)
            .map_err(|e| Error::compression(CompressionVariant::Snappy, e.to_string()))
    }

    fn decompress_block(
        &self,
        compressed: &[u8],
        scratch: &mut DecompressBuffer,
    ) -> Result<Vec<u8>> {
        let len = decompress_len(compressed)
            .map_err(|e| Error::decompression(CompressionVariant::Snappy, e.to_string()))?;
        let bound = max_decompressed_len(compressed.len());
        if len > bound {
            return Err(Error::decompression(
                CompressionVariant::Snappy,
                format!(
                    "length prefix {} exceeds the {} bytes a {}-byte block can hold",
                    len,
                    bound,
                    compressed.len()
                ),
            ));
        }

        scratch.clear();
        scratch.prepare(len)?;
        let n = Decoder::new()
            .decompress(compressed, scratch.spare_mut())
            .map_err(|e| Error::decompression(CompressionVariant::Snappy, e.to_string()))?;
        scratch.advance(n);
        Ok(scratch.take_copy())
    }
}
