use std::sync::Arc;

use crate::buffer::DecompressBuffer;
use crate::error::{Error, Result};
use crate::format::CompressionVariant;

/// Core compression abstraction.
///
/// Each `Codec` implementation:
/// - Is identified by the [`CompressionVariant`] whose id lands in the block
///   trailer.
/// - Compresses and decompresses single blocks independently. No state may
///   carry over from one call to the next.
/// - Decompresses through a caller-supplied scratch buffer and returns an
///   owned copy, so the scratch can be reused as soon as the call returns.
/// - May read other blocks from inside `decompress_block` through
///   `BlockReader::read_block` (a nested thread-scratch call gets its own
///   temporary buffer), but must not re-enter `read_block_shared` on the
///   same `SharedScratch`, whose lock is not reentrant.
pub trait Codec: Send + Sync {
    fn variant(&self) -> CompressionVariant;

    /// Human-readable codec name for CLI display.
    fn name(&self) -> &'static str {
        self.variant().name()
    }

    /// Compress a single block in one shot.
    fn compress_block(&self, raw: &[u8]) -> Result<Vec<u8>>;

    /// Decompress a single block.
    ///
    /// `scratch` may be grown; its previous contents are irrelevant.
    fn decompress_block(&self, compressed: &[u8], scratch: &mut DecompressBuffer)
        -> Result<Vec<u8>>;
}

/// One codec per variant, looked up by exhaustive match.
///
/// Unknown ids never reach this point: they are rejected when the trailer is
/// decoded. Each slot is checked on construction, so `get(v).variant() == v`
/// always holds.
#[derive(Clone)]
pub struct CodecSet {
    none: Arc<dyn Codec>,
    snappy: Arc<dyn Codec>,
    zlib: Arc<dyn Codec>,
    zlib_raw: Arc<dyn Codec>,
}

impl CodecSet {
    pub fn new(
        none: Arc<dyn Codec>,
        snappy: Arc<dyn Codec>,
        zlib: Arc<dyn Codec>,
        zlib_raw: Arc<dyn Codec>,
    ) -> Result<Self> {
        let set = Self {
            none,
            snappy,
            zlib,
            zlib_raw,
        };
        for variant in CompressionVariant::ALL {
            let actual = set.slot(variant).variant();
            if actual != variant {
                return Err(Error::Config {
                    message: format!("codec slot for {variant} holds a {actual} codec"),
                });
            }
        }
        Ok(set)
    }

    pub fn get(&self, variant: CompressionVariant) -> &Arc<dyn Codec> {
        let codec = self.slot(variant);
        debug_assert_eq!(codec.variant(), variant);
        codec
    }

    fn slot(&self, variant: CompressionVariant) -> &Arc<dyn Codec> {
        match variant {
            CompressionVariant::None => &self.none,
            CompressionVariant::Snappy => &self.snappy,
            CompressionVariant::Zlib => &self.zlib,
            CompressionVariant::ZlibRaw => &self.zlib_raw,
        }
    }
}

impl std::fmt::Debug for CodecSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecSet")
            .field("none", &self.none.name())
            .field("snappy", &self.snappy.name())
            .field("zlib", &self.zlib.name())
            .field("zlib_raw", &self.zlib_raw.name())
            .finish()
    }
}
