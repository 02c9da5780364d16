use xxhash_rust::xxh32::Xxh32;

use crate::format::CompressionVariant;

/// Checksum stored in a block trailer: xxHash32 (seed 0) over the compressed
/// payload followed by the variant id byte.
///
/// The value is written big-endian regardless of the hash's natural order.
pub fn block_checksum(payload: &[u8], variant: CompressionVariant) -> u32 {
    let mut hasher = Xxh32::new(0);
    hasher.update(payload);
    hasher.update(&[variant.id()]);
    hasher.digest()
}
