use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fixed size of the block trailer in bytes.
///   variant_id:u8 + checksum:u32 (big-endian)
///   = 1 + 4 = 5
pub const TRAILER_SIZE: usize = 5;

// ── Compression variants ───────────────────────────────────────────────────

/// Codec used for a single block, persisted as the first trailer byte.
///
/// Id 3 is reserved and must never decode. Nothing is known about what it
/// once meant, so it is left unassigned rather than reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionVariant {
    None,
    Snappy,
    Zlib,
    /// Zlib deflate stream without the two-byte header and adler32 footer.
    ZlibRaw,
}

impl CompressionVariant {
    pub const ALL: [CompressionVariant; 4] = [
        CompressionVariant::None,
        CompressionVariant::Snappy,
        CompressionVariant::Zlib,
        CompressionVariant::ZlibRaw,
    ];

    /// Persistent id written to disk.
    pub const fn id(self) -> u8 {
        match self {
            CompressionVariant::None => 0,
            CompressionVariant::Snappy => 1,
            CompressionVariant::Zlib => 2,
            CompressionVariant::ZlibRaw => 4,
        }
    }

    /// Resolve a persistent id. Unknown and reserved ids are hard errors.
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(CompressionVariant::None),
            1 => Ok(CompressionVariant::Snappy),
            2 => Ok(CompressionVariant::Zlib),
            4 => Ok(CompressionVariant::ZlibRaw),
            _ => Err(Error::UnknownCodec { id }),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            CompressionVariant::None => "none",
            CompressionVariant::Snappy => "snappy",
            CompressionVariant::Zlib => "zlib",
            CompressionVariant::ZlibRaw => "zlib_raw",
        }
    }
}

impl fmt::Display for CompressionVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompressionVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" | "passthrough" => Ok(CompressionVariant::None),
            "snappy" => Ok(CompressionVariant::Snappy),
            "zlib" => Ok(CompressionVariant::Zlib),
            "zlib_raw" | "zlib-raw" | "raw" => Ok(CompressionVariant::ZlibRaw),
            other => Err(Error::Config {
                message: format!(
                    "unknown codec '{}'; valid options: none, snappy, zlib, zlib_raw",
                    other
                ),
            }),
        }
    }
}

// ── Block trailer ──────────────────────────────────────────────────────────

/// Decoded 5-byte trailer that follows every block's compressed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockTrailer {
    pub variant: CompressionVariant,
    pub checksum: u32,
}

impl BlockTrailer {
    pub fn new(variant: CompressionVariant, checksum: u32) -> Self {
        Self { variant, checksum }
    }

    /// Serialize to exactly `TRAILER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; TRAILER_SIZE] {
        let mut buf = [0u8; TRAILER_SIZE];
        buf[0] = self.variant.id();
        buf[1..5].copy_from_slice(&self.checksum.to_be_bytes());
        buf
    }

    /// Deserialize from `TRAILER_SIZE` bytes, validating the variant id.
    pub fn from_bytes(buf: &[u8; TRAILER_SIZE]) -> Result<Self> {
        let variant = CompressionVariant::from_id(buf[0])?;
        let checksum = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        Ok(Self { variant, checksum })
    }

    /// Decode the trailer stored in the last `TRAILER_SIZE` bytes of `block`.
    pub fn from_slice(block: &[u8]) -> Result<Self> {
        let start = block.len().checked_sub(TRAILER_SIZE).ok_or_else(|| Error::Corruption {
            message: format!(
                "block of {} bytes is too short to hold a {}-byte trailer",
                block.len(),
                TRAILER_SIZE
            ),
        })?;
        let mut buf = [0u8; TRAILER_SIZE];
        buf.copy_from_slice(&block[start..]);
        Self::from_bytes(&buf)
    }
}

impl fmt::Display for BlockTrailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{variant={}, checksum=0x{:08x}}}", self.variant, self.checksum)
    }
}

// ── Block handle ───────────────────────────────────────────────────────────

/// Location of one block's compressed payload inside a table file.
///
/// `size` excludes the trailer, which sits at `offset + size`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHandle {
    pub offset: u64,
    pub size: u64,
}

impl BlockHandle {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Offset of the first trailer byte.
    ///
    /// Handles come from an on-disk index, so an offset/size pair that runs
    /// past `u64::MAX` is reported as corruption.
    pub fn trailer_offset(&self) -> Result<u64> {
        self.offset.checked_add(self.size).ok_or_else(|| self.overflow())
    }

    /// Offset one past the trailer, i.e. where the next block starts.
    pub fn end(&self) -> Result<u64> {
        self.trailer_offset()?
            .checked_add(TRAILER_SIZE as u64)
            .ok_or_else(|| self.overflow())
    }

    fn overflow(&self) -> Error {
        Error::Corruption {
            message: format!(
                "block handle at offset {} with size {} overflows the file offset range",
                self.offset, self.size
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_ids_are_stable() {
        let table = [
            (CompressionVariant::None, 0u8),
            (CompressionVariant::Snappy, 1),
            (CompressionVariant::Zlib, 2),
            (CompressionVariant::ZlibRaw, 4),
        ];
        for (variant, id) in table {
            assert_eq!(variant.id(), id);
            assert_eq!(CompressionVariant::from_id(id).unwrap(), variant);
        }
    }

    #[test]
    fn only_known_ids_decode() {
        for id in 0..=u8::MAX {
            let decoded = CompressionVariant::from_id(id);
            match id {
                0 | 1 | 2 | 4 => assert!(decoded.is_ok(), "id {id} should decode"),
                _ => assert!(
                    matches!(decoded, Err(Error::UnknownCodec { id: bad }) if bad == id),
                    "id {id} should be rejected"
                ),
            }
        }
    }

    #[test]
    fn trailer_layout_is_big_endian() {
        let trailer = BlockTrailer::new(CompressionVariant::ZlibRaw, 0xDEAD_BEEF);
        assert_eq!(trailer.to_bytes(), [4, 0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(BlockTrailer::from_bytes(&trailer.to_bytes()).unwrap(), trailer);
    }

    #[test]
    fn trailer_round_trips_for_every_variant() {
        for variant in CompressionVariant::ALL {
            for checksum in [0u32, 1, 0x8000_0000, u32::MAX, 0x1234_5678] {
                let trailer = BlockTrailer::new(variant, checksum);
                assert_eq!(BlockTrailer::from_bytes(&trailer.to_bytes()).unwrap(), trailer);
            }
        }
    }

    #[test]
    fn reserved_id_in_trailer_is_never_none() {
        let err = BlockTrailer::from_bytes(&[3, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, Error::UnknownCodec { id: 3 }));
    }

    #[test]
    fn trailer_from_short_slice_is_corruption() {
        let err = BlockTrailer::from_slice(&[0, 1, 2]).unwrap_err();
        assert!(matches!(err, Error::Corruption { .. }));

        let mut block = b"payload".to_vec();
        block.extend_from_slice(&[2, 0, 0, 0, 7]);
        let trailer = BlockTrailer::from_slice(&block).unwrap();
        assert_eq!(trailer, BlockTrailer::new(CompressionVariant::Zlib, 7));
    }

    #[test]
    fn handle_bounds_are_checked() {
        let handle = BlockHandle::new(100, 20);
        assert_eq!(handle.trailer_offset().unwrap(), 120);
        assert_eq!(handle.end().unwrap(), 125);

        let wraps = BlockHandle::new(u64::MAX - 2, 10);
        assert!(matches!(wraps.trailer_offset(), Err(Error::Corruption { .. })));
        assert!(matches!(wraps.end(), Err(Error::Corruption { .. })));

        let trailer_wraps = BlockHandle::new(u64::MAX - 7, 5);
        assert_eq!(trailer_wraps.trailer_offset().unwrap(), u64::MAX - 2);
        assert!(matches!(trailer_wraps.end(), Err(Error::Corruption { .. })));
    }

    #[test]
    fn variant_names_parse_back() {
        for variant in CompressionVariant::ALL {
            assert_eq!(variant.name().parse::<CompressionVariant>().unwrap(), variant);
        }
        assert!("lz4".parse::<CompressionVariant>().is_err());
    }
}
