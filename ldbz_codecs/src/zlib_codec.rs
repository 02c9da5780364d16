use std::cell::RefCell;
use std::thread::LocalKey;

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use ldbz_core::buffer::MIN_GROWN_CAPACITY;
use ldbz_core::{Codec, CompressionVariant, DecompressBuffer, Error, Result};

/// Default deflate level, matching zlib's own default.
pub const DEFAULT_LEVEL: u32 = 6;

/// Worst-case compressed size for `raw_len` input bytes:
/// `ceil(raw_len * 1.001) + 14`.
pub fn max_compressed_len(raw_len: usize) -> usize {
    raw_len + raw_len.div_ceil(1000) + 14
}

// Inflate/deflate contexts are reused per thread and reset before every
// call, so no stream state leaks from one block to the next.
thread_local! {
    static INFLATE_WRAPPED: RefCell<Decompress> = RefCell::new(Decompress::new(true));
    static INFLATE_RAW: RefCell<Decompress> = RefCell::new(Decompress::new(false));
    static DEFLATE_WRAPPED: RefCell<Option<(u32, Compress)>> = const { RefCell::new(None) };
    static DEFLATE_RAW: RefCell<Option<(u32, Compress)>> = const { RefCell::new(None) };
}

/// Zlib block codec, in either framing.
///
/// `Zlib` blocks carry the standard two-byte header and adler32 trailer.
/// `ZlibRaw` blocks are the bare deflate stream, a few bytes shorter. The
/// compression algorithm is the same; only the framing differs.
///
/// Best for: cold data where size matters more than decode speed.
pub struct ZlibCodec {
    raw: bool,
    /// Compression level (0 = store, 9 = slowest / smallest).
    pub level: u32,
}

impl Default for ZlibCodec {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL)
    }
}

impl ZlibCodec {
    /// Wrapped zlib framing.
    pub fn new(level: u32) -> Self {
        Self { raw: false, level }
    }

    /// Raw deflate framing.
    pub fn raw(level: u32) -> Self {
        Self { raw: true, level }
    }

    fn zlib_header(&self) -> bool {
        !self.raw
    }

    fn inflater(&self) -> &'static LocalKey<RefCell<Decompress>> {
        if self.raw {
            &INFLATE_RAW
        } else {
            &INFLATE_WRAPPED
        }
    }

    fn deflater(&self) -> &'static LocalKey<RefCell<Option<(u32, Compress)>>> {
        if self.raw {
            &DEFLATE_RAW
        } else {
            &DEFLATE_WRAPPED
        }
    }

    fn inflate(&self, compressed: &[u8], scratch: &mut DecompressBuffer) -> Result<Vec<u8>> {
        let variant = self.variant();
        self.inflater().with(|cell| {
            let mut inflater = cell.borrow_mut();
            inflater.reset(self.zlib_header());

            scratch.clear();
            scratch.prepare(compressed.len().saturating_mul(2).max(MIN_GROWN_CAPACITY))?;

            loop {
                let consumed = inflater.total_in() as usize;
                let out_before = inflater.total_out();
                let status = inflater
                    .decompress(&compressed[consumed..], scratch.spare_mut(), FlushDecompress::None)
                    .map_err(|e| Error::decompression(variant, e.to_string()))?;
                scratch.advance((inflater.total_out() - out_before) as usize);

                if status == Status::StreamEnd {
                    break;
                }

                let now_consumed = inflater.total_in() as usize;
                let progressed = inflater.total_out() > out_before || now_consumed > consumed;
                if !progressed && !scratch.spare_mut().is_empty() {
                    return Err(Error::decompression(
                        variant,
                        format!(
                            "stream ended early after {} of {} input bytes",
                            now_consumed,
                            compressed.len()
                        ),
                    ));
                }

                let remaining = compressed.len() - now_consumed;
                scratch.prepare(remaining.saturating_mul(2).max(MIN_GROWN_CAPACITY))?;
            }

            Ok(scratch.take_copy())
        })
    }

    fn deflate(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let variant = self.variant();
        let level = self.level;
        self.deflater().with(|cell| {
            let mut slot = cell.borrow_mut();
            let stale = !matches!(&*slot, Some((l, _)) if *l == level);
            if stale {
                *slot = None;
            }
            let (_, deflater) = slot.get_or_insert_with(|| {
                (level, Compress::new(Compression::new(level), self.zlib_header()))
            });
            deflater.reset();

            let mut out = Vec::with_capacity(max_compressed_len(raw.len()));
            loop {
                let consumed = deflater.total_in() as usize;
                let out_before = deflater.total_out();
                let status = deflater
                    .compress_vec(&raw[consumed..], &mut out, FlushCompress::Finish)
                    .map_err(|e| Error::compression(variant, e.to_string()))?;

                if status == Status::StreamEnd {
                    break;
                }
                if out.len() == out.capacity() {
                    out.reserve((raw.len() / 8).max(MIN_GROWN_CAPACITY));
                    continue;
                }
                let progressed = deflater.total_out() > out_before
                    || deflater.total_in() as usize > consumed;
                if !progressed {
                    return Err(Error::compression(variant, "deflate stalled before finishing"));
                }
            }

            if deflater.total_in() as usize != raw.len() {
                return Err(Error::compression(
                    variant,
                    format!(
                        "deflate finished after consuming {} of {} input bytes",
                        deflater.total_in(),
                        raw.len()
                    ),
                ));
            }
            Ok(out)
        })
    }
}

impl Codec for ZlibCodec {
    fn variant(&self) -> CompressionVariant {
        if self.raw {
            CompressionVariant::ZlibRaw
        } else {
            CompressionVariant::Zlib
        }
    }

    fn compress_block(&self, raw: &[u8]) -> Result<Vec<u8>> {
        self.deflate(raw)
    }

    fn decompress_block(
        &self,
        compressed: &[u8],
        scratch: &mut DecompressBuffer,
    ) -> Result<Vec<u8>> {
        self.inflate(compressed, scratch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compressible(len: usize) -> Vec<u8> {
        let pattern = b"key:000123 value:the quick brown fox; ";
        (0..len).map(|i| pattern[i % pattern.len()]).collect()
    }

    #[test]
    fn max_compressed_len_bound() {
        assert_eq!(max_compressed_len(0), 14);
        assert_eq!(max_compressed_len(1), 16);
        assert_eq!(max_compressed_len(1000), 1015);
        assert_eq!(max_compressed_len(1001), 1017);
    }

    #[test]
    fn raw_framing_is_shorter_than_wrapped() {
        let data = compressible(10_000);
        let wrapped = ZlibCodec::default().compress_block(&data).unwrap();
        let raw = ZlibCodec::raw(DEFAULT_LEVEL).compress_block(&data).unwrap();
        // 2-byte header + 4-byte adler32.
        assert_eq!(wrapped.len(), raw.len() + 6);
        assert_eq!(wrapped[0], 0x78);
    }

    #[test]
    fn framings_do_not_cross_decode() {
        let data = compressible(2_000);
        let wrapped = ZlibCodec::default().compress_block(&data).unwrap();
        let mut scratch = DecompressBuffer::new();
        assert!(ZlibCodec::raw(DEFAULT_LEVEL)
            .decompress_block(&wrapped, &mut scratch)
            .is_err());
    }

    #[test]
    fn output_larger_than_twice_input_grows_scratch() {
        let data = vec![0u8; 1_000_000];
        let codec = ZlibCodec::raw(DEFAULT_LEVEL);
        let compressed = codec.compress_block(&data).unwrap();
        assert!(compressed.len() * 2 < data.len());

        let mut scratch = DecompressBuffer::new();
        let out = codec.decompress_block(&compressed, &mut scratch).unwrap();
        assert_eq!(out, data);
        assert!(scratch.capacity() >= data.len());
    }

    #[test]
    fn truncated_stream_fails() {
        let data = compressible(50_000);
        let codec = ZlibCodec::default();
        let compressed = codec.compress_block(&data).unwrap();
        let mut scratch = DecompressBuffer::new();
        let err = codec
            .decompress_block(&compressed[..compressed.len() / 2], &mut scratch)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DecompressionFailure { variant: CompressionVariant::Zlib, .. }
        ));
    }

    #[test]
    fn garbage_is_decompression_failure() {
        let mut scratch = DecompressBuffer::new();
        let err = ZlibCodec::default()
            .decompress_block(b"definitely not a zlib stream", &mut scratch)
            .unwrap_err();
        assert!(matches!(err, Error::DecompressionFailure { .. }));
    }

    #[test]
    fn level_change_rebuilds_deflater() {
        let data = compressible(20_000);
        let stored = ZlibCodec::raw(0).compress_block(&data).unwrap();
        let best = ZlibCodec::raw(9).compress_block(&data).unwrap();
        assert!(stored.len() > data.len());
        assert!(best.len() < data.len() / 4);

        let mut scratch = DecompressBuffer::new();
        let codec = ZlibCodec::raw(9);
        assert_eq!(codec.decompress_block(&stored, &mut scratch).unwrap(), data);
        assert_eq!(codec.decompress_block(&best, &mut scratch).unwrap(), data);
    }
}
