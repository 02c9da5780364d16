mod passthrough;
mod snappy_codec;
mod zlib_codec;

pub use passthrough::PassThroughCodec;
pub use snappy_codec::SnappyCodec;
pub use zlib_codec::{max_compressed_len, ZlibCodec, DEFAULT_LEVEL};

use std::sync::Arc;

use ldbz_core::buffer::with_thread_scratch;
use ldbz_core::{Codec, CodecSet, CompressionVariant, Options, Result};

/// Codec for `variant`, with `zlib_level` applied to the zlib framings.
pub fn codec_for(variant: CompressionVariant, zlib_level: u32) -> Arc<dyn Codec> {
    match variant {
        CompressionVariant::None => Arc::new(PassThroughCodec),
        CompressionVariant::Snappy => Arc::new(SnappyCodec),
        CompressionVariant::Zlib => Arc::new(ZlibCodec::new(zlib_level)),
        CompressionVariant::ZlibRaw => Arc::new(ZlibCodec::raw(zlib_level)),
    }
}

/// Resolve a codec from its on-disk variant id.
pub fn codec_by_id(id: u8) -> Result<Arc<dyn Codec>> {
    Ok(codec_for(CompressionVariant::from_id(id)?, DEFAULT_LEVEL))
}

/// All bundled codecs at the default zlib level.
pub fn default_codecs() -> Result<CodecSet> {
    codecs_with_level(DEFAULT_LEVEL)
}

/// All bundled codecs, configured from `options`.
pub fn codecs_for(options: &Options) -> Result<CodecSet> {
    codecs_with_level(options.zlib_level)
}

fn codecs_with_level(zlib_level: u32) -> Result<CodecSet> {
    CodecSet::new(
        codec_for(CompressionVariant::None, zlib_level),
        codec_for(CompressionVariant::Snappy, zlib_level),
        codec_for(CompressionVariant::Zlib, zlib_level),
        codec_for(CompressionVariant::ZlibRaw, zlib_level),
    )
}

/// One-shot compression of a whole buffer.
pub fn compress(raw: &[u8], variant: CompressionVariant) -> Result<Vec<u8>> {
    codec_for(variant, DEFAULT_LEVEL).compress_block(raw)
}

/// One-shot decompression through this thread's scratch buffer.
pub fn decompress(compressed: &[u8], variant: CompressionVariant) -> Result<Vec<u8>> {
    let codec = codec_for(variant, DEFAULT_LEVEL);
    with_thread_scratch(|scratch| codec.decompress_block(compressed, scratch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldbz_core::Error;

    #[test]
    fn set_lookup_matches_variant() {
        let codecs = default_codecs().unwrap();
        for variant in CompressionVariant::ALL {
            assert_eq!(codecs.get(variant).variant(), variant);
        }
    }

    #[test]
    fn misplaced_codec_is_rejected() {
        let err = CodecSet::new(
            Arc::new(PassThroughCodec),
            Arc::new(ZlibCodec::default()),
            Arc::new(SnappyCodec),
            Arc::new(ZlibCodec::raw(DEFAULT_LEVEL)),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config { .. }), "got {err:?}");

        // Framing matters: a wrapped zlib codec cannot stand in for the raw one.
        let err = CodecSet::new(
            Arc::new(PassThroughCodec),
            Arc::new(SnappyCodec),
            Arc::new(ZlibCodec::default()),
            Arc::new(ZlibCodec::default()),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config { .. }), "got {err:?}");
    }

    #[test]
    fn codec_by_id_rejects_reserved() {
        assert!(matches!(codec_by_id(3), Err(Error::UnknownCodec { id: 3 })));
        assert!(matches!(codec_by_id(5), Err(Error::UnknownCodec { id: 5 })));
        assert_eq!(codec_by_id(4).unwrap().name(), "zlib_raw");
    }

    #[test]
    fn every_variant_round_trips() {
        let inputs: Vec<Vec<u8>> = vec![
            Vec::new(),
            b"a".to_vec(),
            b"hello world".to_vec(),
            (0..=255u8).collect(),
            b"abcabcabc".repeat(10_000),
        ];
        for variant in CompressionVariant::ALL {
            for input in &inputs {
                let compressed = compress(input, variant).unwrap();
                assert_eq!(&decompress(&compressed, variant).unwrap(), input, "{variant}");
            }
        }
    }
}
