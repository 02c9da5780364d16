use std::path::Path;

use tracing::{trace, warn};

use crate::buffer::{with_thread_scratch, DecompressBuffer, SharedScratch};
use crate::checksum::block_checksum;
use crate::codec::CodecSet;
use crate::error::{Error, Result};
use crate::format::{BlockHandle, BlockTrailer, TRAILER_SIZE};
use crate::options::Options;
use crate::source::{ByteSource, FileSource, MmapSource};

/// Random-access block reader for a table file.
///
/// # Read sequence
/// 1. Fetch `size + 5` bytes at the handle's offset: payload then trailer.
/// 2. Decode the trailer; unknown variant ids fail here.
/// 3. Optionally verify the trailer checksum against the payload.
/// 4. Hand the payload to the codec for the trailer's variant.
///
/// Decompression goes through a scratch [`DecompressBuffer`]. The result is
/// always an owned copy, so the scratch is free again when the call returns.
/// [`read_block`] uses one scratch per thread; [`read_block_with`] takes an
/// explicit one; [`read_block_shared`] locks a shared one for the whole
/// sequence.
///
/// [`read_block`]: BlockReader::read_block
/// [`read_block_with`]: BlockReader::read_block_with
/// [`read_block_shared`]: BlockReader::read_block_shared
pub struct BlockReader<S> {
    source: S,
    codecs: CodecSet,
    verify_checksums: bool,
}

/// Open a table file for block reads, by memory map or positioned reads
/// depending on `options.use_mmap`.
pub fn open_table(
    path: impl AsRef<Path>,
    codecs: CodecSet,
    options: &Options,
) -> Result<BlockReader<Box<dyn ByteSource>>> {
    let source: Box<dyn ByteSource> = if options.use_mmap {
        Box::new(MmapSource::open(path)?)
    } else {
        Box::new(FileSource::open(path)?)
    };
    Ok(BlockReader::new(source, codecs, options))
}

impl<S: ByteSource> BlockReader<S> {
    pub fn new(source: S, codecs: CodecSet, options: &Options) -> Self {
        Self {
            source,
            codecs,
            verify_checksums: options.verify_checksums,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn verify_checksums(&self) -> bool {
        self.verify_checksums
    }

    /// Read and decode only the trailer of a block.
    pub fn read_trailer(&self, handle: BlockHandle) -> Result<BlockTrailer> {
        let mut buf = [0u8; TRAILER_SIZE];
        let offset = handle.trailer_offset()?;
        let n = self.source.read_at(offset, &mut buf)?;
        if n < TRAILER_SIZE {
            return Err(Error::IncompleteRead {
                offset,
                expected: TRAILER_SIZE,
                actual: n,
            });
        }
        BlockTrailer::from_bytes(&buf)
    }

    /// Decompress one block using this thread's scratch buffer.
    pub fn read_block(&self, handle: BlockHandle) -> Result<Vec<u8>> {
        with_thread_scratch(|scratch| self.read_block_with(handle, scratch))
    }

    /// Decompress one block holding the shared scratch lock throughout.
    pub fn read_block_shared(
        &self,
        handle: BlockHandle,
        scratch: &SharedScratch,
    ) -> Result<Vec<u8>> {
        scratch.with(|buffer| self.read_block_with(handle, buffer))
    }

    /// Decompress one block into an explicit scratch buffer.
    pub fn read_block_with(
        &self,
        handle: BlockHandle,
        scratch: &mut DecompressBuffer,
    ) -> Result<Vec<u8>> {
        let (payload, trailer) = self.read_raw(handle)?;

        if self.verify_checksums {
            let actual = block_checksum(&payload, trailer.variant);
            if actual != trailer.checksum {
                warn!(
                    offset = handle.offset,
                    size = handle.size,
                    expected = trailer.checksum,
                    actual,
                    "block checksum mismatch"
                );
                return Err(Error::ChecksumMismatch {
                    offset: handle.offset,
                    expected: trailer.checksum,
                    actual,
                });
            }
        }

        trace!(
            offset = handle.offset,
            size = handle.size,
            variant = %trailer.variant,
            "decompressing block"
        );

        let codec = self.codecs.get(trailer.variant);
        scratch.clear();
        codec
            .decompress_block(&payload, scratch)
            .map_err(|e| e.at_block(handle.offset, handle.size))
    }

    /// Fetch a block's compressed payload and decoded trailer, without
    /// decompressing.
    pub fn read_raw(&self, handle: BlockHandle) -> Result<(Vec<u8>, BlockTrailer)> {
        handle.end()?;
        let payload_len = usize::try_from(handle.size).map_err(|_| Error::Corruption {
            message: format!("block size {} does not fit in memory", handle.size),
        })?;
        let total = payload_len.checked_add(TRAILER_SIZE).ok_or_else(|| Error::Corruption {
            message: format!("block size {} overflows", handle.size),
        })?;

        // Check against the source length before allocating for a length
        // that may come from a corrupt handle.
        let available = self.source.len()?.saturating_sub(handle.offset);
        if available < total as u64 {
            return Err(Error::IncompleteRead {
                offset: handle.offset,
                expected: total,
                actual: available as usize,
            });
        }

        let mut raw = vec![0u8; total];
        let n = self.source.read_at(handle.offset, &mut raw)?;
        if n < total {
            return Err(Error::IncompleteRead {
                offset: handle.offset,
                expected: total,
                actual: n,
            });
        }

        let trailer = BlockTrailer::from_slice(&raw)?;
        raw.truncate(payload_len);
        Ok((raw, trailer))
    }
}
