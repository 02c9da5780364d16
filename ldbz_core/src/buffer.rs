//! Reusable decompression destination.
//!
//! A [`DecompressBuffer`] keeps its storage across calls so that reading a
//! stream of blocks does not allocate once per block. Growth follows a fixed
//! policy: geometric (powers of two, starting at 64) below
//! [`GROWTH_THRESHOLD`], linear by one threshold above it. Capacity never
//! shrinks.

use std::cell::RefCell;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

/// Above this size the buffer grows linearly instead of doubling: 4 MiB.
pub const GROWTH_THRESHOLD: usize = 4 * 1024 * 1024;

/// Smallest capacity the geometric branch will produce.
pub const MIN_GROWN_CAPACITY: usize = 64;

/// Hard ceiling on buffer capacity. Block sizes are 32-bit on disk, so
/// anything at or past this can only come from a corrupt length.
pub const MAX_CAPACITY: usize = i32::MAX as usize - 1;

/// Capacity chosen when `required` bytes no longer fit.
pub fn grown_capacity(required: usize) -> usize {
    if required == GROWTH_THRESHOLD {
        GROWTH_THRESHOLD
    } else if required > GROWTH_THRESHOLD {
        required.saturating_add(GROWTH_THRESHOLD)
    } else {
        required.next_power_of_two().max(MIN_GROWN_CAPACITY)
    }
}

/// Growable output buffer with a write position.
///
/// Bytes in `[0, position)` are the output produced so far; bytes past the
/// position are spare capacity for the decoder to write into.
#[derive(Debug)]
pub struct DecompressBuffer {
    storage: Option<Box<[u8]>>,
    position: usize,
    max_capacity: usize,
}

impl Default for DecompressBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl DecompressBuffer {
    /// An empty buffer; nothing is allocated until the first [`prepare`].
    ///
    /// [`prepare`]: DecompressBuffer::prepare
    pub fn new() -> Self {
        Self::with_max_capacity(MAX_CAPACITY)
    }

    pub fn with_max_capacity(max_capacity: usize) -> Self {
        Self {
            storage: None,
            position: 0,
            max_capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.as_ref().map_or(0, |s| s.len())
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Whether storage has been allocated yet.
    pub fn is_allocated(&self) -> bool {
        self.storage.is_some()
    }

    /// Rewind the write position. Capacity is kept.
    pub fn clear(&mut self) {
        self.position = 0;
    }

    /// Make room for at least `preferred` more bytes past the position.
    ///
    /// Existing bytes in `[0, old_capacity)` are carried over on growth.
    pub fn prepare(&mut self, preferred: usize) -> Result<()> {
        let required = self
            .position
            .checked_add(preferred)
            .ok_or(Error::BufferTooLarge {
                required: usize::MAX,
                max: self.max_capacity,
            })?;

        let Some(old) = self.storage.as_ref() else {
            if required >= self.max_capacity {
                return Err(Error::BufferTooLarge {
                    required,
                    max: self.max_capacity,
                });
            }
            debug!(capacity = preferred, "allocating decompression buffer");
            self.storage = Some(vec![0u8; preferred].into_boxed_slice());
            return Ok(());
        };

        let old_capacity = old.len();
        if required <= old_capacity {
            return Ok(());
        }

        let new_capacity = grown_capacity(required);
        if required >= self.max_capacity || new_capacity > self.max_capacity {
            return Err(Error::BufferTooLarge {
                required: new_capacity.max(required),
                max: self.max_capacity,
            });
        }

        debug!(old_capacity, new_capacity, required, "growing decompression buffer");
        let mut grown = vec![0u8; new_capacity].into_boxed_slice();
        grown[..old_capacity].copy_from_slice(old);
        self.storage = Some(grown);
        Ok(())
    }

    /// Output written so far.
    pub fn filled(&self) -> &[u8] {
        match &self.storage {
            Some(s) => &s[..self.position],
            None => &[],
        }
    }

    /// Writable space past the position.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        match &mut self.storage {
            Some(s) => &mut s[self.position..],
            None => &mut [],
        }
    }

    /// Mark `n` spare bytes as written.
    ///
    /// # Panics
    /// If `n` runs past the current capacity.
    pub fn advance(&mut self, n: usize) {
        assert!(
            self.position + n <= self.capacity(),
            "advance({n}) past capacity {} at position {}",
            self.capacity(),
            self.position
        );
        self.position += n;
    }

    /// Owned copy of the filled bytes, detached from this buffer.
    pub fn take_copy(&self) -> Vec<u8> {
        self.filled().to_vec()
    }
}

// ── Thread-confined scratch ────────────────────────────────────────────────

// One buffer per thread. Never shared, so no locking is needed.
thread_local! {
    static SCRATCH: RefCell<DecompressBuffer> = RefCell::new(DecompressBuffer::new());
}

/// Run `f` with this thread's scratch buffer, cleared before use.
///
/// Calls may nest (a codec that reads another block while decoding): the
/// inner call gets a fresh buffer that is dropped when it returns, and the
/// outer call's scratch is left untouched.
pub fn with_thread_scratch<F, R>(f: F) -> R
where
    F: FnOnce(&mut DecompressBuffer) -> R,
{
    SCRATCH.with(|scratch| match scratch.try_borrow_mut() {
        Ok(mut buffer) => {
            buffer.clear();
            f(&mut buffer)
        }
        Err(_) => {
            debug!("thread scratch busy; using a temporary buffer");
            f(&mut DecompressBuffer::new())
        }
    })
}

/// Capacity of the current thread's scratch buffer, or 0 while it is in use.
pub fn thread_scratch_capacity() -> usize {
    SCRATCH.with(|scratch| scratch.try_borrow().map_or(0, |buffer| buffer.capacity()))
}

// ── Shared scratch ─────────────────────────────────────────────────────────

/// A single scratch buffer shared between readers.
///
/// The lock is held across the whole decode, inflate, and copy-out sequence
/// for a block, so concurrent readers serialize on it. The lock is not
/// reentrant: `with` must not be called again from inside its closure.
#[derive(Debug, Default)]
pub struct SharedScratch {
    inner: Mutex<DecompressBuffer>,
}

impl SharedScratch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_capacity(max_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(DecompressBuffer::with_max_capacity(max_capacity)),
        }
    }

    /// Run `f` holding the lock, with the buffer cleared.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut DecompressBuffer) -> R,
    {
        let mut buffer = self.inner.lock();
        buffer.clear();
        f(&mut buffer)
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: usize = 1024 * 1024;

    #[test]
    fn first_prepare_allocates_exactly() {
        let mut buf = DecompressBuffer::new();
        assert!(!buf.is_allocated());
        buf.prepare(100).unwrap();
        assert_eq!(buf.capacity(), 100);
    }

    #[test]
    fn prepare_reuses_when_capacity_suffices() {
        let mut buf = DecompressBuffer::new();
        buf.prepare(256).unwrap();
        buf.advance(100);
        buf.prepare(156).unwrap();
        assert_eq!(buf.capacity(), 256);
        buf.clear();
        buf.prepare(10).unwrap();
        assert_eq!(buf.capacity(), 256);
    }

    #[test]
    fn small_growth_is_power_of_two_from_64() {
        assert_eq!(grown_capacity(1), 64);
        assert_eq!(grown_capacity(64), 64);
        assert_eq!(grown_capacity(65), 128);
        assert_eq!(grown_capacity(1000), 1024);
        assert_eq!(grown_capacity(3 * MIB), 4 * MIB);
        assert_eq!(grown_capacity(4 * MIB - 1), 4 * MIB);
    }

    #[test]
    fn threshold_boundary_is_exact() {
        let mut buf = DecompressBuffer::new();
        buf.prepare(16).unwrap();
        buf.prepare(GROWTH_THRESHOLD).unwrap();
        assert_eq!(buf.capacity(), 4 * 1024 * 1024);
    }

    #[test]
    fn growth_above_threshold_is_linear() {
        let mut buf = DecompressBuffer::new();
        buf.prepare(16).unwrap();
        buf.prepare(GROWTH_THRESHOLD + 1).unwrap();
        assert_eq!(buf.capacity(), GROWTH_THRESHOLD + 1 + GROWTH_THRESHOLD);
        assert_eq!(grown_capacity(10 * MIB), 14 * MIB);
    }

    #[test]
    fn required_counts_from_position() {
        let mut buf = DecompressBuffer::new();
        buf.prepare(64).unwrap();
        buf.advance(60);
        buf.prepare(10).unwrap();
        assert_eq!(buf.capacity(), 128);
        assert_eq!(buf.position(), 60);
    }

    #[test]
    fn capacity_never_decreases() {
        let mut buf = DecompressBuffer::new();
        let mut last = 0;
        for required in [10, 50, 64, 65, 500, 4096, 70_000, 1_000_000, 4 * MIB, 4 * MIB + 7, 100] {
            buf.clear();
            buf.prepare(required).unwrap();
            assert!(buf.capacity() >= last, "capacity shrank at {required}");
            assert!(buf.capacity() >= required);
            last = buf.capacity();
        }
    }

    #[test]
    fn grow_preserves_written_bytes() {
        let mut buf = DecompressBuffer::new();
        buf.prepare(64).unwrap();
        let pattern: Vec<u8> = (0..64u8).collect();
        buf.spare_mut()[..64].copy_from_slice(&pattern);
        buf.advance(64);

        buf.prepare(1000).unwrap();
        assert_eq!(buf.capacity(), 2048);
        assert_eq!(buf.filled(), pattern.as_slice());
    }

    #[test]
    fn too_large_fails_without_allocating() {
        let mut buf = DecompressBuffer::with_max_capacity(1024);
        let err = buf.prepare(4096).unwrap_err();
        assert!(matches!(err, Error::BufferTooLarge { max: 1024, .. }));
        assert!(!buf.is_allocated());

        buf.prepare(512).unwrap();
        buf.advance(512);
        // 512 + 600 rounds up to 2048, past the cap.
        let err = buf.prepare(600).unwrap_err();
        assert!(matches!(err, Error::BufferTooLarge { .. }));
        assert_eq!(buf.capacity(), 512);
    }

    #[test]
    fn position_overflow_is_too_large() {
        let mut buf = DecompressBuffer::new();
        buf.prepare(8).unwrap();
        buf.advance(8);
        assert!(matches!(
            buf.prepare(usize::MAX),
            Err(Error::BufferTooLarge { .. })
        ));
    }

    #[test]
    fn take_copy_is_detached() {
        let mut buf = DecompressBuffer::new();
        buf.prepare(4).unwrap();
        buf.spare_mut()[..4].copy_from_slice(b"abcd");
        buf.advance(4);
        let copy = buf.take_copy();
        buf.clear();
        buf.spare_mut()[..4].copy_from_slice(b"wxyz");
        assert_eq!(copy, b"abcd");
    }

    #[test]
    fn thread_scratch_is_cleared_and_retained() {
        with_thread_scratch(|buf| {
            buf.prepare(300).unwrap();
            buf.advance(10);
        });
        let (position, capacity) = with_thread_scratch(|buf| (buf.position(), buf.capacity()));
        assert_eq!(position, 0);
        assert!(capacity >= 300);
        assert_eq!(thread_scratch_capacity(), capacity);
    }

    #[test]
    fn nested_thread_scratch_gets_a_fresh_buffer() {
        let (outer, inner) = with_thread_scratch(|outer| {
            outer.prepare(512).unwrap();
            outer.spare_mut()[..3].copy_from_slice(b"abc");
            outer.advance(3);

            let inner = with_thread_scratch(|inner| {
                assert!(!inner.is_allocated());
                inner.prepare(16).unwrap();
                inner.spare_mut()[..2].copy_from_slice(b"zz");
                inner.advance(2);
                inner.take_copy()
            });
            (outer.take_copy(), inner)
        });
        assert_eq!(outer, b"abc");
        assert_eq!(inner, b"zz");
        assert!(thread_scratch_capacity() >= 512);
    }

    #[test]
    fn shared_scratch_is_cleared_under_lock() {
        let shared = SharedScratch::new();
        shared.with(|buf| {
            buf.prepare(128).unwrap();
            buf.advance(128);
        });
        shared.with(|buf| assert_eq!(buf.position(), 0));
        assert_eq!(shared.capacity(), 128);
    }
}
