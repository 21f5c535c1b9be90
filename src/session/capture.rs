//! Capture buffer: one allocation holding the output region and the scratch
//! region handlers receive datagrams into.

use std::io::{self, Write};

use crate::engine::control::MAX_DATAGRAM;
use crate::session::QueryError;

/// Output region sizes are rounded up to this.
pub const CAPTURE_ALIGN: usize = 16;

/// Descriptor count assumed when the platform limit is unknown or unbounded.
const FALLBACK_DESCRIPTORS: usize = 1024;
/// Cap on the descriptor count used for sizing the scratch region.
const MAX_DESCRIPTORS: usize = 65536;

fn descriptor_limit() -> usize {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    if rc != 0 || limit.rlim_cur == libc::RLIM_INFINITY {
        return FALLBACK_DESCRIPTORS;
    }
    usize::try_from(limit.rlim_cur)
        .unwrap_or(MAX_DESCRIPTORS)
        .min(MAX_DESCRIPTORS)
}

/// Scratch region size: a descriptor bitmap for the process's open-file
/// limit, and never less than one full control datagram.
pub fn scratch_size() -> usize {
    descriptor_limit().div_ceil(8).max(MAX_DATAGRAM)
}

/// Owned storage behind an open session.
#[derive(Debug)]
pub struct CaptureBuffer {
    storage: Vec<u8>,
    /// Requested capacity; the sink never writes past it.
    capacity: usize,
    /// Start of the scratch region.
    scratch_at: usize,
    written: usize,
    dropped: usize,
}

impl CaptureBuffer {
    /// Allocate the output and scratch regions in one go.
    pub fn allocate(capacity: usize) -> Result<Self, QueryError> {
        let scratch_at = capacity
            .checked_next_multiple_of(CAPTURE_ALIGN)
            .ok_or(QueryError::OutOfMemory {
                requested: capacity,
            })?;
        let total = scratch_at
            .checked_add(scratch_size())
            .ok_or(QueryError::OutOfMemory {
                requested: capacity,
            })?;

        let mut storage = Vec::new();
        storage
            .try_reserve_exact(total)
            .map_err(|_| QueryError::OutOfMemory { requested: total })?;
        storage.resize(total, 0);

        tracing::debug!(capacity, total, "Capture buffer allocated");
        Ok(Self {
            storage,
            capacity,
            scratch_at,
            written: 0,
            dropped: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn scratch_len(&self) -> usize {
        self.storage.len() - self.scratch_at
    }

    /// Zero the output region and forget previous output.
    pub fn clear(&mut self) {
        self.storage[..self.scratch_at].fill(0);
        self.written = 0;
        self.dropped = 0;
    }

    /// Borrow the capture sink and the scratch region together.
    pub fn split(&mut self) -> (CaptureSink<'_>, &mut [u8]) {
        let (output, scratch) = self.storage.split_at_mut(self.scratch_at);
        let sink = CaptureSink {
            region: &mut output[..self.capacity],
            written: &mut self.written,
            dropped: &mut self.dropped,
        };
        (sink, scratch)
    }

    /// Bytes captured since the last [`clear`](Self::clear).
    pub fn captured(&self) -> &[u8] {
        &self.storage[..self.written]
    }

    /// Bytes discarded because the output region was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// Writer bound to the output region.
///
/// Writes past the end are accepted and discarded so handlers never see an
/// error for long output.
pub struct CaptureSink<'a> {
    region: &'a mut [u8],
    written: &'a mut usize,
    dropped: &'a mut usize,
}

impl Write for CaptureSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let start = *self.written;
        let take = buf.len().min(self.region.len() - start);
        self.region[start..start + take].copy_from_slice(&buf[..take]);
        *self.written += take;
        *self.dropped += buf.len() - take;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
