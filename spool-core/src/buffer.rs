//! Reusable sample buffers exchanged between tracks and codecs.
//!
//! A [`SampleBuffer`] is handed to `read`/`process`/`write` calls and refilled
//! in place; its backing storage is reused across calls. Anything that must
//! outlive the next call has to be cloned explicitly.

use crate::descriptor::FormatDescriptor;
use crate::error::Error;
use crate::rational::Rational;
use bitflags::bitflags;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

bitflags! {
    /// Flags for buffer properties.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u32 {
        /// Payload must be ignored; metadata stays valid and is forwarded.
        const DISCARD = 0x0001;
        /// This sample is a keyframe.
        const KEYFRAME = 0x0002;
        /// Last buffer of the track.
        const END_OF_MEDIA = 0x0004;
        /// Payload is identical to the previous sample.
        const SAME_DATA = 0x0008;
    }
}

/// A timed sample with reusable storage.
#[derive(Clone, Default)]
pub struct SampleBuffer {
    data: Vec<u8>,
    offset: usize,
    length: usize,
    /// Format of the payload.
    pub format: FormatDescriptor,
    /// Buffer flags.
    pub flags: BufferFlags,
    /// Presentation time of the first payload unit.
    pub timestamp: Rational,
    /// Duration covered by the payload.
    pub duration: Rational,
    /// Sequence number, contiguous per track.
    pub sequence: u64,
    /// Opaque codec header token carried alongside the payload.
    pub header: Option<Bytes>,
    /// Index of the track this sample belongs to.
    pub track: usize,
    error: Option<Arc<Error>>,
}

impl SampleBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with preallocated storage.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Create a buffer holding a copy of `payload`.
    pub fn from_payload(payload: &[u8]) -> Self {
        let mut buf = Self::new();
        buf.set_payload(payload);
        buf
    }

    /// The visible payload.
    pub fn payload(&self) -> &[u8] {
        &self.data[self.offset..self.offset + self.length]
    }

    /// Length of the visible payload.
    pub fn len(&self) -> usize {
        self.length
    }

    /// Check if the visible payload is empty.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Offset of the visible payload in the backing storage.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Capacity of the backing storage.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Resize the payload to `len` bytes at offset zero and return it.
    ///
    /// Existing storage is reused; contents beyond the previous data are zeroed.
    pub fn payload_mut(&mut self, len: usize) -> &mut [u8] {
        if self.offset != 0 {
            self.data.copy_within(self.offset..self.offset + self.length, 0);
            self.offset = 0;
        }
        self.data.resize(len, 0);
        self.length = len;
        &mut self.data[..len]
    }

    /// Replace the payload with a copy of `bytes`.
    pub fn set_payload(&mut self, bytes: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(bytes);
        self.offset = 0;
        self.length = bytes.len();
    }

    /// Append bytes to the visible payload.
    pub fn extend_payload(&mut self, bytes: &[u8]) {
        let end = self.offset + self.length;
        self.data.truncate(end);
        self.data.extend_from_slice(bytes);
        self.length += bytes.len();
    }

    /// Empty the payload, keeping storage.
    pub fn clear_payload(&mut self) {
        self.data.clear();
        self.offset = 0;
        self.length = 0;
    }

    /// Mutable access to the storage, for readers filling it directly.
    ///
    /// The visible view is reset to the whole vector once `f` returns.
    pub fn fill_with<R>(&mut self, f: impl FnOnce(&mut Vec<u8>) -> R) -> R {
        self.data.clear();
        let result = f(&mut self.data);
        self.offset = 0;
        self.length = self.data.len();
        result
    }

    /// Consume `n` bytes from the front of the visible payload.
    ///
    /// Codecs that split one input into several outputs advance the input
    /// this way until it is empty.
    pub fn advance(&mut self, n: usize) {
        let n = n.min(self.length);
        self.offset += n;
        self.length -= n;
    }

    /// Check a flag.
    pub fn has(&self, flag: BufferFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Check the DISCARD flag.
    pub fn is_discard(&self) -> bool {
        self.has(BufferFlags::DISCARD)
    }

    /// Check the KEYFRAME flag.
    pub fn is_keyframe(&self) -> bool {
        self.has(BufferFlags::KEYFRAME)
    }

    /// Check the END_OF_MEDIA flag.
    pub fn is_end_of_media(&self) -> bool {
        self.has(BufferFlags::END_OF_MEDIA)
    }

    /// Set or clear a flag.
    pub fn set_flag(&mut self, flag: BufferFlags, on: bool) {
        self.flags.set(flag, on);
    }

    /// Mark the payload as not to be used.
    pub fn discard(&mut self) {
        self.flags.insert(BufferFlags::DISCARD);
    }

    /// Mark the buffer as failed: DISCARD plus the carried error.
    pub fn fail(&mut self, error: Error) {
        self.discard();
        self.error = Some(Arc::new(error));
    }

    /// Error carried by a failed buffer.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_deref()
    }

    /// Remove and return the carried error.
    pub fn take_error(&mut self) -> Option<Arc<Error>> {
        self.error.take()
    }

    /// Copy all metadata from `other`, leaving the payload untouched.
    ///
    /// Codecs call this first so that timing, sequence and flags are
    /// forwarded downstream.
    pub fn set_meta_from(&mut self, other: &SampleBuffer) {
        self.format = other.format.clone();
        self.flags = other.flags;
        self.timestamp = other.timestamp;
        self.duration = other.duration;
        self.sequence = other.sequence;
        self.header = other.header.clone();
        self.track = other.track;
        self.error = other.error.clone();
    }

    /// Copy payload and metadata from `other`, reusing this buffer's storage.
    pub fn copy_from(&mut self, other: &SampleBuffer) {
        self.set_meta_from(other);
        self.set_payload(other.payload());
    }

    /// Time just past the end of this sample.
    pub fn end_time(&self) -> Rational {
        self.timestamp + self.duration
    }

    /// Clear flags, error and payload while keeping storage and format.
    pub fn reset(&mut self) {
        self.flags = BufferFlags::empty();
        self.error = None;
        self.header = None;
        self.clear_payload();
    }
}

impl fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("len", &self.length)
            .field("track", &self.track)
            .field("sequence", &self.sequence)
            .field("timestamp", &self.timestamp)
            .field("duration", &self.duration)
            .field("flags", &self.flags)
            .field("format", &self.format)
            .field("error", &self.error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;

    #[test]
    fn test_payload_view_advance() {
        let mut buf = SampleBuffer::from_payload(b"abcdef");
        buf.advance(2);
        assert_eq!(buf.payload(), b"cdef");
        assert_eq!(buf.offset(), 2);
        buf.advance(10);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_payload_mut_reuses_storage() {
        let mut buf = SampleBuffer::with_capacity(64);
        let cap = buf.capacity();
        buf.payload_mut(32).fill(7);
        assert_eq!(buf.payload(), &[7u8; 32][..]);
        buf.payload_mut(16);
        assert_eq!(buf.capacity(), cap);
    }

    #[test]
    fn test_payload_mut_after_advance_keeps_bytes() {
        let mut buf = SampleBuffer::from_payload(b"xxhello");
        buf.advance(2);
        let out = buf.payload_mut(5);
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_extend_payload() {
        let mut buf = SampleBuffer::from_payload(b"ab");
        buf.extend_payload(b"cd");
        assert_eq!(buf.payload(), b"abcd");
    }

    #[test]
    fn test_fail_sets_discard_and_error() {
        let mut buf = SampleBuffer::new();
        buf.fail(Error::CodecProcess(CodecError::NotConfigured));
        assert!(buf.is_discard());
        assert!(buf.error().is_some_and(Error::is_recoverable));
    }

    #[test]
    fn test_set_meta_from_forwards_timing() {
        let mut src = SampleBuffer::from_payload(b"x");
        src.timestamp = Rational::new(1, 2);
        src.duration = Rational::new(1, 30);
        src.sequence = 9;
        src.flags = BufferFlags::KEYFRAME | BufferFlags::END_OF_MEDIA;

        let mut dst = SampleBuffer::from_payload(b"payload");
        dst.set_meta_from(&src);
        assert_eq!(dst.payload(), b"payload");
        assert_eq!(dst.sequence, 9);
        assert_eq!(dst.end_time(), Rational::new(8, 15));
        assert!(dst.is_keyframe() && dst.is_end_of_media());
    }

    #[test]
    fn test_clone_retains_past_reuse() {
        let mut buf = SampleBuffer::from_payload(b"first");
        let kept = buf.clone();
        buf.set_payload(b"second");
        assert_eq!(kept.payload(), b"first");
    }

    #[test]
    fn test_reset() {
        let mut buf = SampleBuffer::from_payload(b"abc");
        buf.discard();
        buf.reset();
        assert!(buf.flags.is_empty());
        assert!(buf.is_empty());
    }
}
