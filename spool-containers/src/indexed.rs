//! Tracks backed by a precomputed sample index.
//!
//! Both container readers parse their index structures up front and hand
//! each track a list of [`SampleEntry`] values plus a handle on the shared
//! byte source.

use crate::traits::{ReadSeek, SeekableTrack, Track};
use parking_lot::Mutex;
use spool_core::{
    BufferFlags, ContainerError, Error, FormatDescriptor, Rational, Result, SampleBuffer,
};
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

/// Byte source shared by all tracks of one reader. `None` once closed.
pub type SharedSource = Arc<Mutex<Option<Box<dyn ReadSeek>>>>;

/// Wrap a byte source for sharing between tracks.
pub fn shared(source: Box<dyn ReadSeek>) -> SharedSource {
    Arc::new(Mutex::new(Some(source)))
}

/// Location and timing of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleEntry {
    /// Absolute byte offset of the payload.
    pub offset: u64,
    /// Payload size in bytes.
    pub size: u32,
    /// Presentation time.
    pub timestamp: Rational,
    /// Sample duration.
    pub duration: Rational,
    /// Whether the sample decodes on its own.
    pub keyframe: bool,
}

impl SampleEntry {
    /// Time just past the end of this sample.
    pub fn end_time(&self) -> Rational {
        self.timestamp + self.duration
    }
}

/// A [`SeekableTrack`] reading samples at indexed offsets.
pub struct IndexedTrack {
    index: usize,
    format: FormatDescriptor,
    entries: Vec<SampleEntry>,
    position: u64,
    source: SharedSource,
}

impl IndexedTrack {
    /// Create a track over `entries`, which must be in presentation order.
    pub fn new(
        index: usize,
        format: FormatDescriptor,
        entries: Vec<SampleEntry>,
        source: SharedSource,
    ) -> Self {
        Self {
            index,
            format,
            entries,
            position: 0,
            source,
        }
    }

    /// The sample index.
    pub fn entries(&self) -> &[SampleEntry] {
        &self.entries
    }

    fn read_payload(&self, entry: &SampleEntry, buffer: &mut SampleBuffer) -> Result<()> {
        let mut guard = self.source.lock();
        let source = guard.as_mut().ok_or(ContainerError::Closed)?;
        source.seek(SeekFrom::Start(entry.offset))?;
        source.read_exact(buffer.payload_mut(entry.size as usize))?;
        Ok(())
    }
}

impl Track for IndexedTrack {
    fn index(&self) -> usize {
        self.index
    }

    fn format(&self) -> &FormatDescriptor {
        &self.format
    }

    fn sample_count(&self) -> u64 {
        self.entries.len() as u64
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn set_position(&mut self, index: u64) -> Result<()> {
        if index > self.sample_count() {
            return Err(ContainerError::SeekFailed(format!(
                "sample {index} beyond track {} with {} samples",
                self.index,
                self.entries.len()
            ))
            .into());
        }
        self.position = index;
        Ok(())
    }

    fn duration(&self) -> Rational {
        self.entries
            .iter()
            .map(SampleEntry::end_time)
            .max()
            .unwrap_or_default()
    }

    fn read(&mut self, buffer: &mut SampleBuffer) -> Result<()> {
        buffer.reset();
        buffer.format = self.format.clone();
        buffer.track = self.index;
        buffer.sequence = self.position;

        let Some(entry) = self.entries.get(self.position as usize).copied() else {
            if self.source.lock().is_none() {
                return Err(ContainerError::Closed.into());
            }
            buffer.flags = BufferFlags::DISCARD | BufferFlags::END_OF_MEDIA;
            buffer.timestamp = self.duration();
            buffer.duration = Rational::zero();
            return Ok(());
        };

        self.read_payload(&entry, buffer)?;
        buffer.timestamp = entry.timestamp;
        buffer.duration = entry.duration;
        buffer.set_flag(BufferFlags::KEYFRAME, entry.keyframe);
        self.position += 1;
        if self.position == self.sample_count() {
            buffer.flags.insert(BufferFlags::END_OF_MEDIA);
        }
        Ok(())
    }
}

impl SeekableTrack for IndexedTrack {
    fn seek(&mut self, time: Rational) -> Result<u64> {
        if time.is_negative() {
            return Err(Error::invalid_param(format!("negative seek time {time}")));
        }
        let target = self
            .entries
            .iter()
            .rposition(|e| e.keyframe && e.timestamp <= time)
            .unwrap_or(0) as u64;
        self.position = target;
        Ok(target)
    }
}

impl std::fmt::Debug for IndexedTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedTrack")
            .field("index", &self.index)
            .field("format", &self.format)
            .field("samples", &self.entries.len())
            .field("position", &self.position)
            .finish()
    }
}
