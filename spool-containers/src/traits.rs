//! Track and container traits for reading and writing.

use spool_core::{ContainerError, FormatDescriptor, Rational, Result, SampleBuffer};
use std::io::{Read, Seek, Write};

/// Byte source a reader can seek in.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Byte sink a writer can seek back into for patching.
pub trait WriteSeek: Write + Seek + Send {}

impl<T: Write + Seek + Send> WriteSeek for T {}

/// One elementary stream of a container.
///
/// A track is a cursor over its samples. Callers loop [`read`](Track::read)
/// until the returned buffer carries END_OF_MEDIA; the final real sample
/// carries the flag together with its payload.
pub trait Track: Send {
    /// Index of this track within its container.
    fn index(&self) -> usize;

    /// Format of every sample in this track.
    fn format(&self) -> &FormatDescriptor;

    /// Number of samples.
    fn sample_count(&self) -> u64;

    /// Index of the next sample [`read`](Track::read) returns.
    fn position(&self) -> u64;

    /// Move the cursor to a sample index.
    fn set_position(&mut self, index: u64) -> Result<()>;

    /// Total duration of the track.
    fn duration(&self) -> Rational;

    /// Fill `buffer` with the sample at the cursor and advance.
    ///
    /// Reading past the last sample yields an empty DISCARD | END_OF_MEDIA
    /// buffer.
    fn read(&mut self, buffer: &mut SampleBuffer) -> Result<()>;
}

/// A track supporting time-based seeking.
pub trait SeekableTrack: Track {
    /// Move to the nearest keyframe at or before `time`.
    ///
    /// Returns the sample index the cursor now points at.
    fn seek(&mut self, time: Rational) -> Result<u64>;
}

/// Demultiplexes a container into tracks.
pub trait ContainerReader: Send {
    /// File-level descriptor (media type `File`, file kind, MIME type).
    fn file_format(&self) -> &FormatDescriptor;

    /// Number of tracks.
    fn track_count(&self) -> usize;

    /// Access a track cursor.
    fn track(&mut self, index: usize) -> Option<&mut dyn SeekableTrack>;

    /// Duration of one track.
    fn track_duration(&self, index: usize) -> Option<Rational>;

    /// Duration of the longest track.
    fn duration(&self) -> Rational {
        (0..self.track_count())
            .filter_map(|i| self.track_duration(i))
            .max()
            .unwrap_or_default()
    }

    /// Seek every track to the nearest keyframe at or before `time`.
    fn seek(&mut self, time: Rational) -> Result<()> {
        for i in 0..self.track_count() {
            let track = self
                .track(i)
                .ok_or(ContainerError::TrackNotFound { index: i })?;
            track.seek(time)?;
        }
        Ok(())
    }

    /// Release the underlying source. Later reads fail with `Closed`.
    fn close(&mut self) -> Result<()>;
}

/// Result of [`ContainerWriter::add_track`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedTrack {
    /// Index to pass to [`ContainerWriter::write`].
    pub index: usize,
    /// Refined, authoritative track format.
    pub format: FormatDescriptor,
}

/// Multiplexes tracks into a container.
pub trait ContainerWriter: Send {
    /// File-level descriptor of the produced file.
    fn file_format(&self) -> &FormatDescriptor;

    /// Declare a track. Must precede the first [`write`](Self::write).
    ///
    /// The returned descriptor is what the container will actually store;
    /// samples must be converted to it.
    fn add_track(&mut self, format: &FormatDescriptor) -> Result<AddedTrack>;

    /// Number of declared tracks.
    fn track_count(&self) -> usize;

    /// Refined format of a declared track.
    fn track_format(&self, index: usize) -> Option<&FormatDescriptor>;

    /// Append one sample. DISCARD buffers are skipped.
    fn write(&mut self, track: usize, buffer: &SampleBuffer) -> Result<()>;

    /// Time covered by the samples written to `track` so far.
    fn duration(&self, track: usize) -> Option<Rational>;

    /// Check if [`close`](Self::close) has run.
    fn is_closed(&self) -> bool;

    /// Finalize index structures and release the sink.
    ///
    /// Runs at most once; later calls return `Ok`. The sink is released
    /// even when finalization fails.
    fn close(&mut self) -> Result<()>;
}
