//! Moves samples from one reader track to one writer track.

use serde::{Deserialize, Serialize};
use spool_codecs::{Codec, ProcessStatus};
use spool_containers::{ContainerReader, ContainerWriter};
use spool_core::{ContainerError, Rational, Result, SampleBuffer};
use tracing::{trace, warn};

/// Sample counters for one track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackStats {
    /// Buffers read from the source track.
    pub read: u64,
    /// Buffers written to the output track.
    pub written: u64,
    /// DISCARD buffers skipped.
    pub discarded: u64,
    /// Samples a codec failed on.
    pub failed: u64,
}

/// Pipeline for a single track: read, optionally convert, write.
pub struct TrackPump {
    source: usize,
    target: usize,
    codec: Option<Box<dyn Codec>>,
    input: SampleBuffer,
    output: SampleBuffer,
    pending: bool,
    finished: bool,
    next_time: Rational,
    stats: TrackStats,
}

impl TrackPump {
    /// Pump reader track `source` into writer track `target`.
    pub fn new(source: usize, target: usize, codec: Option<Box<dyn Codec>>) -> Self {
        Self {
            source,
            target,
            codec,
            input: SampleBuffer::new(),
            output: SampleBuffer::new(),
            pending: false,
            finished: false,
            next_time: Rational::zero(),
            stats: TrackStats::default(),
        }
    }

    /// Source track index.
    pub fn source(&self) -> usize {
        self.source
    }

    /// Name of the codec converting this track, if any.
    pub fn codec_name(&self) -> Option<&str> {
        self.codec.as_deref().map(|c| c.name())
    }

    /// Check if the source track has ended and nothing is pending.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Timestamp of the most recently read sample.
    pub fn next_time(&self) -> Rational {
        self.next_time
    }

    /// Counters so far.
    pub fn stats(&self) -> TrackStats {
        self.stats
    }

    fn fetch(&mut self, reader: &mut dyn ContainerReader) -> Result<()> {
        let track = reader
            .track(self.source)
            .ok_or(ContainerError::TrackNotFound { index: self.source })?;
        track.read(&mut self.input)?;
        self.stats.read += 1;
        self.next_time = self.input.timestamp;
        Ok(())
    }

    /// Read ahead one buffer so [`next_time`](Self::next_time) reflects the
    /// source before the first step.
    pub fn prime(&mut self, reader: &mut dyn ContainerReader) -> Result<()> {
        if self.finished || self.pending {
            return Ok(());
        }
        self.fetch(reader)?;
        self.pending = true;
        Ok(())
    }

    /// Move one buffer through the pipeline.
    pub fn step(
        &mut self,
        reader: &mut dyn ContainerReader,
        writer: &mut dyn ContainerWriter,
    ) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        if !self.pending {
            self.fetch(reader)?;
        }
        let end = self.input.is_end_of_media();

        match self.codec.as_mut() {
            None => {
                self.pending = false;
                if self.input.is_discard() {
                    self.stats.discarded += 1;
                } else {
                    writer.write(self.target, &self.input)?;
                    self.stats.written += 1;
                }
            }
            Some(codec) => {
                let status = codec.process(&mut self.input, &mut self.output);
                self.pending = status.input_pending();
                match status {
                    ProcessStatus::Failed => {
                        self.stats.failed += 1;
                        warn!(
                            track = self.source,
                            sequence = self.input.sequence,
                            error = ?self.output.error(),
                            "Dropping sample the codec failed on"
                        );
                    }
                    ProcessStatus::OutputNotFilled => {}
                    ProcessStatus::Ok | ProcessStatus::InputNotConsumed => {
                        if self.output.error().is_some() {
                            self.stats.failed += 1;
                            warn!(
                                track = self.source,
                                sequence = self.output.sequence,
                                error = ?self.output.error(),
                                "Dropping sub-unit the codec failed on"
                            );
                        } else if self.output.is_discard() {
                            self.stats.discarded += 1;
                        } else {
                            writer.write(self.target, &self.output)?;
                            self.stats.written += 1;
                        }
                    }
                }
            }
        }

        if end && !self.pending {
            trace!(track = self.source, "Track finished");
            self.finished = true;
        }
        Ok(())
    }

    /// Drop buffered and codec state after the source was repositioned.
    pub fn reset(&mut self, time: Rational) {
        if let Some(codec) = self.codec.as_mut() {
            codec.reset();
        }
        self.input.reset();
        self.output.reset();
        self.pending = false;
        self.finished = false;
        self.next_time = time;
    }
}

impl std::fmt::Debug for TrackPump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackPump")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("codec", &self.codec_name())
            .field("finished", &self.finished)
            .field("stats", &self.stats)
            .finish()
    }
}
