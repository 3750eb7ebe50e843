//! File-to-file transcoding driven by a session.

use crate::pump::{TrackPump, TrackStats};
use crate::session::{Session, SessionConfig, SessionHooks, StepOutcome};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use spool_containers::{ContainerReader, ContainerWriter};
use spool_core::keys::{ENCODING, FRAME_SIZE, SAMPLE_SIZE_BITS, SIGNED};
use spool_core::{ContainerError, Error, FormatDescriptor, MediaType, Rational, Result};
use spool_registry::ProviderRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What to produce from which input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Source file; the reader is chosen by content, then extension.
    pub input: PathBuf,
    /// Destination file; the writer is chosen by extension.
    pub output: PathBuf,
    /// Re-encode video tracks to this encoding.
    pub video_encoding: Option<String>,
    /// Convert PCM audio to this sample size. Signedness follows the
    /// output container.
    pub audio_sample_bits: Option<u32>,
    /// Leave text tracks out of the output.
    pub drop_text: bool,
}

/// Per-track counters of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    /// Counters indexed by output track.
    pub tracks: Vec<TrackStats>,
    /// Set once every track reached its end.
    pub complete: bool,
}

/// Session hooks that copy every track of one file into another.
pub struct TranscodeJob {
    config: TranscodeConfig,
    registry: Arc<ProviderRegistry>,
    reader: Option<Box<dyn ContainerReader>>,
    writer: Option<Box<dyn ContainerWriter>>,
    pumps: Vec<TrackPump>,
    stats: Arc<Mutex<JobStats>>,
}

impl TranscodeJob {
    /// Create a job; nothing is opened until realize.
    pub fn new(config: TranscodeConfig, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            config,
            registry,
            reader: None,
            writer: None,
            pumps: Vec::new(),
            stats: Arc::default(),
        }
    }

    /// Shared handle to the job counters, readable while the session runs.
    pub fn stats(&self) -> Arc<Mutex<JobStats>> {
        self.stats.clone()
    }

    /// Hand the job to a new session.
    pub fn into_session(self, config: SessionConfig) -> Result<Session> {
        Session::new(self, config)
    }

    /// Format to request from the writer for a source track.
    fn wanted_format(&self, source: &FormatDescriptor) -> Option<FormatDescriptor> {
        match source.media_type() {
            Some(MediaType::Text) if self.config.drop_text => None,
            Some(MediaType::Video) => Some(match &self.config.video_encoding {
                Some(encoding) => source.with(ENCODING, encoding.as_str()),
                None => source.clone(),
            }),
            Some(MediaType::Audio) => Some(match self.config.audio_sample_bits {
                Some(bits) => source
                    .with(SAMPLE_SIZE_BITS, bits)
                    .without(SIGNED)
                    .without(FRAME_SIZE),
                None => source.clone(),
            }),
            _ => Some(source.clone()),
        }
    }

    fn record_stats(&self) {
        let mut stats = self.stats.lock();
        stats.tracks = self.pumps.iter().map(TrackPump::stats).collect();
        stats.complete = !self.pumps.is_empty() && self.pumps.iter().all(TrackPump::is_finished);
    }
}

impl SessionHooks for TranscodeJob {
    fn realize(&mut self) -> Result<()> {
        let mut reader = self.registry.open_reader(&self.config.input)?;
        let mut writer = self.registry.create_writer(&self.config.output)?;

        let mut pumps = Vec::new();
        for index in 0..reader.track_count() {
            let source = reader
                .track(index)
                .ok_or(ContainerError::TrackNotFound { index })?
                .format()
                .clone();
            let Some(wanted) = self.wanted_format(&source) else {
                debug!(track = index, "Skipping text track");
                continue;
            };
            let added = writer.add_track(&wanted)?;
            let codec = if source.matches(&added.format) {
                None
            } else {
                Some(self.registry.get_codec_chain(&source, &added.format)?)
            };
            info!(
                track = index,
                format = %source,
                codec = codec.as_deref().map(|c| c.name()),
                "Track ready"
            );
            pumps.push(TrackPump::new(index, added.index, codec));
        }
        if pumps.is_empty() {
            return Err(Error::invalid_param("no tracks to transcode"));
        }

        self.reader = Some(reader);
        self.writer = Some(writer);
        self.pumps = pumps;
        self.record_stats();
        Ok(())
    }

    fn prefetch(&mut self) -> Result<()> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| Error::Lifecycle("job is not realized".to_string()))?;
        for pump in &mut self.pumps {
            pump.prime(reader.as_mut())?;
        }
        self.record_stats();
        Ok(())
    }

    fn seek(&mut self, time: Rational) -> Result<()> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| Error::Lifecycle("job is not realized".to_string()))?;
        reader.seek(time)?;
        for pump in &mut self.pumps {
            pump.reset(time);
        }
        self.record_stats();
        Ok(())
    }

    fn step(&mut self) -> Result<StepOutcome> {
        let (Some(reader), Some(writer)) = (self.reader.as_mut(), self.writer.as_mut()) else {
            return Err(Error::Lifecycle("job is not realized".to_string()));
        };
        // Interleave by picking the track that is furthest behind.
        let next = self
            .pumps
            .iter_mut()
            .filter(|p| !p.is_finished())
            .min_by_key(|p| p.next_time());
        let outcome = match next {
            Some(pump) => {
                pump.step(reader.as_mut(), writer.as_mut())?;
                StepOutcome::Continue
            }
            None => StepOutcome::Finished,
        };
        self.record_stats();
        Ok(outcome)
    }

    fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.close() {
                warn!(error = %e, "Failed to finalize output");
            }
        }
        if let Some(mut reader) = self.reader.take() {
            if let Err(e) = reader.close() {
                warn!(error = %e, "Failed to close input");
            }
        }
        self.pumps.clear();
    }
}

impl std::fmt::Debug for TranscodeJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscodeJob")
            .field("config", &self.config)
            .field("pumps", &self.pumps)
            .finish()
    }
}
