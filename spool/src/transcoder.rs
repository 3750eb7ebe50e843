//! High-level file transcoding.

use spool_core::{Error, Result};
use spool_registry::ProviderRegistry;
use spool_session::{JobStats, SessionConfig, SessionEvent, SessionState, TranscodeConfig, TranscodeJob};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Runs a [`TranscodeJob`] in a session until the input is exhausted.
#[derive(Debug)]
pub struct Transcoder {
    config: TranscodeConfig,
    registry: Arc<ProviderRegistry>,
    session: SessionConfig,
}

impl Transcoder {
    /// Create a transcoder using the default providers.
    pub fn new(config: TranscodeConfig) -> Result<Self> {
        TranscoderBuilder::from_config(config).build()
    }

    /// Start building a transcoder.
    pub fn builder() -> TranscoderBuilder {
        TranscoderBuilder::new()
    }

    /// Job configuration.
    pub fn config(&self) -> &TranscodeConfig {
        &self.config
    }

    /// Transcode the whole input, blocking until the output is finalized.
    pub fn run(self) -> Result<JobStats> {
        info!(
            input = %self.config.input.display(),
            output = %self.config.output.display(),
            "Transcoding"
        );
        let job = TranscodeJob::new(self.config, self.registry);
        let stats = job.stats();
        let session = job.into_session(self.session)?;

        session.start().wait()?;
        while let Ok(event) = session.events().recv() {
            match event {
                SessionEvent::EndOfMedia => break,
                SessionEvent::StateChanged { to: SessionState::Closed, .. } => break,
                event => debug!(?event, "Session event"),
            }
        }
        session.close().wait()?;
        if let Some(e) = session.error() {
            return Err(Error::Lifecycle(e.to_string()));
        }

        let stats = stats.lock().clone();
        info!(tracks = stats.tracks.len(), complete = stats.complete, "Transcode finished");
        Ok(stats)
    }
}

/// Fluent construction of a [`Transcoder`].
#[derive(Debug, Default)]
pub struct TranscoderBuilder {
    config: TranscodeConfig,
    registry: Option<Arc<ProviderRegistry>>,
    session: SessionConfig,
}

impl TranscoderBuilder {
    /// Create a builder with empty paths.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing job configuration.
    pub fn from_config(config: TranscodeConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Set the input file.
    pub fn input(mut self, path: impl AsRef<Path>) -> Self {
        self.config.input = path.as_ref().to_path_buf();
        self
    }

    /// Set the output file; its extension selects the container.
    pub fn output(mut self, path: impl AsRef<Path>) -> Self {
        self.config.output = path.as_ref().to_path_buf();
        self
    }

    /// Re-encode video to `encoding`.
    pub fn video_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.config.video_encoding = Some(encoding.into());
        self
    }

    /// Convert PCM audio to `bits` per sample.
    pub fn audio_sample_bits(mut self, bits: u32) -> Self {
        self.config.audio_sample_bits = Some(bits);
        self
    }

    /// Leave text tracks out.
    pub fn drop_text(mut self, drop: bool) -> Self {
        self.config.drop_text = drop;
        self
    }

    /// Resolve providers from `registry` instead of the defaults.
    pub fn registry(mut self, registry: Arc<ProviderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Configure the session worker.
    pub fn session(mut self, config: SessionConfig) -> Self {
        self.session = config;
        self
    }

    /// Build the transcoder.
    pub fn build(self) -> Result<Transcoder> {
        if is_blank(&self.config.input) || is_blank(&self.config.output) {
            return Err(Error::invalid_param("input and output paths are required"));
        }
        Ok(Transcoder {
            config: self.config,
            registry: self.registry.unwrap_or_default(),
            session: self.session,
        })
    }
}

fn is_blank(path: &Path) -> bool {
    path.as_os_str().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_paths() {
        let err = Transcoder::builder().input("in.avi").build().unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn test_builder_fills_config() {
        let transcoder = Transcoder::builder()
            .input("in.avi")
            .output("out.mov")
            .video_encoding("scrn")
            .audio_sample_bits(8)
            .drop_text(true)
            .build()
            .unwrap();
        let config = transcoder.config();
        assert_eq!(config.output, Path::new("out.mov"));
        assert_eq!(config.video_encoding.as_deref(), Some("scrn"));
        assert_eq!(config.audio_sample_bits, Some(8));
        assert!(config.drop_text);
    }
}
