//! Provider registry.
//!
//! A [`ProviderRegistry`] is assembled once by a [`RegistryBuilder`] and is
//! read-only afterwards; share it behind an `Arc`. Every lookup scans its
//! role in registration order and returns the first provider that accepts,
//! so the order in which providers are registered is observable behavior.

use crate::error::RegistryError;
use crate::provider::{CodecProvider, ProviderRole, ReaderProvider, WriterProvider};
use spool_codecs::{
    Codec, CodecChain, CueSplitterCodec, PassThroughCodec, PcmCodec, ScreenDeltaDecoder,
    ScreenDeltaEncoder,
};
use spool_containers::{
    probe, AviReader, AviWriter, ContainerReader, ContainerWriter, IffReader, IffWriter,
    QuickTimeReader, QuickTimeWriter, PROBE_LEN,
};
use spool_core::{Error, FileKind, FormatDescriptor, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, info, trace};

/// Collects providers in registration order.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    codecs: Vec<CodecProvider>,
    readers: Vec<ReaderProvider>,
    writers: Vec<WriterProvider>,
}

impl RegistryBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder holding the built-in providers.
    ///
    /// Codecs, in order:
    /// 1. `passthrough` - wins whenever no conversion is needed
    /// 2. `screen-encoder` - raw video to screen delta
    /// 3. `screen-decoder` - screen delta to raw video
    /// 4. `pcm` - PCM layout conversion
    /// 5. `cue-splitter` - SRT text to one cue per buffer
    ///
    /// Readers and writers: `avi`, `quicktime`, then `iff`.
    ///
    /// Providers registered afterwards are consulted after these.
    pub fn with_defaults() -> Self {
        Self {
            codecs: vec![
                CodecProvider::new("passthrough", || Box::new(PassThroughCodec::new())),
                CodecProvider::new("screen-encoder", || Box::new(ScreenDeltaEncoder::new())),
                CodecProvider::new("screen-decoder", || Box::new(ScreenDeltaDecoder::new())),
                CodecProvider::new("pcm", || Box::new(PcmCodec::new())),
                CodecProvider::new("cue-splitter", || Box::new(CueSplitterCodec::new())),
            ],
            readers: vec![
                ReaderProvider::new("avi", FileKind::Avi, &["avi"], |source| {
                    Ok(Box::new(AviReader::open(source)?) as Box<dyn ContainerReader>)
                })
                .with_probe(|head| probe(head) == Some(FileKind::Avi)),
                ReaderProvider::new("quicktime", FileKind::QuickTime, &["mov", "qt"], |source| {
                    Ok(Box::new(QuickTimeReader::open(source)?) as Box<dyn ContainerReader>)
                })
                .with_probe(|head| probe(head) == Some(FileKind::QuickTime)),
                ReaderProvider::new("iff", FileKind::Iff, &["iff", "8svx", "svx"], |source| {
                    Ok(Box::new(IffReader::open(source)?) as Box<dyn ContainerReader>)
                })
                .with_probe(|head| probe(head) == Some(FileKind::Iff)),
            ],
            writers: vec![
                WriterProvider::new("avi", FileKind::Avi, &["avi"], |sink| {
                    Box::new(AviWriter::new(sink))
                }),
                WriterProvider::new("quicktime", FileKind::QuickTime, &["mov", "qt"], |sink| {
                    Box::new(QuickTimeWriter::new(sink))
                }),
                WriterProvider::new("iff", FileKind::Iff, &["iff", "8svx", "svx"], |sink| {
                    Box::new(IffWriter::new(sink))
                }),
            ],
        }
    }

    /// Append a codec provider.
    pub fn register_codec(&mut self, provider: CodecProvider) -> std::result::Result<&mut Self, RegistryError> {
        check_unique(ProviderRole::Codec, provider.name(), self.codecs.iter().map(|p| p.name()))?;
        info!(name = provider.name(), "Codec provider registered");
        self.codecs.push(provider);
        Ok(self)
    }

    /// Append a reader provider.
    pub fn register_reader(&mut self, provider: ReaderProvider) -> std::result::Result<&mut Self, RegistryError> {
        check_unique(ProviderRole::Reader, provider.name(), self.readers.iter().map(|p| p.name()))?;
        info!(
            name = provider.name(),
            extensions = ?provider.extensions(),
            "Reader provider registered"
        );
        self.readers.push(provider);
        Ok(self)
    }

    /// Append a writer provider.
    pub fn register_writer(&mut self, provider: WriterProvider) -> std::result::Result<&mut Self, RegistryError> {
        check_unique(ProviderRole::Writer, provider.name(), self.writers.iter().map(|p| p.name()))?;
        info!(
            name = provider.name(),
            extensions = ?provider.extensions(),
            "Writer provider registered"
        );
        self.writers.push(provider);
        Ok(self)
    }

    /// Freeze the registry.
    pub fn build(self) -> ProviderRegistry {
        debug!(
            codecs = self.codecs.len(),
            readers = self.readers.len(),
            writers = self.writers.len(),
            "Provider registry built"
        );
        ProviderRegistry {
            codecs: self.codecs,
            readers: self.readers,
            writers: self.writers,
        }
    }
}

fn check_unique<'a>(
    role: ProviderRole,
    name: &str,
    mut existing: impl Iterator<Item = &'a str>,
) -> std::result::Result<(), RegistryError> {
    if existing.any(|n| n == name) {
        return Err(RegistryError::AlreadyRegistered {
            role,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Read-only catalog of providers.
#[derive(Debug)]
pub struct ProviderRegistry {
    codecs: Vec<CodecProvider>,
    readers: Vec<ReaderProvider>,
    writers: Vec<WriterProvider>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        RegistryBuilder::with_defaults().build()
    }
}

impl ProviderRegistry {
    /// Provider names of one role, in registration order.
    pub fn names(&self, role: ProviderRole) -> Vec<&str> {
        match role {
            ProviderRole::Codec => self.codecs.iter().map(|p| p.name()).collect(),
            ProviderRole::Reader => self.readers.iter().map(|p| p.name()).collect(),
            ProviderRole::Writer => self.writers.iter().map(|p| p.name()).collect(),
        }
    }

    /// Codec providers, in registration order.
    pub fn codecs(&self) -> &[CodecProvider] {
        &self.codecs
    }

    /// Reader providers, in registration order.
    pub fn readers(&self) -> &[ReaderProvider] {
        &self.readers
    }

    /// Writer providers, in registration order.
    pub fn writers(&self) -> &[WriterProvider] {
        &self.writers
    }

    /// Find a codec converting `from` to `to`.
    ///
    /// Each provider in turn builds a codec and is offered `from`, then
    /// `to`; the first codec accepting both is returned, already configured.
    pub fn get_codec(&self, from: &FormatDescriptor, to: &FormatDescriptor) -> Result<Box<dyn Codec>> {
        self.find_codec(from, to).ok_or_else(|| {
            Error::UnsupportedFormat(format!("no codec converts {from} to {to}"))
        })
    }

    fn find_codec(&self, from: &FormatDescriptor, to: &FormatDescriptor) -> Option<Box<dyn Codec>> {
        for provider in &self.codecs {
            let mut codec = provider.instantiate();
            if let Err(e) = codec.set_input_format(from) {
                trace!(provider = provider.name(), error = %e, "Codec rejected input");
                continue;
            }
            match codec.set_output_format(to) {
                Ok(output) => {
                    debug!(provider = provider.name(), %from, to = %output, "Codec resolved");
                    return Some(codec);
                }
                Err(e) => trace!(provider = provider.name(), error = %e, "Codec rejected output"),
            }
        }
        None
    }

    /// Like [`get_codec`](Self::get_codec), falling back to a two-stage
    /// chain through an intermediate format.
    ///
    /// Candidates for the first stage are tried in registration order, and
    /// each one's declared outputs in the order it lists them.
    pub fn get_codec_chain(&self, from: &FormatDescriptor, to: &FormatDescriptor) -> Result<Box<dyn Codec>> {
        if let Some(codec) = self.find_codec(from, to) {
            return Ok(codec);
        }
        for provider in &self.codecs {
            let mut scout = provider.instantiate();
            let Ok(input) = scout.set_input_format(from) else {
                continue;
            };
            for candidate in scout.output_formats(Some(&input)) {
                let mut first = provider.instantiate();
                if first.set_input_format(from).is_err() {
                    continue;
                }
                let Ok(middle) = first.set_output_format(&candidate) else {
                    continue;
                };
                if middle == *from {
                    continue;
                }
                let Some(second) = self.find_codec(&middle, to) else {
                    continue;
                };
                let chain = match CodecChain::from_configured(vec![first, second]) {
                    Ok(chain) => chain,
                    Err(e) => {
                        trace!(provider = provider.name(), via = %middle, error = %e, "Chain rejected");
                        continue;
                    }
                };
                debug!(chain = chain.name(), %from, %to, via = %middle, "Codec chain resolved");
                return Ok(Box::new(chain));
            }
        }
        Err(Error::UnsupportedFormat(format!(
            "no codec or two-stage chain converts {from} to {to}"
        )))
    }

    /// Find a reader for a file, by content first and then by extension.
    pub fn get_reader(&self, extension: Option<&str>, head: &[u8]) -> Result<&ReaderProvider> {
        let found = self
            .readers
            .iter()
            .find(|p| p.probe(head))
            .or_else(|| {
                let ext = extension?;
                self.readers.iter().find(|p| p.handles_extension(ext))
            });
        match found {
            Some(provider) => {
                debug!(provider = provider.name(), "Reader resolved");
                Ok(provider)
            }
            None => Err(Error::UnsupportedFormat(format!(
                "no reader for extension {extension:?}"
            ))),
        }
    }

    /// Find a writer by file extension.
    pub fn get_writer(&self, extension: &str) -> Result<&WriterProvider> {
        self.writers
            .iter()
            .find(|p| p.handles_extension(extension))
            .ok_or_else(|| Error::UnsupportedFormat(format!("no writer for extension {extension:?}")))
    }

    /// Open `path` with the first matching reader.
    pub fn open_reader(&self, path: &Path) -> Result<Box<dyn ContainerReader>> {
        let mut file = File::open(path)?;
        let mut head = Vec::with_capacity(PROBE_LEN);
        file.by_ref().take(PROBE_LEN as u64).read_to_end(&mut head)?;
        file.seek(SeekFrom::Start(0))?;
        let extension = path.extension().and_then(|e| e.to_str());
        let provider = self.get_reader(extension, &head)?;
        info!(path = %path.display(), provider = provider.name(), "Opening container");
        provider.open(Box::new(file))
    }

    /// Create `path` with the writer registered for its extension.
    pub fn create_writer(&self, path: &Path) -> Result<Box<dyn ContainerWriter>> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let provider = self.get_writer(extension)?;
        let file = File::create(path)?;
        info!(path = %path.display(), provider = provider.name(), "Creating container");
        Ok(provider.create(Box::new(file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spool_containers::ContainerWriter;
    use spool_core::keys::ENCODING;
    use spool_core::{encoding, MediaType};

    fn text(encoding: &str) -> FormatDescriptor {
        FormatDescriptor::of(MediaType::Text).with(ENCODING, encoding)
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut builder = RegistryBuilder::with_defaults();
        let err = builder
            .register_codec(CodecProvider::new("pcm", || Box::new(PcmCodec::new())))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::AlreadyRegistered {
                role: ProviderRole::Codec,
                name: "pcm".to_string()
            }
        );
        // Same name under another role is fine.
        builder
            .register_reader(ReaderProvider::new("pcm", FileKind::Avi, &["wav"], |s| {
                Ok(Box::new(AviReader::open(s)?) as Box<dyn ContainerReader>)
            }))
            .unwrap();
    }

    #[test]
    fn test_default_order_is_listed() {
        let registry = ProviderRegistry::default();
        assert_eq!(
            registry.names(ProviderRole::Codec),
            vec!["passthrough", "screen-encoder", "screen-decoder", "pcm", "cue-splitter"]
        );
        assert_eq!(registry.names(ProviderRole::Writer), vec!["avi", "quicktime", "iff"]);
        assert_eq!(registry.names(ProviderRole::Reader), vec!["avi", "quicktime", "iff"]);
    }

    #[test]
    fn test_identity_resolves_to_passthrough() {
        let registry = ProviderRegistry::default();
        let codec = registry.get_codec(&text(encoding::SRT), &text(encoding::SRT)).unwrap();
        assert_eq!(codec.name(), "passthrough");

        let codec = registry.get_codec(&text(encoding::SRT), &text(encoding::CUE)).unwrap();
        assert_eq!(codec.name(), "cue-splitter");
    }

    #[test]
    fn test_unsupported_transition() {
        let registry = ProviderRegistry::default();
        let err = registry
            .get_codec(&text(encoding::CUE), &text(encoding::SRT))
            .err().unwrap();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_reader_by_probe_then_extension() {
        let registry = ProviderRegistry::default();
        let mut head = b"RIFF\0\0\0\0AVI ".to_vec();
        assert_eq!(registry.get_reader(Some("mov"), &head).unwrap().name(), "avi");
        head.clear();
        assert_eq!(registry.get_reader(Some(".MOV"), &head).unwrap().name(), "quicktime");
        assert!(registry.get_reader(None, &head).is_err());
        assert!(registry.get_reader(Some("mkv"), &head).is_err());
    }

    #[test]
    fn test_writer_by_extension() {
        let registry = ProviderRegistry::default();
        assert_eq!(registry.get_writer("qt").unwrap().kind(), FileKind::QuickTime);
        assert!(registry.get_writer("wav").is_err());

        let dir = tempfile::tempdir().unwrap();
        let mut writer = registry.create_writer(&dir.path().join("out.avi")).unwrap();
        assert_eq!(writer.file_format().get(spool_core::keys::FILE_KIND), Some(FileKind::Avi));
        writer.close().unwrap();
    }
}
