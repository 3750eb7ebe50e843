//! Provider declarations for the three registry roles.
//!
//! A provider pairs a unique name with a factory. Codec providers build a
//! fresh codec per lookup so that no codec state is ever shared; reader and
//! writer providers declare the file extensions they handle, and readers
//! may also recognize content by its leading bytes.

use spool_codecs::Codec;
use spool_containers::{ContainerReader, ContainerWriter, ReadSeek, WriteSeek};
use spool_core::{FileKind, FormatDescriptor, Result};
use std::fmt;
use std::sync::Arc;

/// Registry role of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderRole {
    /// Creates codecs.
    Codec,
    /// Opens container readers.
    Reader,
    /// Creates container writers.
    Writer,
}

impl fmt::Display for ProviderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderRole::Codec => write!(f, "codec"),
            ProviderRole::Reader => write!(f, "reader"),
            ProviderRole::Writer => write!(f, "writer"),
        }
    }
}

type CodecFactory = Arc<dyn Fn() -> Box<dyn Codec> + Send + Sync>;
type ReaderFactory = Arc<dyn Fn(Box<dyn ReadSeek>) -> Result<Box<dyn ContainerReader>> + Send + Sync>;
type WriterFactory = Arc<dyn Fn(Box<dyn WriteSeek>) -> Box<dyn ContainerWriter> + Send + Sync>;

/// Declares a codec.
#[derive(Clone)]
pub struct CodecProvider {
    name: String,
    factory: CodecFactory,
}

impl CodecProvider {
    /// Create a provider from a codec constructor.
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Codec> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    /// Provider name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build a fresh, unconfigured codec.
    pub fn instantiate(&self) -> Box<dyn Codec> {
        (self.factory)()
    }

    /// Input patterns the codec declares.
    pub fn input_formats(&self) -> Vec<FormatDescriptor> {
        self.instantiate().input_formats()
    }
}

impl fmt::Debug for CodecProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecProvider").field("name", &self.name).finish()
    }
}

/// Declares a container reader.
#[derive(Clone)]
pub struct ReaderProvider {
    name: String,
    kind: FileKind,
    extensions: Vec<String>,
    probe: Option<fn(&[u8]) -> bool>,
    open: ReaderFactory,
}

impl ReaderProvider {
    /// Create a provider handling `extensions` (without the dot).
    pub fn new<F>(name: impl Into<String>, kind: FileKind, extensions: &[&str], open: F) -> Self
    where
        F: Fn(Box<dyn ReadSeek>) -> Result<Box<dyn ContainerReader>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind,
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
            probe: None,
            open: Arc::new(open),
        }
    }

    /// Recognize files by their leading bytes.
    #[must_use]
    pub fn with_probe(mut self, probe: fn(&[u8]) -> bool) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Provider name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File kind read.
    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// Declared extensions, lowercase.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Check if `extension` (with or without the dot) is declared.
    pub fn handles_extension(&self, extension: &str) -> bool {
        let ext = extension.trim_start_matches('.');
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Check the leading bytes of a file; false without a probe.
    pub fn probe(&self, head: &[u8]) -> bool {
        self.probe.is_some_and(|probe| probe(head))
    }

    /// Open a reader over `source`.
    pub fn open(&self, source: Box<dyn ReadSeek>) -> Result<Box<dyn ContainerReader>> {
        (self.open)(source)
    }
}

impl fmt::Debug for ReaderProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderProvider")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("extensions", &self.extensions)
            .field("probe", &self.probe.is_some())
            .finish()
    }
}

/// Declares a container writer.
#[derive(Clone)]
pub struct WriterProvider {
    name: String,
    kind: FileKind,
    extensions: Vec<String>,
    create: WriterFactory,
}

impl WriterProvider {
    /// Create a provider handling `extensions` (without the dot).
    pub fn new<F>(name: impl Into<String>, kind: FileKind, extensions: &[&str], create: F) -> Self
    where
        F: Fn(Box<dyn WriteSeek>) -> Box<dyn ContainerWriter> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind,
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
            create: Arc::new(create),
        }
    }

    /// Provider name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File kind written.
    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// Declared extensions, lowercase.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Check if `extension` (with or without the dot) is declared.
    pub fn handles_extension(&self, extension: &str) -> bool {
        let ext = extension.trim_start_matches('.');
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Create a writer over `sink`.
    pub fn create(&self, sink: Box<dyn WriteSeek>) -> Box<dyn ContainerWriter> {
        (self.create)(sink)
    }
}

impl fmt::Debug for WriterProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterProvider")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("extensions", &self.extensions)
            .finish()
    }
}
