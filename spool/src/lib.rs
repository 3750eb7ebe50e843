//! # Spool
//!
//! Media pipeline built from four pieces:
//!
//! - [`FormatDescriptor`]s describe media as open-ended key/value maps and
//!   negotiate by pattern matching.
//! - [`Codec`]s transform [`SampleBuffer`]s between formats.
//! - Container readers and writers ([`AviReader`], [`QuickTimeWriter`], ...)
//!   demultiplex and multiplex tracks.
//! - A [`Session`] drives work through a realize / prefetch / start
//!   lifecycle on its own worker thread.
//!
//! Providers for all of these are looked up in a [`ProviderRegistry`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spool::Transcoder;
//!
//! fn main() -> spool::Result<()> {
//!     spool::init_logging(false);
//!     let stats = Transcoder::builder()
//!         .input("capture.avi")
//!         .output("capture.mov")
//!         .video_encoding(spool::encoding::SCREEN)
//!         .build()?
//!         .run()?;
//!     println!("{} tracks", stats.tracks.len());
//!     Ok(())
//! }
//! ```

mod logging;
pub mod prelude;
mod transcoder;

pub use spool_core::{
    encoding, keys, BufferFlags, ByteOrder, CodecError, ContainerError, Error, FileKind,
    FormatDescriptor, FormatKey, MediaType, Rational, Result, SampleBuffer, Slot, Value,
};

pub use spool_codecs::{
    Codec, CodecChain, CueSplitterCodec, PassThroughCodec, PcmCodec, ProcessStatus,
    ScreenCodecConfig, ScreenDeltaDecoder, ScreenDeltaEncoder,
};

pub use spool_containers::{
    AddedTrack, AviReader, AviWriter, AviWriterConfig, ContainerReader, ContainerWriter,
    IffReader, IffWriter, QuickTimeReader, QuickTimeWriter, QuickTimeWriterConfig,
    SeekableTrack, Track,
};

pub use spool_registry::{
    CodecProvider, ProviderRegistry, ProviderRole, ReaderProvider, RegistryBuilder,
    RegistryError, WriterProvider,
};

pub use spool_session::{
    JobStats, Session, SessionConfig, SessionEvent, SessionHooks, SessionState, StepOutcome,
    TranscodeConfig, TranscodeJob, Transition,
};

pub use logging::init_logging;
pub use transcoder::{Transcoder, TranscoderBuilder};
