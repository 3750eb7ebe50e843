//! # Spool Containers
//!
//! Container demultiplexing and multiplexing:
//! - [`Track`], [`ContainerReader`] and [`ContainerWriter`] traits
//! - AVI (RIFF) reader and writer
//! - QuickTime reader and writer
//! - IFF 8SVX reader and writer
//! - Content probing by leading bytes

pub mod atom;
pub mod iff;
pub mod indexed;
pub mod probe;
pub mod riff;
pub mod traits;

pub use atom::{QuickTimeReader, QuickTimeWriter, QuickTimeWriterConfig};
pub use iff::{IffReader, IffWriter};
pub use indexed::{shared, IndexedTrack, SampleEntry, SharedSource};
pub use probe::{probe, PROBE_LEN};
pub use riff::{AviReader, AviWriter, AviWriterConfig};
pub use traits::{
    AddedTrack, ContainerReader, ContainerWriter, ReadSeek, SeekableTrack, Track, WriteSeek,
};
