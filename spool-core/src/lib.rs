//! # Spool Core
//!
//! Core types shared by every spool crate:
//! - Error handling types
//! - Exact rational time
//! - Typed format descriptors and negotiation
//! - Reusable sample buffers and their flag protocol
//! - Media and file kinds

pub mod buffer;
pub mod descriptor;
pub mod error;
pub mod media;
pub mod rational;

pub use buffer::{BufferFlags, SampleBuffer};
pub use descriptor::{keys, FormatDescriptor, FormatKey, FormatValue, KeyId, Slot, Value};
pub use error::{CodecError, ContainerError, Error, Result};
pub use media::{encoding, ByteOrder, FileKind, MediaType};
pub use rational::Rational;
