//! Commonly used types and traits.
//!
//! ```rust
//! use spool::prelude::*;
//! ```

pub use crate::{Error, Result};

pub use crate::{BufferFlags, FormatDescriptor, MediaType, Rational, SampleBuffer};

pub use crate::{Codec, CodecChain, ProcessStatus};

pub use crate::{ContainerReader, ContainerWriter, SeekableTrack, Track};

pub use crate::{ProviderRegistry, RegistryBuilder};

pub use crate::{Session, SessionEvent, SessionHooks, SessionState, StepOutcome};

pub use crate::{TranscodeConfig, Transcoder};
