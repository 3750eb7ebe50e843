//! RIFF/AVI container support.
//!
//! Layout written and read:
//!
//! ```text
//! RIFF 'AVI '
//!   LIST 'hdrl'
//!     avih
//!     LIST 'strl' (per stream)
//!       strh
//!       strf
//!   JUNK
//!   LIST 'movi'
//!     ##dc / ##db / ##wb / ##tx chunks
//!   idx1
//! ```
//!
//! Video is stored at a fixed frame rate: a frame longer than one period is
//! followed by empty chunks, which the reader folds back into the frame's
//! duration. Audio is PCM only. Text chunks carry an 8-byte header of start
//! and duration in milliseconds.

pub mod chunks;
mod reader;
mod writer;

pub use reader::AviReader;
pub use writer::{AviWriter, AviWriterConfig};
