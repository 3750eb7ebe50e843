//! QuickTime movie support.
//!
//! Layout written:
//!
//! ```text
//! ftyp 'qt  '
//! wide            (becomes a 64-bit mdat header when needed)
//! mdat            samples in write order
//! moov
//!   mvhd
//!   trak (per track)
//!     tkhd
//!     mdia
//!       mdhd, hdlr
//!       minf
//!         vmhd | smhd | gmhd
//!         dinf
//!         stbl: stsd stts [stss] stsc stsz stco|co64
//! ```
//!
//! Video and text tracks store one sample per chunk; a gap before a sample
//! is stored as a zero-size sample, which the reader drops. Audio tracks
//! store one chunk per write with the sample frame as the sample unit.

mod atoms;
mod reader;
mod writer;

pub use atoms::AtomHeader;
pub use reader::QuickTimeReader;
pub use writer::{QuickTimeWriter, QuickTimeWriterConfig};
