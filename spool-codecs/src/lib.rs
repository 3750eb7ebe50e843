//! # Spool Codecs
//!
//! The [`Codec`] trait and its buffer exchange protocol, [`CodecChain`] for
//! composing codecs, and the built-in codecs:
//!
//! - [`ScreenDeltaEncoder`] / [`ScreenDeltaDecoder`] - screen-capture delta codec
//! - [`PcmCodec`] - PCM layout conversion
//! - [`CueSplitterCodec`] - one caption cue per buffer
//! - [`PassThroughCodec`] - identity

pub mod caption;
pub mod chain;
pub mod passthrough;
pub mod pcm;
pub mod screen;
pub mod traits;

pub use caption::{Cue, CueSplitterCodec};
pub use chain::CodecChain;
pub use passthrough::PassThroughCodec;
pub use pcm::{PcmCodec, PcmLayout};
pub use screen::{ScreenCodecConfig, ScreenDeltaDecoder, ScreenDeltaEncoder};
pub use traits::{negotiate, Codec, ProcessStatus};
