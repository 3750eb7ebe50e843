//! # Spool Session
//!
//! A [`Session`] owns a worker thread that walks a lifecycle state machine
//! (unrealized, realized, prefetched, started, closed), running
//! [`SessionHooks`] at each transition and reporting [`SessionEvent`]s.
//!
//! [`TranscodeJob`] is a ready-made set of hooks that copies every track of
//! one container into another, converting tracks through codecs resolved by
//! a [`ProviderRegistry`](spool_registry::ProviderRegistry).

pub mod job;
pub mod pump;
pub mod session;
pub mod state;

pub use job::{JobStats, TranscodeConfig, TranscodeJob};
pub use pump::{TrackPump, TrackStats};
pub use session::{Session, SessionConfig, SessionHooks, StepOutcome, Transition};
pub use state::{SessionEvent, SessionState};
