//! Common codec traits.
//!
//! A [`Codec`] is configured once through format negotiation and then driven
//! by repeated [`Codec::process`] calls that exchange reusable
//! [`SampleBuffer`]s:
//!
//! ```ignore
//! codec.set_input_format(&track_format)?;
//! codec.set_output_format(&wanted)?;
//!
//! loop {
//!     match codec.process(&mut input, &mut output) {
//!         ProcessStatus::Ok => { write(&output); break; }
//!         ProcessStatus::InputNotConsumed => write(&output),
//!         ProcessStatus::OutputNotFilled => break,
//!         ProcessStatus::Failed => { log(output.error()); break; }
//!     }
//! }
//! ```

use spool_core::{Error, FormatDescriptor, Result, SampleBuffer};

/// Outcome of a single [`Codec::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessStatus {
    /// Input consumed and output filled.
    Ok,
    /// Output filled; call again with the same input for more.
    InputNotConsumed,
    /// Input consumed but nothing to emit yet.
    OutputNotFilled,
    /// The input could not be processed; output carries the error and DISCARD.
    Failed,
}

impl ProcessStatus {
    /// Check if the output buffer holds a result.
    pub fn output_filled(&self) -> bool {
        matches!(self, ProcessStatus::Ok | ProcessStatus::InputNotConsumed)
    }

    /// Check if the caller must resubmit the same input.
    pub fn input_pending(&self) -> bool {
        matches!(self, ProcessStatus::InputNotConsumed)
    }
}

/// A stateful transformation from one format to another.
///
/// Codecs own their state exclusively; they are moved between threads but
/// never shared.
pub trait Codec: Send {
    /// Codec name, unique per provider.
    fn name(&self) -> &str;

    /// Input formats this codec accepts, as patterns.
    fn input_formats(&self) -> Vec<FormatDescriptor>;

    /// Output formats producible from `input`, or from any input when `None`.
    fn output_formats(&self, input: Option<&FormatDescriptor>) -> Vec<FormatDescriptor>;

    /// Negotiate the input format and return the refined descriptor.
    fn set_input_format(&mut self, format: &FormatDescriptor) -> Result<FormatDescriptor>;

    /// Negotiate the output format and return the refined descriptor.
    ///
    /// Must be called after [`set_input_format`](Self::set_input_format).
    fn set_output_format(&mut self, format: &FormatDescriptor) -> Result<FormatDescriptor>;

    /// Negotiated input format.
    fn input_format(&self) -> Option<&FormatDescriptor>;

    /// Negotiated output format.
    fn output_format(&self) -> Option<&FormatDescriptor>;

    /// Process one input buffer into one output buffer.
    fn process(&mut self, input: &mut SampleBuffer, output: &mut SampleBuffer) -> ProcessStatus;

    /// Drop retained state, e.g. after a seek.
    fn reset(&mut self) {}
}

/// Pick the first supported pattern matching `offered` and refine `offered`
/// with it.
pub fn negotiate(
    offered: &FormatDescriptor,
    supported: &[FormatDescriptor],
) -> Result<FormatDescriptor> {
    supported
        .iter()
        .find(|pattern| pattern.matches(offered))
        .map(|pattern| offered.refine(pattern))
        .ok_or_else(|| {
            let reason = supported
                .first()
                .and_then(|p| offered.mismatch(p))
                .unwrap_or_else(|| "no supported format".to_string());
            Error::mismatch(format!("{offered} rejected ({reason})"))
        })
}

/// Forward a DISCARD input unchanged: metadata copied, payload emptied.
pub fn forward_discard(input: &SampleBuffer, output: &mut SampleBuffer) -> ProcessStatus {
    output.set_meta_from(input);
    output.clear_payload();
    ProcessStatus::Ok
}

/// Flag `output` as failed for `input`.
pub fn fail_output(input: &SampleBuffer, output: &mut SampleBuffer, error: Error) -> ProcessStatus {
    output.set_meta_from(input);
    output.clear_payload();
    output.fail(error);
    ProcessStatus::Failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use spool_core::keys::{DEPTH, WIDTH};
    use spool_core::{BufferFlags, CodecError};

    #[test]
    fn test_negotiate_first_match_refines() {
        let supported = vec![
            FormatDescriptor::new().with(DEPTH, 8u32),
            FormatDescriptor::new().with(DEPTH, 24u32).with(WIDTH, 64u32),
        ];
        let offered = FormatDescriptor::new().with(DEPTH, 24u32).wildcard(WIDTH);
        let refined = negotiate(&offered, &supported).unwrap();
        assert_eq!(refined.get(WIDTH), Some(64));
    }

    #[test]
    fn test_negotiate_rejects() {
        let supported = vec![FormatDescriptor::new().with(DEPTH, 8u32)];
        let offered = FormatDescriptor::new().with(DEPTH, 16u32);
        let err = negotiate(&offered, &supported).unwrap_err();
        assert!(err.is_negotiation());
    }

    #[test]
    fn test_fail_output_marks_discard() {
        let mut input = SampleBuffer::from_payload(b"abc");
        input.sequence = 3;
        let mut output = SampleBuffer::new();
        let status = fail_output(&input, &mut output, CodecError::NotConfigured.into());
        assert_eq!(status, ProcessStatus::Failed);
        assert!(output.has(BufferFlags::DISCARD));
        assert_eq!(output.sequence, 3);
        assert!(output.error().is_some());
    }

    #[test]
    fn test_status_helpers() {
        assert!(ProcessStatus::InputNotConsumed.output_filled());
        assert!(ProcessStatus::InputNotConsumed.input_pending());
        assert!(!ProcessStatus::OutputNotFilled.output_filled());
    }
}
