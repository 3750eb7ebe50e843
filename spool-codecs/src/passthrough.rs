//! Codec that copies input to output unchanged.

use crate::traits::{forward_discard, negotiate, Codec, ProcessStatus};
use spool_core::{FormatDescriptor, Result, SampleBuffer};

/// Copies every buffer through; output format equals input format.
#[derive(Debug, Default)]
pub struct PassThroughCodec {
    input: Option<FormatDescriptor>,
    output: Option<FormatDescriptor>,
}

impl PassThroughCodec {
    /// Create a new pass-through codec.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Codec for PassThroughCodec {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn input_formats(&self) -> Vec<FormatDescriptor> {
        vec![FormatDescriptor::new()]
    }

    fn output_formats(&self, input: Option<&FormatDescriptor>) -> Vec<FormatDescriptor> {
        vec![input.cloned().unwrap_or_default()]
    }

    fn set_input_format(&mut self, format: &FormatDescriptor) -> Result<FormatDescriptor> {
        self.input = Some(format.clone());
        Ok(format.clone())
    }

    fn set_output_format(&mut self, format: &FormatDescriptor) -> Result<FormatDescriptor> {
        let candidates = self.output_formats(self.input.as_ref());
        let refined = negotiate(format, &candidates)?;
        self.output = Some(refined.clone());
        Ok(refined)
    }

    fn input_format(&self) -> Option<&FormatDescriptor> {
        self.input.as_ref()
    }

    fn output_format(&self) -> Option<&FormatDescriptor> {
        self.output.as_ref()
    }

    fn process(&mut self, input: &mut SampleBuffer, output: &mut SampleBuffer) -> ProcessStatus {
        if input.is_discard() {
            return forward_discard(input, output);
        }
        output.copy_from(input);
        ProcessStatus::Ok
    }
}
