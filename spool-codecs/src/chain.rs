//! Composition of codecs into a single codec.
//!
//! A [`CodecChain`] owns one intermediate buffer per stage boundary. Each
//! stage may split its input (`InputNotConsumed`) or accumulate it
//! (`OutputNotFilled`); the chain tracks which stages still hold unconsumed
//! input and always resumes at the deepest one, so every sub-unit reaches
//! the end of the chain exactly once and in order.
//!
//! A failing stage only loses the sub-unit it was given. When stages
//! upstream of it still hold input, the failed output is returned with
//! `InputNotConsumed` so the caller resubmits and the remainder flows on.

use crate::traits::{Codec, ProcessStatus};
use spool_core::{BufferFlags, CodecError, Error, FormatDescriptor, Result, SampleBuffer};
use tracing::{debug, trace};

/// An ordered list of codecs presented as one [`Codec`].
pub struct CodecChain {
    name: String,
    stages: Vec<Box<dyn Codec>>,
    buffers: Vec<SampleBuffer>,
    pending: Vec<bool>,
}

impl CodecChain {
    /// Create an unconfigured chain.
    ///
    /// Negotiation through [`Codec::set_input_format`] configures every
    /// boundary in order.
    pub fn new(stages: Vec<Box<dyn Codec>>) -> Result<Self> {
        if stages.is_empty() {
            return Err(Error::invalid_param("codec chain needs at least one stage"));
        }
        let name = stages
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join(" -> ");
        let boundaries = stages.len() - 1;
        Ok(Self {
            name,
            pending: vec![false; stages.len()],
            buffers: (0..boundaries).map(|_| SampleBuffer::new()).collect(),
            stages,
        })
    }

    /// Create a chain from codecs that are already configured.
    ///
    /// Fails unless each stage's output format matches the next stage's
    /// input format.
    pub fn from_configured(stages: Vec<Box<dyn Codec>>) -> Result<Self> {
        let chain = Self::new(stages)?;
        for pair in chain.stages.windows(2) {
            let (up, down) = (&pair[0], &pair[1]);
            match (up.output_format(), down.input_format()) {
                (Some(out), Some(inp)) if out.matches(inp) => {}
                (Some(out), Some(inp)) => {
                    return Err(Error::mismatch(format!(
                        "{} output {out} does not match {} input {inp}",
                        up.name(),
                        down.name()
                    )));
                }
                _ => {
                    return Err(Error::invalid_param(format!(
                        "{} -> {} is not configured",
                        up.name(),
                        down.name()
                    )));
                }
            }
        }
        Ok(chain)
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false; a chain has at least one stage.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stages in processing order.
    pub fn stages(&self) -> impl Iterator<Item = &dyn Codec> {
        self.stages.iter().map(|s| s.as_ref())
    }

    fn clear_pending(&mut self) {
        self.pending.iter_mut().for_each(|p| *p = false);
    }

    fn run_stage(
        &mut self,
        stage: usize,
        input: &mut SampleBuffer,
        output: &mut SampleBuffer,
    ) -> ProcessStatus {
        let last = self.stages.len() - 1;
        let codec = &mut self.stages[stage];
        match (stage, stage == last) {
            (0, true) => codec.process(input, output),
            (0, false) => codec.process(input, &mut self.buffers[0]),
            (_, true) => codec.process(&mut self.buffers[stage - 1], output),
            (_, false) => {
                let (up, down) = self.buffers.split_at_mut(stage);
                codec.process(&mut up[stage - 1], &mut down[0])
            }
        }
    }

    fn stage_input<'a>(&'a self, stage: usize, input: &'a SampleBuffer) -> &'a SampleBuffer {
        if stage == 0 {
            input
        } else {
            &self.buffers[stage - 1]
        }
    }
}

impl Codec for CodecChain {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_formats(&self) -> Vec<FormatDescriptor> {
        self.stages[0].input_formats()
    }

    fn output_formats(&self, input: Option<&FormatDescriptor>) -> Vec<FormatDescriptor> {
        if self.stages.len() == 1 {
            return self.stages[0].output_formats(input);
        }
        // Only the last stage's negotiated input determines what the chain emits.
        let last = &self.stages[self.stages.len() - 1];
        last.output_formats(last.input_format())
    }

    fn set_input_format(&mut self, format: &FormatDescriptor) -> Result<FormatDescriptor> {
        let refined = self.stages[0].set_input_format(format)?;
        let mut current = refined.clone();
        for i in 0..self.stages.len() - 1 {
            let candidates = self.stages[i].output_formats(Some(&current));
            let mut linked = None;
            for candidate in candidates {
                let Ok(out) = self.stages[i].set_output_format(&candidate) else {
                    continue;
                };
                if let Ok(next_in) = self.stages[i + 1].set_input_format(&out) {
                    if out.matches(&next_in) {
                        linked = Some(next_in);
                        break;
                    }
                }
            }
            current = linked.ok_or_else(|| {
                Error::mismatch(format!(
                    "no format links {} to {}",
                    self.stages[i].name(),
                    self.stages[i + 1].name()
                ))
            })?;
            debug!(chain = %self.name, stage = i, format = %current, "Linked codec stages");
        }
        Ok(refined)
    }

    fn set_output_format(&mut self, format: &FormatDescriptor) -> Result<FormatDescriptor> {
        let last = self.stages.len() - 1;
        self.stages[last].set_output_format(format)
    }

    fn input_format(&self) -> Option<&FormatDescriptor> {
        self.stages[0].input_format()
    }

    fn output_format(&self) -> Option<&FormatDescriptor> {
        self.stages[self.stages.len() - 1].output_format()
    }

    fn process(&mut self, input: &mut SampleBuffer, output: &mut SampleBuffer) -> ProcessStatus {
        let last = self.stages.len() - 1;
        if last == 0 {
            return self.stages[0].process(input, output);
        }

        // Resume at the deepest stage still holding input.
        let mut stage = (1..=last).rev().find(|&i| self.pending[i]).unwrap_or(0);

        loop {
            let status = self.run_stage(stage, input, output);
            trace!(chain = %self.name, stage, ?status, "Chain stage processed");

            match status {
                ProcessStatus::Failed => {
                    // Sub-units still held upstream are unaffected by this failure.
                    self.pending[stage..].iter_mut().for_each(|p| *p = false);
                    if stage < last {
                        output.set_meta_from(&self.buffers[stage]);
                        output.clear_payload();
                        output.discard();
                        if output.error().is_none() {
                            output.fail(Error::CodecProcess(CodecError::Other(format!(
                                "stage {} failed",
                                self.stages[stage].name()
                            ))));
                        }
                    }
                    if self.pending.iter().any(|p| *p) {
                        return ProcessStatus::InputNotConsumed;
                    }
                    return ProcessStatus::Failed;
                }
                ProcessStatus::OutputNotFilled => {
                    self.pending[stage] = false;
                    if let Some(upstream) = (0..stage).rev().find(|&i| self.pending[i]) {
                        stage = upstream;
                        continue;
                    }
                    let src = self.stage_input(stage, input);
                    if src.is_end_of_media() {
                        // The terminal signal must survive a swallowed input.
                        output.set_meta_from(src);
                        output.clear_payload();
                        output.flags = BufferFlags::DISCARD | BufferFlags::END_OF_MEDIA;
                        return ProcessStatus::Ok;
                    }
                    return ProcessStatus::OutputNotFilled;
                }
                ProcessStatus::Ok | ProcessStatus::InputNotConsumed => {
                    self.pending[stage] = status.input_pending();
                    if stage < last {
                        stage += 1;
                        continue;
                    }
                    return if self.pending.iter().any(|p| *p) {
                        ProcessStatus::InputNotConsumed
                    } else {
                        ProcessStatus::Ok
                    };
                }
            }
        }
    }

    fn reset(&mut self) {
        self.clear_pending();
        self.buffers.iter_mut().for_each(SampleBuffer::reset);
        self.stages.iter_mut().for_each(|s| s.reset());
    }
}

impl std::fmt::Debug for CodecChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecChain")
            .field("name", &self.name)
            .field("pending", &self.pending)
            .finish()
    }
}
