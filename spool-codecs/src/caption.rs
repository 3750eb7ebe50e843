//! Caption cue splitting.
//!
//! Caption tracks often store many cues per sample. [`CueSplitterCodec`]
//! turns each SRT-style block
//!
//! ```text
//! 12
//! 00:01:02,500 --> 00:01:04,000
//! Some text
//! ```
//!
//! into one output buffer timed by the cue, returning
//! [`ProcessStatus::InputNotConsumed`] until the input is exhausted. A
//! malformed cue becomes a DISCARD output carrying the error; the remaining
//! cues of the same input are still emitted.

use crate::traits::{fail_output, forward_discard, negotiate, Codec, ProcessStatus};
use spool_core::keys::{DATA_CLASS, ENCODING};
use spool_core::{
    encoding, BufferFlags, CodecError, Error, FormatDescriptor, MediaType, Rational, Result,
    SampleBuffer,
};
use tracing::warn;

fn text_pattern(encoding: &str) -> FormatDescriptor {
    FormatDescriptor::of(MediaType::Text)
        .with(ENCODING, encoding)
        .with(DATA_CLASS, "text")
}

/// One parsed cue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    /// Display start.
    pub start: Rational,
    /// Display end.
    pub end: Rational,
    /// Text lines joined by `\n`.
    pub text: String,
}

/// Parse a `HH:MM:SS,mmm` (or `.mmm`) clock value.
pub fn parse_clock(s: &str) -> Option<Rational> {
    let mut parts = s.trim().split(':');
    let (h, m, rest) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let (sec, millis) = rest.split_once([',', '.']).unwrap_or((rest, "0"));
    let hours: i64 = h.parse().ok()?;
    let minutes: i64 = m.parse().ok()?;
    let seconds: i64 = sec.parse().ok()?;
    let millis: i64 = millis.parse().ok()?;
    if minutes >= 60 || seconds >= 60 || millis >= 1000 {
        return None;
    }
    Some(Rational::new(
        ((hours * 60 + minutes) * 60 + seconds) * 1000 + millis,
        1000,
    ))
}

/// Parse one cue block: optional index line, timing line, text lines.
pub fn parse_cue(block: &str) -> std::result::Result<Cue, CodecError> {
    let corrupt = |message: String| CodecError::Corrupt { offset: 0, message };
    let mut lines = block.lines().map(str::trim_end);
    let mut timing = lines.next().ok_or_else(|| corrupt("empty cue".into()))?;
    if !timing.contains("-->") {
        timing = lines
            .next()
            .ok_or_else(|| corrupt("cue has no timing line".into()))?;
    }
    let (start, end) = timing
        .split_once("-->")
        .ok_or_else(|| corrupt(format!("invalid timing line: {timing}")))?;
    // Position hints may follow the end time.
    let end = end.split_whitespace().next().unwrap_or("");
    let start = parse_clock(start).ok_or_else(|| corrupt(format!("invalid start: {start}")))?;
    let end = parse_clock(end).ok_or_else(|| corrupt(format!("invalid end: {end}")))?;
    if end < start {
        return Err(corrupt(format!("cue ends before it starts: {timing}")));
    }
    Ok(Cue {
        start,
        end,
        text: lines.collect::<Vec<_>>().join("\n"),
    })
}

/// Length of the leading blank lines of `text`.
fn blank_prefix(text: &str) -> usize {
    text.split_inclusive('\n')
        .take_while(|line| line.trim().is_empty())
        .map(str::len)
        .sum()
}

/// Length of the first block of non-blank lines of `text`.
fn block_len(text: &str) -> usize {
    text.split_inclusive('\n')
        .take_while(|line| !line.trim().is_empty())
        .map(str::len)
        .sum()
}

/// Splits text buffers of SRT-style cues into one buffer per cue.
#[derive(Debug, Default)]
pub struct CueSplitterCodec {
    input: Option<FormatDescriptor>,
    output: Option<FormatDescriptor>,
    next_sequence: u64,
}

impl CueSplitterCodec {
    /// Create a new cue splitter.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Codec for CueSplitterCodec {
    fn name(&self) -> &str {
        "cue-splitter"
    }

    fn input_formats(&self) -> Vec<FormatDescriptor> {
        vec![text_pattern(encoding::SRT)]
    }

    fn output_formats(&self, _input: Option<&FormatDescriptor>) -> Vec<FormatDescriptor> {
        vec![text_pattern(encoding::CUE)]
    }

    fn set_input_format(&mut self, format: &FormatDescriptor) -> Result<FormatDescriptor> {
        let refined = negotiate(format, &self.input_formats())?;
        self.input = Some(refined.clone());
        Ok(refined)
    }

    fn set_output_format(&mut self, format: &FormatDescriptor) -> Result<FormatDescriptor> {
        if self.input.is_none() {
            return Err(Error::invalid_param("input format must be set first"));
        }
        let refined = negotiate(format, &self.output_formats(self.input.as_ref()))?;
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
        let Some(out_format) = self.output.clone() else {
            return fail_output(input, output, CodecError::NotConfigured.into());
        };
        let text = match std::str::from_utf8(input.payload()) {
            Ok(text) => text,
            Err(e) => {
                let err = CodecError::Corrupt {
                    offset: e.valid_up_to(),
                    message: "caption text is not UTF-8".into(),
                };
                let len = input.len();
                let status = fail_output(input, output, err.into());
                input.advance(len);
                return status;
            }
        };

        let skip = blank_prefix(text);
        if skip == text.len() {
            input.advance(skip);
            if input.is_end_of_media() {
                forward_discard(input, output);
                output.discard();
                return ProcessStatus::Ok;
            }
            return ProcessStatus::OutputNotFilled;
        }
        let len = block_len(&text[skip..]);
        let parsed = parse_cue(&text[skip..skip + len]);

        input.advance(skip + len);
        let more = blank_prefix(std::str::from_utf8(input.payload()).unwrap_or("")) < input.len();
        if !more {
            let rest = input.len();
            input.advance(rest);
        }

        output.set_meta_from(input);
        output.format = out_format;
        output.sequence = self.next_sequence;
        self.next_sequence += 1;
        let mut flags = BufferFlags::KEYFRAME;
        if !more && input.is_end_of_media() {
            flags |= BufferFlags::END_OF_MEDIA;
        }
        output.flags = flags;

        match parsed {
            Ok(cue) => {
                output.timestamp = cue.start;
                output.duration = cue.end - cue.start;
                output.set_payload(cue.text.as_bytes());
            }
            Err(err) => {
                warn!(sequence = output.sequence, error = %err, "Dropping malformed cue");
                output.clear_payload();
                output.fail(err.into());
            }
        }

        if more {
            ProcessStatus::InputNotConsumed
        } else {
            ProcessStatus::Ok
        }
    }

    fn reset(&mut self) {
        self.next_sequence = 0;
    }
}
