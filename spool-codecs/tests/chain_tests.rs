//! Codec chain integration tests.
//!
//! Drives chains of mock splitting and accumulating codecs to verify that
//! every byte reaches the end of the chain exactly once and in order.

use proptest::prelude::*;
use spool_codecs::*;
use spool_core::keys::{DEPTH, ENCODING, HEIGHT, WIDTH};
use spool_core::{
    encoding, BufferFlags, CodecError, Error, FormatDescriptor, MediaType, Rational, Result,
    SampleBuffer,
};

// =============================================================================
// Mock Implementations
// =============================================================================

/// Emits its input in chunks of at most `chunk` bytes.
struct MockSplitter {
    chunk: usize,
    format: Option<FormatDescriptor>,
}

/// Holds bytes until `size` are collected or the track ends.
struct MockAccumulator {
    size: usize,
    held: Vec<u8>,
    format: Option<FormatDescriptor>,
}

/// Fails any input whose first byte is `poison`.
struct MockPoisoned {
    poison: u8,
    format: Option<FormatDescriptor>,
}

macro_rules! mock_formats {
    () => {
        fn input_formats(&self) -> Vec<FormatDescriptor> {
            vec![FormatDescriptor::new()]
        }

        fn output_formats(&self, input: Option<&FormatDescriptor>) -> Vec<FormatDescriptor> {
            vec![input.cloned().unwrap_or_default()]
        }

        fn set_input_format(&mut self, format: &FormatDescriptor) -> Result<FormatDescriptor> {
            self.format = Some(format.clone());
            Ok(format.clone())
        }

        fn set_output_format(&mut self, format: &FormatDescriptor) -> Result<FormatDescriptor> {
            Ok(format.clone())
        }

        fn input_format(&self) -> Option<&FormatDescriptor> {
            self.format.as_ref()
        }

        fn output_format(&self) -> Option<&FormatDescriptor> {
            self.format.as_ref()
        }
    };
}

fn forward(input: &SampleBuffer, output: &mut SampleBuffer) -> ProcessStatus {
    output.set_meta_from(input);
    output.clear_payload();
    output.discard();
    ProcessStatus::Ok
}

impl Codec for MockSplitter {
    fn name(&self) -> &str {
        "splitter"
    }

    mock_formats!();

    fn process(&mut self, input: &mut SampleBuffer, output: &mut SampleBuffer) -> ProcessStatus {
        if input.is_discard() || (input.is_empty() && input.is_end_of_media()) {
            return forward(input, output);
        }
        if input.is_empty() {
            return ProcessStatus::OutputNotFilled;
        }
        let n = self.chunk.min(input.len());
        output.set_meta_from(input);
        output.set_payload(&input.payload()[..n]);
        input.advance(n);
        if input.is_empty() {
            ProcessStatus::Ok
        } else {
            output.flags.remove(BufferFlags::END_OF_MEDIA);
            ProcessStatus::InputNotConsumed
        }
    }
}

impl Codec for MockAccumulator {
    fn name(&self) -> &str {
        "accumulator"
    }

    mock_formats!();

    fn process(&mut self, input: &mut SampleBuffer, output: &mut SampleBuffer) -> ProcessStatus {
        if input.is_discard() {
            return forward(input, output);
        }
        self.held.extend_from_slice(input.payload());
        let flush = self.held.len() >= self.size || input.is_end_of_media();
        if !flush || self.held.is_empty() {
            return ProcessStatus::OutputNotFilled;
        }
        output.set_meta_from(input);
        output.set_payload(&self.held);
        self.held.clear();
        ProcessStatus::Ok
    }
}

impl Codec for MockPoisoned {
    fn name(&self) -> &str {
        "poisoned"
    }

    mock_formats!();

    fn process(&mut self, input: &mut SampleBuffer, output: &mut SampleBuffer) -> ProcessStatus {
        if input.is_discard() {
            return forward(input, output);
        }
        output.set_meta_from(input);
        if input.payload().first() == Some(&self.poison) {
            output.clear_payload();
            output.fail(Error::CodecProcess(CodecError::Other("poison".into())));
            return ProcessStatus::Failed;
        }
        output.set_payload(input.payload());
        ProcessStatus::Ok
    }
}

fn splitter(chunk: usize) -> Box<dyn Codec> {
    Box::new(MockSplitter {
        chunk,
        format: None,
    })
}

fn accumulator(size: usize) -> Box<dyn Codec> {
    Box::new(MockAccumulator {
        size,
        held: Vec::new(),
        format: None,
    })
}

fn poisoned(poison: u8) -> Box<dyn Codec> {
    Box::new(MockPoisoned {
        poison,
        format: None,
    })
}

/// Inputs carrying consecutive byte values; the last one ends the track.
fn inputs(sizes: &[usize]) -> (Vec<SampleBuffer>, Vec<u8>) {
    let mut next = 0u8;
    let mut all = Vec::new();
    let buffers = sizes
        .iter()
        .enumerate()
        .map(|(i, &size)| {
            let data: Vec<u8> = (0..size)
                .map(|_| {
                    next = next.wrapping_add(1);
                    next
                })
                .collect();
            all.extend_from_slice(&data);
            let mut buf = SampleBuffer::from_payload(&data);
            buf.sequence = i as u64;
            if i == sizes.len() - 1 {
                buf.flags.insert(BufferFlags::END_OF_MEDIA);
            }
            buf
        })
        .collect();
    (buffers, all)
}

/// Run every input through `codec` the way a track pump does.
fn drive(codec: &mut dyn Codec, inputs: Vec<SampleBuffer>) -> Vec<SampleBuffer> {
    let mut output = SampleBuffer::new();
    let mut collected = Vec::new();
    for mut input in inputs {
        loop {
            let status = codec.process(&mut input, &mut output);
            if status.output_filled() || status == ProcessStatus::Failed {
                collected.push(output.clone());
            }
            if status != ProcessStatus::InputNotConsumed {
                break;
            }
        }
    }
    collected
}

fn payload_bytes(outputs: &[SampleBuffer]) -> Vec<u8> {
    outputs
        .iter()
        .filter(|b| !b.is_discard())
        .flat_map(|b| b.payload().to_vec())
        .collect()
}

fn chain(stages: Vec<Box<dyn Codec>>) -> CodecChain {
    let mut chain = CodecChain::new(stages).unwrap();
    chain.set_input_format(&FormatDescriptor::new()).unwrap();
    chain.set_output_format(&FormatDescriptor::new()).unwrap();
    chain
}

// =============================================================================
// Interleaving
// =============================================================================

#[test]
fn test_split_then_accumulate() {
    let mut chain = chain(vec![splitter(2), accumulator(3)]);
    let (buffers, expected) = inputs(&[7, 7, 7, 7, 7]);
    let outputs = drive(&mut chain, buffers);
    assert_eq!(payload_bytes(&outputs), expected);
    assert!(outputs.last().is_some_and(SampleBuffer::is_end_of_media));
}

#[test]
fn test_accumulate_then_split() {
    let mut chain = chain(vec![accumulator(10), splitter(4)]);
    let (buffers, expected) = inputs(&[3, 3, 3, 3, 3, 3]);
    let outputs = drive(&mut chain, buffers);
    assert_eq!(payload_bytes(&outputs), expected);
    assert!(outputs.iter().all(|b| b.len() <= 4));
    assert!(outputs.last().is_some_and(SampleBuffer::is_end_of_media));
}

#[test]
fn test_three_stage_interleaving() {
    let mut chain = chain(vec![splitter(3), accumulator(5), splitter(2)]);
    let (buffers, expected) = inputs(&[11, 1, 6, 9]);
    let outputs = drive(&mut chain, buffers);
    assert_eq!(payload_bytes(&outputs), expected);
    assert_eq!(
        outputs.iter().filter(|b| b.is_end_of_media()).count(),
        1,
        "end of media must be signalled exactly once"
    );
}

#[test]
fn test_swallowed_end_of_media_survives() {
    let mut chain = chain(vec![accumulator(4), splitter(8)]);
    let mut buffers = vec![SampleBuffer::from_payload(b"abcd")];
    let mut last = SampleBuffer::new();
    last.flags.insert(BufferFlags::END_OF_MEDIA);
    last.sequence = 1;
    buffers.push(last);

    let outputs = drive(&mut chain, buffers);
    let final_buffer = outputs.last().unwrap();
    assert!(final_buffer.is_end_of_media());
    assert!(final_buffer.is_discard());
    assert_eq!(payload_bytes(&outputs), b"abcd");
}

#[test]
fn test_stage_failure_flags_output_and_continues() {
    let mut chain = chain(vec![splitter(1), poisoned(3)]);
    let (buffers, _) = inputs(&[2, 2, 2]);
    let outputs = drive(&mut chain, buffers);

    // Byte 3 fails; byte 4 shares its input but still comes through.
    assert_eq!(payload_bytes(&outputs), vec![1, 2, 4, 5, 6]);
    let failed: Vec<_> = outputs.iter().filter(|b| b.error().is_some()).collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].is_discard());
}

#[test]
fn test_middle_stage_failure_keeps_upstream_input() {
    let mut chain = chain(vec![splitter(1), poisoned(3), splitter(1)]);
    let (buffers, _) = inputs(&[2, 2, 2]);
    let outputs = drive(&mut chain, buffers);

    assert_eq!(payload_bytes(&outputs), vec![1, 2, 4, 5, 6]);
    let failed: Vec<_> = outputs.iter().filter(|b| b.error().is_some()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].sequence, 1);
    assert!(outputs.last().unwrap().is_end_of_media());
}

#[test]
fn test_failure_without_pending_input_reports_failed() {
    let mut chain = chain(vec![splitter(4), poisoned(1)]);
    let mut input = SampleBuffer::from_payload(&[1, 2]);
    let mut output = SampleBuffer::new();
    assert_eq!(chain.process(&mut input, &mut output), ProcessStatus::Failed);
    assert!(output.error().is_some());
}

#[test]
fn test_single_stage_chain_delegates() {
    let mut chain = chain(vec![splitter(2)]);
    let (buffers, expected) = inputs(&[5]);
    let outputs = drive(&mut chain, buffers);
    assert_eq!(outputs.len(), 3);
    assert_eq!(payload_bytes(&outputs), expected);
}

#[test]
fn test_empty_chain_rejected() {
    assert!(CodecChain::new(Vec::new()).is_err());
}

// =============================================================================
// Negotiation with real codecs
// =============================================================================

fn raw(depth: u32) -> FormatDescriptor {
    FormatDescriptor::of(MediaType::Video)
        .with(ENCODING, encoding::RAW_VIDEO)
        .with(WIDTH, 8u32)
        .with(HEIGHT, 4u32)
        .with(DEPTH, depth)
}

#[test]
fn test_chain_negotiates_encoder_decoder() {
    let mut chain = CodecChain::new(vec![
        Box::new(ScreenDeltaEncoder::new()),
        Box::new(ScreenDeltaDecoder::new()),
    ])
    .unwrap();
    chain.set_input_format(&raw(16)).unwrap();
    let out = chain.set_output_format(&FormatDescriptor::new()).unwrap();
    assert!(out.has_encoding(encoding::RAW_VIDEO));
    assert_eq!(out.get(DEPTH), Some(16));

    let frames: Vec<Vec<u8>> = (0..4u8)
        .map(|i| (0..64u8).map(|b| b.wrapping_mul(i + 1) / 3).collect())
        .collect();
    let buffers = frames
        .iter()
        .enumerate()
        .map(|(i, f)| {
            let mut b = SampleBuffer::from_payload(f);
            b.sequence = i as u64;
            b
        })
        .collect();
    let outputs = drive(&mut chain, buffers);
    let decoded: Vec<Vec<u8>> = outputs.iter().map(|b| b.payload().to_vec()).collect();
    assert_eq!(decoded, frames);
}

#[test]
fn test_from_configured_rejects_mismatch() {
    let mut encoder = ScreenDeltaEncoder::new();
    encoder.set_input_format(&raw(8)).unwrap();
    encoder.set_output_format(&FormatDescriptor::new()).unwrap();

    let mut decoder = ScreenDeltaDecoder::new();
    let coded24 = raw(24).with(ENCODING, encoding::SCREEN);
    decoder.set_input_format(&coded24).unwrap();
    decoder.set_output_format(&FormatDescriptor::new()).unwrap();

    let err = CodecChain::from_configured(vec![Box::new(encoder), Box::new(decoder)]).unwrap_err();
    assert!(err.is_negotiation());
}

// =============================================================================
// Property tests
// =============================================================================

proptest! {
    /// No byte is lost or duplicated for any chunking of a two-stage chain.
    #[test]
    fn chain_preserves_every_byte(
        sizes in prop::collection::vec(1usize..20, 1..8),
        chunk in 1usize..6,
        size in 1usize..12,
        split_first in any::<bool>(),
    ) {
        let stages = if split_first {
            vec![splitter(chunk), accumulator(size)]
        } else {
            vec![accumulator(size), splitter(chunk)]
        };
        let mut chain = chain(stages);
        let (buffers, expected) = inputs(&sizes);
        let outputs = drive(&mut chain, buffers);
        prop_assert_eq!(payload_bytes(&outputs), expected);
        prop_assert_eq!(outputs.iter().filter(|b| b.is_end_of_media()).count(), 1);
    }
}

fn passthrough_chain(stages: usize) -> CodecChain {
    chain(
        (0..stages)
            .map(|_| Box::new(PassThroughCodec::new()) as Box<dyn Codec>)
            .collect(),
    )
}

proptest! {
    /// A pass-through chain emits exactly one output per input, in order.
    #[test]
    fn passthrough_chain_keeps_sequence_and_timing(
        sizes in prop::collection::vec(0usize..16, 1..24),
        stages in 1usize..4,
        step in 1i64..50,
    ) {
        let mut chain = passthrough_chain(stages);
        let buffers: Vec<SampleBuffer> = sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| {
                let mut buf = SampleBuffer::from_payload(&vec![i as u8; size]);
                buf.sequence = 100 + i as u64;
                buf.timestamp = Rational::new(step * i as i64, 1000);
                buf.duration = Rational::new(step, 1000);
                buf
            })
            .collect();
        let expected: Vec<(u64, Rational)> =
            buffers.iter().map(|b| (b.sequence, b.timestamp)).collect();

        let outputs = drive(&mut chain, buffers);
        let seen: Vec<(u64, Rational)> =
            outputs.iter().map(|b| (b.sequence, b.timestamp)).collect();
        prop_assert_eq!(outputs.len(), sizes.len());
        prop_assert_eq!(seen, expected);
        prop_assert!(outputs.iter().all(|b| b.error().is_none()));
    }
}
