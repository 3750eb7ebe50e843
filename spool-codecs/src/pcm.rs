//! Linear PCM sample format conversion.
//!
//! Converts interleaved PCM between 8 and 16 bits, signed and unsigned
//! representations and both byte orders. Eight-bit PCM defaults to unsigned
//! and 16-bit PCM to signed little-endian when the descriptor leaves it open.

use crate::traits::{fail_output, forward_discard, negotiate, Codec, ProcessStatus};
use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use spool_core::keys::{
    BYTE_ORDER, CHANNELS, ENCODING, FRAME_SIZE, SAMPLE_RATE, SAMPLE_SIZE_BITS, SIGNED,
};
use spool_core::{
    encoding, ByteOrder, CodecError, Error, FormatDescriptor, MediaType, Result, SampleBuffer,
};

/// Layout of one PCM sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmLayout {
    /// Bits per sample, 8 or 16.
    pub bits: u32,
    /// Signed or offset-binary.
    pub signed: bool,
    /// Byte order of 16-bit samples.
    pub order: ByteOrder,
    /// Interleaved channels.
    pub channels: u32,
}

impl PcmLayout {
    /// Read the layout from a descriptor, applying PCM defaults.
    pub fn from_format(format: &FormatDescriptor) -> Result<Self> {
        let bits = format.require(SAMPLE_SIZE_BITS)?;
        if bits != 8 && bits != 16 {
            return Err(Error::unsupported(format!("{bits}-bit PCM")));
        }
        let channels = format.get_or(CHANNELS, 1);
        if channels == 0 {
            return Err(Error::unsupported("PCM without channels"));
        }
        Ok(Self {
            bits,
            signed: format.get_or(SIGNED, bits > 8),
            order: format.get_or(BYTE_ORDER, ByteOrder::Little),
            channels,
        })
    }

    /// Bytes per sample.
    pub fn sample_bytes(&self) -> usize {
        self.bits as usize / 8
    }

    /// Bytes per sample frame (all channels).
    pub fn frame_bytes(&self) -> usize {
        self.sample_bytes() * self.channels as usize
    }

    /// Descriptor keys for this layout.
    pub fn describe(&self) -> FormatDescriptor {
        FormatDescriptor::of(MediaType::Audio)
            .with(ENCODING, encoding::PCM)
            .with(SAMPLE_SIZE_BITS, self.bits)
            .with(SIGNED, self.signed)
            .with(BYTE_ORDER, self.order)
            .with(CHANNELS, self.channels)
            .with(FRAME_SIZE, self.frame_bytes() as u32)
    }

    /// Read sample `i` as a signed 16-bit value.
    fn read(&self, data: &[u8], i: usize) -> i16 {
        match (self.bits, self.signed) {
            (8, true) => (data[i] as i8 as i16) << 8,
            (8, false) => ((data[i] as i16) - 128) << 8,
            (_, signed) => {
                let bytes = &data[i * 2..i * 2 + 2];
                let raw = match self.order {
                    ByteOrder::Little => LittleEndian::read_u16(bytes),
                    ByteOrder::Big => BigEndian::read_u16(bytes),
                };
                if signed {
                    raw as i16
                } else {
                    (raw ^ 0x8000) as i16
                }
            }
        }
    }

    /// Write a signed 16-bit value as sample `i`.
    fn write(&self, data: &mut [u8], i: usize, value: i16) {
        match (self.bits, self.signed) {
            (8, true) => data[i] = (value >> 8) as i8 as u8,
            (8, false) => data[i] = ((value >> 8) + 128) as u8,
            (_, signed) => {
                let raw = if signed {
                    value as u16
                } else {
                    (value as u16) ^ 0x8000
                };
                let bytes = &mut data[i * 2..i * 2 + 2];
                match self.order {
                    ByteOrder::Little => LittleEndian::write_u16(bytes, raw),
                    ByteOrder::Big => BigEndian::write_u16(bytes, raw),
                }
            }
        }
    }
}

fn pcm_pattern(bits: u32) -> FormatDescriptor {
    FormatDescriptor::of(MediaType::Audio)
        .with(ENCODING, encoding::PCM)
        .with(SAMPLE_SIZE_BITS, bits)
}

/// Converts PCM between sample layouts; sample rate and channels are kept.
#[derive(Debug, Default)]
pub struct PcmCodec {
    input: Option<FormatDescriptor>,
    output: Option<FormatDescriptor>,
    layouts: Option<(PcmLayout, PcmLayout)>,
}

impl PcmCodec {
    /// Create a new PCM converter.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Codec for PcmCodec {
    fn name(&self) -> &str {
        "pcm"
    }

    fn input_formats(&self) -> Vec<FormatDescriptor> {
        vec![pcm_pattern(8), pcm_pattern(16)]
    }

    fn output_formats(&self, input: Option<&FormatDescriptor>) -> Vec<FormatDescriptor> {
        let common = input
            .map(|f| f.intersect_keys(&[SAMPLE_RATE.id(), CHANNELS.id()]))
            .unwrap_or_default();
        let mut formats = Vec::new();
        for bits in [16u32, 8] {
            for signed in [true, false] {
                for order in [ByteOrder::Little, ByteOrder::Big] {
                    if bits == 8 && order == ByteOrder::Big {
                        continue;
                    }
                    formats.push(
                        common.append(
                            &pcm_pattern(bits)
                                .with(SIGNED, signed)
                                .with(BYTE_ORDER, order),
                        ),
                    );
                }
            }
        }
        formats
    }

    fn set_input_format(&mut self, format: &FormatDescriptor) -> Result<FormatDescriptor> {
        let refined = negotiate(format, &self.input_formats())?;
        let layout = PcmLayout::from_format(&refined)?;
        let refined = refined.append(&layout.describe());
        self.input = Some(refined.clone());
        self.output = None;
        self.layouts = None;
        Ok(refined)
    }

    fn set_output_format(&mut self, format: &FormatDescriptor) -> Result<FormatDescriptor> {
        let input = self
            .input
            .as_ref()
            .ok_or_else(|| Error::invalid_param("input format must be set first"))?;
        let in_layout = PcmLayout::from_format(input)?;
        let refined = negotiate(format, &self.output_formats(Some(input)))?;
        let mut out_layout = PcmLayout::from_format(&refined)?;
        out_layout.channels = in_layout.channels;
        let refined = refined.append(&out_layout.describe());
        self.layouts = Some((in_layout, out_layout));
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
        let (Some((from, to)), Some(out_format)) = (self.layouts, self.output.clone()) else {
            return fail_output(input, output, CodecError::NotConfigured.into());
        };
        if input.len() % from.frame_bytes() != 0 {
            let err = CodecError::Corrupt {
                offset: input.len(),
                message: format!("not a multiple of {} byte frames", from.frame_bytes()),
            };
            return fail_output(input, output, err.into());
        }

        let samples = input.len() / from.sample_bytes();
        output.set_meta_from(input);
        output.format = out_format;
        let src = input.payload();
        let dst = output.payload_mut(samples * to.sample_bytes());
        for i in 0..samples {
            to.write(dst, i, from.read(src, i));
        }
        ProcessStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(bits: u32) -> FormatDescriptor {
        pcm_pattern(bits)
            .with(SAMPLE_RATE, 8000u32)
            .with(CHANNELS, 2u32)
    }

    fn configured(from: FormatDescriptor, to: FormatDescriptor) -> PcmCodec {
        let mut codec = PcmCodec::new();
        codec.set_input_format(&from).unwrap();
        codec.set_output_format(&to).unwrap();
        codec
    }

    #[test]
    fn test_u8_to_s16le() {
        let mut codec = configured(audio(8), pcm_pattern(16));
        let mut input = SampleBuffer::from_payload(&[128, 255, 0, 129]);
        let mut output = SampleBuffer::new();
        assert_eq!(codec.process(&mut input, &mut output), ProcessStatus::Ok);
        let values: Vec<i16> = output
            .payload()
            .chunks(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(values, vec![0, 127 << 8, -128 << 8, 1 << 8]);
    }

    #[test]
    fn test_s16le_to_s16be() {
        let mut codec = configured(
            audio(16),
            pcm_pattern(16).with(BYTE_ORDER, ByteOrder::Big),
        );
        let mut input = SampleBuffer::from_payload(&[0x34, 0x12, 0xFF, 0x7F]);
        let mut output = SampleBuffer::new();
        codec.process(&mut input, &mut output);
        assert_eq!(output.payload(), &[0x12, 0x34, 0x7F, 0xFF]);
        assert_eq!(output.format.get(CHANNELS), Some(2));
        assert_eq!(output.format.get(FRAME_SIZE), Some(4));
    }

    #[test]
    fn test_s16_to_u8() {
        let mut codec = configured(audio(16), pcm_pattern(8).with(SIGNED, false));
        let mut input = SampleBuffer::from_payload(&[0x00, 0x80, 0xFF, 0x7F]);
        let mut output = SampleBuffer::new();
        codec.process(&mut input, &mut output);
        assert_eq!(output.payload(), &[0, 255]);
    }

    #[test]
    fn test_partial_frame_fails() {
        let mut codec = configured(audio(16), pcm_pattern(8));
        let mut input = SampleBuffer::from_payload(&[1, 2, 3]);
        let mut output = SampleBuffer::new();
        assert_eq!(codec.process(&mut input, &mut output), ProcessStatus::Failed);
        assert!(output.is_discard());
    }

    #[test]
    fn test_rejects_24bit() {
        let mut codec = PcmCodec::new();
        assert!(codec.set_input_format(&audio(24)).is_err());
    }

    #[test]
    fn test_rejects_zero_channels() {
        let format = audio(16).with(CHANNELS, 0u32);
        assert!(matches!(
            PcmLayout::from_format(&format),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(PcmCodec::new().set_input_format(&format).is_err());
    }
}
