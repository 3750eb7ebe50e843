//! Screen-capture delta codec.
//!
//! Screen recordings change little between frames, so the encoder keeps the
//! previous frame and only codes pixels that changed. Every payload is a
//! sequence of tagged messages:
//!
//! | tag | body |
//! |-----|------|
//! | `P` | first index (u8), count (u16 LE), `count` RGB triples |
//! | `F` | run-length coded frame, always last |
//!
//! Frames are coded top-down, row by row, with a cursor starting at the
//! top-left pixel. A pixel is 1, 2 or 3 bytes for depths 8, 16 and 24.
//!
//! | bytes | meaning |
//! |-------|---------|
//! | `00 00` | end of line: cursor to start of next row |
//! | `00 01` | end of frame |
//! | `00 02 dx dy` | skip: cursor moves right `dx`, down `dy`; pixels keep previous values |
//! | `00 n` (n >= 3) | `n` literal pixels follow |
//! | `n v` (n >= 1) | `n` copies of pixel `v` |
//!
//! Keyframes never skip and therefore decode without a reference.

use crate::traits::{fail_output, forward_discard, negotiate, Codec, ProcessStatus};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use spool_core::keys::{DEPTH, ENCODING, FRAME_RATE, HEIGHT, KEY_FRAME_INTERVAL, PALETTE, WIDTH};
use spool_core::{
    encoding, BufferFlags, CodecError, Error, FormatDescriptor, MediaType, Result, SampleBuffer,
};
use tracing::{debug, trace};

const TAG_FRAME: u8 = b'F';
const TAG_PALETTE: u8 = b'P';

const ESCAPE: u8 = 0x00;
const OP_END_OF_LINE: u8 = 0x00;
const OP_END_OF_FRAME: u8 = 0x01;
const OP_SKIP: u8 = 0x02;
const MIN_LITERAL: usize = 3;
const MAX_COUNT: usize = 255;

const PALETTE_ENTRIES: usize = 256;
const OUTSIDE: &str = "pixels outside the frame";

/// Screen codec configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenCodecConfig {
    /// Force a keyframe every N frames (0 = only the first frame).
    pub key_frame_interval: u32,
    /// Minimum run of unchanged pixels coded as a skip.
    pub min_skip: usize,
}

impl Default for ScreenCodecConfig {
    fn default() -> Self {
        Self {
            key_frame_interval: 60,
            min_skip: 4,
        }
    }
}

/// Frame dimensions negotiated for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Geometry {
    width: usize,
    height: usize,
    bytes_per_pixel: usize,
}

impl Geometry {
    fn from_format(format: &FormatDescriptor) -> Result<Self> {
        format.require_keys(&[WIDTH.id(), HEIGHT.id(), DEPTH.id()])?;
        let depth = format.require(DEPTH)?;
        let bytes_per_pixel = match depth {
            8 | 16 | 24 => depth as usize / 8,
            other => return Err(Error::unsupported(format!("screen codec depth {other}"))),
        };
        Ok(Self {
            width: format.require(WIDTH)? as usize,
            height: format.require(HEIGHT)? as usize,
            bytes_per_pixel,
        })
    }

    fn row_bytes(&self) -> usize {
        self.width * self.bytes_per_pixel
    }

    fn frame_bytes(&self) -> usize {
        self.row_bytes() * self.height
    }
}

fn pattern(encoding: &str, depth: u32) -> FormatDescriptor {
    FormatDescriptor::of(MediaType::Video)
        .with(ENCODING, encoding)
        .with(DEPTH, depth)
}

fn patterns(encoding: &str) -> Vec<FormatDescriptor> {
    [8u32, 16, 24]
        .into_iter()
        .map(|d| pattern(encoding, d))
        .collect()
}

/// Output descriptor derived from a negotiated input.
fn derived(input: &FormatDescriptor, encoding: &str) -> FormatDescriptor {
    input
        .intersect_keys(&[
            WIDTH.id(),
            HEIGHT.id(),
            DEPTH.id(),
            FRAME_RATE.id(),
            PALETTE.id(),
        ])
        .append(&FormatDescriptor::of(MediaType::Video).with(ENCODING, encoding))
}

// =============================================================================
// Encoder
// =============================================================================

/// Encodes raw frames into keyframes and deltas.
#[derive(Debug, Default)]
pub struct ScreenDeltaEncoder {
    config: ScreenCodecConfig,
    input: Option<FormatDescriptor>,
    output: Option<FormatDescriptor>,
    geometry: Option<Geometry>,
    previous: Vec<u8>,
    has_previous: bool,
    frames_since_key: u32,
    sent_palette: Option<Bytes>,
}

impl ScreenDeltaEncoder {
    /// Create an encoder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an encoder with the given configuration.
    pub fn with_config(config: ScreenCodecConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    fn key_frame_interval(&self) -> u32 {
        self.output
            .as_ref()
            .and_then(|f| f.get(KEY_FRAME_INTERVAL))
            .unwrap_or(self.config.key_frame_interval)
    }
}

impl Codec for ScreenDeltaEncoder {
    fn name(&self) -> &str {
        "screen-encoder"
    }

    fn input_formats(&self) -> Vec<FormatDescriptor> {
        patterns(encoding::RAW_VIDEO)
    }

    fn output_formats(&self, input: Option<&FormatDescriptor>) -> Vec<FormatDescriptor> {
        match input {
            Some(input) => vec![derived(input, encoding::SCREEN)],
            None => patterns(encoding::SCREEN),
        }
    }

    fn set_input_format(&mut self, format: &FormatDescriptor) -> Result<FormatDescriptor> {
        let refined = negotiate(format, &self.input_formats())?;
        self.geometry = Some(Geometry::from_format(&refined)?);
        self.input = Some(refined.clone());
        self.reset();
        Ok(refined)
    }

    fn set_output_format(&mut self, format: &FormatDescriptor) -> Result<FormatDescriptor> {
        let input = self
            .input
            .as_ref()
            .ok_or_else(|| Error::invalid_param("input format must be set first"))?;
        let refined = negotiate(format, &self.output_formats(Some(input)))?;
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
        let (Some(geometry), Some(out_format)) = (self.geometry, self.output.clone()) else {
            return fail_output(input, output, CodecError::NotConfigured.into());
        };
        let frame_bytes = geometry.frame_bytes();
        if input.len() < frame_bytes {
            let err = CodecError::Corrupt {
                offset: input.len(),
                message: format!("frame needs {frame_bytes} bytes"),
            };
            return fail_output(input, output, err.into());
        }

        let interval = self.key_frame_interval();
        let keyframe = !self.has_previous
            || input.is_keyframe()
            || (interval > 0 && self.frames_since_key >= interval);

        let palette = if geometry.bytes_per_pixel == 1 {
            input
                .format
                .get(PALETTE)
                .or_else(|| self.input.as_ref().and_then(|f| f.get(PALETTE)))
        } else {
            None
        };
        let send_palette = match &palette {
            Some(p) => keyframe || self.sent_palette.as_ref() != Some(p),
            None => false,
        };

        let frame = &input.payload()[..frame_bytes];
        let reference = (!keyframe).then_some(self.previous.as_slice());
        let min_skip = self.config.min_skip.max(1);

        output.set_meta_from(input);
        let changed = output.fill_with(|buf| {
            if let (true, Some(p)) = (send_palette, &palette) {
                write_palette(p, buf);
            }
            encode_frame(geometry, frame, reference, min_skip, buf)
        });
        output.format = match (&palette, send_palette) {
            (Some(p), true) => out_format.with(PALETTE, p.clone()),
            _ => out_format,
        };
        output.set_flag(BufferFlags::KEYFRAME, keyframe);
        output.set_flag(BufferFlags::SAME_DATA, !keyframe && !changed);

        self.previous.clear();
        self.previous.extend_from_slice(frame);
        self.has_previous = true;
        self.frames_since_key = if keyframe { 1 } else { self.frames_since_key + 1 };
        if send_palette {
            self.sent_palette = palette;
        }

        trace!(
            sequence = input.sequence,
            keyframe,
            bytes = output.len(),
            "Encoded screen frame"
        );
        ProcessStatus::Ok
    }

    fn reset(&mut self) {
        self.has_previous = false;
        self.frames_since_key = 0;
        self.sent_palette = None;
    }
}

fn write_palette(palette: &[u8], buf: &mut Vec<u8>) {
    let count = (palette.len() / 3).min(PALETTE_ENTRIES);
    buf.push(TAG_PALETTE);
    buf.push(0);
    buf.extend_from_slice(&(count as u16).to_le_bytes());
    buf.extend_from_slice(&palette[..count * 3]);
}

/// Code one frame, returning whether any pixel differs from `reference`.
fn encode_frame(
    geometry: Geometry,
    frame: &[u8],
    reference: Option<&[u8]>,
    min_skip: usize,
    buf: &mut Vec<u8>,
) -> bool {
    let row_bytes = geometry.row_bytes();
    let mut cursor_y = 0;
    let mut changed = false;

    buf.push(TAG_FRAME);
    for y in 0..geometry.height {
        let span = y * row_bytes..(y + 1) * row_bytes;
        let row = &frame[span.clone()];
        let prev = reference.map(|r| &r[span]);
        if prev == Some(row) {
            continue;
        }
        changed = true;

        let mut rows_down = y - cursor_y;
        while rows_down > 0 {
            let dy = rows_down.min(MAX_COUNT);
            buf.extend_from_slice(&[ESCAPE, OP_SKIP, 0, dy as u8]);
            rows_down -= dy;
        }
        encode_row(geometry.bytes_per_pixel, row, prev, min_skip, buf);
        buf.extend_from_slice(&[ESCAPE, OP_END_OF_LINE]);
        cursor_y = y + 1;
    }
    buf.extend_from_slice(&[ESCAPE, OP_END_OF_FRAME]);
    changed
}

fn encode_row(bpp: usize, row: &[u8], prev: Option<&[u8]>, min_skip: usize, buf: &mut Vec<u8>) {
    let width = row.len() / bpp;
    let mut x = 0;

    while x < width {
        if let Some(prev) = prev {
            let same = count_unchanged(row, prev, x, bpp);
            if x + same == width {
                // End of line leaves the rest untouched.
                return;
            }
            if same >= min_skip {
                let mut left = same;
                while left > 0 {
                    let dx = left.min(MAX_COUNT);
                    buf.extend_from_slice(&[ESCAPE, OP_SKIP, dx as u8, 0]);
                    left -= dx;
                }
                x += same;
                continue;
            }
        }

        let run = count_run(row, x, bpp);
        if run >= MIN_LITERAL {
            let n = run.min(MAX_COUNT);
            buf.push(n as u8);
            buf.extend_from_slice(pixel(row, x, bpp));
            x += n;
            continue;
        }

        let start = x;
        let mut end = x;
        while end < width && end - start < MAX_COUNT {
            if end > start {
                if count_run(row, end, bpp) >= MIN_LITERAL {
                    break;
                }
                if prev.is_some_and(|p| count_unchanged(row, p, end, bpp) >= min_skip) {
                    break;
                }
            }
            end += 1;
        }

        let n = end - start;
        if n >= MIN_LITERAL {
            buf.extend_from_slice(&[ESCAPE, n as u8]);
            buf.extend_from_slice(&row[start * bpp..end * bpp]);
        } else {
            for i in start..end {
                buf.push(1);
                buf.extend_from_slice(pixel(row, i, bpp));
            }
        }
        x = end;
    }
}

fn pixel(row: &[u8], x: usize, bpp: usize) -> &[u8] {
    &row[x * bpp..(x + 1) * bpp]
}

fn count_run(row: &[u8], x: usize, bpp: usize) -> usize {
    let width = row.len() / bpp;
    let first = pixel(row, x, bpp);
    (x..width)
        .take_while(|&i| pixel(row, i, bpp) == first)
        .count()
}

fn count_unchanged(row: &[u8], prev: &[u8], x: usize, bpp: usize) -> usize {
    let width = row.len() / bpp;
    (x..width)
        .take_while(|&i| pixel(row, i, bpp) == pixel(prev, i, bpp))
        .count()
}

// =============================================================================
// Decoder
// =============================================================================

/// Decodes keyframes and deltas back into raw frames.
#[derive(Debug, Default)]
pub struct ScreenDeltaDecoder {
    input: Option<FormatDescriptor>,
    output: Option<FormatDescriptor>,
    geometry: Option<Geometry>,
    picture: Vec<u8>,
    has_picture: bool,
    last_sequence: Option<u64>,
    palette: Vec<u8>,
    palette_dirty: bool,
}

impl ScreenDeltaDecoder {
    /// Create a new decoder.
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_payload(
        &mut self,
        geometry: Geometry,
        data: &[u8],
    ) -> std::result::Result<(), CodecError> {
        let mut reader = ByteReader { data, pos: 0 };
        loop {
            match reader.u8()? {
                TAG_PALETTE => {
                    let first = reader.u8()? as usize;
                    let count = u16::from_le_bytes([reader.u8()?, reader.u8()?]) as usize;
                    if first + count > PALETTE_ENTRIES {
                        return Err(reader.corrupt("palette range exceeds 256 entries"));
                    }
                    let rgb = reader.take(count * 3)?;
                    if self.palette.len() < PALETTE_ENTRIES * 3 {
                        self.palette.resize(PALETTE_ENTRIES * 3, 0);
                    }
                    self.palette[first * 3..(first + count) * 3].copy_from_slice(rgb);
                    self.palette_dirty = true;
                }
                TAG_FRAME => return decode_frame(geometry, &mut reader, &mut self.picture),
                _ => return Err(reader.corrupt("unknown message tag")),
            }
        }
    }
}

impl Codec for ScreenDeltaDecoder {
    fn name(&self) -> &str {
        "screen-decoder"
    }

    fn input_formats(&self) -> Vec<FormatDescriptor> {
        patterns(encoding::SCREEN)
    }

    fn output_formats(&self, input: Option<&FormatDescriptor>) -> Vec<FormatDescriptor> {
        match input {
            Some(input) => vec![derived(input, encoding::RAW_VIDEO)],
            None => patterns(encoding::RAW_VIDEO),
        }
    }

    fn set_input_format(&mut self, format: &FormatDescriptor) -> Result<FormatDescriptor> {
        let refined = negotiate(format, &self.input_formats())?;
        self.geometry = Some(Geometry::from_format(&refined)?);
        self.input = Some(refined.clone());
        self.reset();
        Ok(refined)
    }

    fn set_output_format(&mut self, format: &FormatDescriptor) -> Result<FormatDescriptor> {
        let input = self
            .input
            .as_ref()
            .ok_or_else(|| Error::invalid_param("input format must be set first"))?;
        let refined = negotiate(format, &self.output_formats(Some(input)))?;
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
        let (Some(geometry), Some(out_format)) = (self.geometry, self.output.clone()) else {
            return fail_output(input, output, CodecError::NotConfigured.into());
        };

        let keyframe = input.is_keyframe();
        let contiguous = self
            .last_sequence
            .is_some_and(|last| input.sequence == last.wrapping_add(1));
        if !keyframe && !(self.has_picture && contiguous) {
            debug!(
                sequence = input.sequence,
                last = ?self.last_sequence,
                "Discarding delta without reference frame"
            );
            output.set_meta_from(input);
            output.clear_payload();
            output.discard();
            return ProcessStatus::Ok;
        }

        if self.picture.len() != geometry.frame_bytes() {
            self.picture = vec![0; geometry.frame_bytes()];
        }
        if let Err(err) = self.decode_payload(geometry, input.payload()) {
            self.has_picture = false;
            self.last_sequence = None;
            return fail_output(input, output, err.into());
        }
        self.has_picture = true;
        self.last_sequence = Some(input.sequence);

        output.set_meta_from(input);
        output.set_payload(&self.picture);
        output.format = if geometry.bytes_per_pixel == 1 && !self.palette.is_empty() {
            if self.palette_dirty {
                let palette = Bytes::copy_from_slice(&self.palette);
                self.output = Some(out_format.with(PALETTE, palette));
                self.palette_dirty = false;
            }
            self.output.clone().unwrap_or(out_format)
        } else {
            out_format
        };
        output.set_flag(BufferFlags::SAME_DATA, false);
        ProcessStatus::Ok
    }

    fn reset(&mut self) {
        self.has_picture = false;
        self.last_sequence = None;
    }
}

struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn u8(&mut self) -> std::result::Result<u8, CodecError> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| self.corrupt("truncated payload"))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> std::result::Result<&'a [u8], CodecError> {
        let end = self.pos + n;
        if end > self.data.len() {
            return Err(self.corrupt("truncated payload"));
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn corrupt(&self, message: &str) -> CodecError {
        CodecError::Corrupt {
            offset: self.pos,
            message: message.to_string(),
        }
    }
}

fn decode_frame(
    geometry: Geometry,
    reader: &mut ByteReader<'_>,
    picture: &mut [u8],
) -> std::result::Result<(), CodecError> {
    let bpp = geometry.bytes_per_pixel;
    let row_bytes = geometry.row_bytes();
    let (mut x, mut y) = (0usize, 0usize);

    let target = |x: usize, y: usize, n: usize| {
        (y < geometry.height && x + n <= geometry.width).then(|| {
            let start = y * row_bytes + x * bpp;
            start..start + n * bpp
        })
    };

    loop {
        let lead = reader.u8()?;
        if lead != ESCAPE {
            let n = lead as usize;
            let value = reader.take(bpp)?;
            let range = target(x, y, n).ok_or_else(|| reader.corrupt(OUTSIDE))?;
            for px in picture[range].chunks_exact_mut(bpp) {
                px.copy_from_slice(value);
            }
            x += n;
            continue;
        }
        match reader.u8()? {
            OP_END_OF_LINE => {
                x = 0;
                y += 1;
            }
            OP_END_OF_FRAME => return Ok(()),
            OP_SKIP => {
                x += reader.u8()? as usize;
                y += reader.u8()? as usize;
            }
            n => {
                let n = n as usize;
                let pixels = reader.take(n * bpp)?;
                let range = target(x, y, n).ok_or_else(|| reader.corrupt(OUTSIDE))?;
                picture[range].copy_from_slice(pixels);
                x += n;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spool_core::Rational;

    fn raw(width: u32, height: u32, depth: u32) -> FormatDescriptor {
        FormatDescriptor::of(MediaType::Video)
            .with(ENCODING, encoding::RAW_VIDEO)
            .with(WIDTH, width)
            .with(HEIGHT, height)
            .with(DEPTH, depth)
            .with(FRAME_RATE, Rational::from_int(10))
    }

    fn pair(format: &FormatDescriptor) -> (ScreenDeltaEncoder, ScreenDeltaDecoder) {
        let mut enc = ScreenDeltaEncoder::new();
        enc.set_input_format(format).unwrap();
        let coded = enc.set_output_format(&FormatDescriptor::new()).unwrap();
        let mut dec = ScreenDeltaDecoder::new();
        dec.set_input_format(&coded).unwrap();
        dec.set_output_format(&FormatDescriptor::new()).unwrap();
        (enc, dec)
    }

    fn frame_buffer(data: &[u8], sequence: u64) -> SampleBuffer {
        let mut buf = SampleBuffer::from_payload(data);
        buf.sequence = sequence;
        buf.timestamp = Rational::new(sequence as i64, 10);
        buf.duration = Rational::new(1, 10);
        buf
    }

    fn gradient(width: usize, height: usize, bpp: usize) -> Vec<u8> {
        (0..width * height * bpp).map(|i| (i / 7 % 251) as u8).collect()
    }

    fn roundtrip(depth: u32) {
        let (w, h) = (13usize, 5usize);
        let bpp = depth as usize / 8;
        let format = raw(w as u32, h as u32, depth);
        let (mut enc, mut dec) = pair(&format);

        let first = gradient(w, h, bpp);
        let mut second = first.clone();
        second[bpp * (w + 2)..bpp * (w + 6)].fill(0xAB);
        let third = second.clone();

        for (seq, frame) in [first, second, third].iter().enumerate() {
            let mut input = frame_buffer(frame, seq as u64);
            let mut coded = SampleBuffer::new();
            let mut decoded = SampleBuffer::new();
            assert_eq!(enc.process(&mut input, &mut coded), ProcessStatus::Ok);
            assert_eq!(coded.is_keyframe(), seq == 0);
            assert_eq!(dec.process(&mut coded, &mut decoded), ProcessStatus::Ok);
            assert_eq!(decoded.payload(), &frame[..], "frame {seq} at depth {depth}");
            assert_eq!(decoded.timestamp, input.timestamp);
        }
    }

    #[test]
    fn test_roundtrip_8bit() {
        roundtrip(8);
    }

    #[test]
    fn test_roundtrip_16bit() {
        roundtrip(16);
    }

    #[test]
    fn test_roundtrip_24bit() {
        roundtrip(24);
    }

    #[test]
    fn test_unchanged_frame_is_same_data() {
        let format = raw(8, 4, 24);
        let (mut enc, _) = pair(&format);
        let frame = gradient(8, 4, 3);
        let mut coded = SampleBuffer::new();
        enc.process(&mut frame_buffer(&frame, 0), &mut coded);
        enc.process(&mut frame_buffer(&frame, 1), &mut coded);
        assert!(coded.has(BufferFlags::SAME_DATA));
        assert_eq!(coded.payload(), &[TAG_FRAME, ESCAPE, OP_END_OF_FRAME]);
    }

    #[test]
    fn test_key_frame_interval() {
        let format = raw(4, 2, 8);
        let mut enc = ScreenDeltaEncoder::with_config(ScreenCodecConfig {
            key_frame_interval: 2,
            ..Default::default()
        });
        enc.set_input_format(&format).unwrap();
        enc.set_output_format(&FormatDescriptor::new()).unwrap();
        let frame = gradient(4, 2, 1);
        let keys: Vec<bool> = (0..5)
            .map(|seq| {
                let mut coded = SampleBuffer::new();
                enc.process(&mut frame_buffer(&frame, seq), &mut coded);
                coded.is_keyframe()
            })
            .collect();
        assert_eq!(keys, vec![true, false, true, false, true]);
    }

    #[test]
    fn test_keyframe_flag_on_input_forces_keyframe() {
        let format = raw(4, 2, 8);
        let (mut enc, _) = pair(&format);
        let frame = gradient(4, 2, 1);
        let mut coded = SampleBuffer::new();
        enc.process(&mut frame_buffer(&frame, 0), &mut coded);
        let mut forced = frame_buffer(&frame, 1);
        forced.flags.insert(BufferFlags::KEYFRAME);
        enc.process(&mut forced, &mut coded);
        assert!(coded.is_keyframe());
    }

    #[test]
    fn test_gap_discards_deltas_until_keyframe() {
        let format = raw(6, 3, 16);
        let (mut enc, mut dec) = pair(&format);
        let mut frames = Vec::new();
        for seq in 0..4u64 {
            let mut data = gradient(6, 3, 2);
            data[0] = seq as u8;
            let mut coded = SampleBuffer::new();
            let mut input = frame_buffer(&data, seq);
            if seq == 3 {
                input.flags.insert(BufferFlags::KEYFRAME);
            }
            enc.process(&mut input, &mut coded);
            frames.push((coded, data));
        }

        let mut out = SampleBuffer::new();
        assert_eq!(dec.process(&mut frames[0].0, &mut out), ProcessStatus::Ok);
        assert!(!out.is_discard());

        // Frame 1 is lost; frame 2 is a delta after a gap.
        assert_eq!(dec.process(&mut frames[2].0, &mut out), ProcessStatus::Ok);
        assert!(out.is_discard());
        assert_eq!(out.sequence, 2);

        assert_eq!(dec.process(&mut frames[3].0, &mut out), ProcessStatus::Ok);
        assert!(!out.is_discard());
        assert_eq!(out.payload(), &frames[3].1[..]);
    }

    #[test]
    fn test_palette_message() {
        let palette = Bytes::from((0..=255u8).flat_map(|i| [i, 255 - i, i / 2]).collect::<Vec<_>>());
        let format = raw(4, 4, 8).with(PALETTE, palette.clone());
        let (mut enc, mut dec) = pair(&format);
        let frame = gradient(4, 4, 1);
        let mut coded = SampleBuffer::new();
        enc.process(&mut frame_buffer(&frame, 0), &mut coded);
        assert_eq!(coded.payload()[0], TAG_PALETTE);

        let mut out = SampleBuffer::new();
        dec.process(&mut coded, &mut out);
        assert_eq!(out.format.get(PALETTE), Some(palette));
        assert_eq!(out.payload(), &frame[..]);
    }

    #[test]
    fn test_corrupt_payload_fails() {
        let format = raw(4, 2, 8);
        let (_, mut dec) = pair(&format);
        let mut coded = SampleBuffer::from_payload(&[TAG_FRAME, 200, 7]);
        coded.flags.insert(BufferFlags::KEYFRAME);
        let mut out = SampleBuffer::new();
        assert_eq!(dec.process(&mut coded, &mut out), ProcessStatus::Failed);
        assert!(out.is_discard());
        assert!(out.error().is_some_and(Error::is_recoverable));
    }

    #[test]
    fn test_short_frame_fails() {
        let format = raw(4, 2, 24);
        let (mut enc, _) = pair(&format);
        let mut out = SampleBuffer::new();
        let status = enc.process(&mut frame_buffer(&[1, 2, 3], 0), &mut out);
        assert_eq!(status, ProcessStatus::Failed);
    }

    #[test]
    fn test_rejects_unsupported_depth() {
        let mut enc = ScreenDeltaEncoder::new();
        assert!(enc.set_input_format(&raw(4, 4, 32)).is_err());
    }

    #[test]
    fn test_config_serde_defaults() {
        let config: ScreenCodecConfig = serde_json::from_str(r#"{"key_frame_interval": 5}"#).unwrap();
        assert_eq!(config.key_frame_interval, 5);
        assert_eq!(config.min_skip, 4);
    }
}
