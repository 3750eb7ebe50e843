//! QuickTime movie writer.
//!
//! Samples are appended to a single `mdat` as they arrive; the `moov` atom
//! with all sample tables is built in memory and written at close.

use super::atoms::{atom, full_atom, put_matrix, put_pascal};
use crate::traits::{AddedTrack, ContainerWriter, WriteSeek};
use byteorder::{BigEndian, WriteBytesExt};
use bytes::{BufMut, Bytes};
use serde::{Deserialize, Serialize};
use spool_core::keys::{
    self, BYTE_ORDER, CHANNELS, DATA_CLASS, DEPTH, ENCODING, FILE_KIND, HEIGHT, MIME_TYPE,
    PALETTE, SAMPLE_RATE, SAMPLE_SIZE_BITS, SIGNED, WIDTH,
};
use spool_core::{
    encoding, ByteOrder, ContainerError, Error, FileKind, FormatDescriptor, MediaType, Rational,
    Result, SampleBuffer,
};
use std::io::{Seek, SeekFrom, Write};
use tracing::{debug, warn};

/// QuickTime writer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuickTimeWriterConfig {
    /// Time scale of the movie header and track headers
    pub movie_time_scale: u32,
    /// Media time scale of video tracks
    pub video_time_scale: u32,
    /// Media time scale of text tracks
    pub text_time_scale: u32,
}

impl Default for QuickTimeWriterConfig {
    fn default() -> Self {
        QuickTimeWriterConfig {
            movie_time_scale: 600,
            video_time_scale: 600,
            text_time_scale: 1000,
        }
    }
}

#[derive(Debug, Clone)]
enum TrackKind {
    Video {
        fourcc: [u8; 4],
        width: u32,
        height: u32,
        depth: u32,
        palette: Option<Bytes>,
    },
    Audio {
        fourcc: [u8; 4],
        channels: u32,
        bits: u32,
        block_align: u32,
    },
    Text {
        fourcc: [u8; 4],
    },
}

/// One stored sample of a video or text track. Size zero marks a gap.
#[derive(Debug, Clone, Copy)]
struct SampleRecord {
    offset: u64,
    size: u32,
    timestamp: Rational,
    keyframe: bool,
}

/// One stored audio chunk of `frames` sample frames.
#[derive(Debug, Clone, Copy)]
struct AudioChunk {
    offset: u64,
    frames: u32,
}

#[derive(Debug)]
struct TrackState {
    format: FormatDescriptor,
    kind: TrackKind,
    time_scale: u32,
    samples: Vec<SampleRecord>,
    audio_chunks: Vec<AudioChunk>,
    /// Latest end time written.
    end: Rational,
    written: Rational,
}

impl TrackState {
    fn new(format: FormatDescriptor, kind: TrackKind, time_scale: u32) -> Self {
        TrackState {
            format,
            kind,
            time_scale,
            samples: Vec::new(),
            audio_chunks: Vec::new(),
            end: Rational::zero(),
            written: Rational::zero(),
        }
    }

    /// Per-sample durations in media units.
    ///
    /// Boundaries are cumulative times rounded once each, so rounding error
    /// never exceeds one unit however many samples there are.
    fn sample_deltas(&self) -> Vec<u32> {
        let scale = self.time_scale;
        let mut boundaries: Vec<i64> = Vec::with_capacity(self.samples.len() + 1);
        for t in self
            .samples
            .iter()
            .map(|s| s.timestamp)
            .chain(std::iter::once(self.end))
        {
            let units = t.to_units(scale).max(boundaries.last().copied().unwrap_or(0));
            boundaries.push(units);
        }
        boundaries.windows(2).map(|w| (w[1] - w[0]) as u32).collect()
    }

    /// Track duration in media units.
    fn media_duration(&self) -> u64 {
        match self.kind {
            TrackKind::Audio { .. } => self.audio_chunks.iter().map(|c| c.frames as u64).sum(),
            _ => self.sample_deltas().iter().map(|&d| d as u64).sum(),
        }
    }

    fn handler(&self) -> (&'static [u8; 4], &'static str) {
        match self.kind {
            TrackKind::Video { .. } => (b"vide", "Video Media Handler"),
            TrackKind::Audio { .. } => (b"soun", "Sound Media Handler"),
            TrackKind::Text { .. } => (b"text", "Text Media Handler"),
        }
    }
}

/// QuickTime container writer
pub struct QuickTimeWriter {
    sink: Option<Box<dyn WriteSeek>>,
    config: QuickTimeWriterConfig,
    file_format: FormatDescriptor,
    tracks: Vec<TrackState>,
    /// Position of the `wide` placeholder preceding `mdat`.
    wide_offset: Option<u64>,
    closed: bool,
}

impl QuickTimeWriter {
    /// Create a writer with default configuration.
    pub fn new(sink: Box<dyn WriteSeek>) -> Self {
        Self::with_config(sink, QuickTimeWriterConfig::default())
    }

    /// Create a writer with custom configuration.
    pub fn with_config(sink: Box<dyn WriteSeek>, config: QuickTimeWriterConfig) -> Self {
        QuickTimeWriter {
            sink: Some(sink),
            config,
            file_format: FormatDescriptor::of(MediaType::File)
                .with(FILE_KIND, FileKind::QuickTime)
                .with(MIME_TYPE, FileKind::QuickTime.mime_type()),
            tracks: Vec::new(),
            wide_offset: None,
            closed: false,
        }
    }

    fn sink(&mut self) -> Result<&mut Box<dyn WriteSeek>> {
        self.sink.as_mut().ok_or_else(|| ContainerError::Closed.into())
    }

    /// Write `ftyp`, a `wide` placeholder and the `mdat` header.
    fn begin(&mut self) -> Result<()> {
        if self.wide_offset.is_some() {
            return Ok(());
        }
        let mut head = Vec::with_capacity(36);
        atom(&mut head, b"ftyp", |buf| {
            buf.put_slice(b"qt  ");
            buf.put_u32(0x0200);
            buf.put_slice(b"qt  ");
        });
        let sink = self.sink()?;
        let start = sink.stream_position()?;
        sink.write_all(&head)?;
        sink.write_all(&[0, 0, 0, 8])?;
        sink.write_all(b"wide")?;
        sink.write_all(&[0, 0, 0, 0])?;
        sink.write_all(b"mdat")?;
        self.wide_offset = Some(start + head.len() as u64);
        Ok(())
    }

    fn video_track(&self, format: &FormatDescriptor) -> Result<TrackState> {
        format.require_flagged(keys::VIDEO)?;
        let width = format.require(WIDTH)?;
        let height = format.require(HEIGHT)?;
        if width > u16::MAX as u32 || height > u16::MAX as u32 {
            return Err(Error::invalid_param(format!("{width}x{height} video")));
        }
        let depth = format.require(DEPTH)?;
        let palette = if depth == 8 { format.get(PALETTE) } else { None };
        let kind = TrackKind::Video {
            fourcc: fourcc(format)?,
            width,
            height,
            depth,
            palette,
        };
        Ok(TrackState::new(format.clone(), kind, self.config.video_time_scale))
    }

    fn audio_track(&self, format: &FormatDescriptor) -> Result<TrackState> {
        if !format.has_encoding(encoding::PCM) {
            return Err(Error::mismatch(format!(
                "QuickTime stores PCM audio only, got {format}"
            )));
        }
        let bits = format.require(SAMPLE_SIZE_BITS)?;
        if bits != 8 && bits != 16 {
            return Err(Error::mismatch(format!("{bits}-bit PCM")));
        }
        // 'raw ' is unsigned 8-bit; 'twos' and 'sowt' are signed 16-bit.
        let base = if bits == 8 {
            format.without(BYTE_ORDER)
        } else {
            format.clone()
        };
        let pattern = FormatDescriptor::of(MediaType::Audio).with(SIGNED, bits > 8);
        if let Some(conflict) = base.mismatch(&pattern) {
            return Err(Error::mismatch(format!("QuickTime PCM layout: {conflict}")));
        }
        let pattern = if bits == 8 {
            pattern
        } else {
            pattern.with(BYTE_ORDER, ByteOrder::Big)
        };
        let format = base.refine(&pattern);
        format.require_flagged(keys::AUDIO)?;

        let rate = format.require(SAMPLE_RATE)?;
        let channels = format.require(CHANNELS)?;
        if rate == 0 || rate > u16::MAX as u32 || channels == 0 || channels > u16::MAX as u32 {
            return Err(Error::invalid_param(format!(
                "{channels} channels at {rate} Hz"
            )));
        }
        let fourcc = match (bits, format.get(BYTE_ORDER)) {
            (8, _) => *b"raw ",
            (_, Some(ByteOrder::Little)) => *b"sowt",
            _ => *b"twos",
        };
        let kind = TrackKind::Audio {
            fourcc,
            channels,
            bits,
            block_align: channels * bits / 8,
        };
        Ok(TrackState::new(format, kind, rate))
    }

    fn text_track(&self, format: &FormatDescriptor) -> Result<TrackState> {
        let format = format.refine(&FormatDescriptor::of(MediaType::Text).with(DATA_CLASS, "text"));
        format.require_flagged(keys::TEXT)?;
        let kind = TrackKind::Text {
            fourcc: fourcc(&format)?,
        };
        Ok(TrackState::new(format, kind, self.config.text_time_scale))
    }

    fn finalize(&mut self) -> Result<()> {
        self.begin()?;
        let wide_offset = self.wide_offset.unwrap_or_default();
        let sink = self.sink.as_mut().ok_or(ContainerError::Closed)?;

        let mdat_end = sink.stream_position()?;
        let mdat_size = mdat_end - (wide_offset + 8);
        match u32::try_from(mdat_size) {
            Ok(size) => {
                sink.seek(SeekFrom::Start(wide_offset + 8))?;
                sink.write_u32::<BigEndian>(size)?;
            }
            Err(_) => {
                // Grow the header over the `wide` placeholder.
                sink.seek(SeekFrom::Start(wide_offset))?;
                sink.write_u32::<BigEndian>(1)?;
                sink.write_all(b"mdat")?;
                sink.write_u64::<BigEndian>(mdat_size + 8)?;
            }
        }
        sink.seek(SeekFrom::Start(mdat_end))?;

        let moov = build_moov(&self.tracks, &self.config);
        sink.write_all(&moov)?;
        sink.flush()?;

        debug!(
            tracks = self.tracks.len(),
            mdat_size,
            moov_size = moov.len(),
            "QuickTime movie finalized"
        );
        Ok(())
    }
}

fn fourcc(format: &FormatDescriptor) -> Result<[u8; 4]> {
    let name = format.require(ENCODING)?;
    <[u8; 4]>::try_from(name.as_bytes())
        .map_err(|_| Error::unsupported(format!("encoding {name:?} is not a FourCC")))
}

fn to_movie_units(track: &TrackState, movie_scale: u32) -> u64 {
    Rational::from_units(track.media_duration() as i64, track.time_scale).to_units(movie_scale) as u64
}

fn build_moov(tracks: &[TrackState], config: &QuickTimeWriterConfig) -> Vec<u8> {
    let movie_scale = config.movie_time_scale;
    let duration = tracks
        .iter()
        .map(|t| to_movie_units(t, movie_scale))
        .max()
        .unwrap_or(0);

    let mut moov = Vec::new();
    atom(&mut moov, b"moov", |buf| {
        full_atom(buf, b"mvhd", 0, 0, |buf| {
            buf.put_u32(0); // creation time
            buf.put_u32(0); // modification time
            buf.put_u32(movie_scale);
            buf.put_u32(duration as u32);
            buf.put_u32(0x0001_0000); // preferred rate
            buf.put_u16(0x0100); // preferred volume
            buf.put_bytes(0, 10);
            put_matrix(buf);
            buf.put_bytes(0, 24); // preview, poster, selection, current time
            buf.put_u32(tracks.len() as u32 + 1);
        });
        for (i, track) in tracks.iter().enumerate() {
            build_trak(buf, track, i as u32 + 1, movie_scale);
        }
    });
    moov
}

fn build_trak(buf: &mut Vec<u8>, track: &TrackState, track_id: u32, movie_scale: u32) {
    let (width, height) = match track.kind {
        TrackKind::Video { width, height, .. } => (width, height),
        _ => (0, 0),
    };
    atom(buf, b"trak", |buf| {
        full_atom(buf, b"tkhd", 0, 0x0F, |buf| {
            buf.put_u32(0);
            buf.put_u32(0);
            buf.put_u32(track_id);
            buf.put_u32(0);
            buf.put_u32(to_movie_units(track, movie_scale) as u32);
            buf.put_bytes(0, 8);
            buf.put_u16(0); // layer
            buf.put_u16(0); // alternate group
            buf.put_u16(if matches!(track.kind, TrackKind::Audio { .. }) { 0x0100 } else { 0 });
            buf.put_u16(0);
            put_matrix(buf);
            buf.put_u32(width << 16);
            buf.put_u32(height << 16);
        });
        atom(buf, b"mdia", |buf| {
            full_atom(buf, b"mdhd", 0, 0, |buf| {
                buf.put_u32(0);
                buf.put_u32(0);
                buf.put_u32(track.time_scale);
                buf.put_u32(track.media_duration() as u32);
                buf.put_u16(0); // language
                buf.put_u16(0); // quality
            });
            let (subtype, name) = track.handler();
            full_atom(buf, b"hdlr", 0, 0, |buf| {
                buf.put_slice(b"mhlr");
                buf.put_slice(subtype);
                buf.put_bytes(0, 12); // manufacturer, flags, flags mask
                put_pascal(buf, name, name.len() + 1);
            });
            atom(buf, b"minf", |buf| {
                build_media_header(buf, &track.kind);
                atom(buf, b"dinf", |buf| {
                    full_atom(buf, b"dref", 0, 0, |buf| {
                        buf.put_u32(1);
                        // Data is in this file.
                        full_atom(buf, b"alis", 0, 1, |_| {});
                    });
                });
                build_stbl(buf, track);
            });
        });
    });
}

fn build_media_header(buf: &mut Vec<u8>, kind: &TrackKind) {
    match kind {
        TrackKind::Video { .. } => full_atom(buf, b"vmhd", 0, 1, |buf| {
            buf.put_u16(0x40); // graphics mode: dither copy
            buf.put_bytes(0x80, 6); // opcolor
        }),
        TrackKind::Audio { .. } => full_atom(buf, b"smhd", 0, 0, |buf| {
            buf.put_u16(0); // balance
            buf.put_u16(0);
        }),
        TrackKind::Text { .. } => atom(buf, b"gmhd", |buf| {
            full_atom(buf, b"gmin", 0, 0, |buf| {
                buf.put_u16(0x40);
                buf.put_bytes(0x80, 6);
                buf.put_u16(0); // balance
                buf.put_u16(0);
            });
        }),
    }
}

fn build_sample_description(buf: &mut Vec<u8>, kind: &TrackKind, time_scale: u32) {
    let fourcc = match kind {
        TrackKind::Video { fourcc, .. }
        | TrackKind::Audio { fourcc, .. }
        | TrackKind::Text { fourcc } => fourcc,
    };
    atom(buf, fourcc, |buf| {
        buf.put_bytes(0, 6);
        buf.put_u16(1); // data reference index
        match kind {
            TrackKind::Video {
                width,
                height,
                depth,
                palette,
                ..
            } => {
                buf.put_u16(0); // version
                buf.put_u16(0); // revision
                buf.put_u32(0); // vendor
                buf.put_u32(0); // temporal quality
                buf.put_u32(0); // spatial quality
                buf.put_u16(*width as u16);
                buf.put_u16(*height as u16);
                buf.put_u32(0x0048_0000);
                buf.put_u32(0x0048_0000);
                buf.put_u32(0); // data size
                buf.put_u16(1); // frames per sample
                put_pascal(buf, "", 32);
                buf.put_u16(*depth as u16);
                match palette {
                    Some(palette) if !palette.is_empty() => {
                        buf.put_i16(0); // color table follows
                        let count = palette.len() / 3;
                        buf.put_u32(0); // seed
                        buf.put_u16(0x8000);
                        buf.put_u16(count as u16 - 1);
                        for (i, rgb) in palette.chunks_exact(3).enumerate() {
                            buf.put_u16(i as u16);
                            for c in rgb {
                                buf.put_u16(u16::from(*c) * 0x0101);
                            }
                        }
                    }
                    _ => buf.put_i16(-1),
                }
            }
            TrackKind::Audio { channels, bits, .. } => {
                buf.put_u16(0); // version
                buf.put_u16(0); // revision
                buf.put_u32(0); // vendor
                buf.put_u16(*channels as u16);
                buf.put_u16(*bits as u16);
                buf.put_u16(0); // compression id
                buf.put_u16(0); // packet size
                buf.put_u32(time_scale << 16);
            }
            TrackKind::Text { .. } => {}
        }
    });
}

fn build_stbl(buf: &mut Vec<u8>, track: &TrackState) {
    atom(buf, b"stbl", |buf| {
        full_atom(buf, b"stsd", 0, 0, |buf| {
            buf.put_u32(1);
            build_sample_description(buf, &track.kind, track.time_scale);
        });

        match track.kind {
            TrackKind::Audio { block_align, .. } => {
                let frames = track.media_duration() as u32;
                full_atom(buf, b"stts", 0, 0, |buf| {
                    if frames == 0 {
                        buf.put_u32(0);
                    } else {
                        buf.put_u32(1);
                        buf.put_u32(frames);
                        buf.put_u32(1);
                    }
                });
                full_atom(buf, b"stsc", 0, 0, |buf| {
                    let runs = runs(track.audio_chunks.iter().map(|c| c.frames));
                    buf.put_u32(runs.len() as u32);
                    for (first, frames) in runs {
                        buf.put_u32(first);
                        buf.put_u32(frames);
                        buf.put_u32(1);
                    }
                });
                full_atom(buf, b"stsz", 0, 0, |buf| {
                    buf.put_u32(block_align);
                    buf.put_u32(frames);
                });
                put_chunk_offsets(buf, track.audio_chunks.iter().map(|c| c.offset));
            }
            _ => {
                let deltas = track.sample_deltas();
                full_atom(buf, b"stts", 0, 0, |buf| {
                    let runs = runs(deltas.iter().copied());
                    let mut entries: Vec<(u32, u32)> = Vec::with_capacity(runs.len());
                    for (i, (first, delta)) in runs.iter().enumerate() {
                        let next = runs.get(i + 1).map_or(deltas.len() as u32 + 1, |r| r.0);
                        entries.push((next - first, *delta));
                    }
                    buf.put_u32(entries.len() as u32);
                    for (count, delta) in entries {
                        buf.put_u32(count);
                        buf.put_u32(delta);
                    }
                });
                if track.samples.iter().any(|s| !s.keyframe) {
                    full_atom(buf, b"stss", 0, 0, |buf| {
                        let sync: Vec<u32> = track
                            .samples
                            .iter()
                            .enumerate()
                            .filter(|(_, s)| s.keyframe)
                            .map(|(i, _)| i as u32 + 1)
                            .collect();
                        buf.put_u32(sync.len() as u32);
                        for n in sync {
                            buf.put_u32(n);
                        }
                    });
                }
                full_atom(buf, b"stsc", 0, 0, |buf| {
                    if track.samples.is_empty() {
                        buf.put_u32(0);
                    } else {
                        buf.put_u32(1);
                        buf.put_u32(1);
                        buf.put_u32(1);
                        buf.put_u32(1);
                    }
                });
                full_atom(buf, b"stsz", 0, 0, |buf| {
                    buf.put_u32(0);
                    buf.put_u32(track.samples.len() as u32);
                    for s in &track.samples {
                        buf.put_u32(s.size);
                    }
                });
                put_chunk_offsets(buf, track.samples.iter().map(|s| s.offset));
            }
        }
    });
}

/// Collapse a sequence into (first 1-based index, value) runs.
fn runs(values: impl Iterator<Item = u32>) -> Vec<(u32, u32)> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for (i, v) in values.enumerate() {
        if runs.last().map_or(true, |r| r.1 != v) {
            runs.push((i as u32 + 1, v));
        }
    }
    runs
}

fn put_chunk_offsets(buf: &mut Vec<u8>, offsets: impl Iterator<Item = u64> + Clone) {
    if offsets.clone().any(|o| o > u32::MAX as u64) {
        full_atom(buf, b"co64", 0, 0, |buf| {
            buf.put_u32(offsets.clone().count() as u32);
            offsets.for_each(|o| buf.put_u64(o));
        });
    } else {
        full_atom(buf, b"stco", 0, 0, |buf| {
            buf.put_u32(offsets.clone().count() as u32);
            offsets.for_each(|o| buf.put_u32(o as u32));
        });
    }
}

impl ContainerWriter for QuickTimeWriter {
    fn file_format(&self) -> &FormatDescriptor {
        &self.file_format
    }

    fn add_track(&mut self, format: &FormatDescriptor) -> Result<AddedTrack> {
        if self.closed {
            return Err(ContainerError::Closed.into());
        }
        let track = match format.media_type() {
            Some(MediaType::Video) => self.video_track(format)?,
            Some(MediaType::Audio) => self.audio_track(format)?,
            Some(MediaType::Text) => self.text_track(format)?,
            _ => return Err(Error::unsupported(format!("QuickTime cannot store {format}"))),
        };
        let added = AddedTrack {
            index: self.tracks.len(),
            format: track.format.clone(),
        };
        debug!(track = added.index, format = %added.format, "QuickTime track added");
        self.tracks.push(track);
        Ok(added)
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_format(&self, index: usize) -> Option<&FormatDescriptor> {
        self.tracks.get(index).map(|t| &t.format)
    }

    fn write(&mut self, track: usize, buffer: &SampleBuffer) -> Result<()> {
        if self.closed {
            return Err(ContainerError::Closed.into());
        }
        if track >= self.tracks.len() {
            return Err(ContainerError::TrackNotFound { index: track }.into());
        }
        if buffer.is_discard() {
            return Ok(());
        }
        if let TrackKind::Audio { block_align, .. } = self.tracks[track].kind {
            if buffer.len() % block_align as usize != 0 {
                return Err(Error::invalid_param(format!(
                    "{} audio bytes is not a whole number of {block_align}-byte frames",
                    buffer.len()
                )));
            }
        }
        self.begin()?;
        let sink = self.sink.as_mut().ok_or(ContainerError::Closed)?;
        let offset = sink.stream_position()?;
        sink.write_all(buffer.payload())?;

        let state = &mut self.tracks[track];
        match state.kind {
            TrackKind::Audio { block_align, .. } => {
                state.audio_chunks.push(AudioChunk {
                    offset,
                    frames: (buffer.len() / block_align as usize) as u32,
                });
                state.end += buffer.duration;
            }
            _ => {
                if buffer.timestamp > state.end {
                    state.samples.push(SampleRecord {
                        offset,
                        size: 0,
                        timestamp: state.end,
                        keyframe: true,
                    });
                }
                state.samples.push(SampleRecord {
                    offset,
                    size: buffer.len() as u32,
                    timestamp: buffer.timestamp,
                    keyframe: buffer.is_keyframe(),
                });
                state.end = state.end.max(buffer.end_time());
            }
        }
        state.written += buffer.duration;
        Ok(())
    }

    fn duration(&self, track: usize) -> Option<Rational> {
        self.tracks.get(track).map(|t| t.written)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self.finalize();
        self.sink = None;
        if let Err(e) = &result {
            warn!(error = %e, "QuickTime finalization failed");
        }
        result
    }
}

impl Drop for QuickTimeWriter {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}

impl std::fmt::Debug for QuickTimeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuickTimeWriter")
            .field("tracks", &self.tracks)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track_with(times: &[(i64, i64)], end: (i64, i64)) -> TrackState {
        let mut t = TrackState::new(
            FormatDescriptor::new(),
            TrackKind::Text { fourcc: *b"cue " },
            600,
        );
        for &(n, d) in times {
            t.samples.push(SampleRecord {
                offset: 0,
                size: 1,
                timestamp: Rational::new(n, d),
                keyframe: true,
            });
        }
        t.end = Rational::new(end.0, end.1);
        t
    }

    #[test]
    fn test_cumulative_rounding_has_no_drift() {
        // 1/7 s at 600 units per second is 85.714... units.
        let times: Vec<_> = (0..70).map(|i| (i, 7)).collect();
        let track = track_with(&times, (70, 7));
        let deltas = track.sample_deltas();
        assert_eq!(deltas.len(), 70);
        assert_eq!(deltas.iter().map(|&d| d as u64).sum::<u64>(), 6000);
        assert!(deltas.iter().all(|&d| d == 85 || d == 86));
    }

    #[test]
    fn test_runs() {
        assert_eq!(runs([5, 5, 3, 3, 3, 5].into_iter()), vec![(1, 5), (3, 3), (6, 5)]);
        assert!(runs(std::iter::empty()).is_empty());
    }
}
