//! AVI writer.
//!
//! The header is written lazily at the first [`ContainerWriter::write`] (or
//! at close for a file without samples), so every track must be declared
//! before any sample is written. Sizes, `avih.total_frames` and each
//! `strh.length` are patched when the writer closes.

use super::chunks::{
    chunk_ids, chunk_size, write_chunk, BitmapInfo, ChunkKind, FourCC, IndexEntry, MainHeader,
    StreamHeader, WaveFormat,
};
use crate::traits::{AddedTrack, ContainerWriter, WriteSeek};
use byteorder::{LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};
use spool_core::keys::{
    self, BYTE_ORDER, CHANNELS, DATA_CLASS, DEPTH, ENCODING, FILE_KIND, FRAME_RATE, HEIGHT,
    MIME_TYPE, PALETTE, SAMPLE_RATE, SAMPLE_SIZE_BITS, SIGNED, WIDTH,
};
use spool_core::{
    encoding, ByteOrder, ContainerError, Error, FileKind, FormatDescriptor, MediaType, Rational,
    Result, SampleBuffer,
};
use std::io::{Seek, SeekFrom, Write};
use tracing::{debug, warn};

/// AVI writer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AviWriterConfig {
    /// Frame rate for video tracks that declare none
    pub default_frame_rate: Rational,
    /// Suggested buffer size written to the headers
    pub suggested_buffer_size: u32,
    /// The `movi` list starts on a multiple of this many bytes
    pub header_alignment: u32,
}

impl Default for AviWriterConfig {
    fn default() -> Self {
        AviWriterConfig {
            default_frame_rate: Rational::from_int(30),
            suggested_buffer_size: 1_000_000,
            header_alignment: 2048,
        }
    }
}

#[derive(Debug, Clone)]
enum StreamKind {
    Video { frame_rate: Rational, width: u32, height: u32 },
    Audio { block_align: u32 },
    Text,
}

#[derive(Debug)]
struct StreamState {
    format: FormatDescriptor,
    kind: StreamKind,
    chunk_id: FourCC,
    header: StreamHeader,
    strf: Vec<u8>,
    /// Position of the strh payload, for patching `length`.
    strh_pos: u64,
    /// Frame slots for video, sample frames for audio, chunks for text.
    length: u64,
    written: Rational,
}

/// AVI container writer
pub struct AviWriter {
    sink: Option<Box<dyn WriteSeek>>,
    config: AviWriterConfig,
    file_format: FormatDescriptor,
    streams: Vec<StreamState>,
    index: Vec<IndexEntry>,
    movi_offset: u64,
    avih_pos: u64,
    header_written: bool,
    closed: bool,
}

impl AviWriter {
    /// Create a writer with default configuration.
    pub fn new(sink: Box<dyn WriteSeek>) -> Self {
        Self::with_config(sink, AviWriterConfig::default())
    }

    /// Create a writer with custom configuration.
    pub fn with_config(sink: Box<dyn WriteSeek>, config: AviWriterConfig) -> Self {
        AviWriter {
            sink: Some(sink),
            config,
            file_format: FormatDescriptor::of(MediaType::File)
                .with(FILE_KIND, FileKind::Avi)
                .with(MIME_TYPE, FileKind::Avi.mime_type()),
            streams: Vec::new(),
            index: Vec::new(),
            movi_offset: 0,
            avih_pos: 0,
            header_written: false,
            closed: false,
        }
    }

    fn sink(&mut self) -> Result<&mut Box<dyn WriteSeek>> {
        self.sink.as_mut().ok_or_else(|| ContainerError::Closed.into())
    }

    fn video_stream(&self, format: &FormatDescriptor) -> Result<StreamState> {
        let pattern = FormatDescriptor::of(MediaType::Video)
            .with(FRAME_RATE, self.config.default_frame_rate);
        let format = format.refine(&pattern);
        format.require_flagged(keys::VIDEO)?;

        let width = format.require(WIDTH)?;
        let height = format.require(HEIGHT)?;
        let depth = format.require(DEPTH)?;
        let frame_rate = format.require(FRAME_RATE)?;
        if !frame_rate.is_positive() {
            return Err(Error::invalid_param(format!("frame rate {frame_rate}")));
        }
        let name = format.require(ENCODING)?;
        let fourcc = FourCC::from_name(&name)
            .ok_or_else(|| Error::unsupported(format!("encoding {name:?} is not a FourCC")))?;
        let raw = &*name == encoding::RAW_VIDEO;
        let palette = match (depth, format.get(PALETTE)) {
            (8, Some(palette)) => palette.to_vec(),
            _ => Vec::new(),
        };
        let strf = BitmapInfo {
            width: width as i32,
            height: height as i32,
            bit_count: depth as u16,
            compression: (!raw).then_some(fourcc),
            image_size: width * height * depth.div_ceil(8),
            palette,
        }
        .to_bytes();

        let kind = if raw { ChunkKind::RawVideo } else { ChunkKind::Video };
        Ok(StreamState {
            chunk_id: kind.chunk_id(self.streams.len() as u16),
            header: StreamHeader {
                fcc_type: chunk_ids::VIDS,
                handler: fourcc,
                flags: 0,
                scale: to_u32(frame_rate.den() as u64, "frame rate")?,
                rate: to_u32(frame_rate.num() as u64, "frame rate")?,
                start: 0,
                length: 0,
                suggested_buffer_size: self.config.suggested_buffer_size,
                sample_size: 0,
            },
            strf,
            kind: StreamKind::Video {
                frame_rate,
                width,
                height,
            },
            format,
            strh_pos: 0,
            length: 0,
            written: Rational::zero(),
        })
    }

    fn audio_stream(&self, format: &FormatDescriptor) -> Result<StreamState> {
        if !format.has_encoding(encoding::PCM) {
            return Err(Error::mismatch(format!(
                "AVI stores PCM audio only, got {format}"
            )));
        }
        let bits = format.require(SAMPLE_SIZE_BITS)?;
        if bits != 8 && bits != 16 {
            return Err(Error::mismatch(format!("{bits}-bit PCM")));
        }
        // RIFF PCM: 8-bit unsigned, wider signed, little-endian.
        let pattern = FormatDescriptor::of(MediaType::Audio)
            .with(SIGNED, bits > 8)
            .with(BYTE_ORDER, ByteOrder::Little);
        if let Some(conflict) = format.mismatch(&pattern) {
            return Err(Error::mismatch(format!("AVI PCM layout: {conflict}")));
        }
        let format = format.refine(&pattern);
        format.require_flagged(keys::AUDIO)?;

        let channels = format.require(CHANNELS)?;
        let rate = format.require(SAMPLE_RATE)?;
        if channels == 0 || rate == 0 || channels > u16::MAX as u32 {
            return Err(Error::invalid_param(format!(
                "{channels} channels at {rate} Hz"
            )));
        }
        let wave = WaveFormat::pcm(channels as u16, rate, bits as u16);
        Ok(StreamState {
            chunk_id: ChunkKind::Audio.chunk_id(self.streams.len() as u16),
            header: StreamHeader {
                fcc_type: chunk_ids::AUDS,
                handler: FourCC([0; 4]),
                flags: 0,
                scale: wave.block_align as u32,
                rate: wave.avg_bytes_per_sec,
                start: 0,
                length: 0,
                suggested_buffer_size: self.config.suggested_buffer_size,
                sample_size: wave.block_align as u32,
            },
            strf: wave.to_bytes(),
            kind: StreamKind::Audio {
                block_align: wave.block_align as u32,
            },
            format,
            strh_pos: 0,
            length: 0,
            written: Rational::zero(),
        })
    }

    fn text_stream(&self, format: &FormatDescriptor) -> Result<StreamState> {
        let format = format.refine(&FormatDescriptor::of(MediaType::Text).with(DATA_CLASS, "text"));
        format.require_flagged(keys::TEXT)?;
        let name = format.require(ENCODING)?;
        let fourcc = FourCC::from_name(&name)
            .ok_or_else(|| Error::unsupported(format!("encoding {name:?} is not a FourCC")))?;
        Ok(StreamState {
            chunk_id: ChunkKind::Text.chunk_id(self.streams.len() as u16),
            header: StreamHeader {
                fcc_type: chunk_ids::TXTS,
                handler: fourcc,
                flags: 0,
                scale: 1,
                rate: 1000,
                start: 0,
                length: 0,
                suggested_buffer_size: self.config.suggested_buffer_size,
                sample_size: 0,
            },
            strf: Vec::new(),
            kind: StreamKind::Text,
            format,
            strh_pos: 0,
            length: 0,
            written: Rational::zero(),
        })
    }

    fn write_header(&mut self) -> Result<()> {
        if self.header_written {
            return Ok(());
        }
        let video = self.streams.iter().find_map(|s| match s.kind {
            StreamKind::Video {
                frame_rate,
                width,
                height,
            } => Some((frame_rate, width, height)),
            _ => None,
        });
        let main = MainHeader {
            micro_sec_per_frame: video
                .map_or(0, |(rate, _, _)| (Rational::from_int(1_000_000) / rate).round() as u32),
            max_bytes_per_sec: 0,
            flags: MainHeader::HAS_INDEX | MainHeader::IS_INTERLEAVED,
            total_frames: 0,
            streams: self.streams.len() as u32,
            suggested_buffer_size: self.config.suggested_buffer_size,
            width: video.map_or(0, |(_, w, _)| w),
            height: video.map_or(0, |(_, _, h)| h),
        };
        let alignment = self.config.header_alignment.max(1) as u64;

        let sink = self.sink.as_mut().ok_or(ContainerError::Closed)?;
        sink.write_all(chunk_ids::RIFF.as_bytes())?;
        sink.write_u32::<LittleEndian>(0)?; // patched at close
        sink.write_all(chunk_ids::AVI.as_bytes())?;

        let hdrl_start = sink.stream_position()?;
        sink.write_all(chunk_ids::LIST.as_bytes())?;
        sink.write_u32::<LittleEndian>(0)?;
        sink.write_all(chunk_ids::HDRL.as_bytes())?;

        self.avih_pos = sink.stream_position()? + 8;
        write_chunk(sink, chunk_ids::AVIH, &main.to_bytes())?;

        for stream in &mut self.streams {
            let strl_start = sink.stream_position()?;
            sink.write_all(chunk_ids::LIST.as_bytes())?;
            sink.write_u32::<LittleEndian>(0)?;
            sink.write_all(chunk_ids::STRL.as_bytes())?;
            stream.strh_pos = sink.stream_position()? + 8;
            write_chunk(sink, chunk_ids::STRH, &stream.header.to_bytes())?;
            write_chunk(sink, chunk_ids::STRF, &stream.strf)?;
            patch_list_size(sink, strl_start)?;
        }
        patch_list_size(sink, hdrl_start)?;

        let pos = sink.stream_position()?;
        let pad = (alignment - (pos + 8) % alignment) % alignment;
        write_chunk(sink, chunk_ids::JUNK, &vec![0u8; pad as usize])?;

        self.movi_offset = sink.stream_position()?;
        sink.write_all(chunk_ids::LIST.as_bytes())?;
        sink.write_u32::<LittleEndian>(0)?;
        sink.write_all(chunk_ids::MOVI.as_bytes())?;

        self.header_written = true;
        debug!(
            streams = self.streams.len(),
            movi_offset = self.movi_offset,
            "AVI header written"
        );
        Ok(())
    }

    /// Append one data chunk and its index entry.
    fn emit(&mut self, stream: usize, prefix: &[u8], payload: &[u8], keyframe: bool) -> Result<()> {
        let chunk_id = self.streams[stream].chunk_id;
        let movi_offset = self.movi_offset;
        let size = prefix.len() + payload.len();

        let sink = self.sink()?;
        let pos = sink.stream_position()?;
        let offset = u32::try_from(pos - movi_offset - 8)
            .map_err(|_| Error::invalid_structure("AVI file exceeds 4 GiB"))?;
        sink.write_all(chunk_id.as_bytes())?;
        sink.write_u32::<LittleEndian>(size as u32)?;
        sink.write_all(prefix)?;
        sink.write_all(payload)?;
        if size % 2 != 0 {
            sink.write_all(&[0])?;
        }

        self.index.push(IndexEntry {
            chunk_id,
            flags: if keyframe { IndexEntry::KEYFRAME } else { 0 },
            offset,
            size: size as u32,
        });
        Ok(())
    }

    fn write_video(&mut self, stream: usize, buffer: &SampleBuffer, frame_rate: Rational) -> Result<()> {
        let slot = |t: Rational| (t * frame_rate).round().max(0) as u64;
        let start = slot(buffer.timestamp);
        let end = slot(buffer.end_time());

        while self.streams[stream].length < start {
            self.emit(stream, &[], &[], false)?;
            self.streams[stream].length += 1;
        }
        self.emit(stream, &[], buffer.payload(), buffer.is_keyframe())?;
        self.streams[stream].length += 1;
        // A frame held for several periods repeats as empty chunks.
        while self.streams[stream].length < end {
            self.emit(stream, &[], &[], false)?;
            self.streams[stream].length += 1;
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.write_header()?;
        let movi_offset = self.movi_offset;
        let avih_pos = self.avih_pos;
        let total_frames = self
            .streams
            .iter()
            .find(|s| matches!(s.kind, StreamKind::Video { .. }))
            .map_or(0, |s| s.length);
        let lengths = self
            .streams
            .iter()
            .map(|s| Ok((s.strh_pos, to_u32(s.length, "stream length")?)))
            .collect::<Result<Vec<_>>>()?;
        let index = std::mem::take(&mut self.index);

        let sink = self.sink()?;
        patch_list_size(sink, movi_offset)?;

        let mut idx1 = Vec::with_capacity(index.len() * IndexEntry::SIZE);
        for entry in &index {
            entry.write(&mut idx1)?;
        }
        write_chunk(sink, chunk_ids::IDX1, &idx1)?;

        let file_end = sink.stream_position()?;
        patch_u32(sink, 4, to_u32(file_end - 8, "RIFF size")?)?;
        patch_u32(
            sink,
            avih_pos + MainHeader::TOTAL_FRAMES_OFFSET,
            to_u32(total_frames, "total frames")?,
        )?;
        for (strh_pos, length) in lengths {
            patch_u32(sink, strh_pos + StreamHeader::LENGTH_OFFSET, length)?;
        }
        sink.seek(SeekFrom::Start(file_end))?;
        sink.flush()?;

        debug!(
            size = file_end,
            chunks = index.len(),
            total_frames,
            index_size = chunk_size(idx1.len()),
            "AVI finalized"
        );
        Ok(())
    }
}

fn to_u32(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::invalid_structure(format!("{what} {value} overflows AVI field")))
}

/// Caption timing is stored as unsigned 32-bit milliseconds.
fn to_millis(time: Rational, what: &str) -> Result<u32> {
    u32::try_from(time.to_units(1000))
        .map_err(|_| Error::invalid_param(format!("{what} {time} does not fit in AVI caption timing")))
}

fn patch_u32(sink: &mut Box<dyn WriteSeek>, pos: u64, value: u32) -> Result<()> {
    sink.seek(SeekFrom::Start(pos))?;
    sink.write_u32::<LittleEndian>(value)?;
    Ok(())
}

/// Patch the size of the LIST starting at `start` to end at the current position.
fn patch_list_size(sink: &mut Box<dyn WriteSeek>, start: u64) -> Result<()> {
    let end = sink.stream_position()?;
    patch_u32(sink, start + 4, to_u32(end - start - 8, "LIST size")?)?;
    sink.seek(SeekFrom::Start(end))?;
    Ok(())
}

impl ContainerWriter for AviWriter {
    fn file_format(&self) -> &FormatDescriptor {
        &self.file_format
    }

    fn add_track(&mut self, format: &FormatDescriptor) -> Result<AddedTrack> {
        if self.closed {
            return Err(ContainerError::Closed.into());
        }
        if self.header_written {
            return Err(ContainerError::TrackConfig(
                "AVI tracks must be added before the first write".into(),
            )
            .into());
        }
        if self.streams.len() >= 100 {
            return Err(ContainerError::TrackConfig("AVI supports at most 100 streams".into()).into());
        }
        let stream = match format.media_type() {
            Some(MediaType::Video) => self.video_stream(format)?,
            Some(MediaType::Audio) => self.audio_stream(format)?,
            Some(MediaType::Text) => self.text_stream(format)?,
            _ => return Err(Error::unsupported(format!("AVI cannot store {format}"))),
        };
        let added = AddedTrack {
            index: self.streams.len(),
            format: stream.format.clone(),
        };
        debug!(track = added.index, format = %added.format, "AVI track added");
        self.streams.push(stream);
        Ok(added)
    }

    fn track_count(&self) -> usize {
        self.streams.len()
    }

    fn track_format(&self, index: usize) -> Option<&FormatDescriptor> {
        self.streams.get(index).map(|s| &s.format)
    }

    fn write(&mut self, track: usize, buffer: &SampleBuffer) -> Result<()> {
        if self.closed {
            return Err(ContainerError::Closed.into());
        }
        let kind = self
            .streams
            .get(track)
            .map(|s| s.kind.clone())
            .ok_or(ContainerError::TrackNotFound { index: track })?;
        if buffer.is_discard() {
            return Ok(());
        }
        self.write_header()?;

        match kind {
            StreamKind::Video { frame_rate, .. } => self.write_video(track, buffer, frame_rate)?,
            StreamKind::Audio { block_align } => {
                if buffer.len() % block_align as usize != 0 {
                    return Err(Error::invalid_param(format!(
                        "{} audio bytes is not a whole number of {block_align}-byte frames",
                        buffer.len()
                    )));
                }
                self.emit(track, &[], buffer.payload(), true)?;
                self.streams[track].length += (buffer.len() / block_align as usize) as u64;
            }
            StreamKind::Text => {
                let mut prefix = [0u8; 8];
                prefix[..4].copy_from_slice(&to_millis(buffer.timestamp, "cue start")?.to_le_bytes());
                prefix[4..].copy_from_slice(&to_millis(buffer.duration, "cue duration")?.to_le_bytes());
                self.emit(track, &prefix, buffer.payload(), true)?;
                self.streams[track].length += 1;
            }
        }
        self.streams[track].written += buffer.duration;
        Ok(())
    }

    fn duration(&self, track: usize) -> Option<Rational> {
        self.streams.get(track).map(|s| s.written)
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
            warn!(error = %e, "AVI finalization failed");
        }
        result
    }
}

impl Drop for AviWriter {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}

impl std::fmt::Debug for AviWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AviWriter")
            .field("streams", &self.streams)
            .field("header_written", &self.header_written)
            .field("closed", &self.closed)
            .finish()
    }
}
