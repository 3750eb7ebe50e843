//! AVI reader.

use super::chunks::{
    chunk_ids, parse_index, sub_chunks, BitmapInfo, ChunkHeader, ChunkKind, FourCC, IndexEntry,
    MainHeader, StreamHeader, WaveFormat,
};
use crate::indexed::{shared, IndexedTrack, SampleEntry, SharedSource};
use crate::traits::{ContainerReader, ReadSeek, SeekableTrack, Track};
use bytes::Bytes;
use spool_core::keys::{
    BYTE_ORDER, CHANNELS, DATA_CLASS, DEPTH, ENCODING, FILE_KIND, FRAME_RATE, HEIGHT, MIME_TYPE,
    PALETTE, SAMPLE_RATE, SAMPLE_SIZE_BITS, SIGNED, WIDTH,
};
use spool_core::{
    encoding, ByteOrder, Error, FileKind, FormatDescriptor, MediaType, Rational, Result,
};
use std::io::{Read, Seek, SeekFrom};
use tracing::{debug, warn};

/// A data chunk located in the `movi` list.
#[derive(Debug, Clone, Copy)]
struct DataChunk {
    stream: u16,
    /// Absolute payload offset.
    offset: u64,
    size: u32,
    keyframe: bool,
}

#[derive(Debug)]
enum StreamInfo {
    Video { frame_rate: Rational },
    Audio { byte_rate: u32 },
    Text,
}

struct ParsedStream {
    header: StreamHeader,
    format: FormatDescriptor,
    info: StreamInfo,
}

/// AVI container reader
pub struct AviReader {
    file_format: FormatDescriptor,
    main_header: MainHeader,
    stream_headers: Vec<StreamHeader>,
    tracks: Vec<IndexedTrack>,
    source: SharedSource,
}

impl AviReader {
    /// Parse the headers and index of an AVI file.
    pub fn open(mut source: Box<dyn ReadSeek>) -> Result<Self> {
        let mut riff = [0u8; 12];
        source.read_exact(&mut riff)?;
        if riff[0..4] != chunk_ids::RIFF.0 || riff[8..12] != chunk_ids::AVI.0 {
            return Err(Error::invalid_structure("not a RIFF AVI file"));
        }

        let mut hdrl = None;
        let mut movi = None;
        let mut idx1 = Vec::new();
        while let Some(header) = ChunkHeader::read(&mut source)? {
            let body = source.stream_position()?;
            match header.id {
                chunk_ids::LIST => {
                    let mut list_type = [0u8; 4];
                    source.read_exact(&mut list_type)?;
                    match FourCC(list_type) {
                        chunk_ids::HDRL => {
                            let mut data = vec![0u8; (header.size as usize).saturating_sub(4)];
                            source.read_exact(&mut data)?;
                            hdrl = Some(data);
                        }
                        chunk_ids::MOVI => movi = Some((body, header.size as u64)),
                        _ => {}
                    }
                }
                chunk_ids::IDX1 => {
                    let mut data = vec![0u8; header.size as usize];
                    source.read_exact(&mut data)?;
                    idx1 = parse_index(&data)?;
                }
                _ => {}
            }
            source.seek(SeekFrom::Start(body + header.padded_size()))?;
        }

        let hdrl = hdrl.ok_or_else(|| Error::invalid_structure("AVI has no hdrl list"))?;
        let (movi_start, movi_size) =
            movi.ok_or_else(|| Error::invalid_structure("AVI has no movi list"))?;

        let mut main_header = None;
        let mut streams = Vec::new();
        for (id, body) in sub_chunks(&hdrl) {
            match id {
                chunk_ids::AVIH => main_header = Some(MainHeader::parse(body)?),
                chunk_ids::LIST if body.starts_with(chunk_ids::STRL.as_bytes()) => {
                    streams.push(parse_strl(&body[4..])?);
                }
                _ => {}
            }
        }
        let main_header = main_header.ok_or_else(|| Error::invalid_structure("AVI has no avih"))?;

        let chunks = if idx1.is_empty() {
            debug!("AVI has no idx1, scanning movi");
            scan_movi(&mut source, movi_start, movi_size)?
        } else {
            from_index(&idx1, movi_start)
        };

        let mut per_stream: Vec<Vec<DataChunk>> = vec![Vec::new(); streams.len()];
        for chunk in chunks {
            match per_stream.get_mut(chunk.stream as usize) {
                Some(list) => list.push(chunk),
                None => warn!(stream = chunk.stream, "AVI chunk for undeclared stream"),
            }
        }

        let source = shared(source);
        let mut stream_headers = Vec::new();
        let mut tracks = Vec::new();
        for (stream, chunks) in streams.into_iter().zip(per_stream) {
            let Some(stream) = stream else {
                continue;
            };
            let entries = build_entries(&stream.info, &chunks, &source)?;
            tracks.push(IndexedTrack::new(
                tracks.len(),
                stream.format,
                entries,
                source.clone(),
            ));
            stream_headers.push(stream.header);
        }

        debug!(
            tracks = tracks.len(),
            total_frames = main_header.total_frames,
            "AVI opened"
        );
        Ok(AviReader {
            file_format: FormatDescriptor::of(MediaType::File)
                .with(FILE_KIND, FileKind::Avi)
                .with(MIME_TYPE, FileKind::Avi.mime_type()),
            main_header,
            stream_headers,
            tracks,
            source,
        })
    }

    /// The `avih` header.
    pub fn main_header(&self) -> &MainHeader {
        &self.main_header
    }

    /// Stream headers of the readable tracks, in track order.
    pub fn stream_headers(&self) -> &[StreamHeader] {
        &self.stream_headers
    }
}

/// Parse one `strl` list into a track description, or `None` for an
/// unsupported stream type.
fn parse_strl(data: &[u8]) -> Result<Option<ParsedStream>> {
    let mut strh = None;
    let mut strf: &[u8] = &[];
    for (id, body) in sub_chunks(data) {
        match id {
            chunk_ids::STRH => strh = Some(StreamHeader::parse(body)?),
            chunk_ids::STRF => strf = body,
            _ => {}
        }
    }
    let header = strh.ok_or_else(|| Error::invalid_structure("strl without strh"))?;

    let (format, info) = match header.fcc_type {
        chunk_ids::VIDS => {
            if header.scale == 0 || header.rate == 0 {
                return Err(Error::invalid_structure("video stream with zero rate"));
            }
            let bitmap = BitmapInfo::parse(strf)?;
            let frame_rate = Rational::new(header.rate as i64, header.scale as i64);
            let name = bitmap
                .compression
                .map_or_else(|| encoding::RAW_VIDEO.to_string(), |c| c.to_string());
            let mut format = FormatDescriptor::of(MediaType::Video)
                .with(ENCODING, name.as_str())
                .with(WIDTH, bitmap.width.unsigned_abs())
                .with(HEIGHT, bitmap.height.unsigned_abs())
                .with(DEPTH, bitmap.bit_count as u32)
                .with(FRAME_RATE, frame_rate);
            if !bitmap.palette.is_empty() {
                format = format.with(PALETTE, Bytes::from(bitmap.palette));
            }
            (format, StreamInfo::Video { frame_rate })
        }
        chunk_ids::AUDS => {
            let wave = WaveFormat::parse(strf)?;
            if wave.format_tag != WaveFormat::PCM {
                warn!(tag = wave.format_tag, "Skipping non-PCM AVI audio stream");
                return Ok(None);
            }
            if wave.avg_bytes_per_sec == 0 {
                return Err(Error::invalid_structure("audio stream with zero byte rate"));
            }
            let format = FormatDescriptor::of(MediaType::Audio)
                .with(ENCODING, encoding::PCM)
                .with(SAMPLE_RATE, wave.samples_per_sec)
                .with(CHANNELS, wave.channels as u32)
                .with(SAMPLE_SIZE_BITS, wave.bits_per_sample as u32)
                .with(SIGNED, wave.bits_per_sample > 8)
                .with(BYTE_ORDER, ByteOrder::Little);
            (
                format,
                StreamInfo::Audio {
                    byte_rate: wave.avg_bytes_per_sec,
                },
            )
        }
        chunk_ids::TXTS => (
            FormatDescriptor::of(MediaType::Text)
                .with(ENCODING, header.handler.to_string().as_str())
                .with(DATA_CLASS, "text"),
            StreamInfo::Text,
        ),
        other => {
            warn!(kind = %other, "Skipping unsupported AVI stream");
            return Ok(None);
        }
    };
    Ok(Some(ParsedStream {
        header,
        format,
        info,
    }))
}

/// Resolve idx1 entries to absolute payload offsets.
///
/// Offsets are normally relative to the `movi` list type; some writers
/// store absolute file offsets instead.
fn from_index(entries: &[IndexEntry], movi_start: u64) -> Vec<DataChunk> {
    let base = match entries.first() {
        Some(first) if first.offset as u64 > movi_start => 0,
        _ => movi_start,
    };
    entries
        .iter()
        .filter_map(|e| {
            let (stream, _) = ChunkKind::parse(e.chunk_id)?;
            Some(DataChunk {
                stream,
                offset: base + e.offset as u64 + 8,
                size: e.size,
                keyframe: e.is_keyframe(),
            })
        })
        .collect()
}

/// Walk the `movi` list when there is no index. Every chunk is a keyframe.
fn scan_movi(source: &mut Box<dyn ReadSeek>, movi_start: u64, movi_size: u64) -> Result<Vec<DataChunk>> {
    let end = movi_start + movi_size;
    let mut chunks = Vec::new();
    source.seek(SeekFrom::Start(movi_start + 4))?;
    while source.stream_position()? + 8 <= end {
        let Some(header) = ChunkHeader::read(source)? else {
            break;
        };
        let body = source.stream_position()?;
        if header.id == chunk_ids::LIST {
            // Descend into `rec ` groups.
            source.seek(SeekFrom::Start(body + 4))?;
            continue;
        }
        if let Some((stream, _)) = ChunkKind::parse(header.id) {
            chunks.push(DataChunk {
                stream,
                offset: body,
                size: header.size,
                keyframe: true,
            });
        }
        source.seek(SeekFrom::Start(body + header.padded_size()))?;
    }
    Ok(chunks)
}

fn build_entries(info: &StreamInfo, chunks: &[DataChunk], source: &SharedSource) -> Result<Vec<SampleEntry>> {
    let mut entries: Vec<SampleEntry> = Vec::with_capacity(chunks.len());
    match *info {
        StreamInfo::Video { frame_rate } => {
            let period = frame_rate.recip();
            for (slot, chunk) in chunks.iter().enumerate() {
                if chunk.size == 0 {
                    // An empty chunk repeats the previous frame.
                    if let Some(last) = entries.last_mut() {
                        last.duration += period;
                    }
                    continue;
                }
                entries.push(SampleEntry {
                    offset: chunk.offset,
                    size: chunk.size,
                    timestamp: period.mul_int(slot as i64),
                    duration: period,
                    keyframe: chunk.keyframe,
                });
            }
        }
        StreamInfo::Audio { byte_rate } => {
            let mut bytes = 0i64;
            for chunk in chunks.iter().filter(|c| c.size > 0) {
                entries.push(SampleEntry {
                    offset: chunk.offset,
                    size: chunk.size,
                    timestamp: Rational::new(bytes, byte_rate as i64),
                    duration: Rational::new(chunk.size as i64, byte_rate as i64),
                    keyframe: true,
                });
                bytes += chunk.size as i64;
            }
        }
        StreamInfo::Text => {
            let mut guard = source.lock();
            let Some(reader) = guard.as_mut() else {
                return Ok(entries);
            };
            for chunk in chunks {
                if chunk.size < 8 {
                    warn!(offset = chunk.offset, "Skipping AVI text chunk without timing");
                    continue;
                }
                let mut timing = [0u8; 8];
                reader.seek(SeekFrom::Start(chunk.offset))?;
                reader.read_exact(&mut timing)?;
                let start = u32::from_le_bytes([timing[0], timing[1], timing[2], timing[3]]);
                let duration = u32::from_le_bytes([timing[4], timing[5], timing[6], timing[7]]);
                entries.push(SampleEntry {
                    offset: chunk.offset + 8,
                    size: chunk.size - 8,
                    timestamp: Rational::from_units(start as i64, 1000),
                    duration: Rational::from_units(duration as i64, 1000),
                    keyframe: true,
                });
            }
        }
    }
    Ok(entries)
}

impl ContainerReader for AviReader {
    fn file_format(&self) -> &FormatDescriptor {
        &self.file_format
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track(&mut self, index: usize) -> Option<&mut dyn SeekableTrack> {
        self.tracks
            .get_mut(index)
            .map(|t| t as &mut dyn SeekableTrack)
    }

    fn track_duration(&self, index: usize) -> Option<Rational> {
        self.tracks.get(index).map(Track::duration)
    }

    fn close(&mut self) -> Result<()> {
        if self.source.lock().take().is_some() {
            debug!("AVI reader closed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for AviReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AviReader")
            .field("main_header", &self.main_header)
            .field("tracks", &self.tracks)
            .finish()
    }
}
