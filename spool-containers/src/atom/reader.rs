//! QuickTime movie reader.

use super::atoms::{children, find, full_body, read_u32_table, require_path, AtomHeader};
use crate::indexed::{shared, IndexedTrack, SampleEntry, SharedSource};
use crate::traits::{ContainerReader, ReadSeek, SeekableTrack, Track};
use byteorder::{BigEndian, ReadBytesExt};
use bytes::Bytes;
use spool_core::keys::{
    BYTE_ORDER, CHANNELS, DATA_CLASS, DEPTH, ENCODING, FILE_KIND, FRAME_RATE, HEIGHT, MIME_TYPE,
    PALETTE, SAMPLE_RATE, SAMPLE_SIZE_BITS, SIGNED, WIDTH,
};
use spool_core::{
    encoding, ByteOrder, ContainerError, Error, FileKind, FormatDescriptor, MediaType, Rational,
    Result,
};
use std::io::{Cursor, Read, Seek, SeekFrom};
use tracing::{debug, warn};

/// Sample tables of one track, as stored.
#[derive(Debug, Default)]
struct SampleTables {
    /// (count, delta) runs.
    time_to_sample: Vec<(u32, u32)>,
    /// 1-based sync sample numbers; `None` means every sample is sync.
    sync: Option<Vec<u32>>,
    /// Constant sample size, or 0 when `sizes` holds one per sample.
    sample_size: u32,
    sample_count: u32,
    sizes: Vec<u32>,
    /// (first chunk, samples per chunk, description) runs.
    sample_to_chunk: Vec<(u32, u32, u32)>,
    chunk_offsets: Vec<u64>,
}

impl SampleTables {
    /// Samples held by each chunk.
    fn samples_per_chunk(&self) -> Vec<u32> {
        let chunks = self.chunk_offsets.len() as u32;
        let mut counts = Vec::with_capacity(chunks as usize);
        for (i, run) in self.sample_to_chunk.iter().enumerate() {
            let last = self
                .sample_to_chunk
                .get(i + 1)
                .map_or(chunks, |next| next.0.saturating_sub(1).min(chunks));
            for _ in run.0..=last {
                counts.push(run.1);
            }
        }
        counts.truncate(chunks as usize);
        counts
    }

    fn size_of(&self, sample: usize) -> u32 {
        if self.sample_size != 0 {
            self.sample_size
        } else {
            self.sizes.get(sample).copied().unwrap_or(0)
        }
    }
}

#[derive(Debug)]
enum TrackInfo {
    Framed,
    Audio { rate: u32, block_align: u32 },
}

/// QuickTime container reader
pub struct QuickTimeReader {
    file_format: FormatDescriptor,
    movie_time_scale: u32,
    tracks: Vec<IndexedTrack>,
    source: SharedSource,
}

impl QuickTimeReader {
    /// Parse the movie atom of a QuickTime file.
    pub fn open(mut source: Box<dyn ReadSeek>) -> Result<Self> {
        let mut moov = None;
        while let Some(header) = AtomHeader::read(&mut source)? {
            if &header.atom_type == b"moov" {
                let size = usize::try_from(header.content_size())
                    .map_err(|_| Error::invalid_structure("moov too large"))?;
                let mut data = vec![0u8; size];
                source.read_exact(&mut data)?;
                moov = Some(data);
            }
            source.seek(SeekFrom::Start(header.end()))?;
        }
        let moov = moov.ok_or_else(|| ContainerError::MissingElement("moov".to_string()))?;

        let (_, mut mvhd) = full_body(require_path(&moov, &[b"mvhd"])?)?;
        mvhd.seek(SeekFrom::Current(8))?;
        let movie_time_scale = mvhd.read_u32::<BigEndian>()?;

        let source = shared(source);
        let mut tracks = Vec::new();
        for (kind, trak) in children(&moov) {
            if &kind != b"trak" {
                continue;
            }
            let Some((format, info, tables, time_scale)) = parse_trak(trak)? else {
                continue;
            };
            let entries = build_entries(&info, &tables, time_scale)?;
            tracks.push(IndexedTrack::new(
                tracks.len(),
                format,
                entries,
                source.clone(),
            ));
        }

        debug!(tracks = tracks.len(), movie_time_scale, "QuickTime movie opened");
        Ok(QuickTimeReader {
            file_format: FormatDescriptor::of(MediaType::File)
                .with(FILE_KIND, FileKind::QuickTime)
                .with(MIME_TYPE, FileKind::QuickTime.mime_type()),
            movie_time_scale,
            tracks,
            source,
        })
    }

    /// Time scale of the movie header.
    pub fn movie_time_scale(&self) -> u32 {
        self.movie_time_scale
    }
}

type ParsedTrak = (FormatDescriptor, TrackInfo, SampleTables, u32);

fn parse_trak(trak: &[u8]) -> Result<Option<ParsedTrak>> {
    let (version, mut mdhd) = full_body(require_path(trak, &[b"mdia", b"mdhd"])?)?;
    mdhd.seek(SeekFrom::Current(if version == 1 { 16 } else { 8 }))?;
    let time_scale = mdhd.read_u32::<BigEndian>()?;
    if time_scale == 0 {
        return Err(Error::invalid_structure("track time scale is zero"));
    }

    let (_, mut hdlr) = full_body(require_path(trak, &[b"mdia", b"hdlr"])?)?;
    hdlr.seek(SeekFrom::Current(4))?;
    let mut subtype = [0u8; 4];
    hdlr.read_exact(&mut subtype)?;

    let stbl = require_path(trak, &[b"mdia", b"minf", b"stbl"])?;
    let (_, mut stsd) = full_body(require_path(stbl, &[b"stsd"])?)?;
    stsd.seek(SeekFrom::Current(4))?;
    let rest = &stsd.get_ref()[stsd.position() as usize..];
    let (fourcc, description) = children(rest)
        .next()
        .ok_or_else(|| ContainerError::MissingElement("stsd entry".to_string()))?;
    // Skip reserved bytes and the data reference index.
    let description = description
        .get(8..)
        .ok_or_else(|| Error::invalid_structure("truncated sample description"))?;

    let parsed = match &subtype {
        b"vide" => Some((video_format(&fourcc, description)?, TrackInfo::Framed)),
        b"soun" => audio_format(&fourcc, description)?,
        b"text" | b"sbtl" => Some((
            FormatDescriptor::of(MediaType::Text)
                .with(ENCODING, fourcc_name(&fourcc))
                .with(DATA_CLASS, "text"),
            TrackInfo::Framed,
        )),
        _ => None,
    };
    let Some((mut format, info)) = parsed else {
        warn!(
            handler = %String::from_utf8_lossy(&subtype),
            fourcc = %String::from_utf8_lossy(&fourcc),
            "skipping unsupported QuickTime track"
        );
        return Ok(None);
    };

    let tables = parse_tables(stbl)?;
    if let (TrackInfo::Framed, [(_, delta)]) = (&info, tables.time_to_sample.as_slice()) {
        if *delta != 0 && format.media_type() == Some(MediaType::Video) {
            format = format.with(FRAME_RATE, Rational::new(time_scale as i64, *delta as i64));
        }
    }
    Ok(Some((format, info, tables, time_scale)))
}

fn fourcc_name(fourcc: &[u8; 4]) -> String {
    String::from_utf8_lossy(fourcc).into_owned()
}

fn video_format(fourcc: &[u8; 4], description: &[u8]) -> Result<FormatDescriptor> {
    let mut cursor = Cursor::new(description);
    // version, revision, vendor, temporal and spatial quality
    cursor.seek(SeekFrom::Current(16))?;
    let width = cursor.read_u16::<BigEndian>()?;
    let height = cursor.read_u16::<BigEndian>()?;
    // resolution, data size, frame count, compressor name
    cursor.seek(SeekFrom::Current(4 + 4 + 4 + 2 + 32))?;
    let depth = cursor.read_u16::<BigEndian>()?;
    let color_table = cursor.read_i16::<BigEndian>()?;

    let mut format = FormatDescriptor::of(MediaType::Video)
        .with(ENCODING, fourcc_name(fourcc))
        .with(WIDTH, width as u32)
        .with(HEIGHT, height as u32)
        .with(DEPTH, depth as u32);
    if color_table == 0 {
        format = format.with(PALETTE, read_color_table(&mut cursor)?);
    }
    Ok(format)
}

fn read_color_table(cursor: &mut Cursor<&[u8]>) -> Result<Bytes> {
    let _seed = cursor.read_u32::<BigEndian>()?;
    let _flags = cursor.read_u16::<BigEndian>()?;
    let count = cursor.read_u16::<BigEndian>()? as usize + 1;
    let mut palette = Vec::with_capacity(count * 3);
    for _ in 0..count {
        let _index = cursor.read_u16::<BigEndian>()?;
        for _ in 0..3 {
            palette.push((cursor.read_u16::<BigEndian>()? >> 8) as u8);
        }
    }
    Ok(Bytes::from(palette))
}

fn audio_format(fourcc: &[u8; 4], description: &[u8]) -> Result<Option<(FormatDescriptor, TrackInfo)>> {
    let (signed, order) = match fourcc {
        b"raw " => (false, None),
        b"twos" => (true, Some(ByteOrder::Big)),
        b"sowt" => (true, Some(ByteOrder::Little)),
        _ => return Ok(None),
    };
    let mut cursor = Cursor::new(description);
    // version, revision, vendor
    cursor.seek(SeekFrom::Current(8))?;
    let channels = cursor.read_u16::<BigEndian>()? as u32;
    let bits = cursor.read_u16::<BigEndian>()? as u32;
    cursor.seek(SeekFrom::Current(4))?;
    let rate = cursor.read_u32::<BigEndian>()? >> 16;
    if channels == 0 || rate == 0 || !(bits == 8 || bits == 16) {
        return Err(Error::invalid_structure(format!(
            "sound description with {channels} channels, {bits} bits at {rate} Hz"
        )));
    }

    let format = FormatDescriptor::of(MediaType::Audio)
        .with(ENCODING, encoding::PCM)
        .with(SAMPLE_RATE, rate)
        .with(CHANNELS, channels)
        .with(SAMPLE_SIZE_BITS, bits)
        .with(SIGNED, signed);
    let format = match order {
        Some(order) => format.with(BYTE_ORDER, order),
        None => format,
    };
    let info = TrackInfo::Audio {
        rate,
        block_align: channels * bits / 8,
    };
    Ok(Some((format, info)))
}

fn parse_tables(stbl: &[u8]) -> Result<SampleTables> {
    let mut tables = SampleTables::default();

    let (_, mut stts) = full_body(require_path(stbl, &[b"stts"])?)?;
    tables.time_to_sample = read_u32_table(&mut stts, 2)?
        .chunks_exact(2)
        .map(|e| (e[0], e[1]))
        .collect();

    if let Some(stss) = find(stbl, b"stss") {
        let (_, mut stss) = full_body(stss)?;
        tables.sync = Some(read_u32_table(&mut stss, 1)?);
    }

    let (_, mut stsz) = full_body(require_path(stbl, &[b"stsz"])?)?;
    tables.sample_size = stsz.read_u32::<BigEndian>()?;
    if tables.sample_size == 0 {
        tables.sizes = read_u32_table(&mut stsz, 1)?;
        tables.sample_count = tables.sizes.len() as u32;
    } else {
        tables.sample_count = stsz.read_u32::<BigEndian>()?;
    }

    let (_, mut stsc) = full_body(require_path(stbl, &[b"stsc"])?)?;
    tables.sample_to_chunk = read_u32_table(&mut stsc, 3)?
        .chunks_exact(3)
        .map(|e| (e[0], e[1], e[2]))
        .collect();

    tables.chunk_offsets = if let Some(stco) = find(stbl, b"stco") {
        let (_, mut stco) = full_body(stco)?;
        read_u32_table(&mut stco, 1)?.into_iter().map(u64::from).collect()
    } else if let Some(co64) = find(stbl, b"co64") {
        let (_, mut co64) = full_body(co64)?;
        let words = read_u32_table(&mut co64, 2)?;
        words
            .chunks_exact(2)
            .map(|w| (u64::from(w[0]) << 32) | u64::from(w[1]))
            .collect()
    } else {
        return Err(ContainerError::MissingElement("stbl/stco".to_string()).into());
    };
    Ok(tables)
}

fn build_entries(info: &TrackInfo, tables: &SampleTables, time_scale: u32) -> Result<Vec<SampleEntry>> {
    let per_chunk = tables.samples_per_chunk();
    let mut entries = Vec::new();

    match *info {
        TrackInfo::Audio { rate, block_align } => {
            let mut frames_done: i64 = 0;
            for (&offset, &frames) in tables.chunk_offsets.iter().zip(&per_chunk) {
                entries.push(SampleEntry {
                    offset,
                    size: frames * block_align,
                    timestamp: Rational::from_units(frames_done, rate),
                    duration: Rational::from_units(frames as i64, rate),
                    keyframe: true,
                });
                frames_done += frames as i64;
            }
        }
        TrackInfo::Framed => {
            let mut deltas = tables
                .time_to_sample
                .iter()
                .flat_map(|&(count, delta)| std::iter::repeat(delta).take(count as usize));
            let mut sample = 0usize;
            let mut units: i64 = 0;
            for (&chunk_offset, &count) in tables.chunk_offsets.iter().zip(&per_chunk) {
                let mut offset = chunk_offset;
                for _ in 0..count {
                    if sample >= tables.sample_count as usize {
                        break;
                    }
                    let size = tables.size_of(sample);
                    let delta = deltas.next().ok_or_else(|| {
                        Error::invalid_structure("time-to-sample table shorter than sample count")
                    })?;
                    let keyframe = tables
                        .sync
                        .as_ref()
                        .map_or(true, |sync| sync.binary_search(&(sample as u32 + 1)).is_ok());
                    // Zero-size samples fill gaps between real ones.
                    if size > 0 {
                        entries.push(SampleEntry {
                            offset,
                            size,
                            timestamp: Rational::from_units(units, time_scale),
                            duration: Rational::from_units(delta as i64, time_scale),
                            keyframe,
                        });
                    }
                    offset += size as u64;
                    units += delta as i64;
                    sample += 1;
                }
            }
        }
    }
    Ok(entries)
}

impl ContainerReader for QuickTimeReader {
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
            debug!("QuickTime reader closed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for QuickTimeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuickTimeReader")
            .field("movie_time_scale", &self.movie_time_scale)
            .field("tracks", &self.tracks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_per_chunk_runs() {
        let tables = SampleTables {
            sample_to_chunk: vec![(1, 4, 1), (3, 2, 1), (4, 7, 1)],
            chunk_offsets: vec![0; 5],
            ..Default::default()
        };
        assert_eq!(tables.samples_per_chunk(), vec![4, 4, 2, 7, 7]);
    }

    #[test]
    fn test_framed_entries_skip_fillers() {
        let tables = SampleTables {
            time_to_sample: vec![(3, 100)],
            sync: Some(vec![1, 3]),
            sample_count: 3,
            sizes: vec![10, 0, 5],
            sample_to_chunk: vec![(1, 1, 1)],
            chunk_offsets: vec![100, 110, 110],
            ..Default::default()
        };
        let entries = build_entries(&TrackInfo::Framed, &tables, 600).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].offset, 100);
        assert_eq!(entries[1].timestamp, Rational::new(1, 3));
        assert_eq!(entries[1].duration, Rational::new(1, 6));
        assert!(entries[1].keyframe);
    }

    #[test]
    fn test_audio_entries_follow_frame_counts() {
        let tables = SampleTables {
            time_to_sample: vec![(6000, 1)],
            sample_size: 4,
            sample_count: 6000,
            sample_to_chunk: vec![(1, 2000, 1)],
            chunk_offsets: vec![0, 8000, 16000],
            ..Default::default()
        };
        let info = TrackInfo::Audio {
            rate: 8000,
            block_align: 4,
        };
        let entries = build_entries(&info, &tables, 8000).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].timestamp, Rational::new(1, 2));
        assert_eq!(entries[2].size, 8000);
    }

    #[test]
    fn test_missing_moov() {
        let mut data = Vec::new();
        super::super::atoms::atom(&mut data, b"free", |_| {});
        let err = QuickTimeReader::open(Box::new(Cursor::new(data))).unwrap_err();
        assert!(matches!(err, Error::Container(ContainerError::MissingElement(_))));
    }
}
