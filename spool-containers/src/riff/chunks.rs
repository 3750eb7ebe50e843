//! RIFF chunk primitives and AVI header structures.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use spool_core::{Error, Result};
use std::borrow::Cow;
use std::io::{self, Cursor, Read, Write};

/// FourCC (Four Character Code) identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create from a four-byte ASCII name.
    pub fn from_name(name: &str) -> Option<Self> {
        <[u8; 4]>::try_from(name.as_bytes()).ok().map(FourCC)
    }

    /// Get as string
    pub fn as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl std::fmt::Debug for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FourCC(\"{}\")", self.as_str())
    }
}

impl std::fmt::Display for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_str())
    }
}

/// Well-known chunk IDs
pub mod chunk_ids {
    use super::FourCC;

    pub const RIFF: FourCC = FourCC(*b"RIFF");
    pub const AVI: FourCC = FourCC(*b"AVI ");
    pub const LIST: FourCC = FourCC(*b"LIST");
    pub const HDRL: FourCC = FourCC(*b"hdrl");
    pub const AVIH: FourCC = FourCC(*b"avih");
    pub const STRL: FourCC = FourCC(*b"strl");
    pub const STRH: FourCC = FourCC(*b"strh");
    pub const STRF: FourCC = FourCC(*b"strf");
    pub const MOVI: FourCC = FourCC(*b"movi");
    pub const IDX1: FourCC = FourCC(*b"idx1");
    pub const JUNK: FourCC = FourCC(*b"JUNK");
    pub const REC: FourCC = FourCC(*b"rec ");

    /// Stream header types.
    pub const VIDS: FourCC = FourCC(*b"vids");
    pub const AUDS: FourCC = FourCC(*b"auds");
    pub const TXTS: FourCC = FourCC(*b"txts");
}

/// Payload kind of a stream data chunk such as `00dc` or `01wb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// Compressed video frame (`dc`)
    Video,
    /// Uncompressed video frame (`db`)
    RawVideo,
    /// Audio data (`wb`)
    Audio,
    /// Text (`tx`)
    Text,
}

impl ChunkKind {
    fn suffix(self) -> [u8; 2] {
        match self {
            ChunkKind::Video => *b"dc",
            ChunkKind::RawVideo => *b"db",
            ChunkKind::Audio => *b"wb",
            ChunkKind::Text => *b"tx",
        }
    }

    /// Build the chunk ID for `stream`.
    pub fn chunk_id(self, stream: u16) -> FourCC {
        let suffix = self.suffix();
        FourCC([
            b'0' + (stream / 10) as u8,
            b'0' + (stream % 10) as u8,
            suffix[0],
            suffix[1],
        ])
    }

    /// Split a data chunk ID into stream number and kind.
    pub fn parse(id: FourCC) -> Option<(u16, ChunkKind)> {
        let b = id.as_bytes();
        if !(b[0].is_ascii_digit() && b[1].is_ascii_digit()) {
            return None;
        }
        let stream = (b[0] - b'0') as u16 * 10 + (b[1] - b'0') as u16;
        let kind = match &b[2..4] {
            b"dc" | b"DC" => ChunkKind::Video,
            b"db" | b"DB" => ChunkKind::RawVideo,
            b"wb" | b"WB" => ChunkKind::Audio,
            b"tx" | b"TX" => ChunkKind::Text,
            _ => return None,
        };
        Some((stream, kind))
    }
}

/// Chunk header: ID and unpadded payload size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: FourCC,
    pub size: u32,
}

impl ChunkHeader {
    /// Read a header, or `None` at a clean end of input.
    pub fn read<R: Read + ?Sized>(reader: &mut R) -> Result<Option<Self>> {
        let mut header = [0u8; 8];
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        Ok(Some(ChunkHeader {
            id: FourCC([header[0], header[1], header[2], header[3]]),
            size: u32::from_le_bytes([header[4], header[5], header[6], header[7]]),
        }))
    }

    /// Payload size rounded up to the word boundary.
    pub fn padded_size(&self) -> u64 {
        (self.size as u64 + 1) & !1
    }
}

/// Write a chunk with word padding.
pub fn write_chunk<W: Write + ?Sized>(writer: &mut W, id: FourCC, data: &[u8]) -> io::Result<()> {
    writer.write_all(id.as_bytes())?;
    writer.write_u32::<LittleEndian>(data.len() as u32)?;
    writer.write_all(data)?;
    if data.len() % 2 != 0 {
        writer.write_all(&[0])?;
    }
    Ok(())
}

/// Total on-disk size of a chunk with `len` payload bytes.
pub fn chunk_size(len: usize) -> u64 {
    8 + ((len as u64 + 1) & !1)
}

/// Iterate the chunks of an in-memory LIST body (after the list type).
pub fn sub_chunks(data: &[u8]) -> impl Iterator<Item = (FourCC, &[u8])> {
    let mut offset = 0usize;
    std::iter::from_fn(move || {
        if offset + 8 > data.len() {
            return None;
        }
        let id = FourCC([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]]);
        let size = u32::from_le_bytes([
            data[offset + 4],
            data[offset + 5],
            data[offset + 6],
            data[offset + 7],
        ]) as usize;
        let start = offset + 8;
        let end = start.checked_add(size).filter(|&e| e <= data.len())?;
        offset = end + (size & 1);
        Some((id, &data[start..end]))
    })
}

/// AVI index entry (idx1 format)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Chunk ID
    pub chunk_id: FourCC,
    /// Flags
    pub flags: u32,
    /// Offset of the chunk header from the `movi` list type
    pub offset: u32,
    /// Size of chunk data
    pub size: u32,
}

impl IndexEntry {
    /// Index flags
    pub const KEYFRAME: u32 = 0x10;

    /// Encoded size in bytes.
    pub const SIZE: usize = 16;

    /// Parse an entry from 16 bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let mut id = [0u8; 4];
        cursor.read_exact(&mut id)?;
        Ok(IndexEntry {
            chunk_id: FourCC(id),
            flags: cursor.read_u32::<LittleEndian>()?,
            offset: cursor.read_u32::<LittleEndian>()?,
            size: cursor.read_u32::<LittleEndian>()?,
        })
    }

    /// Write to writer
    pub fn write<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(self.chunk_id.as_bytes())?;
        writer.write_u32::<LittleEndian>(self.flags)?;
        writer.write_u32::<LittleEndian>(self.offset)?;
        writer.write_u32::<LittleEndian>(self.size)
    }

    /// Check if this is a keyframe
    pub fn is_keyframe(&self) -> bool {
        (self.flags & Self::KEYFRAME) != 0
    }
}

/// Parse an idx1 body. A trailing partial entry is ignored.
pub fn parse_index(data: &[u8]) -> Result<Vec<IndexEntry>> {
    data.chunks_exact(IndexEntry::SIZE)
        .map(IndexEntry::parse)
        .collect()
}

/// Main AVI header (`avih`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MainHeader {
    pub micro_sec_per_frame: u32,
    pub max_bytes_per_sec: u32,
    pub flags: u32,
    pub total_frames: u32,
    pub streams: u32,
    pub suggested_buffer_size: u32,
    pub width: u32,
    pub height: u32,
}

impl MainHeader {
    pub const HAS_INDEX: u32 = 0x10;
    pub const IS_INTERLEAVED: u32 = 0x100;

    /// Byte offset of `total_frames` inside the chunk payload.
    pub const TOTAL_FRAMES_OFFSET: u64 = 16;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(56);
        for v in [
            self.micro_sec_per_frame,
            self.max_bytes_per_sec,
            0, // padding granularity
            self.flags,
            self.total_frames,
            0, // initial frames
            self.streams,
            self.suggested_buffer_size,
            self.width,
            self.height,
        ] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        data.extend_from_slice(&[0u8; 16]);
        data
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 40 {
            return Err(Error::invalid_structure("avih chunk too short"));
        }
        let mut c = Cursor::new(data);
        let micro_sec_per_frame = c.read_u32::<LittleEndian>()?;
        let max_bytes_per_sec = c.read_u32::<LittleEndian>()?;
        let _granularity = c.read_u32::<LittleEndian>()?;
        let flags = c.read_u32::<LittleEndian>()?;
        let total_frames = c.read_u32::<LittleEndian>()?;
        let _initial = c.read_u32::<LittleEndian>()?;
        Ok(MainHeader {
            micro_sec_per_frame,
            max_bytes_per_sec,
            flags,
            total_frames,
            streams: c.read_u32::<LittleEndian>()?,
            suggested_buffer_size: c.read_u32::<LittleEndian>()?,
            width: c.read_u32::<LittleEndian>()?,
            height: c.read_u32::<LittleEndian>()?,
        })
    }
}

/// Stream header (`strh`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    pub fcc_type: FourCC,
    pub handler: FourCC,
    pub flags: u32,
    pub scale: u32,
    pub rate: u32,
    pub start: u32,
    pub length: u32,
    pub suggested_buffer_size: u32,
    pub sample_size: u32,
}

impl StreamHeader {
    /// Byte offset of `length` inside the chunk payload.
    pub const LENGTH_OFFSET: u64 = 32;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(56);
        data.extend_from_slice(self.fcc_type.as_bytes());
        data.extend_from_slice(self.handler.as_bytes());
        data.extend_from_slice(&self.flags.to_le_bytes());
        data.extend_from_slice(&[0u8; 4]); // priority, language
        data.extend_from_slice(&0u32.to_le_bytes()); // initial frames
        for v in [
            self.scale,
            self.rate,
            self.start,
            self.length,
            self.suggested_buffer_size,
        ] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        data.extend_from_slice(&u32::MAX.to_le_bytes()); // quality: default
        data.extend_from_slice(&self.sample_size.to_le_bytes());
        data.extend_from_slice(&[0u8; 8]); // frame rect
        data
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 48 {
            return Err(Error::invalid_structure("strh chunk too short"));
        }
        let mut c = Cursor::new(data);
        let mut fcc_type = [0u8; 4];
        let mut handler = [0u8; 4];
        c.read_exact(&mut fcc_type)?;
        c.read_exact(&mut handler)?;
        let flags = c.read_u32::<LittleEndian>()?;
        let _priority_language = c.read_u32::<LittleEndian>()?;
        let _initial = c.read_u32::<LittleEndian>()?;
        let scale = c.read_u32::<LittleEndian>()?;
        let rate = c.read_u32::<LittleEndian>()?;
        let start = c.read_u32::<LittleEndian>()?;
        let length = c.read_u32::<LittleEndian>()?;
        let suggested_buffer_size = c.read_u32::<LittleEndian>()?;
        let _quality = c.read_u32::<LittleEndian>()?;
        let sample_size = c.read_u32::<LittleEndian>()?;
        Ok(StreamHeader {
            fcc_type: FourCC(fcc_type),
            handler: FourCC(handler),
            flags,
            scale,
            rate,
            start,
            length,
            suggested_buffer_size,
            sample_size,
        })
    }
}

/// BITMAPINFOHEADER plus an optional RGBQUAD palette.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmapInfo {
    pub width: i32,
    pub height: i32,
    pub bit_count: u16,
    /// `None` for uncompressed RGB.
    pub compression: Option<FourCC>,
    pub image_size: u32,
    /// RGB triples.
    pub palette: Vec<u8>,
}

impl BitmapInfo {
    const HEADER_SIZE: u32 = 40;

    pub fn to_bytes(&self) -> Vec<u8> {
        let colors = (self.palette.len() / 3) as u32;
        let mut data = Vec::with_capacity(Self::HEADER_SIZE as usize + colors as usize * 4);
        data.extend_from_slice(&Self::HEADER_SIZE.to_le_bytes());
        data.extend_from_slice(&self.width.to_le_bytes());
        data.extend_from_slice(&self.height.to_le_bytes());
        data.extend_from_slice(&1u16.to_le_bytes()); // planes
        data.extend_from_slice(&self.bit_count.to_le_bytes());
        data.extend_from_slice(&self.compression.map_or([0u8; 4], |c| c.0));
        data.extend_from_slice(&self.image_size.to_le_bytes());
        data.extend_from_slice(&[0u8; 8]); // pixels per meter
        data.extend_from_slice(&colors.to_le_bytes());
        data.extend_from_slice(&colors.to_le_bytes());
        for rgb in self.palette.chunks_exact(3) {
            data.extend_from_slice(&[rgb[2], rgb[1], rgb[0], 0]);
        }
        data
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::HEADER_SIZE as usize {
            return Err(Error::invalid_structure("strf video format too short"));
        }
        let mut c = Cursor::new(data);
        let header_size = c.read_u32::<LittleEndian>()? as usize;
        let width = c.read_i32::<LittleEndian>()?;
        let height = c.read_i32::<LittleEndian>()?;
        let _planes = c.read_u16::<LittleEndian>()?;
        let bit_count = c.read_u16::<LittleEndian>()?;
        let mut compression = [0u8; 4];
        c.read_exact(&mut compression)?;
        let image_size = c.read_u32::<LittleEndian>()?;
        let _ppm = c.read_u64::<LittleEndian>()?;
        let clr_used = c.read_u32::<LittleEndian>()? as usize;

        let quads = data.get(header_size.max(Self::HEADER_SIZE as usize)..).unwrap_or(&[]);
        let colors = if clr_used == 0 && bit_count <= 8 {
            quads.len() / 4
        } else {
            clr_used.min(quads.len() / 4)
        };
        let palette = quads
            .chunks_exact(4)
            .take(colors)
            .flat_map(|q| [q[2], q[1], q[0]])
            .collect();

        Ok(BitmapInfo {
            width,
            height,
            bit_count,
            compression: (compression != [0u8; 4]).then_some(FourCC(compression)),
            image_size,
            palette,
        })
    }
}

/// PCM WAVEFORMATEX.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveFormat {
    pub format_tag: u16,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl WaveFormat {
    pub const PCM: u16 = 1;

    /// Describe integer PCM.
    pub fn pcm(channels: u16, samples_per_sec: u32, bits_per_sample: u16) -> Self {
        let block_align = channels * bits_per_sample.div_ceil(8);
        WaveFormat {
            format_tag: Self::PCM,
            channels,
            samples_per_sec,
            avg_bytes_per_sec: samples_per_sec * block_align as u32,
            block_align,
            bits_per_sample,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(18);
        data.extend_from_slice(&self.format_tag.to_le_bytes());
        data.extend_from_slice(&self.channels.to_le_bytes());
        data.extend_from_slice(&self.samples_per_sec.to_le_bytes());
        data.extend_from_slice(&self.avg_bytes_per_sec.to_le_bytes());
        data.extend_from_slice(&self.block_align.to_le_bytes());
        data.extend_from_slice(&self.bits_per_sample.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes()); // extra size
        data
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 16 {
            return Err(Error::invalid_structure("strf audio format too short"));
        }
        let mut c = Cursor::new(data);
        Ok(WaveFormat {
            format_tag: c.read_u16::<LittleEndian>()?,
            channels: c.read_u16::<LittleEndian>()?,
            samples_per_sec: c.read_u32::<LittleEndian>()?,
            avg_bytes_per_sec: c.read_u32::<LittleEndian>()?,
            block_align: c.read_u16::<LittleEndian>()?,
            bits_per_sample: c.read_u16::<LittleEndian>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc() {
        let fourcc = FourCC::from_name("AVI ").unwrap();
        assert_eq!(fourcc, chunk_ids::AVI);
        assert_eq!(fourcc.as_str(), "AVI ");
        assert!(FourCC::from_name("AVI").is_none());
    }

    #[test]
    fn test_stream_chunk_ids() {
        assert_eq!(ChunkKind::Video.chunk_id(0).as_bytes(), b"00dc");
        assert_eq!(ChunkKind::Audio.chunk_id(12).as_bytes(), b"12wb");
        assert_eq!(ChunkKind::parse(FourCC(*b"03tx")), Some((3, ChunkKind::Text)));
        assert_eq!(ChunkKind::parse(FourCC(*b"01db")), Some((1, ChunkKind::RawVideo)));
        assert_eq!(ChunkKind::parse(chunk_ids::AVIH), None);
        assert_eq!(ChunkKind::parse(FourCC(*b"00ix")), None);
    }

    #[test]
    fn test_chunk_padding() {
        let mut out = Vec::new();
        write_chunk(&mut out, FourCC(*b"test"), &[1, 2, 3]).unwrap();
        assert_eq!(out.len() as u64, chunk_size(3));
        assert_eq!(out.len(), 12);

        let header = ChunkHeader::read(&mut Cursor::new(&out)).unwrap().unwrap();
        assert_eq!(header.size, 3);
        assert_eq!(header.padded_size(), 4);
        assert!(ChunkHeader::read(&mut Cursor::new(&[][..])).unwrap().is_none());
    }

    #[test]
    fn test_sub_chunks() {
        let mut body = Vec::new();
        write_chunk(&mut body, chunk_ids::STRH, &[7; 5]).unwrap();
        write_chunk(&mut body, chunk_ids::STRF, &[9; 2]).unwrap();
        let found: Vec<_> = sub_chunks(&body).collect();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], (chunk_ids::STRH, &[7u8; 5][..]));
        assert_eq!(found[1], (chunk_ids::STRF, &[9u8; 2][..]));
    }

    #[test]
    fn test_index_entries() {
        let entry = IndexEntry {
            chunk_id: FourCC(*b"00dc"),
            flags: IndexEntry::KEYFRAME,
            offset: 4,
            size: 100,
        };
        let mut data = Vec::new();
        entry.write(&mut data).unwrap();
        data.extend_from_slice(&[0; 5]);
        let parsed = parse_index(&data).unwrap();
        assert_eq!(parsed, vec![entry]);
        assert!(parsed[0].is_keyframe());
    }

    #[test]
    fn test_headers_parse_what_they_write() {
        let main = MainHeader {
            micro_sec_per_frame: 33_333,
            flags: MainHeader::HAS_INDEX,
            total_frames: 9,
            streams: 2,
            width: 320,
            height: 240,
            ..Default::default()
        };
        let bytes = main.to_bytes();
        assert_eq!(bytes.len(), 56);
        assert_eq!(
            &bytes[MainHeader::TOTAL_FRAMES_OFFSET as usize..][..4],
            &9u32.to_le_bytes()
        );
        assert_eq!(MainHeader::parse(&bytes).unwrap(), main);

        let strh = StreamHeader {
            fcc_type: chunk_ids::VIDS,
            handler: FourCC(*b"scrn"),
            flags: 0,
            scale: 1,
            rate: 30,
            start: 0,
            length: 42,
            suggested_buffer_size: 0,
            sample_size: 0,
        };
        let bytes = strh.to_bytes();
        assert_eq!(bytes.len(), 56);
        assert_eq!(
            &bytes[StreamHeader::LENGTH_OFFSET as usize..][..4],
            &42u32.to_le_bytes()
        );
        assert_eq!(StreamHeader::parse(&bytes).unwrap(), strh);
    }

    #[test]
    fn test_bitmap_palette_is_stored_as_bgr_quads() {
        let info = BitmapInfo {
            width: 4,
            height: 2,
            bit_count: 8,
            compression: None,
            image_size: 8,
            palette: vec![10, 20, 30, 40, 50, 60],
        };
        let bytes = info.to_bytes();
        assert_eq!(&bytes[40..48], &[30, 20, 10, 0, 60, 50, 40, 0]);
        assert_eq!(BitmapInfo::parse(&bytes).unwrap(), info);
    }

    #[test]
    fn test_wave_format() {
        let wf = WaveFormat::pcm(2, 8000, 16);
        assert_eq!(wf.block_align, 4);
        assert_eq!(wf.avg_bytes_per_sec, 32_000);
        assert_eq!(WaveFormat::parse(&wf.to_bytes()).unwrap(), wf);
    }
}
