//! Amiga IFF (8SVX) container support.
//!
//! Layout written and read:
//!
//! ```text
//! FORM '8SVX'
//!   VHDR
//!   CHAN (optional, read only)
//!   BODY
//! ```
//!
//! IFF shares the RIFF chunk shape with big-endian sizes. Only uncompressed
//! mono 8SVX is handled: one audio track of signed 8-bit samples.

mod reader;
mod writer;

pub use reader::IffReader;
pub use writer::IffWriter;

use crate::riff::chunks::{ChunkHeader, FourCC};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use spool_core::{Error, Result};
use std::io::{self, Cursor, Read, Write};

/// Well-known IFF chunk IDs
pub mod chunk_ids {
    use crate::riff::chunks::FourCC;

    pub const FORM: FourCC = FourCC(*b"FORM");
    pub const SVX8: FourCC = FourCC(*b"8SVX");
    pub const VHDR: FourCC = FourCC(*b"VHDR");
    pub const CHAN: FourCC = FourCC(*b"CHAN");
    pub const BODY: FourCC = FourCC(*b"BODY");
}

/// Read a big-endian chunk header, or `None` at a clean end of input.
pub fn read_header<R: Read + ?Sized>(reader: &mut R) -> Result<Option<ChunkHeader>> {
    let mut id = [0u8; 4];
    match reader.read_exact(&mut id) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    Ok(Some(ChunkHeader {
        id: FourCC(id),
        size: reader.read_u32::<BigEndian>()?,
    }))
}

/// Write a chunk with a big-endian size and word padding.
pub fn write_chunk<W: Write + ?Sized>(writer: &mut W, id: FourCC, data: &[u8]) -> io::Result<()> {
    writer.write_all(id.as_bytes())?;
    writer.write_u32::<BigEndian>(data.len() as u32)?;
    writer.write_all(data)?;
    if data.len() % 2 != 0 {
        writer.write_all(&[0])?;
    }
    Ok(())
}

/// Voice header (`VHDR`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceHeader {
    /// Samples in the one-shot part of the voice.
    pub one_shot_samples: u32,
    /// Samples in the repeating part.
    pub repeat_samples: u32,
    pub samples_per_cycle: u32,
    pub samples_per_sec: u16,
    /// Number of octaves stored in `BODY`.
    pub octaves: u8,
    /// 0 for none, 1 for Fibonacci delta.
    pub compression: u8,
    /// Playback volume, 16.16 fixed point.
    pub volume: u32,
}

impl VoiceHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 20;

    /// Full playback volume.
    pub const UNITY_VOLUME: u32 = 0x0001_0000;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(Self::SIZE);
        data.extend_from_slice(&self.one_shot_samples.to_be_bytes());
        data.extend_from_slice(&self.repeat_samples.to_be_bytes());
        data.extend_from_slice(&self.samples_per_cycle.to_be_bytes());
        data.extend_from_slice(&self.samples_per_sec.to_be_bytes());
        data.push(self.octaves);
        data.push(self.compression);
        data.extend_from_slice(&self.volume.to_be_bytes());
        data
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::invalid_structure("VHDR chunk too short"));
        }
        let mut c = Cursor::new(data);
        Ok(VoiceHeader {
            one_shot_samples: c.read_u32::<BigEndian>()?,
            repeat_samples: c.read_u32::<BigEndian>()?,
            samples_per_cycle: c.read_u32::<BigEndian>()?,
            samples_per_sec: c.read_u16::<BigEndian>()?,
            octaves: c.read_u8()?,
            compression: c.read_u8()?,
            volume: c.read_u32::<BigEndian>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_header_layout() {
        let header = VoiceHeader {
            one_shot_samples: 0x0102_0304,
            samples_per_sec: 8000,
            octaves: 1,
            volume: VoiceHeader::UNITY_VOLUME,
            ..VoiceHeader::default()
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), VoiceHeader::SIZE);
        assert_eq!(&bytes[..4], &[1, 2, 3, 4]);
        assert_eq!(&bytes[12..14], &8000u16.to_be_bytes());
        assert_eq!(VoiceHeader::parse(&bytes).unwrap(), header);
        assert!(VoiceHeader::parse(&bytes[..12]).is_err());
    }

    #[test]
    fn test_chunk_sizes_are_big_endian() {
        let mut out = Vec::new();
        write_chunk(&mut out, chunk_ids::BODY, &[1, 2, 3]).unwrap();
        assert_eq!(out, b"BODY\0\0\0\x03\x01\x02\x03\0");

        let header = read_header(&mut Cursor::new(&out)).unwrap().unwrap();
        assert_eq!(header.id, chunk_ids::BODY);
        assert_eq!(header.size, 3);
        assert_eq!(header.padded_size(), 4);
        assert!(read_header(&mut Cursor::new(&[] as &[u8])).unwrap().is_none());
    }
}
