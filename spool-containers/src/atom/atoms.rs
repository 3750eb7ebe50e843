//! QuickTime atom parsing and building.

use byteorder::{BigEndian, ByteOrder as _, ReadBytesExt};
use bytes::BufMut;
use spool_core::{ContainerError, Error, Result};
use std::io::{self, Cursor, Read, Seek, SeekFrom};

/// Atom header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomHeader {
    /// Atom type (4 bytes).
    pub atom_type: [u8; 4],
    /// Atom size (including header).
    pub size: u64,
    /// Header size (8 or 16 bytes).
    pub header_size: u8,
    /// Offset in file.
    pub offset: u64,
}

impl AtomHeader {
    /// Read atom header from reader.
    pub fn read<R: Read + Seek + ?Sized>(reader: &mut R) -> Result<Option<Self>> {
        let offset = reader.stream_position()?;

        let mut header = [0u8; 8];
        match reader.read_exact(&mut header) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let size = BigEndian::read_u32(&header[0..4]);
        let atom_type = [header[4], header[5], header[6], header[7]];

        let (size, header_size) = match size {
            1 => (reader.read_u64::<BigEndian>()?, 16),
            0 => {
                // Size extends to end of file
                let current = reader.stream_position()?;
                let end = reader.seek(SeekFrom::End(0))?;
                reader.seek(SeekFrom::Start(current))?;
                (end - offset, 8)
            }
            n => (n as u64, 8),
        };
        if size < header_size as u64 {
            return Err(Error::invalid_structure(format!(
                "atom '{}' at {offset} has size {size}",
                String::from_utf8_lossy(&atom_type)
            )));
        }

        Ok(Some(Self {
            atom_type,
            size,
            header_size,
            offset,
        }))
    }

    /// Get content size (size - header).
    pub fn content_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size as u64)
    }

    /// Get content offset.
    pub fn content_offset(&self) -> u64 {
        self.offset + self.header_size as u64
    }

    /// Offset just past this atom.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Append an atom whose body is produced by `body`; the size is patched.
pub fn atom(buf: &mut Vec<u8>, kind: &[u8; 4], body: impl FnOnce(&mut Vec<u8>)) {
    let start = buf.len();
    buf.put_u32(0);
    buf.put_slice(kind);
    body(buf);
    let size = (buf.len() - start) as u32;
    BigEndian::write_u32(&mut buf[start..start + 4], size);
}

/// Append a full atom (version and flags precede the body).
pub fn full_atom(buf: &mut Vec<u8>, kind: &[u8; 4], version: u8, flags: u32, body: impl FnOnce(&mut Vec<u8>)) {
    atom(buf, kind, |buf| {
        buf.put_u32((version as u32) << 24 | (flags & 0x00FF_FFFF));
        body(buf);
    });
}

/// Append the identity transformation matrix.
pub fn put_matrix(buf: &mut Vec<u8>) {
    for v in [0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
        buf.put_u32(v);
    }
}

/// Append a Pascal string padded to `len` bytes.
pub fn put_pascal(buf: &mut Vec<u8>, s: &str, len: usize) {
    let bytes = &s.as_bytes()[..s.len().min(len - 1)];
    buf.put_u8(bytes.len() as u8);
    buf.put_slice(bytes);
    buf.put_bytes(0, len - 1 - bytes.len());
}

/// Iterate the child atoms of an in-memory container body.
pub fn children(data: &[u8]) -> impl Iterator<Item = ([u8; 4], &[u8])> {
    let mut offset = 0usize;
    std::iter::from_fn(move || {
        let header = data.get(offset..offset + 8)?;
        let size = BigEndian::read_u32(&header[0..4]) as usize;
        let kind = [header[4], header[5], header[6], header[7]];
        let (start, end) = match size {
            0 => (offset + 8, data.len()),
            1 => {
                let ext = data.get(offset + 8..offset + 16)?;
                let size = usize::try_from(BigEndian::read_u64(ext)).ok()?;
                (offset + 16, offset.checked_add(size)?)
            }
            n if n >= 8 => (offset + 8, offset.checked_add(n)?),
            _ => return None,
        };
        let body = data.get(start..end)?;
        offset = end;
        Some((kind, body))
    })
}

/// Find the first child atom of `kind`.
pub fn find<'a>(data: &'a [u8], kind: &[u8; 4]) -> Option<&'a [u8]> {
    children(data).find(|(k, _)| k == kind).map(|(_, body)| body)
}

/// Follow a path of nested container atoms.
pub fn find_path<'a>(data: &'a [u8], path: &[&[u8; 4]]) -> Option<&'a [u8]> {
    path.iter().try_fold(data, |body, kind| find(body, kind))
}

/// Like [`find_path`], failing with `MissingElement` naming the path.
pub fn require_path<'a>(data: &'a [u8], path: &[&[u8; 4]]) -> Result<&'a [u8]> {
    find_path(data, path).ok_or_else(|| {
        let names: Vec<_> = path.iter().map(|k| String::from_utf8_lossy(&k[..])).collect();
        ContainerError::MissingElement(names.join("/")).into()
    })
}

/// Cursor over a full atom body, positioned after version and flags.
pub fn full_body(data: &[u8]) -> Result<(u8, Cursor<&[u8]>)> {
    let mut cursor = Cursor::new(data);
    let version_flags = cursor.read_u32::<BigEndian>()?;
    Ok(((version_flags >> 24) as u8, cursor))
}

/// Read a big-endian u32 table preceded by its entry count.
pub fn read_u32_table(cursor: &mut Cursor<&[u8]>, fields: usize) -> Result<Vec<u32>> {
    let count = cursor.read_u32::<BigEndian>()? as usize;
    let remaining = cursor.get_ref().len() as u64 - cursor.position();
    if (count * fields * 4) as u64 > remaining {
        return Err(Error::invalid_structure(format!(
            "table of {count} entries exceeds its atom"
        )));
    }
    (0..count * fields)
        .map(|_| cursor.read_u32::<BigEndian>().map_err(Error::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atom_sizes_are_patched() {
        let mut buf = Vec::new();
        atom(&mut buf, b"moov", |buf| {
            full_atom(buf, b"mvhd", 0, 0, |buf| buf.put_u32(600));
            atom(buf, b"trak", |_| {});
        });
        assert_eq!(BigEndian::read_u32(&buf[0..4]) as usize, buf.len());
        assert_eq!(&buf[4..8], b"moov");
        assert_eq!(buf.len(), 8 + 16 + 8);

        let moov = find(&buf, b"moov").unwrap();
        let kinds: Vec<_> = children(moov).map(|(k, _)| k).collect();
        assert_eq!(kinds, vec![*b"mvhd", *b"trak"]);

        let (version, mut body) = full_body(find(moov, b"mvhd").unwrap()).unwrap();
        assert_eq!(version, 0);
        assert_eq!(body.read_u32::<BigEndian>().unwrap(), 600);
    }

    #[test]
    fn test_find_path() {
        let mut buf = Vec::new();
        atom(&mut buf, b"mdia", |buf| {
            atom(buf, b"minf", |buf| atom(buf, b"stbl", |buf| buf.put_u8(7)));
        });
        assert_eq!(find_path(&buf, &[b"mdia", b"minf", b"stbl"]), Some(&[7u8][..]));
        let err = require_path(&buf, &[b"mdia", b"hdlr"]).unwrap_err();
        assert!(err.to_string().contains("mdia/hdlr"));
    }

    #[test]
    fn test_truncated_children_stop() {
        let data = [0, 0, 0, 40, b'f', b'r', b'e', b'e', 1, 2];
        assert_eq!(children(&data).count(), 0);
    }

    #[test]
    fn test_header_read() {
        let mut data = Vec::new();
        atom(&mut data, b"free", |buf| buf.put_bytes(0, 4));
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&20u64.to_be_bytes());
        data.extend_from_slice(&[9; 4]);

        let mut cursor = Cursor::new(data);
        let free = AtomHeader::read(&mut cursor).unwrap().unwrap();
        assert_eq!((&free.atom_type, free.size), (b"free", 12));
        cursor.seek(SeekFrom::Start(free.end())).unwrap();
        let mdat = AtomHeader::read(&mut cursor).unwrap().unwrap();
        assert_eq!(mdat.header_size, 16);
        assert_eq!(mdat.content_size(), 4);
        assert_eq!(mdat.content_offset(), 28);
        cursor.seek(SeekFrom::Start(mdat.end())).unwrap();
        assert!(AtomHeader::read(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_pascal_string() {
        let mut buf = Vec::new();
        put_pascal(&mut buf, "spool", 32);
        assert_eq!(buf.len(), 32);
        assert_eq!(buf[0], 5);
        assert_eq!(&buf[1..6], b"spool");
    }
}
