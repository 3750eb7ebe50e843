//! Container detection from leading bytes.

use spool_core::FileKind;

/// Atom types that may open a QuickTime file.
const QUICKTIME_LEADING_ATOMS: &[&[u8; 4]] = &[b"ftyp", b"moov", b"mdat", b"wide", b"free", b"skip"];

/// Number of leading bytes [`probe`] needs.
pub const PROBE_LEN: usize = 12;

/// Detect the container kind from the first bytes of a file.
pub fn probe(head: &[u8]) -> Option<FileKind> {
    if head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"AVI " {
        return Some(FileKind::Avi);
    }
    if head.len() >= 12 && &head[0..4] == b"FORM" && &head[8..12] == b"8SVX" {
        return Some(FileKind::Iff);
    }
    if head.len() >= 8 {
        let kind = &head[4..8];
        if QUICKTIME_LEADING_ATOMS.iter().any(|a| &a[..] == kind) {
            return Some(FileKind::QuickTime);
        }
    }
    None
}
