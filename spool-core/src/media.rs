//! Media and file kind definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of elementary stream a descriptor describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Video frames.
    Video,
    /// Audio sample frames.
    Audio,
    /// Captions and other timed text.
    Text,
    /// A whole file (file-level descriptors).
    File,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Text => write!(f, "text"),
            Self::File => write!(f, "file"),
        }
    }
}

/// Container file kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum FileKind {
    /// RIFF-based Audio Video Interleave.
    Avi,
    /// Atom-based QuickTime movie.
    QuickTime,
    /// Amiga IFF `FORM` holding 8SVX sampled sound.
    Iff,
}

impl FileKind {
    /// Get the typical file extension for this kind.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Avi => "avi",
            Self::QuickTime => "mov",
            Self::Iff => "iff",
        }
    }

    /// Get the MIME type for this kind.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Avi => "video/avi",
            Self::QuickTime => "video/quicktime",
            Self::Iff => "audio/x-8svx",
        }
    }

    /// Try to detect the kind from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "avi" => Some(Self::Avi),
            "mov" | "qt" => Some(Self::QuickTime),
            "iff" | "8svx" | "svx" => Some(Self::Iff),
            _ => None,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avi => write!(f, "AVI"),
            Self::QuickTime => write!(f, "QuickTime"),
            Self::Iff => write!(f, "IFF"),
        }
    }
}

/// Byte order of multi-byte samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Least significant byte first.
    #[default]
    Little,
    /// Most significant byte first.
    Big,
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Little => write!(f, "le"),
            Self::Big => write!(f, "be"),
        }
    }
}

/// Well-known values for the `encoding` key.
pub mod encoding {
    /// Uncompressed pixels; layout follows the `depth` key.
    pub const RAW_VIDEO: &str = "raw ";
    /// Screen-capture run-length delta codec.
    pub const SCREEN: &str = "scrn";
    /// Linear PCM audio.
    pub const PCM: &str = "pcm ";
    /// A text buffer holding one or more SRT-style cues.
    pub const SRT: &str = "srt ";
    /// A text buffer holding exactly one cue body.
    pub const CUE: &str = "cue ";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_kind_from_extension() {
        assert_eq!(FileKind::from_extension("AVI"), Some(FileKind::Avi));
        assert_eq!(FileKind::from_extension(".mov"), Some(FileKind::QuickTime));
        assert_eq!(FileKind::from_extension("8SVX"), Some(FileKind::Iff));
        assert_eq!(FileKind::from_extension("mkv"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(MediaType::Video.to_string(), "video");
        assert_eq!(FileKind::QuickTime.to_string(), "QuickTime");
        assert_eq!(ByteOrder::Big.to_string(), "be");
    }
}
