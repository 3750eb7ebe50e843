//! 8SVX reader.

use super::{chunk_ids, read_header, VoiceHeader};
use crate::indexed::{shared, IndexedTrack, SampleEntry, SharedSource};
use crate::traits::{ContainerReader, ReadSeek, SeekableTrack, Track};
use byteorder::{BigEndian, ReadBytesExt};
use spool_core::keys::{
    CHANNELS, ENCODING, FILE_KIND, MIME_TYPE, SAMPLE_RATE, SAMPLE_SIZE_BITS, SIGNED,
};
use spool_core::{encoding, Error, FileKind, FormatDescriptor, MediaType, Rational, Result};
use std::io::{Read, Seek, SeekFrom};
use tracing::debug;

/// `CHAN` values for a single channel.
const CHAN_LEFT: u32 = 2;
const CHAN_RIGHT: u32 = 4;

/// Samples are served in blocks of this fraction of a second.
const BLOCKS_PER_SEC: u32 = 10;

/// IFF 8SVX container reader
pub struct IffReader {
    file_format: FormatDescriptor,
    voice: VoiceHeader,
    tracks: Vec<IndexedTrack>,
    source: SharedSource,
}

impl IffReader {
    /// Parse the `FORM` of an 8SVX file.
    pub fn open(mut source: Box<dyn ReadSeek>) -> Result<Self> {
        let form = read_header(&mut source)?
            .filter(|h| h.id == chunk_ids::FORM)
            .ok_or_else(|| Error::invalid_structure("not an IFF FORM"))?;
        let mut form_type = [0u8; 4];
        source.read_exact(&mut form_type)?;
        if form_type != chunk_ids::SVX8.0 {
            return Err(Error::unsupported(format!(
                "IFF FORM type {:?}",
                String::from_utf8_lossy(&form_type)
            )));
        }
        let end = 8 + form.size as u64;

        let mut voice = None;
        let mut body = None;
        while source.stream_position()? + 8 <= end {
            let Some(header) = read_header(&mut source)? else {
                break;
            };
            let start = source.stream_position()?;
            match header.id {
                chunk_ids::VHDR => {
                    let mut data = vec![0u8; header.size as usize];
                    source.read_exact(&mut data)?;
                    voice = Some(VoiceHeader::parse(&data)?);
                }
                chunk_ids::CHAN => {
                    let chan = source.read_u32::<BigEndian>()?;
                    if chan != CHAN_LEFT && chan != CHAN_RIGHT {
                        return Err(Error::unsupported(format!("8SVX channel layout {chan}")));
                    }
                }
                chunk_ids::BODY => body = Some((start, header.size)),
                _ => {}
            }
            source.seek(SeekFrom::Start(start + header.padded_size()))?;
        }

        let voice = voice.ok_or_else(|| Error::invalid_structure("8SVX has no VHDR"))?;
        let (body_start, body_size) =
            body.ok_or_else(|| Error::invalid_structure("8SVX has no BODY"))?;
        if voice.compression != 0 {
            return Err(Error::unsupported(format!(
                "8SVX compression {}",
                voice.compression
            )));
        }
        let rate = voice.samples_per_sec as u32;
        if rate == 0 {
            return Err(Error::invalid_structure("8SVX with zero sample rate"));
        }

        let format = FormatDescriptor::of(MediaType::Audio)
            .with(ENCODING, encoding::PCM)
            .with(SAMPLE_RATE, rate)
            .with(CHANNELS, 1u32)
            .with(SAMPLE_SIZE_BITS, 8u32)
            .with(SIGNED, true);
        let entries = blocks(body_start, body_size, rate);
        debug!(
            rate,
            samples = body_size,
            blocks = entries.len(),
            "8SVX opened"
        );

        let source = shared(source);
        Ok(IffReader {
            file_format: FormatDescriptor::of(MediaType::File)
                .with(FILE_KIND, FileKind::Iff)
                .with(MIME_TYPE, FileKind::Iff.mime_type()),
            voice,
            tracks: vec![IndexedTrack::new(0, format, entries, source.clone())],
            source,
        })
    }

    /// The `VHDR` header.
    pub fn voice_header(&self) -> &VoiceHeader {
        &self.voice
    }
}

/// Cut `size` one-byte samples starting at `offset` into timed blocks.
fn blocks(offset: u64, size: u32, rate: u32) -> Vec<SampleEntry> {
    let block = (rate / BLOCKS_PER_SEC).max(1);
    (0..size)
        .step_by(block as usize)
        .map(|at| {
            let len = block.min(size - at);
            SampleEntry {
                offset: offset + at as u64,
                size: len,
                timestamp: Rational::new(at as i64, rate as i64),
                duration: Rational::new(len as i64, rate as i64),
                keyframe: true,
            }
        })
        .collect()
}

impl ContainerReader for IffReader {
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
            debug!("8SVX reader closed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for IffReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IffReader")
            .field("voice", &self.voice)
            .field("tracks", &self.tracks)
            .finish()
    }
}
