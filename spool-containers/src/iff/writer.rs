//! 8SVX writer.
//!
//! Samples stream straight into `BODY`; the `FORM` and `BODY` sizes and the
//! one-shot sample count in `VHDR` are patched when the writer closes.

use super::{chunk_ids, write_chunk, VoiceHeader};
use crate::traits::{AddedTrack, ContainerWriter, WriteSeek};
use byteorder::{BigEndian, WriteBytesExt};
use spool_core::keys::{
    self, BYTE_ORDER, CHANNELS, FILE_KIND, MIME_TYPE, SAMPLE_RATE, SAMPLE_SIZE_BITS,
    SIGNED,
};
use spool_core::{
    encoding, ContainerError, Error, FileKind, FormatDescriptor, MediaType, Rational, Result,
    SampleBuffer,
};
use std::io::{Seek, SeekFrom, Write};
use tracing::{debug, warn};

#[derive(Debug)]
struct Voice {
    format: FormatDescriptor,
    rate: u16,
}

/// IFF 8SVX container writer
pub struct IffWriter {
    sink: Option<Box<dyn WriteSeek>>,
    file_format: FormatDescriptor,
    voice: Option<Voice>,
    /// Position of the VHDR payload.
    vhdr_pos: u64,
    /// Position of the BODY payload.
    body_pos: u64,
    samples: u64,
    header_written: bool,
    closed: bool,
}

impl IffWriter {
    /// Create a writer.
    pub fn new(sink: Box<dyn WriteSeek>) -> Self {
        IffWriter {
            sink: Some(sink),
            file_format: FormatDescriptor::of(MediaType::File)
                .with(FILE_KIND, FileKind::Iff)
                .with(MIME_TYPE, FileKind::Iff.mime_type()),
            voice: None,
            vhdr_pos: 0,
            body_pos: 0,
            samples: 0,
            header_written: false,
            closed: false,
        }
    }

    fn sink(&mut self) -> Result<&mut Box<dyn WriteSeek>> {
        self.sink.as_mut().ok_or_else(|| ContainerError::Closed.into())
    }

    fn write_header(&mut self) -> Result<()> {
        if self.header_written {
            return Ok(());
        }
        let rate = self
            .voice
            .as_ref()
            .map(|v| v.rate)
            .ok_or_else(|| Error::invalid_param("8SVX needs an audio track"))?;
        let vhdr = VoiceHeader {
            samples_per_sec: rate,
            octaves: 1,
            volume: VoiceHeader::UNITY_VOLUME,
            ..VoiceHeader::default()
        };

        let sink = self.sink()?;
        sink.write_all(chunk_ids::FORM.as_bytes())?;
        sink.write_u32::<BigEndian>(0)?;
        sink.write_all(chunk_ids::SVX8.as_bytes())?;
        let vhdr_pos = sink.stream_position()? + 8;
        write_chunk(sink, chunk_ids::VHDR, &vhdr.to_bytes())?;
        sink.write_all(chunk_ids::BODY.as_bytes())?;
        sink.write_u32::<BigEndian>(0)?;
        let body_pos = sink.stream_position()?;

        self.vhdr_pos = vhdr_pos;
        self.body_pos = body_pos;
        self.header_written = true;
        debug!(rate, "8SVX header written");
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.write_header()?;
        let (vhdr_pos, body_pos) = (self.vhdr_pos, self.body_pos);
        let samples = to_u32(self.samples, "sample count")?;

        let sink = self.sink()?;
        if samples % 2 != 0 {
            sink.write_all(&[0])?;
        }
        let file_end = sink.stream_position()?;
        patch_u32(sink, 4, to_u32(file_end - 8, "FORM size")?)?;
        patch_u32(sink, vhdr_pos, samples)?;
        patch_u32(sink, body_pos - 4, samples)?;
        sink.seek(SeekFrom::Start(file_end))?;
        sink.flush()?;

        debug!(size = file_end, samples, "8SVX finalized");
        Ok(())
    }
}

fn to_u32(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::invalid_structure(format!("{what} {value} overflows IFF field")))
}

fn patch_u32(sink: &mut Box<dyn WriteSeek>, pos: u64, value: u32) -> Result<()> {
    sink.seek(SeekFrom::Start(pos))?;
    sink.write_u32::<BigEndian>(value)?;
    Ok(())
}

impl ContainerWriter for IffWriter {
    fn file_format(&self) -> &FormatDescriptor {
        &self.file_format
    }

    fn add_track(&mut self, format: &FormatDescriptor) -> Result<AddedTrack> {
        if self.closed {
            return Err(ContainerError::Closed.into());
        }
        if self.voice.is_some() {
            return Err(Error::unsupported("8SVX holds a single audio track"));
        }
        if format.media_type() != Some(MediaType::Audio) || !format.has_encoding(encoding::PCM) {
            return Err(Error::mismatch(format!("8SVX stores PCM audio only, got {format}")));
        }
        let pattern = FormatDescriptor::of(MediaType::Audio)
            .with(SAMPLE_SIZE_BITS, 8u32)
            .with(SIGNED, true)
            .with(CHANNELS, 1u32);
        if let Some(conflict) = format.mismatch(&pattern) {
            return Err(Error::mismatch(format!("8SVX layout: {conflict}")));
        }
        let format = format.without(BYTE_ORDER).refine(&pattern);
        format.require_flagged(keys::AUDIO)?;

        let rate = format.require(SAMPLE_RATE)?;
        let rate = u16::try_from(rate)
            .ok()
            .filter(|&r| r > 0)
            .ok_or_else(|| Error::invalid_param(format!("8SVX sample rate {rate} Hz")))?;

        debug!(rate, "8SVX track added");
        self.voice = Some(Voice {
            format: format.clone(),
            rate,
        });
        Ok(AddedTrack { index: 0, format })
    }

    fn track_count(&self) -> usize {
        usize::from(self.voice.is_some())
    }

    fn track_format(&self, index: usize) -> Option<&FormatDescriptor> {
        self.voice.as_ref().filter(|_| index == 0).map(|v| &v.format)
    }

    fn write(&mut self, track: usize, buffer: &SampleBuffer) -> Result<()> {
        if self.closed {
            return Err(ContainerError::Closed.into());
        }
        if track != 0 || self.voice.is_none() {
            return Err(ContainerError::TrackNotFound { index: track }.into());
        }
        if buffer.is_discard() {
            return Ok(());
        }
        self.write_header()?;
        self.sink()?.write_all(buffer.payload())?;
        self.samples += buffer.len() as u64;
        Ok(())
    }

    fn duration(&self, track: usize) -> Option<Rational> {
        let voice = self.voice.as_ref().filter(|_| track == 0)?;
        Some(Rational::new(self.samples as i64, voice.rate as i64))
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
            warn!(error = %e, "8SVX finalization failed");
        }
        result
    }
}

impl Drop for IffWriter {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}

impl std::fmt::Debug for IffWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IffWriter")
            .field("voice", &self.voice)
            .field("samples", &self.samples)
            .field("closed", &self.closed)
            .finish()
    }
}
