//! Whole-pipeline tests through the facade.

use spool::keys::{DEPTH, ENCODING, FRAME_RATE, HEIGHT, WIDTH};
use spool::prelude::*;
use spool::{encoding, AviWriter, CodecProvider, PassThroughCodec, QuickTimeReader};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

const FRAME_BYTES: usize = 8 * 4 * 3;

fn video_format() -> FormatDescriptor {
    FormatDescriptor::of(MediaType::Video)
        .with(ENCODING, encoding::RAW_VIDEO)
        .with(WIDTH, 8u32)
        .with(HEIGHT, 4u32)
        .with(DEPTH, 24u32)
        .with(FRAME_RATE, Rational::from_int(5))
}

fn buffer(payload: &[u8], at: Rational, duration: Rational, keyframe: bool) -> SampleBuffer {
    let mut buffer = SampleBuffer::from_payload(payload);
    buffer.timestamp = at;
    buffer.duration = duration;
    buffer.set_flag(BufferFlags::KEYFRAME, keyframe);
    buffer
}

/// Two seconds of 24-bit video plus two captions.
fn write_capture(path: &Path) {
    let mut writer = AviWriter::new(Box::new(File::create(path).unwrap()));
    let video = writer.add_track(&video_format()).unwrap().index;
    let text = writer
        .add_track(&FormatDescriptor::of(MediaType::Text).with(ENCODING, encoding::SRT))
        .unwrap()
        .index;
    let fifth = Rational::new(1, 5);
    for i in 0..10u8 {
        let frame = buffer(&[i; FRAME_BYTES], fifth.mul_int(i as i64), fifth, i == 0);
        writer.write(video, &frame).unwrap();
    }
    writer
        .write(text, &buffer(b"first", Rational::zero(), Rational::one(), true))
        .unwrap();
    writer
        .write(text, &buffer(b"second", Rational::one(), Rational::one(), true))
        .unwrap();
    writer.close().unwrap();
}

fn payloads(track: &mut dyn SeekableTrack) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        let mut buffer = SampleBuffer::new();
        track.read(&mut buffer).unwrap();
        if !buffer.is_discard() && !buffer.is_empty() {
            out.push(buffer.payload().to_vec());
        }
        if buffer.is_end_of_media() {
            return out;
        }
    }
}

#[test]
fn test_capture_to_quicktime() {
    spool::init_logging(false);
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("capture.avi");
    let output = dir.path().join("capture.mov");
    write_capture(&input);

    let stats = Transcoder::builder()
        .input(&input)
        .output(&output)
        .video_encoding(encoding::SCREEN)
        .build()
        .unwrap()
        .run()
        .unwrap();
    assert!(stats.complete);
    assert_eq!(stats.tracks.len(), 2);
    assert_eq!(stats.tracks[0].written, 10);
    assert_eq!(stats.tracks[1].written, 2);

    let mut reader = QuickTimeReader::open(Box::new(File::open(&output).unwrap())).unwrap();
    assert_eq!(reader.track_count(), 2);
    let video = reader.track(0).unwrap();
    assert!(video.format().has_encoding(encoding::SCREEN));
    assert_eq!(payloads(video).len(), 10);

    let text = reader.track(1).unwrap();
    assert!(text.format().has_encoding(encoding::SRT));
    assert_eq!(payloads(text), vec![b"first".to_vec(), b"second".to_vec()]);
    assert_eq!(reader.duration(), Rational::from_int(2));
}

#[test]
fn test_dropping_text_tracks() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("capture.avi");
    let output = dir.path().join("video.mov");
    write_capture(&input);

    let stats = Transcoder::new(TranscodeConfig {
        input,
        output: output.clone(),
        drop_text: true,
        ..TranscodeConfig::default()
    })
    .unwrap()
    .run()
    .unwrap();
    assert_eq!(stats.tracks.len(), 1);

    let mut reader = QuickTimeReader::open(Box::new(File::open(&output).unwrap())).unwrap();
    assert_eq!(reader.track_count(), 1);
    let frames = payloads(reader.track(0).unwrap());
    assert_eq!(frames[9], vec![9u8; FRAME_BYTES]);
}

#[test]
fn test_unresolvable_conversion_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("capture.avi");
    write_capture(&input);

    // Only pass-through: nothing can produce screen video.
    let defaults = ProviderRegistry::default();
    let mut limited = RegistryBuilder::new();
    limited
        .register_codec(CodecProvider::new("passthrough", || Box::new(PassThroughCodec::new())))
        .unwrap();
    for reader in defaults.readers() {
        limited.register_reader(reader.clone()).unwrap();
    }
    for writer in defaults.writers() {
        limited.register_writer(writer.clone()).unwrap();
    }

    let err = Transcoder::builder()
        .input(&input)
        .output(dir.path().join("out.mov"))
        .video_encoding(encoding::SCREEN)
        .registry(Arc::new(limited.build()))
        .build()
        .unwrap()
        .run()
        .unwrap_err();
    assert!(matches!(err, Error::Lifecycle(msg) if msg.contains("realize failed")));
}
