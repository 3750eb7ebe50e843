//! End-to-end transcoding through a session.

use spool_codecs::ProcessStatus;
use spool_containers::SeekableTrack;
use spool_core::keys::{
    BYTE_ORDER, CHANNELS, DEPTH, ENCODING, FILE_KIND, FRAME_RATE, HEIGHT, SAMPLE_RATE,
    SAMPLE_SIZE_BITS, SIGNED, WIDTH,
};
use spool_core::{
    encoding, BufferFlags, ByteOrder, FileKind, FormatDescriptor, MediaType, Rational,
    SampleBuffer,
};
use spool_registry::ProviderRegistry;
use spool_session::*;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const FRAME_BYTES: usize = 16 * 8 * 3;
const AUDIO_BYTES: usize = 1600;

fn video_format() -> FormatDescriptor {
    FormatDescriptor::of(MediaType::Video)
        .with(ENCODING, encoding::RAW_VIDEO)
        .with(WIDTH, 16u32)
        .with(HEIGHT, 8u32)
        .with(DEPTH, 24u32)
        .with(FRAME_RATE, Rational::from_int(10))
}

fn audio_format() -> FormatDescriptor {
    FormatDescriptor::of(MediaType::Audio)
        .with(ENCODING, encoding::PCM)
        .with(SAMPLE_RATE, 8000u32)
        .with(CHANNELS, 1u32)
        .with(SAMPLE_SIZE_BITS, 16u32)
        .with(SIGNED, true)
        .with(BYTE_ORDER, ByteOrder::Little)
}

/// One second of 16x8 raw video (keyframe every fifth frame) and 8 kHz
/// 16-bit audio whose samples are all `0x0100 * i` in block `i`.
fn write_input(registry: &ProviderRegistry, path: &Path) {
    let mut writer = registry.create_writer(path).unwrap();
    let video = writer.add_track(&video_format()).unwrap().index;
    let audio = writer.add_track(&audio_format()).unwrap().index;
    let tenth = Rational::new(1, 10);
    for i in 0..10u8 {
        let at = tenth.mul_int(i as i64);
        let mut frame = SampleBuffer::from_payload(&[i * 10; FRAME_BYTES]);
        frame.timestamp = at;
        frame.duration = tenth;
        frame.set_flag(BufferFlags::KEYFRAME, i % 5 == 0);
        writer.write(video, &frame).unwrap();

        writer.write(audio, &audio_block(i)).unwrap();
    }
    writer.close().unwrap();
}

/// Block `i` of 0.1 s of 16-bit audio, every sample `0x0100 * i`.
fn audio_block(i: u8) -> SampleBuffer {
    let tenth = Rational::new(1, 10);
    let block: Vec<u8> = std::iter::repeat([0u8, i]).take(AUDIO_BYTES / 2).flatten().collect();
    let mut samples = SampleBuffer::from_payload(&block);
    samples.timestamp = tenth.mul_int(i as i64);
    samples.duration = tenth;
    samples.set_flag(BufferFlags::KEYFRAME, true);
    samples
}

fn read_all(track: &mut dyn SeekableTrack) -> Vec<SampleBuffer> {
    let mut samples = Vec::new();
    loop {
        let mut buffer = SampleBuffer::new();
        track.read(&mut buffer).unwrap();
        let end = buffer.is_end_of_media();
        if !buffer.is_discard() && !buffer.is_empty() {
            samples.push(buffer);
        }
        if end {
            return samples;
        }
    }
}

fn run_to_end(session: &Session) {
    session.start().wait().unwrap();
    loop {
        match session.events().recv_timeout(Duration::from_secs(10)).unwrap() {
            SessionEvent::EndOfMedia => break,
            SessionEvent::Error(e) => panic!("transcode failed: {e}"),
            _ => {}
        }
    }
    assert_eq!(session.close().wait().unwrap(), SessionState::Closed);
    assert!(session.error().is_none());
}

#[test]
fn test_avi_to_quicktime_with_conversion() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("capture.avi");
    let output = dir.path().join("capture.mov");
    let registry = Arc::new(ProviderRegistry::default());
    write_input(&registry, &input);

    let job = TranscodeJob::new(
        TranscodeConfig {
            input,
            output: output.clone(),
            video_encoding: Some(encoding::SCREEN.to_string()),
            audio_sample_bits: Some(8),
            drop_text: false,
        },
        registry.clone(),
    );
    let stats = job.stats();
    let session = job.into_session(SessionConfig::default()).unwrap();
    run_to_end(&session);

    let stats = stats.lock().clone();
    assert!(stats.complete);
    assert_eq!(stats.tracks.len(), 2);
    assert_eq!(stats.tracks[0].written, 10);
    assert_eq!(stats.tracks[1].written, 10);
    assert!(stats.tracks.iter().all(|t| t.failed == 0));

    let mut reader = registry.open_reader(&output).unwrap();
    assert_eq!(reader.track_count(), 2);

    let video = reader.track(0).unwrap();
    let coded = video.format().clone();
    assert_eq!(coded.encoding().as_deref(), Some(encoding::SCREEN));
    let frames = read_all(video);
    assert_eq!(frames.len(), 10);

    let mut decoder = registry.get_codec(&coded, &video_format()).unwrap();
    assert_eq!(decoder.name(), "screen-decoder");
    let mut decoded = SampleBuffer::new();
    for (i, mut frame) in frames.into_iter().enumerate() {
        assert_eq!(decoder.process(&mut frame, &mut decoded), ProcessStatus::Ok);
        assert_eq!(decoded.payload(), &[i as u8 * 10; FRAME_BYTES][..]);
    }

    let audio = reader.track(1).unwrap();
    assert_eq!(audio.format().get(SAMPLE_SIZE_BITS), Some(8));
    assert_eq!(audio.format().get(SIGNED), Some(false));
    let bytes: Vec<u8> = read_all(audio)
        .iter()
        .flat_map(|b| b.payload().to_vec())
        .collect();
    assert_eq!(bytes.len(), AUDIO_BYTES * 10 / 2);
    // 16-bit 0x0100 * i becomes unsigned 8-bit 0x80 + i.
    for (i, block) in bytes.chunks(AUDIO_BYTES / 2).enumerate() {
        assert!(block.iter().all(|&b| b == 0x80 + i as u8));
    }
    reader.close().unwrap();
}

#[test]
fn test_avi_audio_to_8svx() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("voice.avi");
    let output = dir.path().join("voice.8svx");
    let registry = Arc::new(ProviderRegistry::default());

    let mut writer = registry.create_writer(&input).unwrap();
    let audio = writer.add_track(&audio_format()).unwrap().index;
    for i in 0..10u8 {
        writer.write(audio, &audio_block(i)).unwrap();
    }
    writer.close().unwrap();

    let job = TranscodeJob::new(
        TranscodeConfig {
            input,
            output: output.clone(),
            audio_sample_bits: Some(8),
            ..TranscodeConfig::default()
        },
        registry.clone(),
    );
    let stats = job.stats();
    let session = job.into_session(SessionConfig::default()).unwrap();
    run_to_end(&session);
    assert_eq!(stats.lock().tracks[0].written, 10);

    let mut reader = registry.open_reader(&output).unwrap();
    assert_eq!(reader.file_format().get(FILE_KIND), Some(FileKind::Iff));
    assert_eq!(reader.duration(), Rational::one());
    let track = reader.track(0).unwrap();
    assert_eq!(track.format().get(SIGNED), Some(true));
    let bytes: Vec<u8> = read_all(track)
        .iter()
        .flat_map(|b| b.payload().to_vec())
        .collect();
    assert_eq!(bytes.len(), AUDIO_BYTES * 10 / 2);
    // Signed 16-bit 0x0100 * i keeps its high byte.
    for (i, block) in bytes.chunks(AUDIO_BYTES / 2).enumerate() {
        assert!(block.iter().all(|&b| b == i as u8));
    }
    reader.close().unwrap();
}

#[test]
fn test_matching_formats_copy_without_codecs() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.avi");
    let output = dir.path().join("out.avi");
    let registry = Arc::new(ProviderRegistry::default());
    write_input(&registry, &input);

    let mut job = TranscodeJob::new(
        TranscodeConfig {
            input,
            output: output.clone(),
            ..TranscodeConfig::default()
        },
        registry.clone(),
    );
    job.realize().unwrap();
    let mut steps = 0;
    while job.step().unwrap() == StepOutcome::Continue {
        steps += 1;
        assert!(steps < 100);
    }
    job.close();
    assert!(job.stats().lock().complete);

    let mut reader = registry.open_reader(&output).unwrap();
    let frames = read_all(reader.track(0).unwrap());
    assert_eq!(frames.len(), 10);
    assert_eq!(frames[3].payload(), &[30u8; FRAME_BYTES][..]);
    assert_eq!(reader.duration(), Rational::one());
}

#[test]
fn test_seek_resumes_from_keyframe() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.avi");
    let output = dir.path().join("out.avi");
    let registry = Arc::new(ProviderRegistry::default());
    write_input(&registry, &input);

    let mut job = TranscodeJob::new(
        TranscodeConfig {
            input,
            output: output.clone(),
            ..TranscodeConfig::default()
        },
        registry.clone(),
    );
    job.realize().unwrap();
    job.seek(Rational::new(7, 10)).unwrap();
    while job.step().unwrap() == StepOutcome::Continue {}
    job.close();

    let stats = job.stats().lock().clone();
    assert_eq!(stats.tracks[0].written, 5);

    let mut reader = registry.open_reader(&output).unwrap();
    let frames = read_all(reader.track(0).unwrap());
    assert_eq!(frames.len(), 5);
    assert_eq!(frames[0].payload(), &[50u8; FRAME_BYTES][..]);
}

#[test]
fn test_missing_input_fails_realize() {
    let dir = tempfile::tempdir().unwrap();
    let job = TranscodeJob::new(
        TranscodeConfig {
            input: dir.path().join("absent.avi"),
            output: dir.path().join("out.mov"),
            ..TranscodeConfig::default()
        },
        Arc::new(ProviderRegistry::default()),
    );
    let session = job.into_session(SessionConfig::default()).unwrap();
    assert!(session.realize().wait().is_err());
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.error().is_some());
}

#[test]
fn test_config_from_json() {
    let config: TranscodeConfig =
        serde_json::from_str(r#"{"input": "a.avi", "output": "b.mov", "drop_text": true}"#)
            .unwrap();
    assert_eq!(config.output, Path::new("b.mov"));
    assert!(config.drop_text);
    assert_eq!(config.video_encoding, None);
}
