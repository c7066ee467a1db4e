/// Integration tests for FFmpeg frame sampling
///
/// Each test encodes a short MPEG-4 clip into a temporary directory, so the
/// real decoder path runs without external fixtures. `EMOTION_TEST_VIDEO`
/// additionally points the ignored test at any decodable clip.
use ffmpeg_next as ffmpeg;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use video_emotion_decoder::{sample, DecodeError, FfmpegVideoSource, VideoSource};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;

/// Luma of frame `i`: a slow ramp so neighbouring frames stay distinguishable
fn luma(i: usize) -> u8 {
    (40 + i * 8).min(235) as u8
}

/// Move every packet the encoder has ready into the container
fn write_packets(
    encoder: &mut ffmpeg::encoder::Encoder,
    output: &mut ffmpeg::format::context::Output,
    stream_time_base: ffmpeg::Rational,
) {
    let mut packet = ffmpeg::Packet::empty();
    while encoder.receive_packet(&mut packet).is_ok() {
        packet.set_stream(0);
        packet.rescale_ts((1, 30), stream_time_base);
        packet.write_interleaved(output).unwrap();
    }
}

/// Encode `frames` flat gray frames at 30 fps into `path`.
///
/// Returns `None` when this FFmpeg build has no MPEG-4 encoder.
fn encode_clip(path: &Path, frames: usize) -> Option<()> {
    ffmpeg::init().unwrap();
    let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4)?;

    let mut output = ffmpeg::format::output(&path).unwrap();
    let global_header = output
        .format()
        .flags()
        .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

    let mut context = ffmpeg::codec::context::Context::new_with_codec(codec)
        .encoder()
        .video()
        .unwrap();
    context.set_width(WIDTH);
    context.set_height(HEIGHT);
    context.set_format(ffmpeg::format::Pixel::YUV420P);
    context.set_time_base((1, 30));
    context.set_frame_rate(Some((30, 1)));
    if global_header {
        context.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
    }
    let mut encoder = context.open_as(codec).unwrap();

    {
        let mut stream = output.add_stream(codec).unwrap();
        stream.set_parameters(&encoder);
        stream.set_time_base((1, 30));
    }
    output.write_header().unwrap();
    let stream_time_base = output.stream(0).unwrap().time_base();

    for i in 0..frames {
        let mut frame = ffmpeg::util::frame::video::Video::new(
            ffmpeg::format::Pixel::YUV420P,
            WIDTH,
            HEIGHT,
        );
        frame.data_mut(0).fill(luma(i));
        frame.data_mut(1).fill(128);
        frame.data_mut(2).fill(128);
        frame.set_pts(Some(i as i64));

        encoder.send_frame(&frame).unwrap();
        write_packets(&mut encoder, &mut output, stream_time_base);
    }
    encoder.send_eof().unwrap();
    write_packets(&mut encoder, &mut output, stream_time_base);
    output.write_trailer().unwrap();

    Some(())
}

/// A freshly encoded clip, or `None` (test skipped) without an MPEG-4 encoder
fn clip(dir: &tempfile::TempDir, frames: usize) -> Option<PathBuf> {
    let path = dir.path().join("clip.avi");
    match encode_clip(&path, frames) {
        Some(()) => Some(path),
        None => {
            println!("FFmpeg has no MPEG-4 encoder, skipping");
            None
        }
    }
}

#[test]
fn test_sampled_count_is_ceiling_of_frames_over_interval() {
    let dir = tempfile::tempdir().unwrap();
    let Some(path) = clip(&dir, 25) else {
        return;
    };
    let source = FfmpegVideoSource::new();

    let mut all = sample(&source, &path, NonZeroU32::MIN).unwrap();
    assert_eq!(all.by_ref().count(), 25);
    assert!(all.take_error().is_none());

    for n in [1u32, 2, 7, 10, 25, 30] {
        let frames: Vec<_> = sample(&source, &path, NonZeroU32::new(n).unwrap())
            .unwrap()
            .collect();
        assert_eq!(frames.len(), 25usize.div_ceil(n as usize), "interval {n}");
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index, i);
            assert_eq!(frame.source_index, i as u64 * u64::from(n));
        }
    }
}

#[test]
fn test_frames_are_rgb_from_matching_positions() {
    let dir = tempfile::tempdir().unwrap();
    let Some(path) = clip(&dir, 25) else {
        return;
    };

    let frames: Vec<_> = sample(&FfmpegVideoSource::new(), &path, NonZeroU32::new(10).unwrap())
        .unwrap()
        .collect();
    assert_eq!(frames.len(), 3);

    let mut previous = 0u8;
    for frame in &frames {
        assert_eq!(frame.dimensions(), (WIDTH, HEIGHT));
        assert_eq!(frame.image.as_raw().len(), (WIDTH * HEIGHT * 3) as usize);

        // Flat gray in, near-flat gray out, brighter with every sample
        let center = frame.image.get_pixel(WIDTH / 2, HEIGHT / 2).0;
        assert!(center[0].abs_diff(center[1]) <= 8, "pixel {center:?}");
        assert!(center[0] > previous, "frame {} not brighter", frame.source_index);
        previous = center[0];
    }
}

#[test]
fn test_single_frame_clip() {
    let dir = tempfile::tempdir().unwrap();
    let Some(path) = clip(&dir, 1) else {
        return;
    };

    let frames: Vec<_> = sample(&FfmpegVideoSource::new(), &path, NonZeroU32::new(10).unwrap())
        .unwrap()
        .collect();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].source_index, 0);
}

#[test]
fn test_abandoned_sampler_releases_and_reopens() {
    let dir = tempfile::tempdir().unwrap();
    let Some(path) = clip(&dir, 25) else {
        return;
    };
    let source = FfmpegVideoSource::new();

    let mut sampler = sample(&source, &path, NonZeroU32::MIN).unwrap();
    assert!(sampler.next().is_some());
    drop(sampler);

    assert_eq!(sample(&source, &path, NonZeroU32::MIN).unwrap().count(), 25);
}

#[test]
fn test_truncated_header_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let Some(path) = clip(&dir, 25) else {
        return;
    };
    let bytes = std::fs::read(&path).unwrap();
    let truncated = dir.path().join("truncated.avi");
    std::fs::write(&truncated, &bytes[..16]).unwrap();

    assert!(matches!(
        FfmpegVideoSource::new().open(&truncated),
        Err(DecodeError::SourceUnavailable { .. })
    ));
}

#[test]
#[ignore]
fn test_external_video() {
    let Some(path) = std::env::var("EMOTION_TEST_VIDEO")
        .ok()
        .map(PathBuf::from)
        .filter(|p| p.is_file())
    else {
        println!("EMOTION_TEST_VIDEO not set, skipping");
        return;
    };

    let mut sampler = sample(&FfmpegVideoSource::new(), &path, NonZeroU32::new(10).unwrap())
        .expect("Failed to open video");
    let count = sampler.by_ref().count();
    assert!(count > 0, "Expected at least one frame");
    assert!(sampler.take_error().is_none());
}
