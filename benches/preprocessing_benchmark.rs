// Preprocessing benchmark - face crop to classifier tensor, and face box postprocessing
//
// Run with: cargo bench --bench preprocessing_benchmark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{ImageBuffer, Rgb, RgbImage};
use video_emotion_classifier::ClassifierConfig;
use video_emotion_common::BoundingBox;
use video_emotion_face_detection::{
    anchors, collect_candidates, non_maximum_suppression, to_frame_boxes, FaceDetectionConfig,
    OutputEncoding,
};
use video_emotion_pipeline::largest_face;

fn test_face(size: u32) -> RgbImage {
    ImageBuffer::from_fn(size, size, |x, y| {
        Rgb([
            ((x + y) % 256) as u8,
            ((x * 2) % 256) as u8,
            ((y * 2) % 256) as u8,
        ])
    })
}

/// Classifier preprocessing for typical face crop sizes
fn bench_classifier_preprocessing(c: &mut Criterion) {
    let mut group = c.benchmark_group("classifier_preprocessing");
    let presets = [
        ("mobilenet_224", ClassifierConfig::default()),
        ("ferplus_64", ClassifierConfig::fer_plus()),
    ];

    for crop in [48u32, 160, 480] {
        let face = test_face(crop);
        for (name, config) in &presets {
            group.bench_with_input(
                BenchmarkId::new(*name, format!("{crop}x{crop}")),
                &face,
                |b, img| {
                    b.iter(|| black_box(config.preprocess(black_box(img))));
                },
            );
        }
    }

    group.finish();
}

/// UltraFace RFB-320 postprocessing on raw outputs with a few dozen candidates
fn bench_face_postprocessing(c: &mut Criterion) {
    let config = FaceDetectionConfig {
        encoding: OutputEncoding::Raw,
        ..Default::default()
    };
    let priors = anchors::generate_priors(320, 240);

    let mut scores = Vec::with_capacity(priors.len() * 2);
    for i in 0..priors.len() {
        // Roughly one anchor in a hundred fires
        let face_logit = if i % 97 == 0 { 4.0 } else { -4.0 };
        scores.extend_from_slice(&[0.0, face_logit]);
    }
    let locations = vec![0.1f32; priors.len() * 4];

    c.bench_function("face_postprocessing_rfb320", |b| {
        b.iter(|| {
            let candidates =
                collect_candidates(black_box(&scores), black_box(&locations), &priors, &config)
                    .unwrap_or_default();
            let kept = non_maximum_suppression(candidates, config.nms_threshold);
            black_box(to_frame_boxes(&kept, 1280, 720, config.min_face_size))
        });
    });

    c.bench_function("prior_generation_rfb320", |b| {
        b.iter(|| black_box(anchors::generate_priors(black_box(320), black_box(240))));
    });
}

fn bench_largest_face(c: &mut Criterion) {
    let faces: Vec<BoundingBox> = (0..32)
        .map(|i| BoundingBox::new(i * 10, i * 5, 20 + (i * 7) % 50, 20 + (i * 3) % 50))
        .collect();

    c.bench_function("largest_face_32", |b| {
        b.iter(|| black_box(largest_face(black_box(&faces))));
    });
}

criterion_group!(
    benches,
    bench_classifier_preprocessing,
    bench_face_postprocessing,
    bench_largest_face
);
criterion_main!(benches);
