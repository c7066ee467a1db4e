// UltraFace prior (anchor) boxes and regression decoding
//
// Priors are laid out on four feature maps with strides 8, 16, 32 and 64.
// Each feature map is ceil(input / stride) cells wide and tall, and the
// effective shrinkage of a level is input / cells, so non-multiple input
// heights (240 / 32 = 7.5) round up to a whole cell.
//
// Reference: Ultra-Light-Fast-Generic-Face-Detector-1MB, vision/utils/box_utils.py

use crate::NormalizedBox;

const STRIDES: [f32; 4] = [8.0, 16.0, 32.0, 64.0];

/// Anchor sizes in input pixels, per feature map level
const MIN_BOXES: [&[f32]; 4] = [
    &[10.0, 16.0, 24.0],
    &[32.0, 48.0],
    &[64.0, 96.0],
    &[128.0, 192.0, 256.0],
];

/// Regression variances used when the model emits raw offsets
pub const CENTER_VARIANCE: f32 = 0.1;
pub const SIZE_VARIANCE: f32 = 0.2;

/// Prior box in center form, normalized to [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorBox {
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
}

/// Generate the prior boxes for a `width` x `height` model input.
///
/// 320x240 yields the 4420 priors of the RFB-320 model; 640x480 yields 17640.
#[must_use]
pub fn generate_priors(width: u32, height: u32) -> Vec<PriorBox> {
    let (width, height) = (width as f32, height as f32);
    let mut priors = Vec::new();

    for (level, stride) in STRIDES.iter().enumerate() {
        let cells_x = (width / stride).ceil();
        let cells_y = (height / stride).ceil();
        let shrink_x = width / cells_x;
        let shrink_y = height / cells_y;

        for j in 0..cells_y as usize {
            for i in 0..cells_x as usize {
                let center_x = ((i as f32 + 0.5) * shrink_x / width).clamp(0.0, 1.0);
                let center_y = ((j as f32 + 0.5) * shrink_y / height).clamp(0.0, 1.0);

                for &size in MIN_BOXES[level] {
                    priors.push(PriorBox {
                        center_x,
                        center_y,
                        width: (size / width).clamp(0.0, 1.0),
                        height: (size / height).clamp(0.0, 1.0),
                    });
                }
            }
        }
    }

    priors
}

/// Decode regression offsets `[dx, dy, dw, dh]` against their priors.
///
/// `locations` holds four values per prior. Returns `None` on a length mismatch.
#[must_use]
pub fn decode_boxes(locations: &[f32], priors: &[PriorBox]) -> Option<Vec<NormalizedBox>> {
    if locations.len() != priors.len() * 4 {
        return None;
    }

    let boxes = locations
        .chunks_exact(4)
        .zip(priors)
        .map(|(loc, prior)| {
            let center_x = prior.center_x + loc[0] * CENTER_VARIANCE * prior.width;
            let center_y = prior.center_y + loc[1] * CENTER_VARIANCE * prior.height;
            let width = prior.width * (loc[2] * SIZE_VARIANCE).exp();
            let height = prior.height * (loc[3] * SIZE_VARIANCE).exp();

            NormalizedBox {
                x1: center_x - width / 2.0,
                y1: center_y - height / 2.0,
                x2: center_x + width / 2.0,
                y2: center_y + height / 2.0,
            }
        })
        .collect();

    Some(boxes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prior_count_rfb_320() {
        assert_eq!(generate_priors(320, 240).len(), 4420);
    }

    #[test]
    fn test_prior_count_rfb_640() {
        assert_eq!(generate_priors(640, 480).len(), 17640);
    }

    #[test]
    fn test_prior_bounds() {
        for prior in generate_priors(320, 240) {
            assert!((0.0..=1.0).contains(&prior.center_x));
            assert!((0.0..=1.0).contains(&prior.center_y));
            assert!(prior.width > 0.0 && prior.width <= 1.0);
            assert!(prior.height > 0.0 && prior.height <= 1.0);
        }
    }

    #[test]
    fn test_first_prior_is_smallest_top_left() {
        let priors = generate_priors(320, 240);
        let first = priors[0];
        assert!((first.center_x - 4.0 / 320.0).abs() < 1e-6);
        assert!((first.center_y - 4.0 / 240.0).abs() < 1e-6);
        assert!((first.width - 10.0 / 320.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_offsets_decode_to_prior() {
        let priors = vec![PriorBox {
            center_x: 0.5,
            center_y: 0.5,
            width: 0.2,
            height: 0.2,
        }];
        let decoded = decode_boxes(&[0.0; 4], &priors).unwrap();

        assert_eq!(decoded.len(), 1);
        assert!((decoded[0].x1 - 0.4).abs() < 1e-3);
        assert!((decoded[0].y1 - 0.4).abs() < 1e-3);
        assert!((decoded[0].x2 - 0.6).abs() < 1e-3);
        assert!((decoded[0].y2 - 0.6).abs() < 1e-3);
    }

    #[test]
    fn test_length_mismatch() {
        let priors = generate_priors(320, 240);
        assert!(decode_boxes(&[0.0; 8], &priors).is_none());
    }
}
