//! Face crop preprocessing
//!
//! Deterministic: the same crop and configuration always produce the same
//! tensor, bit for bit.

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use serde::{Deserialize, Serialize};

/// Channel order the model expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    Rgb,
    Bgr,
    /// Single luma channel
    Gray,
}

impl ChannelOrder {
    #[must_use]
    pub fn channels(self) -> usize {
        match self {
            ChannelOrder::Rgb | ChannelOrder::Bgr => 3,
            ChannelOrder::Gray => 1,
        }
    }
}

/// Pixel value scaling applied after resizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// `x / 127.5 - 1`, range [-1, 1] (Keras MobileNetV2 `preprocess_input`)
    MobileNetV2,
    /// `x / 255`, range [0, 1]
    UnitRange,
    /// Raw 0-255 values
    None,
}

impl Normalization {
    #[inline]
    fn apply(self, value: u8) -> f32 {
        let v = f32::from(value);
        match self {
            Normalization::MobileNetV2 => v / 127.5 - 1.0,
            Normalization::UnitRange => v / 255.0,
            Normalization::None => v,
        }
    }
}

/// Input tensor layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[1, H, W, C]` (Keras/TensorFlow exports)
    Nhwc,
    /// `[1, C, H, W]` (PyTorch exports)
    Nchw,
}

/// Resize `face` to `size` x `size` and lay it out as a normalized tensor
#[must_use]
pub fn preprocess(
    face: &RgbImage,
    size: u32,
    color: ChannelOrder,
    normalization: Normalization,
    layout: TensorLayout,
) -> Array4<f32> {
    let resized = image::imageops::resize(face, size, size, FilterType::Triangle);
    let channels = color.channels();
    let side = size as usize;

    let shape = match layout {
        TensorLayout::Nhwc => (1, side, side, channels),
        TensorLayout::Nchw => (1, channels, side, side),
    };
    let mut input = Array4::<f32>::zeros(shape);

    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        let [r, g, b] = pixel.0;
        let values: [u8; 3] = match color {
            ChannelOrder::Rgb => [r, g, b],
            ChannelOrder::Bgr => [b, g, r],
            // ITU-R BT.601 luma, as `image`'s `to_luma8`
            ChannelOrder::Gray => [luma(r, g, b), 0, 0],
        };

        for (c, &value) in values.iter().take(channels).enumerate() {
            let v = normalization.apply(value);
            match layout {
                TensorLayout::Nhwc => input[[0, y, x, c]] = v,
                TensorLayout::Nchw => input[[0, c, y, x]] = v,
            }
        }
    }

    input
}

#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    let l = 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
    l.round().clamp(0.0, 255.0) as u8
}
