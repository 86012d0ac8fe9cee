//! Frame preprocessing.
//!
//! Steps, in order: resize to the target size, widen to `f32`, scale by
//! 1/255, then transpose to channels-first when configured. Resizing first
//! keeps the `f32` buffer at the (usually smaller) target size.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb};
use serde::{Deserialize, Serialize};

use crate::error::{IntakeError, Result};
use crate::frame::{Layout, ProcessedFrame, RawFrame, CHANNELS};

/// Resampling filter used for the resize step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    #[default]
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PreprocessConfig {
    pub width: u32,
    pub height: u32,
    pub layout: Layout,
    pub filter: ResizeFilter,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            width: 224,
            height: 224,
            layout: Layout::ChannelsFirst,
            filter: ResizeFilter::Triangle,
        }
    }
}

/// Stateless frame transform.
#[derive(Clone, Copy, Debug)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(IntakeError::Config(format!(
                "target size must be non-zero (got {}x{})",
                config.width, config.height
            )));
        }
        Ok(Self { config })
    }

    pub fn target_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn layout(&self) -> Layout {
        self.config.layout
    }

    /// Produce a model-ready frame. The input is left untouched.
    pub fn process(&self, frame: &RawFrame) -> ProcessedFrame {
        let (width, height) = self.target_size();
        let resized = self.resize(frame);

        let data: Vec<f32> = match self.config.layout {
            Layout::ChannelsLast => resized.iter().map(|&v| v as f32 / 255.0).collect(),
            Layout::ChannelsFirst => {
                let plane = width as usize * height as usize;
                let mut planar = vec![0.0_f32; plane * CHANNELS];
                for (i, pixel) in resized.chunks_exact(CHANNELS).enumerate() {
                    for (c, &v) in pixel.iter().enumerate() {
                        planar[c * plane + i] = v as f32 / 255.0;
                    }
                }
                planar
            }
        };

        ProcessedFrame::new(
            data,
            width,
            height,
            self.config.layout,
            frame.channel_order,
        )
    }

    fn resize(&self, frame: &RawFrame) -> Vec<u8> {
        let (width, height) = self.target_size();
        if frame.width == width && frame.height == height {
            return frame.pixels().to_vec();
        }
        // Channel order does not matter to the resampler; BGR is treated as RGB.
        let view: ImageBuffer<Rgb<u8>, &[u8]> =
            match ImageBuffer::from_raw(frame.width, frame.height, frame.pixels()) {
                Some(view) => view,
                // RawFrame::new guarantees the buffer length.
                None => unreachable!("raw frame buffer does not match its dimensions"),
            };
        imageops::resize(&view, width, height, self.config.filter.into()).into_raw()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ChannelOrder;

    fn gradient_frame(width: u32, height: u32) -> RawFrame {
        let pixels = (0..width * height * 3).map(|i| (i % 256) as u8).collect();
        RawFrame::rgb(pixels, width, height).unwrap()
    }

    fn preprocessor(width: u32, height: u32, layout: Layout) -> Preprocessor {
        Preprocessor::new(PreprocessConfig {
            width,
            height,
            layout,
            filter: ResizeFilter::Triangle,
        })
        .unwrap()
    }

    #[test]
    fn output_has_target_shape_and_unit_range() {
        for (w, h) in [(640, 480), (17, 3), (1, 1), (224, 224), (50, 400)] {
            let frame = gradient_frame(w, h);
            for layout in [Layout::ChannelsFirst, Layout::ChannelsLast] {
                let out = preprocessor(32, 24, layout).process(&frame);
                assert_eq!((out.width, out.height), (32, 24));
                assert_eq!(out.as_slice().len(), 32 * 24 * 3);
                assert!(out.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
            }
        }
    }

    #[test]
    fn channels_first_is_transpose_of_channels_last() {
        let frame = gradient_frame(9, 7);
        let hwc = preprocessor(4, 3, Layout::ChannelsLast).process(&frame);
        let chw = preprocessor(4, 3, Layout::ChannelsFirst).process(&frame);
        assert_eq!(hwc.shape(), [3, 4, 3]);
        assert_eq!(chw.shape(), [3, 3, 4]);
        for c in 0..3 {
            for y in 0..3 {
                for x in 0..4 {
                    assert_eq!(hwc.sample(c, y, x), chw.sample(c, y, x));
                }
            }
        }
    }

    #[test]
    fn scaling_maps_extremes_to_unit_interval() {
        let frame = RawFrame::rgb(vec![0, 255, 51], 1, 1).unwrap();
        let out = preprocessor(1, 1, Layout::ChannelsLast).process(&frame);
        assert_eq!(out.as_slice(), &[0.0, 1.0, 0.2]);
    }

    #[test]
    fn input_frame_is_not_modified() {
        let frame = gradient_frame(10, 10);
        let before = frame.pixels().to_vec();
        let _ = preprocessor(5, 5, Layout::ChannelsFirst).process(&frame);
        assert_eq!(frame.pixels(), before.as_slice());
    }

    #[test]
    fn channel_order_is_carried_through() {
        let frame = RawFrame::new(vec![1, 2, 3], 1, 1, ChannelOrder::Bgr).unwrap();
        let out = preprocessor(2, 2, Layout::ChannelsLast).process(&frame);
        assert_eq!(out.channel_order, ChannelOrder::Bgr);
    }

    #[test]
    fn zero_target_size_is_rejected() {
        let config = PreprocessConfig {
            width: 0,
            ..PreprocessConfig::default()
        };
        assert!(matches!(
            Preprocessor::new(config),
            Err(IntakeError::Config(_))
        ));
    }
}
