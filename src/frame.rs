//! Frame data model.
//!
//! - `FrameId`: handle to a frame that has not been read yet.
//! - `RawFrame`: decoded 8-bit, 3-channel pixel buffer. Moved between stages, never shared.
//! - `ProcessedFrame`: model-ready `f32` buffer with a fixed shape and layout.
//!
//! Neither frame type implements `Clone`; a stage hands its output to the next
//! stage by value.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{IntakeError, Result};

/// Samples per pixel for every frame handled by the pipeline.
pub const CHANNELS: usize = 3;

// ----------------------------------------------------------------------------
// FrameId: not-yet-read frame handle
// ----------------------------------------------------------------------------

/// Opaque handle to a frame on disk. Produced by the enumerator, consumed once
/// by the loader.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(PathBuf);

impl FrameId {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

// ----------------------------------------------------------------------------
// Pixel metadata
// ----------------------------------------------------------------------------

/// Order of the three interleaved color samples of a pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

/// Memory layout of a processed frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// Height x width x channels (interleaved).
    ChannelsLast,
    /// Channels x height x width (planar).
    #[default]
    ChannelsFirst,
}

// ----------------------------------------------------------------------------
// RawFrame: decoded pixel buffer
// ----------------------------------------------------------------------------

/// Decoded 3-channel pixel buffer.
pub struct RawFrame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub channel_order: ChannelOrder,
    captured_at: Instant,
}

impl RawFrame {
    /// Wrap an interleaved 8-bit buffer. The length must equal
    /// `width * height * 3` and both dimensions must be non-zero.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        channel_order: ChannelOrder,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(IntakeError::InvalidFrame(format!(
                "frame dimensions must be non-zero (got {}x{})",
                width, height
            )));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(CHANNELS))
            .ok_or_else(|| IntakeError::InvalidFrame("frame dimensions overflow".to_string()))?;
        if data.len() != expected {
            return Err(IntakeError::InvalidFrame(format!(
                "frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            channel_order,
            captured_at: Instant::now(),
        })
    }

    /// Shorthand for an RGB frame.
    pub fn rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        Self::new(data, width, height, ChannelOrder::Rgb)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Time since the frame was decoded or captured.
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channel_order", &self.channel_order)
            .field("bytes", &self.data.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// ProcessedFrame: model-ready buffer
// ----------------------------------------------------------------------------

/// Fixed-shape `f32` frame with every sample in `[0, 1]`.
pub struct ProcessedFrame {
    data: Vec<f32>,
    pub width: u32,
    pub height: u32,
    pub layout: Layout,
    pub channel_order: ChannelOrder,
}

impl ProcessedFrame {
    pub(crate) fn new(
        data: Vec<f32>,
        width: u32,
        height: u32,
        layout: Layout,
        channel_order: ChannelOrder,
    ) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * CHANNELS);
        Self {
            data,
            width,
            height,
            layout,
            channel_order,
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Tensor shape: `[h, w, c]` for channels-last, `[c, h, w]` for channels-first.
    pub fn shape(&self) -> [usize; 3] {
        let (h, w) = (self.height as usize, self.width as usize);
        match self.layout {
            Layout::ChannelsLast => [h, w, CHANNELS],
            Layout::ChannelsFirst => [CHANNELS, h, w],
        }
    }

    /// Sample at channel `c`, row `y`, column `x`, independent of layout.
    pub fn sample(&self, c: usize, y: usize, x: usize) -> f32 {
        let (h, w) = (self.height as usize, self.width as usize);
        let idx = match self.layout {
            Layout::ChannelsLast => (y * w + x) * CHANNELS + c,
            Layout::ChannelsFirst => (c * h + y) * w + x,
        };
        self.data[idx]
    }
}

impl fmt::Debug for ProcessedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessedFrame")
            .field("shape", &self.shape())
            .field("layout", &self.layout)
            .field("channel_order", &self.channel_order)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_frame_validates_length() {
        assert!(RawFrame::rgb(vec![0u8; 12], 2, 2).is_ok());
        assert!(RawFrame::rgb(vec![0u8; 11], 2, 2).is_err());
    }

    #[test]
    fn raw_frame_rejects_zero_dimensions() {
        let err = RawFrame::rgb(Vec::new(), 0, 4).unwrap_err();
        assert!(matches!(err, IntakeError::InvalidFrame(_)));
    }

    #[test]
    fn processed_frame_sample_is_layout_independent() {
        // 1x2 frame, pixel0 = (0.1, 0.2, 0.3), pixel1 = (0.4, 0.5, 0.6)
        let hwc = ProcessedFrame::new(
            vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6],
            2,
            1,
            Layout::ChannelsLast,
            ChannelOrder::Rgb,
        );
        let chw = ProcessedFrame::new(
            vec![0.1, 0.4, 0.2, 0.5, 0.3, 0.6],
            2,
            1,
            Layout::ChannelsFirst,
            ChannelOrder::Rgb,
        );
        assert_eq!(hwc.shape(), [1, 2, 3]);
        assert_eq!(chw.shape(), [3, 1, 2]);
        for c in 0..3 {
            for x in 0..2 {
                assert_eq!(hwc.sample(c, 0, x), chw.sample(c, 0, x));
            }
        }
    }
}
