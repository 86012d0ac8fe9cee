//! Frame loader.
//!
//! Turns one `FrameId` into one `RawFrame`. No resizing or normalization
//! happens here. Decode failures are handled according to [`DecodePolicy`].

use std::path::Path;

use anyhow::{Context, Result as AnyResult};
use serde::{Deserialize, Serialize};

use crate::error::{IntakeError, Result};
use crate::frame::{FrameId, RawFrame};

/// What to do when a frame cannot be decoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    /// Propagate `IntakeError::Decode` and halt the stream.
    #[default]
    Strict,
    /// Log a warning, skip the frame and keep going.
    Lenient,
}

impl std::str::FromStr for DecodePolicy {
    type Err = IntakeError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            other => Err(IntakeError::Config(format!(
                "unknown decode policy '{}'; expected strict or lenient",
                other
            ))),
        }
    }
}

/// Decoder collaborator: bytes on disk to a decoded frame.
pub trait FrameDecoder {
    fn decode(&self, path: &Path) -> AnyResult<RawFrame>;
}

/// Decoder backed by the `image` crate. Every input is converted to RGB8.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageDecoder;

impl FrameDecoder for ImageDecoder {
    fn decode(&self, path: &Path) -> AnyResult<RawFrame> {
        let image = image::open(path)
            .with_context(|| format!("decode {}", path.display()))?
            .into_rgb8();
        let (width, height) = image.dimensions();
        Ok(RawFrame::rgb(image.into_raw(), width, height)?)
    }
}

/// Loads frames one at a time, on demand.
pub struct FrameLoader<D = ImageDecoder> {
    decoder: D,
    policy: DecodePolicy,
}

impl FrameLoader<ImageDecoder> {
    pub fn new(policy: DecodePolicy) -> Self {
        Self::with_decoder(ImageDecoder, policy)
    }
}

impl<D: FrameDecoder> FrameLoader<D> {
    pub fn with_decoder(decoder: D, policy: DecodePolicy) -> Self {
        Self { decoder, policy }
    }

    pub fn policy(&self) -> DecodePolicy {
        self.policy
    }

    /// Decode one frame.
    ///
    /// Returns `Ok(None)` when the frame failed to decode under the lenient
    /// policy; the caller skips it.
    pub fn load(&self, id: &FrameId) -> Result<Option<RawFrame>> {
        match self.decoder.decode(id.path()) {
            Ok(frame) => Ok(Some(frame)),
            Err(err) => {
                let err = IntakeError::Decode {
                    id: id.to_string(),
                    reason: format!("{:#}", err),
                };
                match self.policy {
                    DecodePolicy::Strict => Err(err),
                    DecodePolicy::Lenient => {
                        log::warn!("FrameLoader: {}; skipping", err);
                        Ok(None)
                    }
                }
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(path: &Path, width: u32, height: u32) -> anyhow::Result<()> {
        let image = image::RgbImage::from_pixel(width, height, image::Rgb([10, 20, 30]));
        image.save(path)?;
        Ok(())
    }

    #[test]
    fn loads_valid_image_as_rgb() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("frame.png");
        write_png(&path, 5, 4)?;

        let loader = FrameLoader::new(DecodePolicy::Strict);
        let frame = loader.load(&FrameId::new(&path))?.expect("decoded frame");
        assert_eq!((frame.width, frame.height), (5, 4));
        assert_eq!(&frame.pixels()[..3], &[10, 20, 30]);
        Ok(())
    }

    #[test]
    fn strict_policy_propagates_decode_errors() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not a jpeg")?;

        let loader = FrameLoader::new(DecodePolicy::Strict);
        let err = loader.load(&FrameId::new(&path)).unwrap_err();
        assert!(matches!(err, IntakeError::Decode { .. }));
        Ok(())
    }

    #[test]
    fn lenient_policy_skips_decode_errors() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("missing.png");

        let loader = FrameLoader::new(DecodePolicy::Lenient);
        assert!(loader.load(&FrameId::new(&path))?.is_none());
        Ok(())
    }

    #[test]
    fn decode_policy_parses_case_insensitively() {
        assert_eq!("LENIENT".parse::<DecodePolicy>().unwrap(), DecodePolicy::Lenient);
        assert_eq!(" strict ".parse::<DecodePolicy>().unwrap(), DecodePolicy::Strict);
        assert!("sometimes".parse::<DecodePolicy>().is_err());
    }
}
