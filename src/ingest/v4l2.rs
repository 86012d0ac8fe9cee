//! V4L2 capture device.
//!
//! `V4l2Device` opens a local device node (e.g. /dev/video0), requests RGB24
//! at the configured size and falls back to whatever packed format the driver
//! negotiates (YUYV or NV12), normalizing every buffer to RGB.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::camera::CameraConfig;
use super::normalize::{normalize_to_rgb, PixelFormat};
use crate::frame::RawFrame;

pub(crate) struct V4l2Device {
    path: String,
    config: CameraConfig,
    state: Option<V4l2State>,
    format: PixelFormat,
    active_width: u32,
    active_height: u32,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Device {
    pub(crate) fn new(config: CameraConfig) -> Self {
        Self {
            path: config.device_path(),
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            format: PixelFormat::Rgb24,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.path
    }

    pub(crate) fn open(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.path)
            .with_context(|| format!("open v4l2 device {}", self.path))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("V4l2Device: failed to set format on {}: {}", self.path, err);
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        self.format = match &format.fourcc.repr {
            b"RGB3" => PixelFormat::Rgb24,
            b"YUYV" => PixelFormat::Yuyv,
            b"NV12" => PixelFormat::Nv12,
            other => {
                return Err(anyhow!(
                    "unsupported v4l2 pixel format {}",
                    String::from_utf8_lossy(other)
                ))
            }
        };

        if self.config.native_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.native_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("V4l2Device: failed to set fps on {}: {}", self.path, err);
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;

        let state = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);

        log::info!(
            "V4l2Device: opened {} ({}x{} {:?})",
            self.path,
            self.active_width,
            self.active_height,
            self.format
        );
        Ok(())
    }

    /// Blocks until the driver hands over the next buffer.
    pub(crate) fn read(&mut self) -> Result<Option<RawFrame>> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not open")?;
        let (buf, meta) = state
            .with_mut(|fields| fields.stream.next())
            .context("capture v4l2 frame")?;
        if meta.bytesused == 0 {
            return Ok(None);
        }
        let used = (meta.bytesused as usize).min(buf.len());
        let (width, height) = (self.active_width, self.active_height);
        let rgb = normalize_to_rgb(&buf[..used], width, height, self.format)?;
        Ok(Some(RawFrame::rgb(rgb, width, height)?))
    }

    pub(crate) fn release(&mut self) {
        // Dropping the stream unmaps the buffers and stops streaming.
        self.state = None;
    }
}
