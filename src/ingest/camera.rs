//! Live camera frame source.
//!
//! `CaptureDevice` is the driver seam: open, read one frame if one is ready,
//! release. `Camera` wraps a device and turns raw driver behaviour into the
//! pipeline contract:
//! - An empty read is never an error.
//! - A device that keeps failing (consecutive read errors, or no frame within
//!   the stall timeout) is reported as `IntakeError::Device`.
//!
//! `CameraSource` is the stock device: a synthetic `stub://` camera, or a V4L2
//! device when built with `ingest-v4l2`.

use std::time::{Duration, Instant};

use anyhow::Result as AnyResult;

#[cfg(feature = "ingest-v4l2")]
use super::v4l2::V4l2Device;
use crate::error::{IntakeError, Result};
use crate::frame::{RawFrame, CHANNELS};

/// Driver-level capture interface.
pub trait CaptureDevice {
    /// Human-readable device name for logs and errors.
    fn name(&self) -> &str;

    /// Acquire the device.
    fn open(&mut self) -> AnyResult<()>;

    /// Return a frame if one is ready. `Ok(None)` means "nothing yet".
    fn read(&mut self) -> AnyResult<Option<RawFrame>>;

    /// Release the device. Must be safe to call more than once.
    fn release(&mut self);
}

/// Failure thresholds applied by [`Camera`].
#[derive(Clone, Copy, Debug)]
pub struct CameraHealth {
    /// Consecutive read errors tolerated before the device is declared unusable.
    pub max_consecutive_errors: u32,
    /// Longest time without a frame before the device is declared stalled.
    pub stall_timeout: Duration,
}

impl Default for CameraHealth {
    fn default() -> Self {
        Self {
            max_consecutive_errors: 5,
            stall_timeout: Duration::from_secs(5),
        }
    }
}

/// Statistics for a camera.
#[derive(Clone, Debug, Default)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub empty_reads: u64,
    pub read_errors: u64,
}

/// Pull-based live frame accessor with persistent-failure detection.
pub struct Camera<D: CaptureDevice> {
    device: D,
    health: CameraHealth,
    opened: bool,
    consecutive_errors: u32,
    last_frame_at: Option<Instant>,
    stats: CameraStats,
}

impl<D: CaptureDevice> Camera<D> {
    pub fn new(device: D) -> Self {
        Self::with_health(device, CameraHealth::default())
    }

    pub fn with_health(device: D, health: CameraHealth) -> Self {
        Self {
            device,
            health,
            opened: false,
            consecutive_errors: 0,
            last_frame_at: None,
            stats: CameraStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        self.device.name()
    }

    pub fn open(&mut self) -> Result<()> {
        if self.opened {
            return Ok(());
        }
        self.device.open().map_err(|err| self.device_error(format!("{:#}", err)))?;
        self.opened = true;
        self.consecutive_errors = 0;
        self.last_frame_at = Some(Instant::now());
        log::info!("Camera: opened {}", self.device.name());
        Ok(())
    }

    /// Capture one frame. `Ok(None)` on a transient empty read.
    ///
    /// Blocking depends on the device: the synthetic camera returns at once,
    /// a V4L2 device waits for the driver to hand over the next buffer.
    pub fn try_capture(&mut self) -> Result<Option<RawFrame>> {
        if !self.opened {
            self.open()?;
        }
        match self.device.read() {
            Ok(Some(frame)) => {
                self.consecutive_errors = 0;
                self.last_frame_at = Some(Instant::now());
                self.stats.frames_captured += 1;
                Ok(Some(frame))
            }
            Ok(None) => {
                self.stats.empty_reads += 1;
                self.check_stall()?;
                Ok(None)
            }
            Err(err) => {
                self.stats.read_errors += 1;
                self.consecutive_errors += 1;
                log::warn!(
                    "Camera: read error on {} ({}/{}): {:#}",
                    self.device.name(),
                    self.consecutive_errors,
                    self.health.max_consecutive_errors,
                    err
                );
                if self.consecutive_errors >= self.health.max_consecutive_errors {
                    return Err(self.device_error(format!(
                        "{} consecutive read errors, last: {:#}",
                        self.consecutive_errors, err
                    )));
                }
                self.check_stall()?;
                Ok(None)
            }
        }
    }

    pub fn release(&mut self) {
        if self.opened {
            self.device.release();
            self.opened = false;
            log::info!("Camera: released {}", self.device.name());
        }
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    pub fn stats(&self) -> CameraStats {
        self.stats.clone()
    }

    /// Borrow the wrapped driver.
    pub fn device(&self) -> &D {
        &self.device
    }

    fn check_stall(&self) -> Result<()> {
        let Some(last) = self.last_frame_at else {
            return Ok(());
        };
        let idle = last.elapsed();
        if idle > self.health.stall_timeout {
            return Err(self.device_error(format!(
                "no frame for {:.1}s (stall timeout {:.1}s)",
                idle.as_secs_f64(),
                self.health.stall_timeout.as_secs_f64()
            )));
        }
        Ok(())
    }

    fn device_error(&self, reason: String) -> IntakeError {
        IntakeError::Device {
            device: self.device.name().to_string(),
            reason,
        }
    }
}

impl<D: CaptureDevice> Drop for Camera<D> {
    fn drop(&mut self) {
        self.release();
    }
}

// ----------------------------------------------------------------------------
// CameraSource: stock devices
// ----------------------------------------------------------------------------

/// Configuration for a stock camera.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// `stub://<name>`, a device path (`/dev/video0`) or a bare index (`0`).
    pub device: String,
    pub width: u32,
    pub height: u32,
    /// Native rate of the device. The synthetic camera only has a frame ready
    /// once per `1 / native_fps`; 0 means "always ready".
    pub native_fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "stub://camera".to_string(),
            width: 640,
            height: 480,
            native_fps: 30,
        }
    }
}

impl CameraConfig {
    /// Device path with a bare index expanded to `/dev/video<index>`.
    pub fn device_path(&self) -> String {
        if !self.device.is_empty() && self.device.chars().all(|c| c.is_ascii_digit()) {
            format!("/dev/video{}", self.device)
        } else {
            self.device.clone()
        }
    }
}

/// Stock capture device.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    V4l2(V4l2Device),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(IntakeError::Config(
                "camera width and height must be non-zero".to_string(),
            ));
        }
        if config.device.starts_with("stub://") {
            Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticCamera::new(config)?),
            })
        } else {
            #[cfg(feature = "ingest-v4l2")]
            {
                Ok(Self {
                    backend: CameraBackend::V4l2(V4l2Device::new(config)),
                })
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                Err(IntakeError::Device {
                    device: config.device_path(),
                    reason: "live capture requires the ingest-v4l2 feature".to_string(),
                })
            }
        }
    }
}

impl CaptureDevice for CameraSource {
    fn name(&self) -> &str {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.name(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.name(),
        }
    }

    fn open(&mut self) -> AnyResult<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.open(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.open(),
        }
    }

    fn read(&mut self) -> AnyResult<Option<RawFrame>> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.read(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.read(),
        }
    }

    fn release(&mut self) {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.release(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.release(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://)
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    config: CameraConfig,
    frame_len: usize,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    open: bool,
}

impl SyntheticCamera {
    fn new(config: CameraConfig) -> Result<Self> {
        let frame_len = (config.width as usize)
            .checked_mul(config.height as usize)
            .and_then(|v| v.checked_mul(CHANNELS))
            .ok_or_else(|| {
                IntakeError::Config(format!(
                    "synthetic frame size {}x{} overflows",
                    config.width, config.height
                ))
            })?;
        Ok(Self {
            config,
            frame_len,
            frame_count: 0,
            last_frame_at: None,
            open: false,
        })
    }

    fn name(&self) -> &str {
        &self.config.device
    }

    fn open(&mut self) -> AnyResult<()> {
        self.open = true;
        log::info!(
            "SyntheticCamera: {} ready ({}x{} @ {} fps)",
            self.config.device,
            self.config.width,
            self.config.height,
            self.config.native_fps
        );
        Ok(())
    }

    fn read(&mut self) -> AnyResult<Option<RawFrame>> {
        anyhow::ensure!(self.open, "synthetic camera {} is not open", self.config.device);
        if self.config.native_fps > 0 {
            let interval = Duration::from_secs_f64(1.0 / self.config.native_fps as f64);
            if let Some(last) = self.last_frame_at {
                if last.elapsed() < interval {
                    return Ok(None);
                }
            }
        }
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        let pixels = self.generate_pixels();
        Ok(Some(RawFrame::rgb(
            pixels,
            self.config.width,
            self.config.height,
        )?))
    }

    fn release(&mut self) {
        self.open = false;
    }

    /// Moving gradient so consecutive frames differ.
    fn generate_pixels(&self) -> Vec<u8> {
        let mut pixels = vec![0u8; self.frame_len];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count) % 256) as u8;
        }
        pixels
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
