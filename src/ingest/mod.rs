//! Frame sources.
//!
//! - `directory`: still images enumerated from a local directory (file-batch mode)
//! - `camera`: live capture behind the `CaptureDevice` seam (live mode)
//! - `v4l2`: USB/V4L2 devices (feature: ingest-v4l2)
//!
//! Directory sources only hand out identifiers; decoding happens lazily in the
//! loader. Cameras hand out decoded `RawFrame`s, one per pull.
//!
//! No source performs network I/O or writes frames to disk.

pub mod camera;
pub mod directory;
#[cfg(any(feature = "ingest-v4l2", test))]
mod normalize;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

pub use camera::{Camera, CameraConfig, CameraHealth, CameraSource, CameraStats, CaptureDevice};
pub use directory::{DirectoryConfig, ImageDirectory, DEFAULT_EXTENSIONS};
