use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the intake core.
///
/// Severity is fixed per variant except `Decode`, whose handling is chosen by
/// [`DecodePolicy`](crate::loader::DecodePolicy).
#[derive(Debug, Error)]
pub enum IntakeError {
    /// The backing directory of a frame source does not exist.
    #[error("frame source {} is unavailable", path.display())]
    SourceUnavailable { path: PathBuf },

    /// A single frame could not be decoded.
    #[error("failed to decode frame {id}: {reason}")]
    Decode { id: String, reason: String },

    /// The live capture device is unusable. Always fatal for the live loop.
    #[error("capture device {device} is unusable: {reason}")]
    Device { device: String, reason: String },

    /// The metrics log sink could not be written. Never returned to the frame path.
    #[error("metrics log write to {} failed: {source}", path.display())]
    LogWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A frame buffer does not match its declared geometry.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// A downstream consumer (e.g. a classifier) rejected a frame.
    #[error("downstream consumer failed: {0:#}")]
    Downstream(anyhow::Error),
}

pub type Result<T> = std::result::Result<T, IntakeError>;
