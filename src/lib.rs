//! Frame Intake
//!
//! Real-time frame intake for image-analysis workloads: frames are pulled from
//! a directory of still images or a live camera, normalized into a uniform
//! tensor layout, rate limited, grouped into fixed-size batches and handed to
//! a downstream consumer, while throughput and memory are tracked.
//!
//! # Module Structure
//!
//! - `ingest`: frame sources (image directory, live camera)
//! - `loader`: decode a frame identifier into a `RawFrame` under a `DecodePolicy`
//! - `preprocess`: resize, scale to [0, 1], optional channels-first layout
//! - `sampler`: admission rate limiter for the live loop
//! - `batch`: lazy load/preprocess stream and fixed-size batch aggregation
//! - `monitor`: running FPS, resident memory, periodic CSV metrics log
//! - `pipeline`: file-batch and live orchestration
//! - `classify`: optional downstream image classifier
//! - `config`: JSON file plus environment configuration

pub mod batch;
pub mod classify;
pub mod config;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod loader;
pub mod monitor;
pub mod pipeline;
pub mod preprocess;
pub mod sampler;

pub use batch::{batch_frames, Batch, Batches, FrameStream};
pub use classify::{Classifier, Prediction};
pub use config::IntakeConfig;
pub use error::{IntakeError, Result};
pub use frame::{ChannelOrder, FrameId, Layout, ProcessedFrame, RawFrame, CHANNELS};
pub use ingest::{
    Camera, CameraConfig, CameraSource, CaptureDevice, DirectoryConfig, ImageDirectory,
};
pub use loader::{DecodePolicy, FrameDecoder, FrameLoader, ImageDecoder};
pub use monitor::{MetricsLog, Monitor, SharedMonitor, Snapshot};
pub use pipeline::{
    BatchSummary, BatchTick, FilePipeline, LiveConfig, LivePipeline, LiveSummary, LiveTick,
};
pub use preprocess::{PreprocessConfig, Preprocessor, ResizeFilter};
pub use sampler::FrameSampler;
