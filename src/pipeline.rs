//! Pipelines.
//!
//! - `FilePipeline`: directory → loader → preprocessor → batch aggregator.
//! - `LivePipeline`: camera → admission sampler → preprocessor → consumer.
//!
//! Each pipeline owns its sampler and monitor; nothing is global.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::batch::{Batch, Batches, FrameStream};
use crate::error::{IntakeError, Result};
use crate::frame::ProcessedFrame;
use crate::ingest::{Camera, CaptureDevice, ImageDirectory};
use crate::loader::{FrameDecoder, FrameLoader, ImageDecoder};
use crate::monitor::Monitor;
use crate::preprocess::Preprocessor;
use crate::sampler::FrameSampler;

// ----------------------------------------------------------------------------
// File-batch mode
// ----------------------------------------------------------------------------

/// Progress report after one batch.
#[derive(Clone, Copy, Debug)]
pub struct BatchTick {
    /// 1-based batch sequence number.
    pub index: u64,
    /// Frames found by the directory scan at the start of the run.
    pub discovered: usize,
    pub batch_len: usize,
    pub total_frames: u64,
    pub fps: f64,
    pub memory_mb: f64,
}

/// Totals for a completed file run.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BatchSummary {
    pub discovered: usize,
    pub frames: u64,
    pub skipped: u64,
    pub batches: u64,
    pub fps: f64,
    pub stopped: bool,
}

/// Directory-backed batching pipeline.
pub struct FilePipeline<D = ImageDecoder> {
    source: ImageDirectory,
    loader: FrameLoader<D>,
    preprocessor: Preprocessor,
    batch_size: usize,
}

impl<D: FrameDecoder> FilePipeline<D> {
    pub fn new(
        source: ImageDirectory,
        loader: FrameLoader<D>,
        preprocessor: Preprocessor,
        batch_size: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(IntakeError::Config(
                "batch size must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            source,
            loader,
            preprocessor,
            batch_size,
        })
    }

    pub fn source(&self) -> &ImageDirectory {
        &self.source
    }

    /// Lazy batch iterator over the directory as it is now.
    ///
    /// A missing directory yields no batches.
    pub fn batches(&self) -> Result<Batches<FrameStream<'_, D>>> {
        let ids = self.source.discover();
        let stream = FrameStream::new(ids, &self.loader, &self.preprocessor);
        Batches::new(stream, self.batch_size)
    }

    /// Drive the pipeline to completion, handing every batch to `consumer`.
    ///
    /// `stop` is checked between batches. A fatal decode error or consumer
    /// failure ends the run with that error.
    pub fn run<F>(
        &self,
        monitor: &mut Monitor,
        stop: &AtomicBool,
        mut consumer: F,
    ) -> Result<BatchSummary>
    where
        F: FnMut(&Batch, &BatchTick) -> anyhow::Result<()>,
    {
        let mut batches = self.batches()?;
        let mut summary = BatchSummary {
            discovered: batches.source().remaining(),
            ..BatchSummary::default()
        };
        monitor.start();
        log::info!(
            "FilePipeline: {} frames in {} (batch size {}, {:?} decode)",
            summary.discovered,
            self.source.path().display(),
            self.batch_size,
            self.loader.policy()
        );

        loop {
            if stop.load(Ordering::SeqCst) {
                summary.stopped = true;
                log::info!("FilePipeline: stop requested");
                break;
            }
            let Some(batch) = batches.next() else {
                break;
            };
            let batch = batch?;
            let fps = monitor.update(batch.len() as u64);
            let tick = BatchTick {
                index: batches.emitted(),
                discovered: summary.discovered,
                batch_len: batch.len(),
                total_frames: monitor.frame_count(),
                fps,
                memory_mb: monitor.sample_memory_mb(),
            };
            log::debug!("FilePipeline: batch #{} ({} frames)", tick.index, tick.batch_len);
            consumer(&batch, &tick).map_err(IntakeError::Downstream)?;
            summary.frames += batch.len() as u64;
            summary.batches = tick.index;
            summary.fps = fps;
        }

        summary.skipped = batches.source().skipped();
        Ok(summary)
    }
}

// ----------------------------------------------------------------------------
// Live mode
// ----------------------------------------------------------------------------

/// Progress report after one admitted frame.
#[derive(Clone, Copy, Debug)]
pub struct LiveTick {
    pub frames: u64,
    pub fps: f64,
    pub memory_mb: f64,
    /// Time between capture and the end of preprocessing.
    pub latency: Duration,
}

/// Totals for a completed live run.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LiveSummary {
    pub captured: u64,
    pub admitted: u64,
    /// Frames rejected by the admission sampler.
    pub dropped: u64,
    pub empty_reads: u64,
    pub fps: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct LiveConfig {
    pub target_fps: f64,
    /// Sleep after an empty read so the loop does not spin on a non-blocking device.
    pub idle_backoff: Duration,
    /// Stop after this many admitted frames.
    pub max_frames: Option<u64>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            target_fps: 5.0,
            idle_backoff: Duration::from_millis(2),
            max_frames: None,
        }
    }
}

/// Camera-backed rate-limited pipeline.
pub struct LivePipeline<C: CaptureDevice> {
    camera: Camera<C>,
    sampler: FrameSampler,
    preprocessor: Preprocessor,
    config: LiveConfig,
}

impl<C: CaptureDevice> LivePipeline<C> {
    pub fn new(camera: Camera<C>, preprocessor: Preprocessor, config: LiveConfig) -> Result<Self> {
        Ok(Self {
            camera,
            sampler: FrameSampler::new(config.target_fps)?,
            preprocessor,
            config,
        })
    }

    pub fn camera(&self) -> &Camera<C> {
        &self.camera
    }

    /// Run until `stop` is set, `max_frames` is reached, or the device fails.
    ///
    /// `stop` is only checked before a capture call, so a captured frame is
    /// always either admitted and handed to `consumer`, or counted as dropped.
    /// The device is released on every exit path.
    pub fn run<F>(
        &mut self,
        monitor: &mut Monitor,
        stop: &AtomicBool,
        consumer: F,
    ) -> Result<LiveSummary>
    where
        F: FnMut(&ProcessedFrame, &LiveTick) -> anyhow::Result<()>,
    {
        let result = self.run_inner(monitor, stop, consumer);
        self.camera.release();
        result
    }

    fn run_inner<F>(
        &mut self,
        monitor: &mut Monitor,
        stop: &AtomicBool,
        mut consumer: F,
    ) -> Result<LiveSummary>
    where
        F: FnMut(&ProcessedFrame, &LiveTick) -> anyhow::Result<()>,
    {
        self.camera.open()?;
        monitor.start();
        log::info!(
            "LivePipeline: capturing from {} at up to {:.1} fps",
            self.camera.name(),
            self.config.target_fps
        );

        let mut summary = LiveSummary::default();
        while !stop.load(Ordering::SeqCst) {
            if self.config.max_frames.is_some_and(|max| summary.admitted >= max) {
                break;
            }

            let Some(frame) = self.camera.try_capture()? else {
                summary.empty_reads += 1;
                if !self.config.idle_backoff.is_zero() {
                    std::thread::sleep(self.config.idle_backoff);
                }
                continue;
            };
            summary.captured += 1;

            if !self.sampler.allow() {
                summary.dropped += 1;
                continue;
            }

            let processed = self.preprocessor.process(&frame);
            let latency = frame.age();
            drop(frame);

            let fps = monitor.update(1);
            summary.admitted += 1;
            summary.fps = fps;
            let tick = LiveTick {
                frames: monitor.frame_count(),
                fps,
                memory_mb: monitor.sample_memory_mb(),
                latency,
            };
            consumer(&processed, &tick).map_err(IntakeError::Downstream)?;
        }

        if stop.load(Ordering::SeqCst) {
            log::info!("LivePipeline: stop requested");
        }
        Ok(summary)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
