//! frame_intake - batch or live frame intake with throughput reporting
//!
//! `batch` walks an image directory, preprocesses every frame and hands
//! fixed-size batches downstream. `live` captures from a camera, admits
//! frames at a bounded rate and (with `backend-tract`) classifies them.
//! Both print one status line per unit of work and stop cleanly on Ctrl-C.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use frame_intake::{
    Camera, CameraSource, DecodePolicy, FilePipeline, FrameLoader, ImageDirectory, IntakeConfig,
    LiveConfig, LivePipeline, Monitor, Preprocessor,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
    /// Append a CSV metrics row (timestamp,frame_count,fps,mem_mb) to this file.
    #[arg(long, global = true, value_name = "PATH")]
    metrics_log: Option<PathBuf>,
    /// Write a metrics row every N monitor updates.
    #[arg(long, global = true, value_name = "N")]
    log_every: Option<u64>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, global = true, default_value = "auto", value_name = "MODE")]
    ui: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Batch every image in a directory.
    Batch {
        /// Directory of still images.
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Frames per batch.
        #[arg(long)]
        batch_size: Option<usize>,
        /// Decode failure handling (strict|lenient).
        #[arg(long, value_name = "POLICY")]
        policy: Option<DecodePolicy>,
        /// Shorthand for `--policy lenient`.
        #[arg(long, conflicts_with = "policy")]
        lenient: bool,
        /// Simulated downstream work per batch, in milliseconds.
        #[arg(long, default_value_t = 0)]
        simulate_ms: u64,
    },
    /// Capture from a camera at a bounded rate.
    Live {
        /// `stub://<name>`, a device path, or a bare V4L2 index.
        #[arg(long)]
        device: Option<String>,
        /// Target admission rate.
        #[arg(long)]
        fps: Option<f64>,
        /// Stop after this many admitted frames.
        #[arg(long)]
        max_frames: Option<u64>,
        /// ONNX classifier applied to every admitted frame.
        #[cfg(feature = "backend-tract")]
        #[arg(long)]
        model: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mut cfg = {
        let _stage = ui.stage("Load configuration");
        IntakeConfig::load()?
    };
    if let Some(path) = args.metrics_log {
        cfg.metrics.log_path = Some(path);
    }
    if let Some(every) = args.log_every {
        cfg.metrics.log_every = every;
    }

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })
        .context("error setting Ctrl-C handler")?;
    }

    match args.command {
        Command::Batch {
            dir,
            batch_size,
            policy,
            lenient,
            simulate_ms,
        } => {
            if let Some(dir) = dir {
                cfg.source.dir = dir;
            }
            if let Some(size) = batch_size {
                cfg.batch_size = size;
            }
            if let Some(policy) = policy {
                cfg.decode_policy = policy;
            }
            if lenient {
                cfg.decode_policy = DecodePolicy::Lenient;
            }
            cfg.validate()?;
            run_batch(&cfg, &ui, &stop, Duration::from_millis(simulate_ms))
        }
        Command::Live {
            device,
            fps,
            max_frames,
            #[cfg(feature = "backend-tract")]
            model,
        } => {
            if let Some(device) = device {
                cfg.camera.device = device;
            }
            if let Some(fps) = fps {
                cfg.target_fps = fps;
            }
            cfg.validate()?;
            let live = LiveConfig {
                target_fps: cfg.target_fps,
                max_frames,
                ..LiveConfig::default()
            };
            #[cfg(feature = "backend-tract")]
            {
                run_live(&cfg, &ui, &stop, live, model)
            }
            #[cfg(not(feature = "backend-tract"))]
            {
                run_live(&cfg, &ui, &stop, live)
            }
        }
    }
}

fn build_monitor(cfg: &IntakeConfig) -> Monitor {
    let monitor = Monitor::new();
    match cfg.metrics_log() {
        Some(log) => {
            log::info!("metrics log: {}", log.path().display());
            monitor.with_log(log)
        }
        None => monitor,
    }
}

fn run_batch(cfg: &IntakeConfig, ui: &ui::Ui, stop: &AtomicBool, simulate: Duration) -> Result<()> {
    let pipeline = FilePipeline::new(
        ImageDirectory::new(cfg.directory_config()),
        FrameLoader::new(cfg.decode_policy),
        Preprocessor::new(cfg.preprocess_config())?,
        cfg.batch_size,
    )?;
    let mut monitor = build_monitor(cfg);

    let progress = ui.progress(Some(0));
    let summary = pipeline.run(&mut monitor, stop, |batch, tick| {
        if tick.index == 1 {
            progress.set_total(tick.discovered as u64);
        }
        if !simulate.is_zero() {
            std::thread::sleep(simulate);
        }
        progress.report(
            tick.total_frames,
            &format!(
                "Batch Size: {} | Total FPS: {:.2} | Mem(MB): {:.2}",
                batch.len(),
                tick.fps,
                tick.memory_mb
            ),
        );
        Ok(())
    })?;
    drop(progress);

    println!(
        "{} frames in {} batches ({} skipped) | FPS: {:.2}{}",
        summary.frames,
        summary.batches,
        summary.skipped,
        summary.fps,
        if summary.stopped { " | interrupted" } else { "" }
    );
    Ok(())
}

#[cfg(feature = "backend-tract")]
fn run_live(
    cfg: &IntakeConfig,
    ui: &ui::Ui,
    stop: &AtomicBool,
    live: LiveConfig,
    model: Option<PathBuf>,
) -> Result<()> {
    use frame_intake::classify::{Classifier, TractClassifier};

    let mut classifier = match model {
        Some(path) => {
            let _stage = ui.stage("Load classifier");
            let mut classifier =
                TractClassifier::new(&path, cfg.preprocess.width, cfg.preprocess.height)?;
            classifier.warm_up()?;
            Some(classifier)
        }
        None => None,
    };
    live_loop(cfg, ui, stop, live, |frame| match classifier.as_mut() {
        Some(classifier) => {
            let prediction = classifier.classify(frame)?;
            Ok(Some(format!(
                "Prediction: class {} ({:.2})",
                prediction.class_index, prediction.probability
            )))
        }
        None => Ok(None),
    })
}

#[cfg(not(feature = "backend-tract"))]
fn run_live(cfg: &IntakeConfig, ui: &ui::Ui, stop: &AtomicBool, live: LiveConfig) -> Result<()> {
    live_loop(cfg, ui, stop, live, |_| Ok(None))
}

fn live_loop<F>(
    cfg: &IntakeConfig,
    ui: &ui::Ui,
    stop: &AtomicBool,
    live: LiveConfig,
    mut label: F,
) -> Result<()>
where
    F: FnMut(&frame_intake::ProcessedFrame) -> Result<Option<String>>,
{
    let camera = {
        let _stage = ui.stage("Open camera");
        Camera::new(CameraSource::new(cfg.camera_config())?)
    };
    let preprocessor = Preprocessor::new(cfg.preprocess_config())?;
    let mut pipeline = LivePipeline::new(camera, preprocessor, live)?;
    let mut monitor = build_monitor(cfg);

    let progress = ui.progress(live.max_frames);
    let summary = pipeline.run(&mut monitor, stop, |frame, tick| {
        let prefix = label(frame)?.unwrap_or_else(|| "Frame".to_string());
        progress.report(
            tick.frames,
            &format!(
                "{} | FPS: {:.2} | Mem: {:.2} MB | Latency: {}",
                prefix,
                tick.fps,
                tick.memory_mb,
                ui::format_duration(tick.latency)
            ),
        );
        Ok(())
    });
    drop(progress);
    let summary = summary?;

    println!(
        "{} frames admitted, {} dropped by sampler | FPS: {:.2}{}",
        summary.admitted,
        summary.dropped,
        summary.fps,
        if stop.load(Ordering::SeqCst) {
            " | interrupted"
        } else {
            ""
        }
    );
    log::info!("camera stopped");
    Ok(())
}
