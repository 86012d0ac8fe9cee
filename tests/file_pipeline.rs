use std::path::Path;
use std::sync::atomic::AtomicBool;

use anyhow::Result;
use image::{Rgb, RgbImage};
use tempfile::TempDir;

use frame_intake::monitor::MetricsLog;
use frame_intake::{
    DecodePolicy, DirectoryConfig, FilePipeline, FrameLoader, ImageDirectory, IntakeError, Layout,
    Monitor, PreprocessConfig, Preprocessor, ResizeFilter,
};

const SIDE: u32 = 8;

/// Write a solid image whose red channel is `tag`.
fn write_tagged(dir: &Path, name: &str, tag: u8) -> Result<()> {
    RgbImage::from_pixel(SIDE, SIDE, Rgb([tag, 0, 255])).save(dir.join(name))?;
    Ok(())
}

fn write_corrupt(dir: &Path, name: &str) -> Result<()> {
    std::fs::write(dir.join(name), b"definitely not a png")?;
    Ok(())
}

fn build_pipeline(dir: &Path, policy: DecodePolicy, batch_size: usize) -> Result<FilePipeline> {
    let source = ImageDirectory::new(DirectoryConfig {
        path: dir.to_path_buf(),
        ..DirectoryConfig::default()
    });
    let preprocessor = Preprocessor::new(PreprocessConfig {
        width: SIDE,
        height: SIDE,
        layout: Layout::ChannelsLast,
        filter: ResizeFilter::Nearest,
    })?;
    Ok(FilePipeline::new(
        source,
        FrameLoader::new(policy),
        preprocessor,
        batch_size,
    )?)
}

/// Red sample of each frame of each batch, as the original 8-bit tag.
fn collect_tags(pipeline: &FilePipeline) -> Result<Vec<Vec<u8>>> {
    let mut out = Vec::new();
    for batch in pipeline.batches()? {
        let batch = batch?;
        out.push(
            batch
                .iter()
                .map(|frame| (frame.as_slice()[0] * 255.0).round() as u8)
                .collect(),
        );
    }
    Ok(out)
}

#[test]
fn nine_images_batch_as_four_four_one_in_name_order() -> Result<()> {
    let dir = TempDir::new()?;
    for i in 0..9u8 {
        write_tagged(dir.path(), &format!("frame_{i:02}.png"), i * 10)?;
    }
    std::fs::write(dir.path().join("notes.txt"), b"ignored")?;

    let tags = collect_tags(&build_pipeline(dir.path(), DecodePolicy::Strict, 4)?)?;
    assert_eq!(
        tags,
        vec![vec![0, 10, 20, 30], vec![40, 50, 60, 70], vec![80]]
    );
    Ok(())
}

#[test]
fn processed_frames_have_target_shape_and_unit_range() -> Result<()> {
    let dir = TempDir::new()?;
    RgbImage::from_fn(37, 23, |x, y| Rgb([(x * 7) as u8, (y * 11) as u8, 255]))
        .save(dir.path().join("odd.png"))?;

    let source = ImageDirectory::new(DirectoryConfig {
        path: dir.path().to_path_buf(),
        ..DirectoryConfig::default()
    });
    let preprocessor = Preprocessor::new(PreprocessConfig::default())?;
    let pipeline = FilePipeline::new(
        source,
        FrameLoader::new(DecodePolicy::Strict),
        preprocessor,
        2,
    )?;

    let batches: Vec<_> = pipeline.batches()?.collect::<Result<_, _>>()?;
    assert_eq!(batches.len(), 1);
    let frame = &batches[0].frames()[0];
    assert_eq!(frame.shape(), [3, 224, 224]);
    assert_eq!(frame.as_slice().len(), 3 * 224 * 224);
    assert!(frame.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
    Ok(())
}

#[test]
fn missing_directory_yields_no_batches() -> Result<()> {
    let dir = TempDir::new()?;
    let pipeline = build_pipeline(&dir.path().join("absent"), DecodePolicy::Strict, 4)?;
    assert!(matches!(
        pipeline.source().scan(),
        Err(IntakeError::SourceUnavailable { .. })
    ));
    assert_eq!(pipeline.batches()?.count(), 0);

    let mut monitor = Monitor::new();
    let summary = pipeline.run(&mut monitor, &AtomicBool::new(false), |_, _| Ok(()))?;
    assert_eq!(summary.discovered, 0);
    assert_eq!(summary.batches, 0);
    Ok(())
}

#[test]
fn lenient_policy_skips_one_corrupt_frame_of_ten() -> Result<()> {
    let dir = TempDir::new()?;
    for i in 0..10u8 {
        if i == 4 {
            write_corrupt(dir.path(), &format!("frame_{i:02}.png"))?;
        } else {
            write_tagged(dir.path(), &format!("frame_{i:02}.png"), i)?;
        }
    }

    let pipeline = build_pipeline(dir.path(), DecodePolicy::Lenient, 4)?;
    let tags = collect_tags(&pipeline)?;
    assert_eq!(
        tags,
        vec![vec![0, 1, 2, 3], vec![5, 6, 7, 8], vec![9]]
    );

    let mut monitor = Monitor::new();
    let mut sizes = Vec::new();
    let summary = pipeline.run(&mut monitor, &AtomicBool::new(false), |batch, tick| {
        sizes.push(batch.len());
        assert_eq!(tick.discovered, 10);
        Ok(())
    })?;
    assert_eq!(sizes, vec![4, 4, 1]);
    assert_eq!(summary.discovered, 10);
    assert_eq!(summary.frames, 9);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.batches, 3);
    assert_eq!(monitor.frame_count(), 9);
    Ok(())
}

#[test]
fn strict_policy_halts_on_first_corrupt_frame() -> Result<()> {
    let dir = TempDir::new()?;
    for i in 0..6u8 {
        if i == 5 {
            write_corrupt(dir.path(), &format!("frame_{i:02}.png"))?;
        } else {
            write_tagged(dir.path(), &format!("frame_{i:02}.png"), i)?;
        }
    }

    let pipeline = build_pipeline(dir.path(), DecodePolicy::Strict, 4)?;
    let mut delivered = 0;
    let mut monitor = Monitor::new();
    let err = pipeline
        .run(&mut monitor, &AtomicBool::new(false), |batch, _| {
            delivered += batch.len();
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, IntakeError::Decode { ref id, .. } if id.ends_with("frame_05.png")));
    // The first full batch went out; the partial second batch was discarded.
    assert_eq!(delivered, 4);
    Ok(())
}

#[test]
fn stop_flag_ends_run_between_batches() -> Result<()> {
    let dir = TempDir::new()?;
    for i in 0..8u8 {
        write_tagged(dir.path(), &format!("frame_{i:02}.png"), i)?;
    }

    let pipeline = build_pipeline(dir.path(), DecodePolicy::Strict, 2)?;
    let stop = AtomicBool::new(false);
    let mut monitor = Monitor::new();
    let summary = pipeline.run(&mut monitor, &stop, |_, tick| {
        if tick.index == 2 {
            stop.store(true, std::sync::atomic::Ordering::SeqCst);
        }
        Ok(())
    })?;
    assert!(summary.stopped);
    assert_eq!(summary.batches, 2);
    assert_eq!(summary.frames, 4);
    Ok(())
}

#[test]
fn consumer_failure_surfaces_as_downstream_error() -> Result<()> {
    let dir = TempDir::new()?;
    write_tagged(dir.path(), "a.png", 1)?;

    let pipeline = build_pipeline(dir.path(), DecodePolicy::Strict, 4)?;
    let mut monitor = Monitor::new();
    let err = pipeline
        .run(&mut monitor, &AtomicBool::new(false), |_, _| {
            Err(anyhow::anyhow!("classifier offline"))
        })
        .unwrap_err();
    assert!(matches!(err, IntakeError::Downstream(_)));
    Ok(())
}

#[test]
fn metrics_log_receives_one_row_per_batch() -> Result<()> {
    let dir = TempDir::new()?;
    for i in 0..5u8 {
        write_tagged(dir.path(), &format!("frame_{i:02}.png"), i)?;
    }
    let log_path = dir.path().join("metrics.csv");

    let pipeline = build_pipeline(dir.path(), DecodePolicy::Strict, 2)?;
    let mut monitor = Monitor::new().with_log(MetricsLog::new(&log_path, 1));
    pipeline.run(&mut monitor, &AtomicBool::new(false), |_, _| Ok(()))?;

    let contents = std::fs::read_to_string(&log_path)?;
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines[0], "timestamp,frame_count,fps,mem_mb");
    assert_eq!(lines.len(), 4);
    let counts: Vec<&str> = lines[1..]
        .iter()
        .map(|line| line.split(',').nth(1).unwrap_or_default())
        .collect();
    assert_eq!(counts, vec!["2", "4", "5"]);
    Ok(())
}
