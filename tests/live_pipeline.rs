use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::Result;

use frame_intake::{
    Camera, CameraConfig, CameraSource, IntakeError, Layout, LiveConfig, LivePipeline, Monitor,
    PreprocessConfig, Preprocessor, ResizeFilter,
};

fn stub_camera(native_fps: u32) -> Result<Camera<CameraSource>> {
    let source = CameraSource::new(CameraConfig {
        device: "stub://bench".to_string(),
        width: 32,
        height: 24,
        native_fps,
    })?;
    Ok(Camera::new(source))
}

fn preprocessor() -> Result<Preprocessor> {
    Ok(Preprocessor::new(PreprocessConfig {
        width: 16,
        height: 16,
        layout: Layout::ChannelsFirst,
        filter: ResizeFilter::Triangle,
    })?)
}

#[test]
fn stub_camera_delivers_max_frames_at_target_size() -> Result<()> {
    let config = LiveConfig {
        target_fps: 200.0,
        idle_backoff: Duration::from_millis(1),
        max_frames: Some(4),
    };
    let mut pipeline = LivePipeline::new(stub_camera(0)?, preprocessor()?, config)?;
    let mut monitor = Monitor::new();
    let mut shapes = Vec::new();

    let summary = pipeline.run(&mut monitor, &AtomicBool::new(false), |frame, tick| {
        shapes.push(frame.shape());
        assert!(frame.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(tick.frames, shapes.len() as u64);
        Ok(())
    })?;

    assert_eq!(summary.admitted, 4);
    assert_eq!(summary.captured, summary.admitted + summary.dropped);
    assert!(shapes.iter().all(|s| *s == [3, 16, 16]));
    assert_eq!(monitor.frame_count(), 4);
    assert!(!pipeline.camera().is_open());
    Ok(())
}

#[test]
fn admission_rate_is_bounded_by_target_fps() -> Result<()> {
    // A camera producing frames as fast as it is polled, admitted at 20 fps.
    let config = LiveConfig {
        target_fps: 20.0,
        idle_backoff: Duration::ZERO,
        max_frames: Some(3),
    };
    let mut pipeline = LivePipeline::new(stub_camera(0)?, preprocessor()?, config)?;
    let mut monitor = Monitor::new();

    let started = std::time::Instant::now();
    let summary = pipeline.run(&mut monitor, &AtomicBool::new(false), |_, _| Ok(()))?;
    let elapsed = started.elapsed();

    assert_eq!(summary.admitted, 3);
    assert!(summary.dropped > 0);
    // Three admissions need at least two full intervals.
    assert!(elapsed >= Duration::from_millis(100));
    Ok(())
}

#[test]
fn zero_target_fps_is_rejected() -> Result<()> {
    let config = LiveConfig {
        target_fps: 0.0,
        ..LiveConfig::default()
    };
    assert!(matches!(
        LivePipeline::new(stub_camera(0)?, preprocessor()?, config),
        Err(IntakeError::Config(_))
    ));
    Ok(())
}

#[cfg(not(feature = "ingest-v4l2"))]
#[test]
fn hardware_device_without_capture_backend_is_a_device_error() {
    let result = CameraSource::new(CameraConfig {
        device: "0".to_string(),
        ..CameraConfig::default()
    });
    assert!(matches!(
        result,
        Err(IntakeError::Device { ref device, .. }) if device == "/dev/video0"
    ));
}
