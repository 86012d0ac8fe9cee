use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::frame::Layout;
use crate::ingest::{CameraConfig, DirectoryConfig, DEFAULT_EXTENSIONS};
use crate::loader::DecodePolicy;
use crate::monitor::MetricsLog;
use crate::preprocess::{PreprocessConfig, ResizeFilter};
use crate::sampler::FrameSampler;

const DEFAULT_SOURCE_DIR: &str = "data/images";
const DEFAULT_DEVICE: &str = "stub://camera";
const DEFAULT_CAPTURE_WIDTH: u32 = 640;
const DEFAULT_CAPTURE_HEIGHT: u32 = 480;
const DEFAULT_NATIVE_FPS: u32 = 30;
const DEFAULT_TARGET_SIZE: u32 = 224;
const DEFAULT_BATCH_SIZE: usize = 4;
const DEFAULT_TARGET_FPS: f64 = 5.0;
const DEFAULT_LOG_EVERY: u64 = 10;

#[derive(Debug, Deserialize, Default)]
struct IntakeConfigFile {
    source: Option<SourceConfigFile>,
    camera: Option<CameraConfigFile>,
    preprocess: Option<PreprocessConfigFile>,
    batch_size: Option<usize>,
    target_fps: Option<f64>,
    decode_policy: Option<DecodePolicy>,
    metrics: Option<MetricsConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    dir: Option<PathBuf>,
    extensions: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    native_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct PreprocessConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    layout: Option<Layout>,
    filter: Option<ResizeFilter>,
}

#[derive(Debug, Deserialize, Default)]
struct MetricsConfigFile {
    log_path: Option<PathBuf>,
    log_every: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub source: SourceSettings,
    pub camera: CameraSettings,
    pub preprocess: PreprocessSettings,
    pub batch_size: usize,
    pub target_fps: f64,
    pub decode_policy: DecodePolicy,
    pub metrics: MetricsSettings,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub dir: PathBuf,
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub native_fps: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct PreprocessSettings {
    pub width: u32,
    pub height: u32,
    pub layout: Layout,
    pub filter: ResizeFilter,
}

#[derive(Debug, Clone)]
pub struct MetricsSettings {
    pub log_path: Option<PathBuf>,
    pub log_every: u64,
}

impl IntakeConfig {
    /// Defaults, overlaid by the JSON file named in `INTAKE_CONFIG`, overlaid
    /// by `INTAKE_*` environment variables.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("INTAKE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: IntakeConfigFile) -> Self {
        let source = file.source.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let preprocess = file.preprocess.unwrap_or_default();
        let metrics = file.metrics.unwrap_or_default();
        Self {
            source: SourceSettings {
                dir: source
                    .dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCE_DIR)),
                extensions: source.extensions.unwrap_or_else(default_extensions),
            },
            camera: CameraSettings {
                device: camera.device.unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
                width: camera.width.unwrap_or(DEFAULT_CAPTURE_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAPTURE_HEIGHT),
                native_fps: camera.native_fps.unwrap_or(DEFAULT_NATIVE_FPS),
            },
            preprocess: PreprocessSettings {
                width: preprocess.width.unwrap_or(DEFAULT_TARGET_SIZE),
                height: preprocess.height.unwrap_or(DEFAULT_TARGET_SIZE),
                layout: preprocess.layout.unwrap_or_default(),
                filter: preprocess.filter.unwrap_or_default(),
            },
            batch_size: file.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            target_fps: file.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
            decode_policy: file.decode_policy.unwrap_or_default(),
            metrics: MetricsSettings {
                log_path: metrics.log_path,
                log_every: metrics.log_every.unwrap_or(DEFAULT_LOG_EVERY),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("INTAKE_SOURCE_DIR") {
            if !dir.trim().is_empty() {
                self.source.dir = PathBuf::from(dir);
            }
        }
        if let Ok(extensions) = std::env::var("INTAKE_EXTENSIONS") {
            let parsed = split_csv(&extensions);
            if !parsed.is_empty() {
                self.source.extensions = parsed;
            }
        }
        if let Ok(device) = std::env::var("INTAKE_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(fps) = std::env::var("INTAKE_TARGET_FPS") {
            self.target_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("INTAKE_TARGET_FPS must be a number"))?;
        }
        if let Ok(size) = std::env::var("INTAKE_BATCH_SIZE") {
            self.batch_size = size
                .trim()
                .parse()
                .map_err(|_| anyhow!("INTAKE_BATCH_SIZE must be a positive integer"))?;
        }
        if let Ok(policy) = std::env::var("INTAKE_DECODE_POLICY") {
            self.decode_policy = policy.parse()?;
        }
        if let Ok(path) = std::env::var("INTAKE_METRICS_LOG") {
            if !path.trim().is_empty() {
                self.metrics.log_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    /// Check invariants. Also run by the CLI after applying flag overrides.
    pub fn validate(&mut self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(anyhow!("batch_size must be greater than zero"));
        }
        if !self.target_fps.is_finite() || self.target_fps <= 0.0 {
            return Err(anyhow!("target_fps must be a positive number"));
        }
        FrameSampler::new(self.target_fps).map_err(|e| anyhow!("target_fps: {}", e))?;
        if self.preprocess.width == 0 || self.preprocess.height == 0 {
            return Err(anyhow!("preprocess width and height must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.metrics.log_every == 0 {
            return Err(anyhow!("metrics log_every must be greater than zero"));
        }
        self.source.extensions = self
            .source
            .extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        if self.source.extensions.is_empty() {
            return Err(anyhow!("at least one source extension is required"));
        }
        Ok(())
    }

    pub fn directory_config(&self) -> DirectoryConfig {
        DirectoryConfig {
            path: self.source.dir.clone(),
            extensions: self.source.extensions.clone(),
        }
    }

    pub fn camera_config(&self) -> CameraConfig {
        CameraConfig {
            device: self.camera.device.clone(),
            width: self.camera.width,
            height: self.camera.height,
            native_fps: self.camera.native_fps,
        }
    }

    pub fn preprocess_config(&self) -> PreprocessConfig {
        PreprocessConfig {
            width: self.preprocess.width,
            height: self.preprocess.height,
            layout: self.preprocess.layout,
            filter: self.preprocess.filter,
        }
    }

    pub fn metrics_log(&self) -> Option<MetricsLog> {
        self.metrics
            .log_path
            .as_ref()
            .map(|path| MetricsLog::new(path.clone(), self.metrics.log_every))
    }
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self::from_file(IntakeConfigFile::default())
    }
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn read_config_file(path: &Path) -> Result<IntakeConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() -> Result<()> {
        let mut cfg = IntakeConfig::default();
        cfg.validate()?;
        assert_eq!(cfg.batch_size, 4);
        assert_eq!(cfg.target_fps, 5.0);
        assert_eq!(cfg.decode_policy, DecodePolicy::Strict);
        assert_eq!(cfg.preprocess.layout, Layout::ChannelsFirst);
        assert_eq!(cfg.source.extensions, vec!["jpg", "jpeg", "png", "bmp"]);
        Ok(())
    }

    #[test]
    fn validation_rejects_zero_batch_and_bad_fps() {
        let mut cfg = IntakeConfig::default();
        cfg.batch_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = IntakeConfig::default();
        cfg.target_fps = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = IntakeConfig::default();
        cfg.target_fps = 1e-20;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validation_normalizes_extensions() -> Result<()> {
        let mut cfg = IntakeConfig::default();
        cfg.source.extensions = vec![".PNG".to_string(), " ".to_string()];
        cfg.validate()?;
        assert_eq!(cfg.source.extensions, vec!["png"]);

        cfg.source.extensions = vec![".".to_string()];
        assert!(cfg.validate().is_err());
        Ok(())
    }

    #[test]
    fn file_fields_parse_enums() -> Result<()> {
        let file: IntakeConfigFile = serde_json::from_str(
            r#"{
                "preprocess": { "layout": "channels_last", "filter": "catmull_rom" },
                "decode_policy": "lenient"
            }"#,
        )?;
        let cfg = IntakeConfig::from_file(file);
        assert_eq!(cfg.preprocess.layout, Layout::ChannelsLast);
        assert_eq!(cfg.preprocess.filter, ResizeFilter::CatmullRom);
        assert_eq!(cfg.decode_policy, DecodePolicy::Lenient);
        Ok(())
    }
}
