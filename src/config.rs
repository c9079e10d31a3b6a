use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::analysis::SeverityThresholds;
use crate::detect::KNOWN_BACKENDS;

const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_MODEL_PATH: &str = "best.onnx";
const DEFAULT_CONFIDENCE: f32 = 0.25;
const DEFAULT_IOU: f32 = 0.45;
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_RESIZE_DIM: (u32, u32) = (640, 640);
const DEFAULT_LOG_CAPACITY: usize = 500;
const DEFAULT_FPS: u32 = 10;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_SYNTHETIC_FRAMES: u64 = 50;
const DEFAULT_MAX_DECODE_FAILURES: u32 = 30;

#[derive(Debug, Deserialize, Default)]
struct GuardConfigFile {
    detector: Option<DetectorConfigFile>,
    inference: Option<InferenceConfigFile>,
    thresholds: Option<ThresholdConfigFile>,
    incident_log: Option<IncidentLogConfigFile>,
    source: Option<SourceConfigFile>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct InferenceConfigFile {
    resize_dim: Option<ResizeDimFile>,
}

/// `[640, 640]` or the keyword `"off"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResizeDimFile {
    Dims([u32; 2]),
    Keyword(String),
}

#[derive(Debug, Deserialize, Default)]
struct ThresholdConfigFile {
    low: Option<u32>,
    high: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct IncidentLogConfigFile {
    capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    synthetic_frames: Option<u64>,
    max_consecutive_decode_failures: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub detector: DetectorSettings,
    pub analysis: AnalysisSettings,
    pub source: SourceSettings,
    /// Directory for annotated frames; nothing is written when unset.
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: PathBuf,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Square model input edge in pixels.
    pub input_size: u32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            confidence_threshold: DEFAULT_CONFIDENCE,
            iou_threshold: DEFAULT_IOU,
            input_size: DEFAULT_INPUT_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisSettings {
    /// Pre-inference resize applied to live frames. `None` runs at native resolution.
    pub resize_dim: Option<(u32, u32)>,
    pub thresholds: SeverityThresholds,
    pub incident_capacity: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            resize_dim: Some(DEFAULT_RESIZE_DIM),
            thresholds: SeverityThresholds::default(),
            incident_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    pub target_fps: u32,
    /// Preferred capture width (cameras, synthetic sources).
    pub width: u32,
    pub height: u32,
    /// Length of a synthetic `stub://` video.
    pub synthetic_frames: u64,
    /// Live feeds only; bounded sources skip bad frames until they end.
    pub max_consecutive_decode_failures: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_FPS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            synthetic_frames: DEFAULT_SYNTHETIC_FRAMES,
            max_consecutive_decode_failures: DEFAULT_MAX_DECODE_FAILURES,
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            detector: DetectorSettings::default(),
            analysis: AnalysisSettings::default(),
            source: SourceSettings::default(),
            output_dir: None,
        }
    }
}

impl GuardConfig {
    /// Defaults, then the file named by `POTHOLE_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("POTHOLE_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Like `load`, with an explicit config file path.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => GuardConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: GuardConfigFile) -> Result<Self> {
        let detector_file = file.detector.unwrap_or_default();
        let defaults = DetectorSettings::default();
        let detector = DetectorSettings {
            backend: detector_file.backend.unwrap_or(defaults.backend),
            model_path: detector_file.model_path.unwrap_or(defaults.model_path),
            confidence_threshold: detector_file
                .confidence_threshold
                .unwrap_or(defaults.confidence_threshold),
            iou_threshold: detector_file.iou_threshold.unwrap_or(defaults.iou_threshold),
            input_size: detector_file.input_size.unwrap_or(defaults.input_size),
        };

        let resize_dim = match file.inference.and_then(|inference| inference.resize_dim) {
            None => Some(DEFAULT_RESIZE_DIM),
            Some(ResizeDimFile::Dims([w, h])) => Some((w, h)),
            Some(ResizeDimFile::Keyword(keyword)) => parse_resize_dim(&keyword)?,
        };
        let default_thresholds = SeverityThresholds::default();
        let thresholds = SeverityThresholds {
            low: file
                .thresholds
                .as_ref()
                .and_then(|t| t.low)
                .unwrap_or(default_thresholds.low),
            high: file
                .thresholds
                .as_ref()
                .and_then(|t| t.high)
                .unwrap_or(default_thresholds.high),
        };
        let analysis = AnalysisSettings {
            resize_dim,
            thresholds,
            incident_capacity: file
                .incident_log
                .and_then(|log| log.capacity)
                .unwrap_or(DEFAULT_LOG_CAPACITY),
        };

        let source_file = file.source.unwrap_or_default();
        let source = SourceSettings {
            target_fps: source_file.target_fps.unwrap_or(DEFAULT_FPS),
            width: source_file.width.unwrap_or(DEFAULT_WIDTH),
            height: source_file.height.unwrap_or(DEFAULT_HEIGHT),
            synthetic_frames: source_file
                .synthetic_frames
                .unwrap_or(DEFAULT_SYNTHETIC_FRAMES),
            max_consecutive_decode_failures: source_file
                .max_consecutive_decode_failures
                .unwrap_or(DEFAULT_MAX_DECODE_FAILURES),
        };

        Ok(Self {
            detector,
            analysis,
            source,
            output_dir: file.output.and_then(|output| output.dir),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(backend) = std::env::var("POTHOLE_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_lowercase();
            }
        }
        if let Ok(path) = std::env::var("POTHOLE_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = PathBuf::from(path);
            }
        }
        if let Ok(confidence) = std::env::var("POTHOLE_CONFIDENCE") {
            self.detector.confidence_threshold = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("POTHOLE_CONFIDENCE must be a number between 0 and 1"))?;
        }
        if let Ok(resize) = std::env::var("POTHOLE_RESIZE_DIM") {
            if !resize.trim().is_empty() {
                self.analysis.resize_dim = parse_resize_dim(&resize)?;
            }
        }
        if let Ok(thresholds) = std::env::var("POTHOLE_PEAK_THRESHOLDS") {
            self.analysis.thresholds = parse_thresholds(&thresholds)?;
        }
        if let Ok(capacity) = std::env::var("POTHOLE_LOG_CAPACITY") {
            self.analysis.incident_capacity = capacity
                .trim()
                .parse()
                .map_err(|_| anyhow!("POTHOLE_LOG_CAPACITY must be a positive integer"))?;
        }
        if let Ok(dir) = std::env::var("POTHOLE_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.output_dir = Some(PathBuf::from(dir));
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.detector.backend = self.detector.backend.to_lowercase();
        if !KNOWN_BACKENDS.contains(&self.detector.backend.as_str()) {
            return Err(anyhow!(
                "unknown detector backend '{}' (expected one of {})",
                self.detector.backend,
                KNOWN_BACKENDS.join(", ")
            ));
        }
        for (name, value) in [
            ("confidence_threshold", self.detector.confidence_threshold),
            ("iou_threshold", self.detector.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("detector.{} must be within 0..=1", name));
            }
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector.input_size must be greater than zero"));
        }
        if let Some((w, h)) = self.analysis.resize_dim {
            if w == 0 || h == 0 {
                return Err(anyhow!("inference.resize_dim must be non-zero"));
            }
        }
        self.analysis.thresholds.validate()?;
        if self.analysis.incident_capacity == 0 {
            return Err(anyhow!("incident_log.capacity must be greater than zero"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source width and height must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<GuardConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

/// `640x640` -> `Some((640, 640))`; `off` / `none` -> `None`.
fn parse_resize_dim(value: &str) -> Result<Option<(u32, u32)>> {
    let value = value.trim().to_lowercase();
    if value == "off" || value == "none" {
        return Ok(None);
    }
    let (w, h) = value
        .split_once('x')
        .ok_or_else(|| anyhow!("resize dimension must look like 640x640 or 'off'"))?;
    let w = w
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid resize width '{}'", w))?;
    let h = h
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid resize height '{}'", h))?;
    Ok(Some((w, h)))
}

/// `low,high` -> thresholds.
fn parse_thresholds(value: &str) -> Result<SeverityThresholds> {
    let parts: Vec<&str> = value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .collect();
    let [low, high] = parts.as_slice() else {
        return Err(anyhow!("POTHOLE_PEAK_THRESHOLDS must be 'low,high'"));
    };
    Ok(SeverityThresholds {
        low: low
            .parse()
            .map_err(|_| anyhow!("invalid low threshold '{}'", low))?,
        high: high
            .parse()
            .map_err(|_| anyhow!("invalid high threshold '{}'", high))?,
    })
}
