use anyhow::{anyhow, bail, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::pipeline::{AdmissionPolicy, IdlePolicy, PipelineConfig};

const DEFAULT_BACKEND: &str = "simulated";
const DEFAULT_SOURCE_URI: &str = "stub://camera";
const DEFAULT_SOURCE_FPS: u32 = 5;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_WEAPON_RATE: f64 = 0.2;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SentinelConfigFile {
    detection: Option<DetectionConfigFile>,
    alert: Option<AlertConfigFile>,
    history: Option<HistoryConfigFile>,
    queue: Option<QueueConfigFile>,
    worker: Option<WorkerConfigFile>,
    backend: Option<BackendConfigFile>,
    source: Option<SourceConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    confidence_threshold: Option<f32>,
    weapon_labels: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    detection_threshold: Option<usize>,
    cooldown_secs: Option<f64>,
    message: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct HistoryConfigFile {
    capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct QueueConfigFile {
    capacity: Option<usize>,
    admission_policy: Option<String>,
    idle_policy: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct WorkerConfigFile {
    poll_timeout_ms: Option<u64>,
    shutdown_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct BackendConfigFile {
    name: Option<String>,
    model_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    class_names: Option<Vec<String>>,
    weapon_rate: Option<f64>,
    seed: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    uri: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Full runtime configuration for the `sentinel` driver.
#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub pipeline: PipelineConfig,
    pub backend: BackendSettings,
    pub source: SourceSettings,
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Registry name: `simulated`, `scripted`, `tract` or `auto`.
    pub name: String,
    pub model_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    /// Class index to label mapping for model backends.
    pub class_names: Vec<String>,
    /// Fraction of frames the simulated backend flags as armed.
    pub weapon_rate: f64,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// `stub://...` for synthetic frames, otherwise a directory of images.
    pub uri: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl SentinelConfig {
    /// Load from `SENTINEL_CONFIG` (if set), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENTINEL_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        Self::build(file_cfg.unwrap_or_default())
    }

    /// Load from an explicit file, then apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::build(read_config_file(path)?)
    }

    fn build(file: SentinelConfigFile) -> Result<Self> {
        let mut cfg = Self::from_file(file)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentinelConfigFile) -> Result<Self> {
        let defaults = PipelineConfig::default();
        let detection = file.detection.unwrap_or_default();
        let alert = file.alert.unwrap_or_default();
        let history = file.history.unwrap_or_default();
        let queue = file.queue.unwrap_or_default();
        let worker = file.worker.unwrap_or_default();
        let backend = file.backend.unwrap_or_default();
        let source = file.source.unwrap_or_default();

        let cooldown = match alert.cooldown_secs {
            Some(secs) => parse_cooldown(secs)?,
            None => defaults.cooldown,
        };
        let admission_policy = match queue.admission_policy.as_deref() {
            Some(policy) => AdmissionPolicy::from_str(policy)?,
            None => defaults.admission_policy,
        };
        let idle_policy = match queue.idle_policy.as_deref() {
            Some(policy) => IdlePolicy::from_str(policy)?,
            None => defaults.idle_policy,
        };

        let pipeline = PipelineConfig {
            confidence_threshold: detection
                .confidence_threshold
                .unwrap_or(defaults.confidence_threshold),
            detection_threshold: alert
                .detection_threshold
                .unwrap_or(defaults.detection_threshold),
            cooldown,
            history_capacity: history.capacity.unwrap_or(defaults.history_capacity),
            queue_capacity: queue.capacity.unwrap_or(defaults.queue_capacity),
            admission_policy,
            idle_policy,
            weapon_labels: detection.weapon_labels.unwrap_or(defaults.weapon_labels),
            alert_message: alert.message.unwrap_or(defaults.alert_message),
            poll_timeout: worker
                .poll_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_timeout),
            shutdown_timeout: worker
                .shutdown_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.shutdown_timeout),
        };

        Ok(Self {
            pipeline,
            backend: BackendSettings {
                name: backend.name.unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                model_path: backend.model_path,
                input_width: backend.input_width.unwrap_or(DEFAULT_MODEL_INPUT),
                input_height: backend.input_height.unwrap_or(DEFAULT_MODEL_INPUT),
                class_names: backend.class_names.unwrap_or_default(),
                weapon_rate: backend.weapon_rate.unwrap_or(DEFAULT_WEAPON_RATE),
                seed: backend.seed,
            },
            source: SourceSettings {
                uri: source.uri.unwrap_or_else(|| DEFAULT_SOURCE_URI.to_string()),
                target_fps: source.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
                width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
                height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(value) = env_value("SENTINEL_CONFIDENCE_THRESHOLD") {
            self.pipeline.confidence_threshold = value.parse().map_err(|_| {
                anyhow!("SENTINEL_CONFIDENCE_THRESHOLD must be a number between 0 and 1")
            })?;
        }
        if let Some(value) = env_value("SENTINEL_DETECTION_THRESHOLD") {
            self.pipeline.detection_threshold = value.parse().map_err(|_| {
                anyhow!("SENTINEL_DETECTION_THRESHOLD must be a positive integer")
            })?;
        }
        if let Some(value) = env_value("SENTINEL_COOLDOWN_SECS") {
            let secs: f64 = value
                .parse()
                .map_err(|_| anyhow!("SENTINEL_COOLDOWN_SECS must be a number of seconds"))?;
            self.pipeline.cooldown = parse_cooldown(secs)?;
        }
        if let Some(value) = env_value("SENTINEL_HISTORY_CAPACITY") {
            self.pipeline.history_capacity = value
                .parse()
                .map_err(|_| anyhow!("SENTINEL_HISTORY_CAPACITY must be a positive integer"))?;
        }
        if let Some(value) = env_value("SENTINEL_QUEUE_CAPACITY") {
            self.pipeline.queue_capacity = value
                .parse()
                .map_err(|_| anyhow!("SENTINEL_QUEUE_CAPACITY must be a positive integer"))?;
        }
        if let Some(value) = env_value("SENTINEL_ADMISSION_POLICY") {
            self.pipeline.admission_policy = value.parse()?;
        }
        if let Some(value) = env_value("SENTINEL_IDLE_POLICY") {
            self.pipeline.idle_policy = value.parse()?;
        }
        if let Some(value) = env_value("SENTINEL_WEAPON_LABELS") {
            let parsed = split_csv(&value);
            if !parsed.is_empty() {
                self.pipeline.weapon_labels = parsed;
            }
        }
        if let Some(value) = env_value("SENTINEL_BACKEND") {
            self.backend.name = value;
        }
        if let Some(value) = env_value("SENTINEL_MODEL_PATH") {
            self.backend.model_path = Some(PathBuf::from(value));
        }
        if let Some(value) = env_value("SENTINEL_SOURCE") {
            self.source.uri = value;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.pipeline.validate()?;

        self.backend.name = self.backend.name.trim().to_lowercase();
        if self.backend.name == "tract" {
            if self.backend.model_path.is_none() {
                bail!("backend 'tract' requires a model path");
            }
            if self.backend.class_names.is_empty() {
                bail!("backend 'tract' requires class_names");
            }
        }
        if self.backend.input_width == 0 || self.backend.input_height == 0 {
            bail!("backend input dimensions must be greater than zero");
        }
        if !(0.0..=1.0).contains(&self.backend.weapon_rate) {
            bail!(
                "weapon_rate must be within 0..=1 (got {})",
                self.backend.weapon_rate
            );
        }

        if self.source.uri.trim().is_empty() {
            bail!("source uri must not be empty");
        }
        if self.source.target_fps == 0 {
            bail!("source target_fps must be greater than zero");
        }
        if self.source.width == 0 || self.source.height == 0 {
            bail!("source dimensions must be greater than zero");
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<SentinelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_cooldown(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| anyhow!("cooldown must be a non-negative number of seconds (got {})", secs))
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
