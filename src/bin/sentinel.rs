//! sentinel - streaming weapon detection driver
//!
//! This binary:
//! 1. Loads configuration from `SENTINEL_CONFIG` / `--config` and the environment
//! 2. Picks a classifier backend from the registry
//! 3. Feeds frames from the configured source into the pipeline
//! 4. Prints detection reports and alert notifications as JSON lines

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use weapon_sentinel::config::SentinelConfig;
use weapon_sentinel::ingest::FrameSource;
use weapon_sentinel::{
    evaluate_frame, Classifier, ClassifierRegistry, DetectionReport, Pipeline,
    SimulatedClassifier,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Detect weapons in a frame stream and raise debounced alerts"
)]
struct Args {
    /// JSON or TOML config file. Overrides SENTINEL_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frame source: stub://<name> or a directory of images.
    #[arg(long)]
    source: Option<String>,

    /// Classifier backend: simulated, tract or auto.
    #[arg(long)]
    backend: Option<String>,

    /// ONNX model for the tract backend.
    #[arg(long, env = "SENTINEL_MODEL_PATH")]
    model: Option<PathBuf>,

    /// Frames submitted per second.
    #[arg(long)]
    fps: Option<u32>,

    /// Stop after this many frames (runs until Ctrl-C when unset).
    #[arg(long)]
    max_frames: Option<u64>,

    /// Weapon probability per frame for the simulated backend.
    #[arg(long)]
    weapon_rate: Option<f64>,

    /// Seed for the simulated backend.
    #[arg(long)]
    seed: Option<u64>,

    /// Classify a single frame synchronously and exit.
    #[arg(long)]
    once: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => SentinelConfig::load_from(path)?,
        None => SentinelConfig::load()?,
    };
    apply_args(&mut cfg, &args)?;

    let mut source = FrameSource::new(cfg.source.clone())?;
    let classifier = select_classifier(&cfg)?;

    if args.once {
        return run_once(&cfg, classifier, &mut source);
    }

    let pipeline = Pipeline::new(cfg.pipeline.clone(), classifier)?;
    if !pipeline.start() {
        return Err(anyhow!("pipeline failed to start"));
    }

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    let frame_interval = Duration::from_secs_f64(1.0 / cfg.source.target_fps as f64);
    let mut submitted = 0u64;
    log::info!(
        "sentinel running: source={} fps={}",
        cfg.source.uri,
        cfg.source.target_fps
    );

    loop {
        if rx.try_recv().is_ok() {
            log::info!("shutdown signal received");
            break;
        }
        if args.max_frames.is_some_and(|max| submitted >= max) {
            break;
        }
        let Some(frame) = source.next_frame()? else {
            log::info!("source exhausted after {} frames", submitted);
            break;
        };
        if !pipeline.submit_frame(frame) {
            log::debug!("frame not admitted");
        }
        submitted += 1;

        std::thread::sleep(frame_interval);
        emit_pending(&pipeline)?;
    }

    // Give the worker one poll window to finish the last frame.
    std::thread::sleep(cfg.pipeline.poll_timeout.min(Duration::from_secs(1)));
    emit_pending(&pipeline)?;
    pipeline.stop();

    let status = pipeline.status();
    log::info!(
        "sentinel stopped: {}",
        serde_json::to_string(&status).context("serialize status")?
    );
    log::info!("frames captured from source: {}", source.stats().frames_captured);
    Ok(())
}

fn apply_args(cfg: &mut SentinelConfig, args: &Args) -> Result<()> {
    if let Some(source) = &args.source {
        cfg.source.uri = source.clone();
    }
    if let Some(backend) = &args.backend {
        cfg.backend.name = backend.trim().to_lowercase();
    }
    if let Some(model) = &args.model {
        cfg.backend.model_path = Some(model.clone());
    }
    if let Some(fps) = args.fps {
        if fps == 0 {
            return Err(anyhow!("fps must be >= 1"));
        }
        cfg.source.target_fps = fps;
    }
    if let Some(rate) = args.weapon_rate {
        if !(0.0..=1.0).contains(&rate) {
            return Err(anyhow!("weapon-rate must be within 0..=1"));
        }
        cfg.backend.weapon_rate = rate;
    }
    if let Some(seed) = args.seed {
        cfg.backend.seed = Some(seed);
    }
    Ok(())
}

fn select_classifier(cfg: &SentinelConfig) -> Result<Box<dyn Classifier>> {
    let mut registry = ClassifierRegistry::new();
    register_model_backend(&mut registry, cfg)?;

    let seed = cfg.backend.seed.unwrap_or_else(rand::random);
    registry.register(SimulatedClassifier::new(cfg.backend.weapon_rate, seed));

    match cfg.backend.name.as_str() {
        "auto" => registry.take_first_available(),
        name => {
            if !registry.contains(name) {
                return Err(anyhow!(
                    "backend '{}' is not available (registered: {})",
                    name,
                    registry.list().join(", ")
                ));
            }
            registry.set_default(name)?;
            registry.take_default()
        }
    }
}

#[cfg(feature = "backend-tract")]
fn register_model_backend(registry: &mut ClassifierRegistry, cfg: &SentinelConfig) -> Result<()> {
    use weapon_sentinel::detect::TractClassifier;

    if let Some(path) = &cfg.backend.model_path {
        if cfg.backend.class_names.is_empty() {
            return Err(anyhow!("tract backend requires class_names"));
        }
        registry.register(
            TractClassifier::new(
                path,
                cfg.backend.class_names.clone(),
                cfg.backend.input_width,
                cfg.backend.input_height,
            )
            .with_threshold(cfg.pipeline.confidence_threshold),
        );
    }
    Ok(())
}

#[cfg(not(feature = "backend-tract"))]
fn register_model_backend(_registry: &mut ClassifierRegistry, cfg: &SentinelConfig) -> Result<()> {
    if cfg.backend.name == "tract" {
        return Err(anyhow!("tract backend requires the backend-tract feature"));
    }
    Ok(())
}

fn run_once(
    cfg: &SentinelConfig,
    mut classifier: Box<dyn Classifier>,
    source: &mut FrameSource,
) -> Result<()> {
    classifier.warm_up()?;
    let frame = source
        .next_frame()?
        .ok_or_else(|| anyhow!("source produced no frames"))?;
    let labels = cfg.pipeline.validate()?;
    let result = evaluate_frame(
        &mut *classifier,
        &labels,
        cfg.pipeline.confidence_threshold,
        frame,
    )?;
    let report = DetectionReport::new(Some(&result), None);
    println!(
        "{}",
        serde_json::to_string(&report).context("serialize report")?
    );
    Ok(())
}

fn emit_pending(pipeline: &Pipeline) -> Result<()> {
    let result = pipeline.poll_result();
    let notification = pipeline.poll_notification();
    if result.is_none() && notification.is_none() {
        return Ok(());
    }
    if let Some(notification) = &notification {
        log::warn!("{}", notification.message);
    }
    let report = DetectionReport::new(result.as_ref(), notification.as_ref());
    println!(
        "{}",
        serde_json::to_string(&report).context("serialize report")?
    );
    Ok(())
}
