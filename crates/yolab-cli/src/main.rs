use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use yolab_proto::label::render_label_file;
use yolab_proto::report::DetectionReport;
use yolab_vision::{doctor as vision_doctor, DetectorConfig};

#[cfg(feature = "runtime-ort")]
use yolab_vision::{onnx::OrtLoader, ImageSource, ModelLoader, SessionManager};

#[derive(Debug, Parser)]
#[command(name = "yolab", version, about = "yolab - YOLO object detection on half precision runtimes")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate config and model file without loading the model.
    Doctor,
    /// List the execution backends the compiled-in runtime can use.
    Backends,
    /// Run detection on one image.
    Detect {
        image: PathBuf,
        /// Write YOLO label lines here instead of `output.labels_dir`.
        #[arg(long)]
        labels_out: Option<PathBuf>,
        /// Print the full JSON report to stdout.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    vision: Option<DetectorConfig>,
    output: Option<OutputCfg>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct OutputCfg {
    labels_dir: Option<PathBuf>,
    format: OutputFormat,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
enum OutputFormat {
    #[default]
    Yolo,
    Json,
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    Ok(toml::from_str(&s).context("parse config toml")?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg).await?,
        Command::Backends => backends().await?,
        Command::Detect { image, labels_out, json } => detect(&cfg, &image, labels_out, json).await?,
    }
    Ok(())
}

async fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    let vision = cfg.vision.as_ref().context("no [vision] config section")?;
    vision_doctor::check_config(vision)?;
    vision_doctor::check_model_file(&vision.model_path)?;

    if let Some(dir) = cfg.output.as_ref().and_then(|o| o.labels_dir.as_ref()) {
        if !dir.exists() {
            warn!("doctor: output.labels_dir {} does not exist yet, detect will create it", dir.display());
        } else {
            anyhow::ensure!(dir.is_dir(), "output.labels_dir {} is not a directory", dir.display());
        }
    }

    if !cfg!(feature = "runtime-ort") {
        warn!("doctor: built without an inference runtime; detect is unavailable (rebuild with --features runtime-ort)");
    }

    info!("doctor: OK");
    Ok(())
}

#[cfg(feature = "runtime-ort")]
async fn backends() -> Result<()> {
    for b in OrtLoader.available_backends() {
        println!("{}", b);
    }
    Ok(())
}

#[cfg(not(feature = "runtime-ort"))]
async fn backends() -> Result<()> {
    println!("none (built without runtime-ort)");
    Ok(())
}

async fn detect(cfg: &Config, image: &Path, labels_out: Option<PathBuf>, json: bool) -> Result<()> {
    let vision = cfg.vision.clone().context("no [vision] config section")?;
    let output = cfg.output.as_ref();
    let format = if json { OutputFormat::Json } else { output.map(|o| o.format).unwrap_or_default() };

    let report = run_detection(vision, image).await?;
    info!(
        "detect: {} -> {} boxes on {} ({:.1}ms in runtime)",
        image.display(),
        report.boxes.len(),
        report.backend,
        report.timings.run_ms
    );

    let labels_path = labels_out.or_else(|| {
        output.and_then(|o| o.labels_dir.as_ref()).map(|dir| label_path_for(dir, image))
    });
    if let Some(path) = labels_path {
        write_labels(&path, &report)?;
        info!("detect: wrote {}", path.display());
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Yolo => print!("{}", render_label_file(&report.bounding_boxes())),
    }
    Ok(())
}

#[cfg(feature = "runtime-ort")]
async fn run_detection(vision: DetectorConfig, image: &Path) -> Result<DetectionReport> {
    let mgr = SessionManager::new(OrtLoader);
    let backend = mgr.configure(vision).await.context("configure detector")?;
    info!("detect: session ready on {}", backend);
    Ok(mgr
        .run_inference_detailed(&ImageSource::Path(image.to_path_buf()))
        .await
        .with_context(|| format!("detect {}", image.display()))?)
}

#[cfg(not(feature = "runtime-ort"))]
async fn run_detection(_vision: DetectorConfig, _image: &Path) -> Result<DetectionReport> {
    anyhow::bail!("no inference runtime compiled in; build with --features runtime-ort");
}

fn label_path_for(dir: &Path, image: &Path) -> PathBuf {
    let stem = image.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "image".into());
    dir.join(format!("{}.txt", stem))
}

fn write_labels(path: &Path, report: &DetectionReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    std::fs::write(path, render_label_file(&report.bounding_boxes()))
        .with_context(|| format!("write labels {}", path.display()))
}
