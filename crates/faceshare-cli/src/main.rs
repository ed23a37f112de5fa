use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use faceshare_core::{compare, FaceEngine, Gallery, MockEngine, OnnxEngine};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod batch;
mod config;
mod report;
mod worker;

use batch::{load_image, match_embeddings, tag_images};
use config::{check_range, Config, EngineKind};
use report::{EmbeddingFile, EncodingsFile, ErrorReport, ImageReport};
use worker::{spawn_engine, EngineHandle, WorkerError};

#[derive(Parser)]
#[command(name = "faceshare", about = "FaceShare face detection, recognition and photo tagging")]
struct Cli {
    /// TOML config file (default: $FACESHARE_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Minimum detector score for this run
    #[arg(long, global = true)]
    detection_threshold: Option<f32>,
    /// NMS IoU threshold for this run
    #[arg(long, global = true)]
    nms_threshold: Option<f32>,
    /// Cosine similarity match threshold for this run
    #[arg(long, global = true)]
    match_threshold: Option<f32>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect faces in an image and compute their embeddings
    Detect {
        image: PathBuf,
        /// Include the 512-dim embedding of every face
        #[arg(long)]
        embeddings: bool,
    },
    /// Compare two embedding JSON files
    Compare { first: PathBuf, second: PathBuf },
    /// Match every face in an image against a gallery
    Match {
        image: PathBuf,
        /// Gallery JSON file
        #[arg(short, long)]
        gallery: PathBuf,
    },
    /// Tag known people across a set of photos
    Tag {
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Gallery JSON file
        #[arg(short, long)]
        gallery: PathBuf,
    },
    /// Match precomputed embeddings against a gallery
    MatchEmbeddings {
        /// JSON list of embeddings, or {"detected_encodings": [...]}
        encodings: PathBuf,
        /// Gallery JSON file
        #[arg(short, long)]
        gallery: PathBuf,
    },
    /// Load the engine and report its status
    Status,
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) -> Result<()> {
        if let Some(t) = self.detection_threshold {
            check_range("--detection-threshold", t, 0.0, 1.0)?;
            config.detection_threshold = t;
        }
        if let Some(t) = self.nms_threshold {
            check_range("--nms-threshold", t, 0.0, 1.0)?;
            config.nms_threshold = t;
        }
        if let Some(t) = self.match_threshold {
            check_range("--match-threshold", t, -1.0, 1.0)?;
            config.match_threshold = t;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    cli.apply_overrides(&mut config)?;
    tracing::debug!(?config, "configuration resolved");

    match cli.command {
        Commands::Detect { image, embeddings } => {
            let engine = start_engine(&config)?;
            let loaded = load_image(&image, config.max_image_size).await;
            let analysis = match loaded {
                Ok(img) => engine.analyze(img, config.detection_params()).await,
                Err(err) => Err(err.into()),
            };
            let analysis = report_failure(analysis)?;
            print_json(&ImageReport::new(display(&image), &analysis, embeddings))?;
        }
        Commands::Compare { first, second } => {
            let a = read_embedding(&first)?;
            let b = read_embedding(&second)?;
            let comparison = compare(&a, &b, config.match_threshold);
            tracing::info!(
                similarity = comparison.similarity,
                is_match = comparison.is_match,
                "embeddings compared"
            );
            print_json(&comparison)?;
        }
        Commands::Match { image, gallery } => {
            let gallery = Arc::new(read_gallery(&gallery)?);
            let engine = start_engine(&config)?;
            let loaded = load_image(&image, config.max_image_size).await;
            let analysis = match loaded {
                Ok(img) => {
                    engine
                        .recognize(img, config.detection_params(), gallery, config.match_threshold)
                        .await
                }
                Err(err) => Err(err.into()),
            };
            let analysis = report_failure(analysis)?;
            print_json(&ImageReport::new(display(&image), &analysis, false))?;
        }
        Commands::Tag { images, gallery } => {
            let gallery = Arc::new(read_gallery(&gallery)?);
            let engine = start_engine(&config)?;
            let reports = tag_images(&engine, images, gallery, &config).await;
            print_json(&reports)?;
        }
        Commands::MatchEmbeddings { encodings, gallery } => {
            let gallery = read_gallery(&gallery)?;
            let encodings = read_encodings(&encodings)?;
            print_json(&match_embeddings(&encodings, &gallery, config.match_threshold))?;
        }
        Commands::Status => {
            let engine = start_engine(&config)?;
            let status = engine.status().await?;
            print_json(&StatusReport {
                status: "healthy",
                engine: status,
                model_dir: display(&config.model_dir),
                detection_threshold: config.detection_threshold,
                nms_threshold: config.nms_threshold,
                match_threshold: config.match_threshold,
                max_image_size: config.max_image_size,
            })?;
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct StatusReport {
    status: &'static str,
    engine: faceshare_core::EngineStatus,
    model_dir: String,
    detection_threshold: f32,
    nms_threshold: f32,
    match_threshold: f32,
    max_image_size: u32,
}

/// Build the configured engine and move it onto its worker thread.
///
/// Fails fast if the ONNX models cannot be loaded.
fn start_engine(config: &Config) -> Result<EngineHandle> {
    let engine: Box<dyn FaceEngine> = match config.engine {
        EngineKind::Onnx => Box::new(
            OnnxEngine::load(&config.model_dir, config.intra_threads).with_context(|| {
                format!("loading models from {}", config.model_dir.display())
            })?,
        ),
        EngineKind::Mock => Box::new(MockEngine::new()),
    };
    Ok(spawn_engine(engine)?)
}

/// Print a request-level failure as JSON before propagating it.
fn report_failure<T>(result: Result<T, WorkerError>) -> Result<T> {
    result.map_err(|err| {
        if let Ok(json) = serde_json::to_string_pretty(&ErrorReport::from(&err)) {
            println!("{json}");
        }
        err.into()
    })
}

fn read_embedding(path: &Path) -> Result<faceshare_core::Embedding> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading embedding file {}", path.display()))?;
    let file: EmbeddingFile = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a valid 512-dim embedding", path.display()))?;
    Ok(file.into_embedding())
}

fn read_encodings(path: &Path) -> Result<Vec<serde_json::Value>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading encodings file {}", path.display()))?;
    let file: EncodingsFile = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a list of embeddings", path.display()))?;
    Ok(file.into_values())
}

fn read_gallery(path: &Path) -> Result<Gallery> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading gallery file {}", path.display()))?;
    let gallery = Gallery::from_json_str(&text)
        .with_context(|| format!("parsing gallery file {}", path.display()))?;
    tracing::info!(entries = gallery.len(), "gallery loaded");
    Ok(gallery)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
