//! Commands that fan out over many inputs: `tag` and `match-embeddings`.

use crate::config::Config;
use crate::report::{EmbeddingMatch, EmbeddingMatchReport, TagReport};
use crate::worker::{EngineHandle, WorkerError};
use faceshare_core::{CosineMatcher, Embedding, Gallery, Image, Matcher, PipelineError};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Decode and size-cap an image off the async runtime.
pub async fn load_image(path: &Path, max_side: u32) -> Result<Image, PipelineError> {
    let owned = path.to_path_buf();
    let decoded = tokio::task::spawn_blocking(move || Image::open(&owned))
        .await
        .map_err(|err| PipelineError::InvalidInput(format!("image loader failed: {err}")))?;

    let image = decoded.map_err(|err| {
        PipelineError::InvalidInput(format!("{}: {err}", path.display()))
    })?;
    Ok(image.limit_size(max_side))
}

/// Process every image concurrently; results keep the input order.
pub async fn tag_images(
    engine: &EngineHandle,
    images: Vec<PathBuf>,
    gallery: Arc<Gallery>,
    config: &Config,
) -> Vec<TagReport> {
    let params = config.detection_params();
    let threshold = config.match_threshold;
    let max_side = config.max_image_size;

    let tasks: Vec<_> = images
        .into_iter()
        .map(|path| {
            let engine = engine.clone();
            let gallery = Arc::clone(&gallery);
            tokio::spawn(async move {
                let name = path.display().to_string();
                let result = match load_image(&path, max_side).await {
                    Ok(image) => engine.recognize(image, params, gallery, threshold).await,
                    Err(err) => Err(WorkerError::from(err)),
                };
                match result {
                    Ok(analysis) => TagReport::new(name, &analysis),
                    Err(err) => {
                        tracing::warn!(image = %name, error = %err, "image skipped");
                        TagReport::failed(name, &err)
                    }
                }
            })
        })
        .collect();

    let mut reports = Vec::with_capacity(tasks.len());
    for task in tasks {
        match task.await {
            Ok(report) => reports.push(report),
            Err(err) => tracing::error!(error = %err, "tagging task failed"),
        }
    }

    let tagged = reports.iter().filter(|r| r.total_matched > 0).count();
    tracing::info!(images = reports.len(), tagged, "tagging complete");
    reports
}

/// Match precomputed embeddings against `gallery` without touching the engine.
///
/// Entries that are not valid embeddings count as detected but are skipped
/// with a warning.
pub fn match_embeddings(
    encodings: &[Value],
    gallery: &Gallery,
    threshold: f32,
) -> EmbeddingMatchReport {
    let matches: Vec<EmbeddingMatch> = encodings
        .iter()
        .enumerate()
        .filter_map(|(index, value)| {
            let embedding = match Embedding::deserialize(value) {
                Ok(embedding) => embedding,
                Err(err) => {
                    tracing::warn!(index, error = %err, "skipping malformed embedding");
                    return None;
                }
            };
            let result = CosineMatcher.best_match(&embedding, gallery, threshold);
            Some(EmbeddingMatch {
                index,
                identity: result.identity?,
                similarity: result.similarity,
            })
        })
        .collect();

    tracing::info!(
        embeddings = encodings.len(),
        matched = matches.len(),
        "embeddings matched"
    );
    EmbeddingMatchReport::new(encodings.len(), matches)
}
