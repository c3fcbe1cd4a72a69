use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::{get, post},
    Json, Router,
};
use depthmatch_models::{
    matcher::MatchResult, ModelFamily, ModelListing, ModelManager, ModelSpec,
};
use serde::{Deserialize, Serialize};

use crate::{error::ServeError, state::AppState};

/// Uploaded images are decoded in memory.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub model_name: String,
}

/// Reply of the `select` and `current` routes.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CurrentResponse {
    Ok { current: ModelSpec },
    None,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DepthResponse {
    pub height: usize,
    pub width: usize,
    /// Normalized depth, one row per image row.
    pub depth: Vec<Vec<f32>>,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/depth-anything-v2/select", post(select_depth))
        .route("/depth-anything-v2/current", get(current_depth))
        .route("/depth-anything-v2/models", get(models_depth))
        .route("/depth-anything-v2/predict", post(predict_depth))
        .route("/tiny-roma/select", post(select_match))
        .route("/tiny-roma/current", get(current_match))
        .route("/tiny-roma/models", get(models_match))
        .route("/tiny-roma/predict", post(predict_match))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

async fn health() -> &'static str {
    "depthmatch: swap models and run inference on demand"
}

async fn select<F: ModelFamily>(
    manager: Arc<ModelManager<F>>,
    model_name: String,
) -> Result<Json<CurrentResponse>, ServeError> {
    let spec = tokio::task::spawn_blocking(move || manager.select(&model_name)).await??;
    Ok(Json(CurrentResponse::Ok { current: spec }))
}

async fn current<F: ModelFamily>(
    manager: Arc<ModelManager<F>>,
) -> Result<Json<CurrentResponse>, ServeError> {
    let spec = tokio::task::spawn_blocking(move || manager.get_spec()).await?;
    Ok(Json(match spec.model_name {
        Some(_) => CurrentResponse::Ok { current: spec },
        None => CurrentResponse::None,
    }))
}

async fn models<F: ModelFamily>(
    manager: Arc<ModelManager<F>>,
) -> Result<Json<ModelListing>, ServeError> {
    Ok(Json(
        tokio::task::spawn_blocking(move || manager.list_models()).await?,
    ))
}

/// Read the named fields of a multipart body, in the order of `names`.
async fn read_fields(
    mut multipart: Multipart,
    names: &[&'static str],
) -> Result<Vec<Vec<u8>>, ServeError> {
    let mut fields = HashMap::new();
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if names.contains(&name.as_str()) {
            fields.insert(name, field.bytes().await?);
        }
    }

    names
        .iter()
        .copied()
        .map(|name| {
            fields
                .remove(name)
                .map(|bytes| bytes.to_vec())
                .ok_or(ServeError::MissingField(name))
        })
        .collect()
}

async fn select_depth(
    State(state): State<AppState>,
    Json(req): Json<SelectRequest>,
) -> Result<Json<CurrentResponse>, ServeError> {
    select(state.depth, req.model_name).await
}

async fn current_depth(State(state): State<AppState>) -> Result<Json<CurrentResponse>, ServeError> {
    current(state.depth).await
}

async fn models_depth(State(state): State<AppState>) -> Result<Json<ModelListing>, ServeError> {
    models(state.depth).await
}

async fn predict_depth(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<DepthResponse>, ServeError> {
    let mut fields = read_fields(multipart, &["file"]).await?;
    let image = fields.pop().ok_or(ServeError::MissingField("file"))?;

    let manager = state.depth;
    let depth = tokio::task::spawn_blocking(move || manager.predict(&image, true)).await??;

    let (height, width) = (depth.height(), depth.width());
    let rows = depth
        .as_slice()
        .chunks(width.max(1))
        .map(<[f32]>::to_vec)
        .collect();
    Ok(Json(DepthResponse {
        height,
        width,
        depth: rows,
    }))
}

async fn select_match(
    State(state): State<AppState>,
    Json(req): Json<SelectRequest>,
) -> Result<Json<CurrentResponse>, ServeError> {
    select(state.matcher, req.model_name).await
}

async fn current_match(State(state): State<AppState>) -> Result<Json<CurrentResponse>, ServeError> {
    current(state.matcher).await
}

async fn models_match(State(state): State<AppState>) -> Result<Json<ModelListing>, ServeError> {
    models(state.matcher).await
}

async fn predict_match(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<MatchResult>, ServeError> {
    let fields = read_fields(multipart, &["file1", "file2"]).await?;
    let [image_a, image_b]: [Vec<u8>; 2] = fields
        .try_into()
        .map_err(|_| ServeError::MissingField("file2"))?;

    let manager = state.matcher;
    let result = tokio::task::spawn_blocking(move || manager.predict(&image_a, &image_b)).await??;
    Ok(Json(result))
}
