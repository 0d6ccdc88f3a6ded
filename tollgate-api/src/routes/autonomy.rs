//! Autonomy queue endpoint

use axum::{extract::State, Json};

use crate::dto::QueueTaskDto;
use crate::error::ApiResult;
use crate::state::AppState;

/// Snapshot of every task with its current score.
pub async fn queue(State(state): State<AppState>) -> ApiResult<Json<Vec<QueueTaskDto>>> {
    let snapshot = state.runtime.scheduler().queue_snapshot().await?;
    Ok(Json(snapshot.into_iter().map(QueueTaskDto::from).collect()))
}
