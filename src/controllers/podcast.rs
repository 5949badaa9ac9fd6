use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::pipeline::{ArtifactStatus, PipelineService, SubmitRequest, TaskSnapshot},
    error::{AppError, AppResult},
};

/// Response for POST /api/podcasts
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub task_id: Uuid,
}

pub struct PodcastController {
    pipeline: Arc<PipelineService>,
}

impl PodcastController {
    pub fn new(pipeline: Arc<PipelineService>) -> Self {
        Self { pipeline }
    }

    /// POST /api/podcasts - Submit prose for podcast synthesis
    pub async fn submit(
        State(controller): State<Arc<PodcastController>>,
        Json(request): Json<SubmitRequest>,
    ) -> AppResult<(StatusCode, Json<SubmitResponse>)> {
        let task_id = controller.pipeline.submit(request)?;

        tracing::info!(task_id = %task_id, "Podcast task accepted");

        Ok((StatusCode::ACCEPTED, Json(SubmitResponse { task_id })))
    }

    /// GET /api/podcasts/:taskId - Poll task status
    pub async fn status(
        State(controller): State<Arc<PodcastController>>,
        Path(task_id): Path<Uuid>,
    ) -> AppResult<Json<TaskSnapshot>> {
        let snapshot = controller
            .pipeline
            .status(task_id)
            .ok_or_else(|| AppError::NotFound(format!("task {task_id}")))?;

        Ok(Json(snapshot))
    }

    /// GET /api/podcasts/:taskId/audio - Download the assembled audio
    pub async fn audio(
        State(controller): State<Arc<PodcastController>>,
        Path(task_id): Path<Uuid>,
    ) -> AppResult<(StatusCode, HeaderMap, Body)> {
        let artifact = match controller.pipeline.artifact(task_id) {
            ArtifactStatus::Ready(artifact) => artifact,
            ArtifactStatus::NotReady(snapshot) => {
                return Err(AppError::Conflict(format!(
                    "task {} is {:?} at {}%",
                    task_id, snapshot.state, snapshot.progress
                )));
            }
            ArtifactStatus::Failed(reason) => {
                return Err(AppError::ExternalService(format!(
                    "task {task_id} failed: {reason}"
                )));
            }
            ArtifactStatus::NotFound => {
                return Err(AppError::NotFound(format!("task {task_id}")));
            }
        };

        let duration_seconds = artifact.total_duration_ms / 1000;

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "audio/mpeg".parse().unwrap());
        headers.insert(
            "X-Duration-Seconds",
            duration_seconds.to_string().parse().unwrap(),
        );
        headers.insert(
            "X-Segment-Count",
            artifact.segment_count.to_string().parse().unwrap(),
        );
        headers.insert(
            "X-Word-Count",
            artifact.word_count.to_string().parse().unwrap(),
        );

        Ok((
            StatusCode::OK,
            headers,
            Body::from(artifact.audio.clone()),
        ))
    }

    /// DELETE /api/podcasts/:taskId - Request cancellation
    pub async fn cancel(
        State(controller): State<Arc<PodcastController>>,
        Path(task_id): Path<Uuid>,
    ) -> AppResult<StatusCode> {
        if !controller.pipeline.cancel(task_id) {
            return Err(AppError::NotFound(format!("task {task_id}")));
        }

        Ok(StatusCode::ACCEPTED)
    }
}
