//! Task handlers.

use crate::api::AppState;
use crate::error::{Error, Result};
use crate::types::{CreateTaskRequest, CreateTaskResponse, TaskId, TaskStatusResponse};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

/// POST /tasks - Create a task from a list of URLs
#[utoipa::path(
    post,
    path = "/api/v1/tasks",
    tag = "tasks",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created and its files queued", body = CreateTaskResponse),
        (status = 400, description = "Empty URL list", body = crate::error::ApiError),
        (status = 500, description = "Task could not be saved", body = crate::error::ApiError),
        (status = 503, description = "Shutting down or queue full", body = crate::error::ApiError)
    )
)]
pub async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<CreateTaskResponse>)> {
    if request.urls.is_empty() {
        tracing::warn!("Empty URLs array");
        return Err(Error::Validation("URLs array cannot be empty".to_string()));
    }

    let urls_count = request.urls.len();
    let task = state.downloader.create_task(request.urls).await?;

    tracing::info!(task_id = %task.id, urls_count, "Created task");

    Ok((
        StatusCode::CREATED,
        Json(CreateTaskResponse {
            task_id: task.id.to_string(),
        }),
    ))
}

/// GET /tasks - List all tasks
#[utoipa::path(
    get,
    path = "/api/v1/tasks",
    tag = "tasks",
    responses(
        (status = 200, description = "All tasks, oldest first", body = Vec<TaskStatusResponse>)
    )
)]
pub async fn list_tasks(State(state): State<AppState>) -> Json<Vec<TaskStatusResponse>> {
    let tasks = state.downloader.list_tasks().await;
    Json(tasks.into_iter().map(TaskStatusResponse::from).collect())
}

/// GET /tasks/:id/status - Get task status
#[utoipa::path(
    get,
    path = "/api/v1/tasks/{id}/status",
    tag = "tasks",
    params(
        ("id" = String, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task status and per-file state", body = TaskStatusResponse),
        (status = 404, description = "Task not found", body = crate::error::ApiError)
    )
)]
pub async fn get_task_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskStatusResponse>> {
    let task = state.downloader.get_task(&TaskId::from(id)).await?;

    tracing::debug!(task_id = %task.id, status = %task.status, "Returning task status");

    Ok(Json(TaskStatusResponse::from(task)))
}
