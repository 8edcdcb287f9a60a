//! OpenAPI documentation and schema generation

use utoipa::OpenApi;

/// OpenAPI documentation for the file-downloader REST API
///
/// Served as JSON at `/api/v1/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "file-downloader REST API",
        version = "0.1.0",
        description = "Submit batches of URLs for download and track per-task progress",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server")
    ),
    paths(
        // Tasks
        crate::api::routes::create_task,
        crate::api::routes::list_tasks,
        crate::api::routes::get_task_status,

        // System
        crate::api::routes::health_check,
        crate::api::routes::root,
        crate::api::routes::openapi_spec,
    ),
    components(schemas(
        crate::types::Status,
        crate::types::TaskFile,
        crate::types::CreateTaskRequest,
        crate::types::CreateTaskResponse,
        crate::types::TaskStatusResponse,
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "tasks", description = "Batch download tasks"),
        (name = "system", description = "Health and API metadata")
    )
)]
pub struct ApiDoc;
