use crate::auth::require_admin_middleware;
use crate::report::{ReportError, tasks_csv, users_csv};
use crate::task::{TaskFilter, TaskService};
use crate::user::UserService;
use crate::web::AppState;
use crate::web::api::{INTERNAL_ERROR_MESSAGE, ServerErrorResponse, error_response};
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    middleware::from_fn,
    response::{IntoResponse, Response},
    routing::get,
};

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        match self {
            ReportError::Tasks(err) => err.into_response(),
            ReportError::Users(err) => err.into_response(),
            ReportError::Csv(_) | ReportError::Io(_) => {
                tracing::error!("Report generation failed: {}", self);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
            }
        }
    }
}

fn csv_attachment(file_name: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
        .into_response()
}

/// Handler for GET /api/reports/export/tasks - Downloads every task as CSV.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/reports/export/tasks",
    responses(
        (status = 200, description = "CSV export of every task", content_type = "text/csv", body = String),
        (status = 403, description = "Admin access required", body = ServerErrorResponse),
        (status = 500, description = "Internal server error", body = ServerErrorResponse)
    ),
    tag = "Reports"
)]
pub async fn export_tasks_handler(State(state): State<AppState>) -> Result<Response, ReportError> {
    let tasks = TaskService::new(&state.db)
        .get_tasks(&TaskFilter::default())
        .await?;
    let body = tasks_csv(&tasks)?;
    tracing::info!("Exported {} tasks", tasks.len());
    Ok(csv_attachment("tasks_report.csv", body))
}

/// Handler for GET /api/reports/export/users - Downloads every member with their workload as CSV.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/reports/export/users",
    responses(
        (status = 200, description = "CSV export of every member", content_type = "text/csv", body = String),
        (status = 403, description = "Admin access required", body = ServerErrorResponse),
        (status = 500, description = "Internal server error", body = ServerErrorResponse)
    ),
    tag = "Reports"
)]
pub async fn export_users_handler(State(state): State<AppState>) -> Result<Response, ReportError> {
    let members = UserService::new(&state.db)
        .get_members_with_task_counts()
        .await?;
    let body = users_csv(&members)?;
    tracing::info!("Exported {} members", members.len());
    Ok(csv_attachment("users_report.csv", body))
}

/// Creates and returns the reports API router. Every route is admin only.
pub fn create_api_router(state: AppState) -> Router {
    Router::new()
        .route("/export/tasks", get(export_tasks_handler))
        .route("/export/users", get(export_users_handler))
        .route_layer(from_fn(require_admin_middleware))
        .with_state(state)
}
