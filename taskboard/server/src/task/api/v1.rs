use crate::auth::{CurrentUser, require_admin_middleware};
use crate::task::stats::{DashboardStatistics, StatusSummary, TaskCharts};
use crate::task::{
    Dashboard, NewTask, Priority, Task, TaskList, TaskService, TaskServiceError, TaskStatus,
    TaskUpdate, TodoItem,
};
use crate::user::api::v1::UserJson;
use crate::web::AppState;
use crate::web::api::{INTERNAL_ERROR_MESSAGE, MessageResponse, ServerErrorResponse, error_response};
use crate::web::extract::{ApiJson, ApiPath, ApiQuery};
use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn,
    response::{IntoResponse, Json, Response},
    routing::{get, put},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// JSON representation of a checklist entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TodoItemJson {
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

impl From<TodoItem> for TodoItemJson {
    fn from(item: TodoItem) -> Self {
        Self {
            text: item.text,
            completed: item.completed,
        }
    }
}

impl From<TodoItemJson> for TodoItem {
    fn from(item: TodoItemJson) -> Self {
        Self {
            text: item.text,
            completed: item.completed,
        }
    }
}

/// JSON representation of a Task for API responses.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskJson {
    id: i32,
    title: String,
    description: String,
    priority: Priority,
    status: TaskStatus,
    due_date: DateTime<Utc>,
    /// ID of the admin who created the task
    created_by: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    assigned_to: Vec<UserJson>,
    todo_checklist: Vec<TodoItemJson>,
    /// Attachment URLs
    attachments: Vec<String>,
    /// Number of completed checklist items
    completed_todo_count: usize,
    /// Completed checklist items divided by all items, `0` for an empty checklist
    progress: f64,
}

impl From<Task> for TaskJson {
    fn from(task: Task) -> Self {
        let completed_todo_count = task.completed_todo_count();
        let progress = task.progress();
        Self {
            id: task.id,
            title: task.title,
            description: task.description,
            priority: task.priority,
            status: task.status,
            due_date: task.due_date,
            created_by: task.created_by,
            created_at: task.created_at,
            updated_at: task.updated_at,
            assigned_to: task.assignees.into_iter().map(UserJson::from).collect(),
            todo_checklist: task
                .todo_checklist
                .into_iter()
                .map(TodoItemJson::from)
                .collect(),
            attachments: task.attachments,
            completed_todo_count,
            progress,
        }
    }
}

/// API response for the task list.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskListResponse {
    tasks: Vec<TaskJson>,
    /// Tab counters over every task visible to the caller
    status_summary: StatusSummary,
}

impl From<TaskList> for TaskListResponse {
    fn from(list: TaskList) -> Self {
        Self {
            tasks: list.tasks.into_iter().map(TaskJson::from).collect(),
            status_summary: list.status_summary,
        }
    }
}

/// API response for both dashboards.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    statistics: DashboardStatistics,
    charts: TaskCharts,
    /// The ten most recently created tasks, newest first
    recent_tasks: Vec<TaskJson>,
}

impl From<Dashboard> for DashboardResponse {
    fn from(dashboard: Dashboard) -> Self {
        Self {
            statistics: dashboard.statistics,
            charts: dashboard.charts,
            recent_tasks: dashboard
                .recent_tasks
                .into_iter()
                .map(TaskJson::from)
                .collect(),
        }
    }
}

/// Query parameters for filtering the task list.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TaskStatusQuery {
    /// `Pending`, `In Progress` or `Completed`; empty or absent lists every task
    #[serde(default)]
    status: Option<String>,
}

impl TaskStatusQuery {
    fn status(&self) -> Result<Option<TaskStatus>, TaskServiceError> {
        parse_status_filter(self.status.as_deref().unwrap_or_default())
    }
}

fn parse_status_filter(raw: &str) -> Result<Option<TaskStatus>, TaskServiceError> {
    match raw.trim() {
        "" => Ok(None),
        "Pending" => Ok(Some(TaskStatus::Pending)),
        "In Progress" => Ok(Some(TaskStatus::InProgress)),
        "Completed" => Ok(Some(TaskStatus::Completed)),
        other => Err(TaskServiceError::InvalidInput(format!(
            "unknown status '{}'",
            other
        ))),
    }
}

fn default_priority() -> Priority {
    Priority::Medium
}

/// JSON request payload for creating a task.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    pub due_date: DateTime<Utc>,
    /// IDs of the users to assign
    #[serde(default)]
    pub assigned_to: Vec<i32>,
    #[serde(default)]
    pub todo_checklist: Vec<TodoItemJson>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl From<CreateTaskRequest> for NewTask {
    fn from(request: CreateTaskRequest) -> Self {
        Self {
            title: request.title,
            description: request.description,
            priority: request.priority,
            due_date: request.due_date,
            assignee_ids: request.assigned_to,
            todo_checklist: request
                .todo_checklist
                .into_iter()
                .map(TodoItem::from)
                .collect(),
            attachments: request.attachments,
        }
    }
}

/// JSON request payload for editing a task. Absent fields keep their value.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<DateTime<Utc>>,
    pub assigned_to: Option<Vec<i32>>,
    pub todo_checklist: Option<Vec<TodoItemJson>>,
    pub attachments: Option<Vec<String>>,
}

impl From<UpdateTaskRequest> for TaskUpdate {
    fn from(request: UpdateTaskRequest) -> Self {
        Self {
            title: request.title,
            description: request.description,
            priority: request.priority,
            due_date: request.due_date,
            assignee_ids: request.assigned_to,
            todo_checklist: request
                .todo_checklist
                .map(|items| items.into_iter().map(TodoItem::from).collect()),
            attachments: request.attachments,
        }
    }
}

/// JSON request payload for a status change.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: TaskStatus,
}

/// JSON request payload replacing a checklist.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateChecklistRequest {
    pub todo_checklist: Vec<TodoItemJson>,
}

impl IntoResponse for TaskServiceError {
    fn into_response(self) -> Response {
        match self {
            TaskServiceError::TaskNotFound(_) => {
                error_response(StatusCode::NOT_FOUND, self.to_string())
            }
            TaskServiceError::UnknownAssignee(_) | TaskServiceError::InvalidInput(_) => {
                error_response(StatusCode::BAD_REQUEST, self.to_string())
            }
            TaskServiceError::Forbidden { .. } => {
                tracing::warn!("{}", self);
                error_response(
                    StatusCode::FORBIDDEN,
                    "You are not allowed to access this task",
                )
            }
            TaskServiceError::Database(_) => {
                tracing::error!("Task request failed: {}", self);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
            }
        }
    }
}

/// Handler for GET /api/tasks - Lists the caller's visible tasks with tab counters.
#[tracing::instrument(skip(state, current_user), fields(user_id = current_user.id))]
#[utoipa::path(
    get,
    path = "/api/tasks",
    params(TaskStatusQuery),
    responses(
        (status = 200, description = "Successfully retrieved tasks", body = TaskListResponse),
        (status = 400, description = "Unknown status", body = ServerErrorResponse),
        (status = 401, description = "Not signed in", body = ServerErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn get_tasks_handler(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ApiQuery(query): ApiQuery<TaskStatusQuery>,
) -> Result<Json<TaskListResponse>, TaskServiceError> {
    let status = query.status()?;
    let list = TaskService::new(&state.db)
        .list_tasks(&current_user, status)
        .await?;
    Ok(Json(TaskListResponse::from(list)))
}

/// Handler for GET /api/tasks/dashboard-data - Dashboard over every task.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/tasks/dashboard-data",
    responses(
        (status = 200, description = "Dashboard over every task", body = DashboardResponse),
        (status = 401, description = "Not signed in", body = ServerErrorResponse),
        (status = 403, description = "Admin access required", body = ServerErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn admin_dashboard_handler(
    State(state): State<AppState>,
) -> Result<Json<DashboardResponse>, TaskServiceError> {
    let dashboard = TaskService::new(&state.db).dashboard(None).await?;
    Ok(Json(DashboardResponse::from(dashboard)))
}

/// Handler for GET /api/tasks/user-dashboard-data - Dashboard over the caller's tasks.
#[tracing::instrument(skip(state, current_user), fields(user_id = current_user.id))]
#[utoipa::path(
    get,
    path = "/api/tasks/user-dashboard-data",
    responses(
        (status = 200, description = "Dashboard over the caller's assigned tasks", body = DashboardResponse),
        (status = 401, description = "Not signed in", body = ServerErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn user_dashboard_handler(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<DashboardResponse>, TaskServiceError> {
    let dashboard = TaskService::new(&state.db)
        .dashboard(Some(current_user.id))
        .await?;
    Ok(Json(DashboardResponse::from(dashboard)))
}

/// Handler for GET /api/tasks/{id} - Returns one task.
#[tracing::instrument(skip(state, current_user), fields(user_id = current_user.id))]
#[utoipa::path(
    get,
    path = "/api/tasks/{id}",
    params(
        ("id" = i32, Path, description = "ID of the task")
    ),
    responses(
        (status = 200, description = "Successfully retrieved task", body = TaskJson),
        (status = 403, description = "Task is not assigned to the caller", body = ServerErrorResponse),
        (status = 404, description = "Task not found", body = ServerErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn get_task_handler(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<i32>,
) -> Result<Json<TaskJson>, TaskServiceError> {
    let task = TaskService::new(&state.db)
        .get_visible_task(id, &current_user)
        .await?;
    Ok(Json(TaskJson::from(task)))
}

/// Handler for POST /api/tasks - Creates a task.
#[tracing::instrument(skip(state, current_user, payload), fields(user_id = current_user.id))]
#[utoipa::path(
    post,
    path = "/api/tasks",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created", body = TaskJson),
        (status = 400, description = "Invalid input", body = ServerErrorResponse),
        (status = 403, description = "Admin access required", body = ServerErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn create_task_handler(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ApiJson(payload): ApiJson<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskJson>), TaskServiceError> {
    let task = TaskService::new(&state.db)
        .create_task(NewTask::from(payload), current_user.id)
        .await?;
    tracing::info!("Created task {}", task.id);
    Ok((StatusCode::CREATED, Json(TaskJson::from(task))))
}

/// Handler for PUT /api/tasks/{id} - Edits a task.
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    put,
    path = "/api/tasks/{id}",
    params(
        ("id" = i32, Path, description = "ID of the task")
    ),
    request_body = UpdateTaskRequest,
    responses(
        (status = 200, description = "Task updated", body = TaskJson),
        (status = 400, description = "Invalid input", body = ServerErrorResponse),
        (status = 403, description = "Admin access required", body = ServerErrorResponse),
        (status = 404, description = "Task not found", body = ServerErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn update_task_handler(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i32>,
    ApiJson(payload): ApiJson<UpdateTaskRequest>,
) -> Result<Json<TaskJson>, TaskServiceError> {
    let task = TaskService::new(&state.db)
        .update_task(id, TaskUpdate::from(payload))
        .await?;
    Ok(Json(TaskJson::from(task)))
}

/// Handler for DELETE /api/tasks/{id} - Deletes a task.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    delete,
    path = "/api/tasks/{id}",
    params(
        ("id" = i32, Path, description = "ID of the task")
    ),
    responses(
        (status = 200, description = "Task deleted", body = MessageResponse),
        (status = 403, description = "Admin access required", body = ServerErrorResponse),
        (status = 404, description = "Task not found", body = ServerErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn delete_task_handler(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i32>,
) -> Result<Json<MessageResponse>, TaskServiceError> {
    let deleted = TaskService::new(&state.db).delete_task(id).await?;
    tracing::info!("Deleted task {}", deleted.id);
    Ok(Json(MessageResponse::new(format!(
        "Task '{}' deleted",
        deleted.title
    ))))
}

/// Handler for PUT /api/tasks/{id}/status - Changes the status of a task.
#[tracing::instrument(skip(state, current_user), fields(user_id = current_user.id))]
#[utoipa::path(
    put,
    path = "/api/tasks/{id}/status",
    params(
        ("id" = i32, Path, description = "ID of the task")
    ),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = TaskJson),
        (status = 403, description = "Task is not assigned to the caller", body = ServerErrorResponse),
        (status = 404, description = "Task not found", body = ServerErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn update_status_handler(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<i32>,
    ApiJson(payload): ApiJson<UpdateStatusRequest>,
) -> Result<Json<TaskJson>, TaskServiceError> {
    let task = TaskService::new(&state.db)
        .update_status(id, payload.status, &current_user)
        .await?;
    Ok(Json(TaskJson::from(task)))
}

/// Handler for PUT /api/tasks/{id}/todo - Replaces the checklist of a task.
#[tracing::instrument(skip(state, current_user, payload), fields(user_id = current_user.id))]
#[utoipa::path(
    put,
    path = "/api/tasks/{id}/todo",
    params(
        ("id" = i32, Path, description = "ID of the task")
    ),
    request_body = UpdateChecklistRequest,
    responses(
        (status = 200, description = "Checklist replaced and status derived", body = TaskJson),
        (status = 403, description = "Task is not assigned to the caller", body = ServerErrorResponse),
        (status = 404, description = "Task not found", body = ServerErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn update_checklist_handler(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<i32>,
    ApiJson(payload): ApiJson<UpdateChecklistRequest>,
) -> Result<Json<TaskJson>, TaskServiceError> {
    let items = payload
        .todo_checklist
        .into_iter()
        .map(TodoItem::from)
        .collect();
    let task = TaskService::new(&state.db)
        .update_checklist(id, items, &current_user)
        .await?;
    Ok(Json(TaskJson::from(task)))
}

/// Creates and returns the tasks API router.
///
/// Members reach the read, status and checklist routes; creating, editing,
/// deleting and the global dashboard are admin only.
pub fn create_api_router(state: AppState) -> Router {
    let member_routes = Router::new()
        .route("/", get(get_tasks_handler))
        .route("/user-dashboard-data", get(user_dashboard_handler))
        .route("/{id}", get(get_task_handler))
        .route("/{id}/status", put(update_status_handler))
        .route("/{id}/todo", put(update_checklist_handler));

    let admin_routes = Router::new()
        .route("/", axum::routing::post(create_task_handler))
        .route("/dashboard-data", get(admin_dashboard_handler))
        .route(
            "/{id}",
            put(update_task_handler).delete(delete_task_handler),
        )
        .route_layer(from_fn(require_admin_middleware));

    member_routes.merge(admin_routes).with_state(state)
}
