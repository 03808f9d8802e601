use crate::auth::require_admin_middleware;
use crate::entities::sea_orm_active_enums::Role;
use crate::task::stats::UserTaskCounts;
use crate::user::{User, UserService, UserServiceError};
use crate::web::AppState;
use crate::web::api::{INTERNAL_ERROR_MESSAGE, ServerErrorResponse, error_response};
use crate::web::extract::ApiPath;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// JSON representation of a User for API responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserJson {
    /// Unique identifier for the user
    pub id: i32,
    /// Display name
    pub name: String,
    /// Login email address
    pub email: String,
    /// Either `admin` or `member`
    pub role: Role,
    /// URL of the profile picture, if one was uploaded
    pub profile_image_url: Option<String>,
}

impl From<User> for UserJson {
    fn from(user: User) -> Self {
        Self {
            id: user.id(),
            name: user.name().to_string(),
            email: user.email().to_string(),
            role: user.role(),
            profile_image_url: user.profile_image_url().map(str::to_string),
        }
    }
}

/// A member together with their task workload.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberJson {
    #[serde(flatten)]
    user: UserJson,
    #[serde(flatten)]
    task_counts: UserTaskCounts,
    /// Sum of the pending, in-progress and completed counts
    total_tasks: u64,
}

impl From<(User, UserTaskCounts)> for MemberJson {
    fn from((user, task_counts): (User, UserTaskCounts)) -> Self {
        Self {
            user: UserJson::from(user),
            total_tasks: task_counts.total(),
            task_counts,
        }
    }
}

/// API response for listing members.
#[derive(Debug, Serialize, ToSchema)]
pub struct UsersResponse {
    /// Members ordered by name
    users: Vec<MemberJson>,
    /// Total number of members
    count: usize,
}

impl IntoResponse for UserServiceError {
    fn into_response(self) -> Response {
        match self {
            UserServiceError::DuplicateEmail(_) => {
                error_response(StatusCode::CONFLICT, self.to_string())
            }
            UserServiceError::UserNotFound(_) => {
                error_response(StatusCode::NOT_FOUND, self.to_string())
            }
            UserServiceError::InvalidInput(_) => {
                error_response(StatusCode::BAD_REQUEST, self.to_string())
            }
            UserServiceError::Database(_) | UserServiceError::Tasks(_) => {
                tracing::error!("User request failed: {}", self);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
            }
        }
    }
}

/// Handler for GET /api/users/get-users - Returns every member with their task counts.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/users/get-users",
    responses(
        (status = 200, description = "Successfully retrieved members", body = UsersResponse),
        (status = 401, description = "Not signed in", body = ServerErrorResponse),
        (status = 403, description = "Admin access required", body = ServerErrorResponse),
        (status = 500, description = "Internal server error", body = ServerErrorResponse)
    ),
    tag = "Users"
)]
pub async fn get_users_handler(
    State(state): State<AppState>,
) -> Result<Json<UsersResponse>, UserServiceError> {
    let members = UserService::new(&state.db)
        .get_members_with_task_counts()
        .await?;
    let users: Vec<MemberJson> = members.into_iter().map(MemberJson::from).collect();
    let count = users.len();

    Ok(Json(UsersResponse { users, count }))
}

/// Handler for GET /api/users/{id} - Returns a single user.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(
        ("id" = i32, Path, description = "ID of the user")
    ),
    responses(
        (status = 200, description = "Successfully retrieved user", body = UserJson),
        (status = 401, description = "Not signed in", body = ServerErrorResponse),
        (status = 404, description = "User not found", body = ServerErrorResponse)
    ),
    tag = "Users"
)]
pub async fn get_user_handler(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i32>,
) -> Result<Json<UserJson>, UserServiceError> {
    let user = UserService::new(&state.db).get_user_by_id(id).await?;
    Ok(Json(UserJson::from(user)))
}

/// Creates and returns the users API router.
pub fn create_api_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/get-users", get(get_users_handler))
        .route_layer(from_fn(require_admin_middleware));

    Router::new()
        .route("/{id}", get(get_user_handler))
        .merge(admin_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_json_flattens_counts_next_to_user_fields() {
        let user = User::new(
            3,
            "Grace".to_string(),
            "grace@example.com".to_string(),
            Role::Member,
            None,
        );
        let counts = UserTaskCounts {
            pending_tasks: 2,
            in_progress_tasks: 1,
            completed_tasks: 4,
        };

        insta::assert_json_snapshot!(MemberJson::from((user, counts)), @r#"
        {
          "id": 3,
          "name": "Grace",
          "email": "grace@example.com",
          "role": "member",
          "profileImageUrl": null,
          "pendingTasks": 2,
          "inProgressTasks": 1,
          "completedTasks": 4,
          "totalTasks": 7
        }
        "#);
    }

    #[test]
    fn maps_user_errors_to_status_codes() {
        let cases = [
            (
                UserServiceError::DuplicateEmail("a@example.com".to_string()),
                StatusCode::CONFLICT,
            ),
            (UserServiceError::UserNotFound(9), StatusCode::NOT_FOUND),
            (
                UserServiceError::InvalidInput("name must not be empty".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                UserServiceError::Database(sea_orm::DbErr::Custom("boom".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
