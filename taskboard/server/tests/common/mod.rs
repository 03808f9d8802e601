#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use chrono::{Duration, Utc};
use migration::MigratorTrait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;
use taskboard_server::auth::{encode_jwt, hash_password};
use taskboard_server::config::Config;
use taskboard_server::entities::sea_orm_active_enums::Role;
use taskboard_server::task::{NewTask, Priority, Task, TaskService, TodoItem};
use taskboard_server::user::{NewUser, User, UserService};
use tower::ServiceExt;

pub const JWT_SECRET: &str = "test_secret";
pub const ADMIN_INVITE_TOKEN: &str = "admin-invite";
pub const PASSWORD: &str = "password123";

/// Opens a fresh in-memory SQLite database with every migration applied.
///
/// The pool holds exactly one connection because each SQLite memory
/// connection is its own database.
pub async fn setup_db() -> anyhow::Result<Arc<DatabaseConnection>> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(Arc::new(db))
}

pub fn test_config() -> Config {
    Config {
        db_url: "sqlite::memory:".to_string(),
        port: 8080,
        jwt_secret: JWT_SECRET.to_string(),
        admin_invite_token: Some(ADMIN_INVITE_TOKEN.to_string()),
        front_end_url: None,
    }
}

/// Builds the full application router over `db`.
pub fn create_test_app(db: &Arc<DatabaseConnection>) -> Router {
    taskboard_server::web::build_router(&test_config(), db.clone()).unwrap()
}

/// Inserts a user whose password is never checked.
pub async fn create_user(db: &DatabaseConnection, name: &str, role: Role) -> User {
    UserService::new(db)
        .create_user(NewUser {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            password_hash: "unused".to_string(),
            profile_image_url: None,
            role,
        })
        .await
        .unwrap()
}

/// Inserts a user that can sign in with `PASSWORD`.
pub async fn create_user_with_password(db: &DatabaseConnection, name: &str, role: Role) -> User {
    UserService::new(db)
        .create_user(NewUser {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            password_hash: hash_password(PASSWORD).unwrap(),
            profile_image_url: None,
            role,
        })
        .await
        .unwrap()
}

pub fn new_task(title: &str, assignees: &[&User]) -> NewTask {
    NewTask {
        title: title.to_string(),
        description: format!("{} description", title),
        priority: Priority::Medium,
        due_date: Utc::now() + Duration::days(7),
        assignee_ids: assignees.iter().map(|user| user.id()).collect(),
        todo_checklist: Vec::new(),
        attachments: Vec::new(),
    }
}

pub fn todo(text: &str, completed: bool) -> TodoItem {
    TodoItem {
        text: text.to_string(),
        completed,
    }
}

pub async fn create_task(
    db: &DatabaseConnection,
    admin: &User,
    title: &str,
    assignees: &[&User],
) -> Task {
    TaskService::new(db)
        .create_task(new_task(title, assignees), admin.id())
        .await
        .unwrap()
}

/// `Authorization` header value for `user`.
pub fn bearer(user: &User) -> String {
    let token = encode_jwt(user.id(), user.role(), JWT_SECRET).unwrap();
    format!("Bearer {}", token)
}

/// Builds a request with an optional bearer token and JSON body.
pub fn request(
    method: Method,
    uri: &str,
    user: Option<&User>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(header::AUTHORIZATION, bearer(user));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.body.clone()).unwrap()
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    TestResponse {
        status,
        headers,
        body,
    }
}
