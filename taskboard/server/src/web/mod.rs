use axum::Router;
use axum::http::{HeaderValue, Method, header};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::{AuthState, FilteredMakeSpan};
use crate::config::{self, Config};

pub mod api;
pub mod extract;

/// Shared state of the task, user and report routers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Taskboard API", description = "Task management and dashboard endpoints"),
    paths(
        crate::auth::api::v1::sign_up_handler,
        crate::auth::api::v1::sign_in_handler,
        crate::auth::api::v1::sign_out_handler,
        crate::auth::api::v1::user_profile_handler,
        crate::auth::api::v1::update_profile_handler,
        crate::user::api::v1::get_users_handler,
        crate::user::api::v1::get_user_handler,
        crate::task::api::v1::get_tasks_handler,
        crate::task::api::v1::admin_dashboard_handler,
        crate::task::api::v1::user_dashboard_handler,
        crate::task::api::v1::get_task_handler,
        crate::task::api::v1::create_task_handler,
        crate::task::api::v1::update_task_handler,
        crate::task::api::v1::delete_task_handler,
        crate::task::api::v1::update_status_handler,
        crate::task::api::v1::update_checklist_handler,
        crate::report::api::v1::export_tasks_handler,
        crate::report::api::v1::export_users_handler,
    ),
    tags(
        (name = "Auth", description = "Accounts and sessions"),
        (name = "Users", description = "Member directory"),
        (name = "Tasks", description = "Tasks, checklists and dashboards"),
        (name = "Reports", description = "CSV exports")
    )
)]
pub struct ApiDoc;

fn cors_layer(front_end_url: Option<&str>) -> anyhow::Result<CorsLayer> {
    let Some(origin) = front_end_url.filter(|url| !url.is_empty()) else {
        return Ok(CorsLayer::new());
    };
    Ok(CorsLayer::new()
        .allow_origin(origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true))
}

/// Builds the complete application router on top of an already migrated database.
pub fn build_router(config: &Config, db: Arc<DatabaseConnection>) -> anyhow::Result<Router> {
    let auth_state = Arc::new(AuthState::from_config(config, db.clone()));
    let app_state = AppState { db };

    let app = Router::new()
        .route("/health", axum::routing::get(health_check_handler))
        .merge(api::create_api_router(auth_state, app_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetSensitiveRequestHeadersLayer::new([
                    header::AUTHORIZATION,
                    header::COOKIE,
                ]))
                .layer(TraceLayer::new_for_http().make_span_with(FilteredMakeSpan))
                .layer(cors_layer(config.front_end_url.as_deref())?),
        );
    Ok(app)
}

#[tracing::instrument(skip(config))]
pub async fn start_web_server(config: config::Config) -> anyhow::Result<()> {
    let server_address = format!("0.0.0.0:{}", &config.port);
    let listener = tokio::net::TcpListener::bind(&server_address).await?;
    tracing::info!("Web server running on http://{}", server_address);

    let db = Database::connect(&config.db_url).await?;
    migration::Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");

    let app = build_router(&config, Arc::new(db))?;

    axum::serve(listener, app).await?;
    Ok(())
}

#[tracing::instrument]
pub async fn health_check_handler() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_doc_lists_every_resource() {
        let doc = ApiDoc::openapi();

        for path in [
            "/api/auth/sign-in",
            "/api/users/get-users",
            "/api/tasks",
            "/api/tasks/{id}/todo",
            "/api/reports/export/users",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn can_build_cors_layer_from_front_end_url() {
        assert!(cors_layer(None).is_ok());
        assert!(cors_layer(Some("")).is_ok());
        assert!(cors_layer(Some("http://localhost:5173")).is_ok());
        assert!(cors_layer(Some("not a header\n")).is_err());
    }
}
