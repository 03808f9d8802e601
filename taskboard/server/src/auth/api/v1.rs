use crate::auth::{
    AUTH_COOKIE, AuthError, AuthState, CurrentUser, encode_jwt, hash_password,
    require_auth_middleware, session_cookie, verify_password,
};
use crate::user::api::v1::UserJson;
use crate::user::{NewUser, ProfileUpdate, User, UserService};
use crate::web::api::{MessageResponse, ServerErrorResponse};
use crate::web::extract::ApiJson;
use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn,
    routing::{get, post, put},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::Cookie;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Shortest password accepted at sign-up and on profile updates.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// JSON request payload for creating an account.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SignUpRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub profile_image_url: Option<String>,
    /// Grants the admin role when it matches the server's invite token
    pub admin_invite_token: Option<String>,
}

/// JSON request payload for signing in.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// JSON request payload for a profile update. Absent fields keep their value.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub profile_image_url: Option<String>,
}

/// JSON response for a successful sign-up, sign-in or profile update.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub user: UserJson,
    /// Session token, also set as the `access_token` cookie
    pub token: String,
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::InvalidInput(format!(
            "password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

/// Issues a token for `user` and attaches it to the cookie jar.
fn start_session(
    state: &AuthState,
    jar: CookieJar,
    user: User,
) -> Result<(CookieJar, Json<AuthResponse>), AuthError> {
    let token = encode_jwt(user.id(), user.role(), &state.jwt_secret).map_err(|err| {
        tracing::error!("Failed to generate authentication token: {}", err);
        AuthError::JwtError
    })?;
    let jar = jar.add(session_cookie(token.clone()));
    Ok((
        jar,
        Json(AuthResponse {
            user: UserJson::from(user),
            token,
        }),
    ))
}

/// Handler for POST /api/auth/sign-up - Registers a member, or an admin when
/// the invite token matches.
#[tracing::instrument(skip(state, jar, payload))]
#[utoipa::path(
    post,
    path = "/api/auth/sign-up",
    request_body = SignUpRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid input", body = ServerErrorResponse),
        (status = 409, description = "Email already registered", body = ServerErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn sign_up_handler(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    ApiJson(payload): ApiJson<SignUpRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), AuthError> {
    validate_password(&payload.password)?;
    let role = state.role_for_invite(payload.admin_invite_token.as_deref());
    let new_user = NewUser {
        name: payload.name,
        email: payload.email,
        password_hash: hash_password(&payload.password)?,
        profile_image_url: payload.profile_image_url.filter(|url| !url.is_empty()),
        role,
    };

    let user = UserService::new(&state.db).create_user(new_user).await?;
    tracing::info!("Registered user {} as {:?}", user.id(), user.role());
    let (jar, body) = start_session(&state, jar, user)?;
    Ok((StatusCode::CREATED, jar, body))
}

/// Handler for POST /api/auth/sign-in - Validates credentials and starts a session.
#[tracing::instrument(skip(state, jar, payload))]
#[utoipa::path(
    post,
    path = "/api/auth/sign-in",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Invalid email or password", body = ServerErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn sign_in_handler(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    ApiJson(payload): ApiJson<SignInRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AuthError> {
    let credentials = UserService::new(&state.db)
        .find_credentials(&payload.email)
        .await?;
    match credentials {
        Some((user, password_hash)) if verify_password(&payload.password, &password_hash) => {
            start_session(&state, jar, user)
        }
        _ => {
            tracing::warn!("Rejected sign-in attempt");
            Err(AuthError::InvalidCredentials)
        }
    }
}

/// Handler for POST /api/auth/sign-out - Clears the session cookie.
#[tracing::instrument(skip(jar))]
#[utoipa::path(
    post,
    path = "/api/auth/sign-out",
    responses(
        (status = 200, description = "Signed out", body = MessageResponse)
    ),
    tag = "Auth"
)]
pub async fn sign_out_handler(jar: CookieJar) -> (CookieJar, Json<MessageResponse>) {
    let jar = jar.remove(Cookie::build(AUTH_COOKIE).path("/"));
    (jar, Json(MessageResponse::new("Signed out")))
}

/// Handler for GET /api/auth/user-profile - Returns the signed-in user.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/auth/user-profile",
    responses(
        (status = 200, description = "The signed-in user", body = UserJson),
        (status = 401, description = "Not signed in", body = ServerErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn user_profile_handler(
    State(state): State<Arc<AuthState>>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<UserJson>, AuthError> {
    let user = UserService::new(&state.db)
        .get_user_by_id(current_user.id)
        .await?;
    Ok(Json(UserJson::from(user)))
}

/// Handler for PUT /api/auth/update-profile - Changes the signed-in user's
/// name, email, password or picture and reissues the session token.
#[tracing::instrument(skip(state, jar, payload))]
#[utoipa::path(
    put,
    path = "/api/auth/update-profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = AuthResponse),
        (status = 400, description = "Invalid input", body = ServerErrorResponse),
        (status = 401, description = "Not signed in", body = ServerErrorResponse),
        (status = 409, description = "Email already registered", body = ServerErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn update_profile_handler(
    State(state): State<Arc<AuthState>>,
    Extension(current_user): Extension<CurrentUser>,
    jar: CookieJar,
    ApiJson(payload): ApiJson<UpdateProfileRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AuthError> {
    let password_hash = match payload.password.as_deref() {
        Some(password) => {
            validate_password(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };
    let update = ProfileUpdate {
        name: payload.name,
        email: payload.email,
        password_hash,
        profile_image_url: payload.profile_image_url,
    };

    let user = UserService::new(&state.db)
        .update_profile(current_user.id, update)
        .await?;
    start_session(&state, jar, user)
}

/// Creates the authentication router.
///
/// Sign-up, sign-in and sign-out are public; the profile routes need a session.
pub fn create_api_router(state: Arc<AuthState>) -> Router {
    let session_routes = Router::new()
        .route("/user-profile", get(user_profile_handler))
        .route("/update-profile", put(update_profile_handler))
        .route_layer(from_fn(require_auth_middleware));

    Router::new()
        .route("/sign-up", post(sign_up_handler))
        .route("/sign-in", post(sign_in_handler))
        .route("/sign-out", post(sign_out_handler))
        .merge(session_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_passwords() {
        assert!(matches!(
            validate_password("short"),
            Err(AuthError::InvalidInput(_))
        ));
        assert!(validate_password("long enough").is_ok());
    }

    #[test]
    fn missing_sign_in_fields_deserialize_as_empty() {
        let request: SignInRequest = serde_json::from_str("{}").unwrap();

        assert_eq!(request.email, "");
        assert_eq!(request.password, "");
    }
}
