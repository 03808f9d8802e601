use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{MatchedPath, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use jsonwebtoken::encode;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::trace::MakeSpan;
use tracing::Span;

use crate::config::Config;
use crate::entities::sea_orm_active_enums::Role;
use crate::user::{User, UserService, UserServiceError};
use crate::web::api::{INTERNAL_ERROR_MESSAGE, error_response};

pub mod api;

/// Name of the cookie carrying the session token.
pub const AUTH_COOKIE: &str = "access_token";

const TOKEN_LIFETIME_HOURS: i64 = 24;

/// Represents the currently authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i32,
    pub role: Role,
}

impl CurrentUser {
    /// Creates a new CurrentUser instance.
    pub fn new(id: i32, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self::new(user.id(), user.role())
    }
}

/// Authentication state containing the user store, JWT secret and admin invite token.
#[derive(Clone)]
pub struct AuthState {
    pub db: Arc<DatabaseConnection>,
    pub jwt_secret: String,
    pub admin_invite_token: Option<String>,
}

impl AuthState {
    /// Creates a new AuthState from the application config.
    pub fn from_config(config: &Config, db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            jwt_secret: config.jwt_secret.clone(),
            admin_invite_token: config.admin_invite_token.clone(),
        }
    }

    /// Role granted to a new account presenting `invite_token`.
    pub fn role_for_invite(&self, invite_token: Option<&str>) -> Role {
        match (self.admin_invite_token.as_deref(), invite_token) {
            (Some(expected), Some(given)) if !expected.is_empty() && expected == given => {
                Role::Admin
            }
            _ => Role::Member,
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq, Eq)]
pub struct Claims {
    /// Expiry time of the token
    pub exp: usize,
    /// Issued at time of the token
    pub iat: usize,
    /// ID of the authenticated user
    pub sub: i32,
    /// Role at the time the token was issued
    pub role: Role,
}

/// Custom error type for authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Represents a sign-in with an unknown email or a wrong password.
    #[error("Invalid email or password")]
    InvalidCredentials,
    /// Represents a request without a valid session.
    #[error("Authentication required to access this resource")]
    Unauthorized,
    /// Represents an authenticated user lacking the admin role.
    #[error("Admin access required")]
    Forbidden,
    /// Represents rejected sign-up or profile input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Represents an error during JWT operations.
    #[error("JWT operation failed")]
    JwtError,
    /// Represents an error while hashing a password.
    #[error("Password hashing failed")]
    PasswordHash,
    /// Represents an error from the user store.
    #[error(transparent)]
    User(#[from] UserServiceError),
}

impl axum::response::IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::User(err) => err.into_response(),
            AuthError::InvalidCredentials | AuthError::Unauthorized => {
                error_response(StatusCode::UNAUTHORIZED, self.to_string())
            }
            AuthError::Forbidden => error_response(StatusCode::FORBIDDEN, self.to_string()),
            AuthError::InvalidInput(_) => error_response(StatusCode::BAD_REQUEST, self.to_string()),
            AuthError::JwtError | AuthError::PasswordHash => {
                tracing::error!("Authentication failure: {}", self);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
            }
        }
    }
}

pub fn encode_jwt(user_id: i32, role: Role, jwt_secret: &str) -> anyhow::Result<String> {
    let now = chrono::Utc::now();
    let expire = chrono::Duration::hours(TOKEN_LIFETIME_HOURS);
    let exp = (now + expire).timestamp() as usize;
    let iat = now.timestamp() as usize;
    let claims = Claims {
        exp,
        iat,
        sub: user_id,
        role,
    };
    let jwt = encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(jwt_secret.as_bytes()),
    )?;
    Ok(jwt)
}

pub fn decode_jwt(token: &str, jwt_secret: &str) -> anyhow::Result<Claims> {
    let token_data = jsonwebtoken::decode(
        token,
        &jsonwebtoken::DecodingKey::from_secret(jwt_secret.as_bytes()),
        &jsonwebtoken::Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Hashes a password into a PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Checks a password against a stored PHC string. Malformed hashes never verify.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    PasswordHash::new(password_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Builds the session cookie for a freshly issued token.
pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, token))
        .http_only(true)
        .secure(false) // Set to true in production with HTTPS
        .same_site(SameSite::Lax)
        .max_age(time::Duration::hours(TOKEN_LIFETIME_HOURS))
        .path("/")
        .build()
}

/// Decodes the session token from the cookie, falling back to an
/// `Authorization: Bearer` header when the cookie is absent or invalid.
fn session_claims(jar: &CookieJar, headers: &HeaderMap, secret: &str) -> Option<Claims> {
    let from_cookie = jar.get(AUTH_COOKIE).map(|cookie| cookie.value());
    let from_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    [from_cookie, from_header]
        .into_iter()
        .flatten()
        .find_map(|token| decode_jwt(token, secret).ok())
}

/// Authentication middleware that checks for a valid JWT and sets the CurrentUser extension.
/// The user is reloaded from the database so role changes and deletions apply immediately.
/// This middleware only populates the CurrentUser extension and never rejects a request.
pub async fn auth_user_middleware(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let claims = session_claims(&jar, request.headers(), &state.jwt_secret);

    if let Some(claims) = claims {
        match UserService::new(&state.db).get_user_by_id(claims.sub).await {
            Ok(user) => {
                if user.role() != claims.role {
                    tracing::info!(
                        "Role of user {} changed from {:?} to {:?} since sign-in",
                        user.id(),
                        claims.role,
                        user.role()
                    );
                }
                request.extensions_mut().insert(CurrentUser::from(&user));
            }
            Err(UserServiceError::UserNotFound(id)) => {
                tracing::warn!("Session token refers to missing user {}", id);
            }
            Err(err) => {
                tracing::error!("Failed to load session user: {}", err);
            }
        }
    }

    next.run(request).await
}

/// Middleware that ensures the current user is authenticated.
/// Returns UNAUTHORIZED if the CurrentUser extension is not found in the request.
/// This middleware should be applied after auth_user_middleware.
pub async fn require_auth_middleware(request: Request, next: Next) -> Response {
    if request.extensions().get::<CurrentUser>().is_none() {
        return axum::response::IntoResponse::into_response(AuthError::Unauthorized);
    }

    next.run(request).await
}

/// Middleware that only lets admins through.
/// Returns UNAUTHORIZED without a session and FORBIDDEN for members.
pub async fn require_admin_middleware(request: Request, next: Next) -> Response {
    let caller = request
        .extensions()
        .get::<CurrentUser>()
        .map(|user| (user.id, user.is_admin()));

    match caller {
        None => axum::response::IntoResponse::into_response(AuthError::Unauthorized),
        Some((user_id, false)) => {
            tracing::warn!("User {} denied admin access", user_id);
            axum::response::IntoResponse::into_response(AuthError::Forbidden)
        }
        Some((_, true)) => next.run(request).await,
    }
}

/// Custom span maker that filters sensitive data from credential requests.
/// This implementation avoids logging request bodies and cookies for security.
#[derive(Clone, Debug)]
pub struct FilteredMakeSpan;

const SENSITIVE_PATHS: [&str; 3] = [
    "/api/auth/sign-in",
    "/api/auth/sign-up",
    "/api/auth/update-profile",
];

impl<B> MakeSpan<B> for FilteredMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> Span {
        let uri = request.uri();
        let method = request.method();
        let matched_path = request
            .extensions()
            .get::<MatchedPath>()
            .map(MatchedPath::as_str);

        if SENSITIVE_PATHS.contains(&uri.path()) {
            tracing::info_span!(
                "request",
                method = %method,
                uri = %uri,
                matched_path,
                sensitive_route = true,
            )
        } else {
            tracing::info_span!(
                "request",
                method = %method,
                uri = %uri,
                matched_path,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_round_trip_jwt_claims() {
        let token = encode_jwt(42, Role::Admin, "test_secret").unwrap();

        let claims = decode_jwt(&token, "test_secret").unwrap();

        assert_eq!(claims.sub, 42);
        assert_eq!(claims.role, Role::Admin);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn rejects_jwt_signed_with_another_secret() {
        let token = encode_jwt(42, Role::Member, "test_secret").unwrap();

        assert!(decode_jwt(&token, "other_secret").is_err());
    }

    #[test]
    fn can_verify_hashed_password() {
        let hash = hash_password("correct horse").unwrap();

        assert_ne!(hash, "correct horse");
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("battery staple", &hash));
        assert!(!verify_password("correct horse", "not-a-phc-string"));
    }

    #[test]
    fn invite_token_grants_admin_only_when_it_matches() {
        let state = AuthState {
            db: Arc::new(DatabaseConnection::Disconnected),
            jwt_secret: "test_secret".to_string(),
            admin_invite_token: Some("let-me-in".to_string()),
        };

        assert_eq!(state.role_for_invite(Some("let-me-in")), Role::Admin);
        assert_eq!(state.role_for_invite(Some("guess")), Role::Member);
        assert_eq!(state.role_for_invite(None), Role::Member);

        let without_token = AuthState {
            admin_invite_token: None,
            ..state
        };
        assert_eq!(without_token.role_for_invite(Some("let-me-in")), Role::Member);
    }

    #[test]
    fn session_cookie_is_http_only_and_site_wide() {
        let cookie = session_cookie("token".to_string());

        assert_eq!(cookie.name(), AUTH_COOKIE);
        assert_eq!(cookie.value(), "token");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }

    #[test]
    fn falls_back_to_bearer_when_cookie_is_stale() {
        let token = encode_jwt(7, Role::Member, "test_secret").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "access_token=stale".parse().unwrap());
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {}", token).parse().unwrap(),
        );
        let jar = CookieJar::from_headers(&headers);

        let claims = session_claims(&jar, &headers, "test_secret").unwrap();

        assert_eq!(claims.sub, 7);
        assert!(session_claims(&CookieJar::new(), &HeaderMap::new(), "test_secret").is_none());
    }

    #[test]
    fn current_user_keeps_id_and_role() {
        let user = User::new(
            3,
            "Ada".to_string(),
            "ada@example.com".to_string(),
            Role::Admin,
            None,
        );

        let current_user = CurrentUser::from(&user);

        assert_eq!(current_user, CurrentUser::new(3, Role::Admin));
        assert!(current_user.is_admin());
    }
}
