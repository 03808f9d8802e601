use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::json;
use taskboard_server::entities::sea_orm_active_enums::Role;

mod common;

use common::{
    ADMIN_INVITE_TOKEN, PASSWORD, bearer, create_test_app, create_user, create_user_with_password,
    request, send, setup_db,
};

fn set_cookie(response: &common::TestResponse) -> String {
    response
        .headers
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn can_sign_up_as_member() {
    let db = setup_db().await.unwrap();
    let app = create_test_app(&db);

    let response = send(
        &app,
        request(
            Method::POST,
            "/api/auth/sign-up",
            None,
            Some(json!({
                "name": "Ada",
                "email": "Ada@Example.com",
                "password": "correct horse"
            })),
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::CREATED);
    let body = response.json();
    assert_eq!(body["name"], "Ada");
    assert_eq!(body["email"], "ada@example.com");
    assert_eq!(body["role"], "member");
    assert!(body["token"].as_str().is_some_and(|token| !token.is_empty()));
    let cookie = set_cookie(&response);
    assert!(cookie.starts_with("access_token="));
    assert!(cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn invite_token_creates_admin() {
    let db = setup_db().await.unwrap();
    let app = create_test_app(&db);

    let admin = send(
        &app,
        request(
            Method::POST,
            "/api/auth/sign-up",
            None,
            Some(json!({
                "name": "Root",
                "email": "root@example.com",
                "password": "correct horse",
                "adminInviteToken": ADMIN_INVITE_TOKEN
            })),
        ),
    )
    .await;
    let guesser = send(
        &app,
        request(
            Method::POST,
            "/api/auth/sign-up",
            None,
            Some(json!({
                "name": "Guesser",
                "email": "guesser@example.com",
                "password": "correct horse",
                "adminInviteToken": "wrong"
            })),
        ),
    )
    .await;

    assert_eq!(admin.json()["role"], "admin");
    assert_eq!(guesser.json()["role"], "member");
}

#[tokio::test]
async fn rejects_duplicate_sign_up() {
    let db = setup_db().await.unwrap();
    create_user(&db, "Ada", Role::Member).await;
    let app = create_test_app(&db);

    let response = send(
        &app,
        request(
            Method::POST,
            "/api/auth/sign-up",
            None,
            Some(json!({
                "name": "Ada Again",
                "email": "ada@example.com",
                "password": "correct horse"
            })),
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(
        response.json(),
        json!({
            "success": false,
            "statusCode": 409,
            "message": "A user with email 'ada@example.com' already exists"
        })
    );
}

#[tokio::test]
async fn rejects_sign_up_with_missing_fields() {
    let db = setup_db().await.unwrap();
    let app = create_test_app(&db);

    let short_password = send(
        &app,
        request(
            Method::POST,
            "/api/auth/sign-up",
            None,
            Some(json!({ "name": "Ada", "email": "ada@example.com", "password": "short" })),
        ),
    )
    .await;
    let no_name = send(
        &app,
        request(
            Method::POST,
            "/api/auth/sign-up",
            None,
            Some(json!({ "email": "ada@example.com", "password": "correct horse" })),
        ),
    )
    .await;

    assert_eq!(short_password.status, StatusCode::BAD_REQUEST);
    assert_eq!(no_name.status, StatusCode::BAD_REQUEST);
    assert_eq!(no_name.json()["success"], false);
}

#[tokio::test]
async fn can_sign_in_and_use_cookie_session() {
    let db = setup_db().await.unwrap();
    create_user_with_password(&db, "Ada", Role::Member).await;
    let app = create_test_app(&db);

    let signed_in = send(
        &app,
        request(
            Method::POST,
            "/api/auth/sign-in",
            None,
            Some(json!({ "email": "ada@example.com", "password": PASSWORD })),
        ),
    )
    .await;
    assert_eq!(signed_in.status, StatusCode::OK);
    let cookie = set_cookie(&signed_in);
    let cookie_pair = cookie.split(';').next().unwrap().to_string();

    let profile = send(
        &app,
        Request::builder()
            .uri("/api/auth/user-profile")
            .header(header::COOKIE, cookie_pair)
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(profile.status, StatusCode::OK);
    assert_eq!(profile.json()["email"], "ada@example.com");
}

#[tokio::test]
async fn rejects_wrong_credentials() {
    let db = setup_db().await.unwrap();
    create_user_with_password(&db, "Ada", Role::Member).await;
    let app = create_test_app(&db);

    let wrong_password = send(
        &app,
        request(
            Method::POST,
            "/api/auth/sign-in",
            None,
            Some(json!({ "email": "ada@example.com", "password": "not the password" })),
        ),
    )
    .await;
    let unknown_email = send(
        &app,
        request(
            Method::POST,
            "/api/auth/sign-in",
            None,
            Some(json!({ "email": "nobody@example.com", "password": PASSWORD })),
        ),
    )
    .await;

    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.json(), unknown_email.json());
    assert!(set_cookie(&wrong_password).is_empty());
}

#[tokio::test]
async fn profile_requires_session() {
    let db = setup_db().await.unwrap();
    let app = create_test_app(&db);

    let anonymous = send(
        &app,
        request(Method::GET, "/api/auth/user-profile", None, None),
    )
    .await;
    let forged = send(
        &app,
        Request::builder()
            .uri("/api/auth/user-profile")
            .header(header::AUTHORIZATION, "Bearer not-a-token")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    assert_eq!(anonymous.json()["statusCode"], 401);
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_of_deleted_user_is_rejected() {
    let db = setup_db().await.unwrap();
    let app = create_test_app(&db);
    let ghost = taskboard_server::user::User::new(
        404,
        "Ghost".to_string(),
        "ghost@example.com".to_string(),
        Role::Admin,
        None,
    );

    let response = send(
        &app,
        request(Method::GET, "/api/auth/user-profile", Some(&ghost), None),
    )
    .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn can_sign_out() {
    let db = setup_db().await.unwrap();
    let app = create_test_app(&db);

    let response = send(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/api/auth/sign-out")
            .header(header::COOKIE, "access_token=whatever")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    let cookie = set_cookie(&response);
    assert!(cookie.starts_with("access_token="));
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn can_update_own_profile() {
    let db = setup_db().await.unwrap();
    let ada = create_user(&db, "Ada", Role::Member).await;
    let app = create_test_app(&db);

    let response = send(
        &app,
        request(
            Method::PUT,
            "/api/auth/update-profile",
            Some(&ada),
            Some(json!({ "name": "Ada Lovelace", "password": "new password" })),
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["name"], "Ada Lovelace");

    let signed_in = send(
        &app,
        request(
            Method::POST,
            "/api/auth/sign-in",
            None,
            Some(json!({ "email": "ada@example.com", "password": "new password" })),
        ),
    )
    .await;
    assert_eq!(signed_in.status, StatusCode::OK);
}

#[tokio::test]
async fn stale_cookie_does_not_hide_bearer_token() {
    let db = setup_db().await.unwrap();
    let ada = create_user(&db, "Ada", Role::Member).await;
    let app = create_test_app(&db);

    let response = send(
        &app,
        Request::builder()
            .uri("/api/auth/user-profile")
            .header(header::COOKIE, "access_token=stale")
            .header(header::AUTHORIZATION, bearer(&ada))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["id"], ada.id());
}
