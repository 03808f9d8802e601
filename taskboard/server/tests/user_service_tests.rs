use taskboard_server::auth::CurrentUser;
use taskboard_server::entities::sea_orm_active_enums::Role;
use taskboard_server::task::{TaskService, TaskStatus};
use taskboard_server::user::{NewUser, ProfileUpdate, UserService, UserServiceError};

mod common;

use common::{create_task, create_user, setup_db};

fn new_user(name: &str, email: &str) -> NewUser {
    NewUser {
        name: name.to_string(),
        email: email.to_string(),
        password_hash: "hash".to_string(),
        profile_image_url: None,
        role: Role::Member,
    }
}

#[tokio::test]
async fn can_create_user_with_normalized_email() {
    let db = setup_db().await.unwrap();
    let service = UserService::new(&db);

    let user = service
        .create_user(new_user("  Ada  ", " Ada@Example.COM "))
        .await
        .unwrap();

    assert_eq!(user.name(), "Ada");
    assert_eq!(user.email(), "ada@example.com");
    assert_eq!(user.role(), Role::Member);
    assert_eq!(service.get_user_by_id(user.id()).await.unwrap(), user);
}

#[tokio::test]
async fn rejects_duplicate_email_ignoring_case() {
    let db = setup_db().await.unwrap();
    let service = UserService::new(&db);
    service
        .create_user(new_user("Ada", "ada@example.com"))
        .await
        .unwrap();

    let result = service
        .create_user(new_user("Other Ada", "ADA@example.com"))
        .await;

    assert!(matches!(
        result,
        Err(UserServiceError::DuplicateEmail(email)) if email == "ada@example.com"
    ));
}

#[tokio::test]
async fn rejects_invalid_input() {
    let db = setup_db().await.unwrap();
    let service = UserService::new(&db);

    let blank_name = service.create_user(new_user(" ", "ada@example.com")).await;
    let bad_email = service.create_user(new_user("Ada", "not-an-email")).await;

    assert!(matches!(blank_name, Err(UserServiceError::InvalidInput(_))));
    assert!(matches!(bad_email, Err(UserServiceError::InvalidInput(_))));
}

#[tokio::test]
async fn can_find_credentials_by_email() {
    let db = setup_db().await.unwrap();
    let service = UserService::new(&db);
    let user = service
        .create_user(new_user("Ada", "ada@example.com"))
        .await
        .unwrap();

    let found = service.find_credentials("ADA@example.com").await.unwrap();
    let missing = service.find_credentials("nobody@example.com").await.unwrap();

    assert_eq!(found, Some((user, "hash".to_string())));
    assert_eq!(missing, None);
}

#[tokio::test]
async fn can_update_profile() {
    let db = setup_db().await.unwrap();
    let ada = create_user(&db, "Ada", Role::Member).await;
    let grace = create_user(&db, "Grace", Role::Member).await;
    let service = UserService::new(&db);

    let updated = service
        .update_profile(
            ada.id(),
            ProfileUpdate {
                name: Some("Ada Lovelace".to_string()),
                profile_image_url: Some("https://img.example.com/ada.png".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let taken = service
        .update_profile(
            ada.id(),
            ProfileUpdate {
                email: Some(grace.email().to_string()),
                ..Default::default()
            },
        )
        .await;
    let same_email = service
        .update_profile(
            ada.id(),
            ProfileUpdate {
                email: Some("ADA@example.com".to_string()),
                ..Default::default()
            },
        )
        .await;

    assert_eq!(updated.name(), "Ada Lovelace");
    assert_eq!(updated.email(), "ada@example.com");
    assert_eq!(
        updated.profile_image_url(),
        Some("https://img.example.com/ada.png")
    );
    assert!(matches!(taken, Err(UserServiceError::DuplicateEmail(_))));
    assert!(same_email.is_ok());
    assert!(matches!(
        service.update_profile(999, ProfileUpdate::default()).await,
        Err(UserServiceError::UserNotFound(999))
    ));
}

#[tokio::test]
async fn can_count_member_workload() {
    let db = setup_db().await.unwrap();
    let admin = create_user(&db, "Admin", Role::Admin).await;
    let ada = create_user(&db, "Ada", Role::Member).await;
    let grace = create_user(&db, "Grace", Role::Member).await;
    let shared = create_task(&db, &admin, "Shared", &[&ada, &grace]).await;
    create_task(&db, &admin, "Ada only", &[&ada]).await;
    TaskService::new(&db)
        .update_status(shared.id, TaskStatus::InProgress, &CurrentUser::from(&admin))
        .await
        .unwrap();

    let members = UserService::new(&db)
        .get_members_with_task_counts()
        .await
        .unwrap();

    assert_eq!(members.len(), 2);
    let (first, ada_counts) = &members[0];
    let (second, grace_counts) = &members[1];
    assert_eq!(first, &ada);
    assert_eq!(second, &grace);
    assert_eq!(ada_counts.pending_tasks, 1);
    assert_eq!(ada_counts.in_progress_tasks, 1);
    assert_eq!(ada_counts.total(), 2);
    assert_eq!(grace_counts.in_progress_tasks, 1);
    assert_eq!(grace_counts.total(), 1);
}
