use crate::entities::sea_orm_active_enums::Role;
use crate::entities::user;
use crate::task::stats::{self, UserTaskCounts};
use crate::task::{TaskFilter, TaskService, TaskServiceError};
use chrono::Utc;
use sea_orm::*;

pub mod api;

#[derive(Debug, PartialEq, Clone, Eq, Hash)]
pub struct User {
    id: i32,
    name: String,
    email: String,
    role: Role,
    profile_image_url: Option<String>,
}

impl User {
    pub fn new(
        id: i32,
        name: String,
        email: String,
        role: Role,
        profile_image_url: Option<String>,
    ) -> Self {
        Self {
            id,
            name,
            email,
            role,
            profile_image_url,
        }
    }

    /// Returns the ID of the user.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Returns the display name of the user.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the email address of the user.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the role of the user.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the profile image URL of the user, if any.
    pub fn profile_image_url(&self) -> Option<&str> {
        self.profile_image_url.as_deref()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<user::Model> for User {
    fn from(model: user::Model) -> Self {
        User::new(
            model.id,
            model.name,
            model.email,
            model.role,
            model.profile_image_url,
        )
    }
}

/// Data needed to register a user. The password must already be hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub profile_image_url: Option<String>,
    pub role: Role,
}

/// Fields of a profile that may change. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub profile_image_url: Option<String>,
}

/// Error type for UserService operations.
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Represents an email that is already registered.
    #[error("A user with email '{0}' already exists")]
    DuplicateEmail(String),
    /// Represents a user not found error.
    #[error("User with ID {0} not found")]
    UserNotFound(i32),
    /// Represents rejected input such as a blank name or a malformed email.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    /// Represents a failure while loading the tasks used for workload counts.
    #[error("Task lookup failed: {0}")]
    Tasks(#[from] TaskServiceError),
}

/// Lowercases and trims an email so lookups are case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Loose syntactic check: one `@`, a non-empty local part and a dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
}

pub struct UserService<'a> {
    db: &'a sea_orm::DatabaseConnection,
}

impl UserService<'_> {
    pub fn new(db: &sea_orm::DatabaseConnection) -> UserService<'_> {
        UserService { db }
    }

    /// Registers a new user.
    ///
    /// # Returns
    ///
    /// The created `User`, or `DuplicateEmail` when the address is taken.
    #[tracing::instrument(skip(self, new_user), fields(email = %new_user.email))]
    pub async fn create_user(&self, new_user: NewUser) -> Result<User, UserServiceError> {
        let name = new_user.name.trim().to_string();
        if name.is_empty() {
            return Err(UserServiceError::InvalidInput(
                "name must not be empty".to_string(),
            ));
        }
        let email = normalize_email(&new_user.email);
        if !is_valid_email(&email) {
            return Err(UserServiceError::InvalidInput(format!(
                "'{}' is not a valid email address",
                new_user.email
            )));
        }
        if self.email_exists(&email).await? {
            return Err(UserServiceError::DuplicateEmail(email));
        }
        let email_for_error = email.clone();

        let active_model = user::ActiveModel {
            name: ActiveValue::Set(name),
            email: ActiveValue::Set(email),
            password_hash: ActiveValue::Set(new_user.password_hash),
            profile_image_url: ActiveValue::Set(new_user.profile_image_url),
            role: ActiveValue::Set(new_user.role),
            created_at: ActiveValue::Set(Utc::now()),
            ..Default::default()
        };
        let created_model = active_model
            .insert(self.db)
            .await
            .map_err(|err| duplicate_email_or_database(err, &email_for_error))?;
        Ok(User::from(created_model))
    }

    /// Looks up a user by email together with the stored password hash.
    #[tracing::instrument(skip(self))]
    pub async fn find_credentials(
        &self,
        email: &str,
    ) -> Result<Option<(User, String)>, UserServiceError> {
        let model = user::Entity::find()
            .filter(user::Column::Email.eq(normalize_email(email)))
            .one(self.db)
            .await?;
        Ok(model.map(|model| {
            let password_hash = model.password_hash.clone();
            (User::from(model), password_hash)
        }))
    }

    /// Retrieves a user by ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_user_by_id(&self, id: i32) -> Result<User, UserServiceError> {
        let model = user::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(UserServiceError::UserNotFound(id))?;
        Ok(User::from(model))
    }

    /// Applies a profile update to the user with the given ID.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_profile(
        &self,
        id: i32,
        update: ProfileUpdate,
    ) -> Result<User, UserServiceError> {
        let user_to_update = user::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(UserServiceError::UserNotFound(id))?;

        let mut requested_email = user_to_update.email.clone();
        let mut active_model: user::ActiveModel = user_to_update.clone().into();
        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(UserServiceError::InvalidInput(
                    "name must not be empty".to_string(),
                ));
            }
            active_model.name = ActiveValue::Set(name);
        }
        if let Some(email) = update.email {
            let email = normalize_email(&email);
            if !is_valid_email(&email) {
                return Err(UserServiceError::InvalidInput(format!(
                    "'{}' is not a valid email address",
                    email
                )));
            }
            if email != user_to_update.email && self.email_exists(&email).await? {
                return Err(UserServiceError::DuplicateEmail(email));
            }
            requested_email = email.clone();
            active_model.email = ActiveValue::Set(email);
        }
        if let Some(password_hash) = update.password_hash {
            active_model.password_hash = ActiveValue::Set(password_hash);
        }
        if let Some(url) = update.profile_image_url {
            active_model.profile_image_url = ActiveValue::Set(Some(url).filter(|u| !u.is_empty()));
        }

        let updated_model = active_model
            .update(self.db)
            .await
            .map_err(|err| duplicate_email_or_database(err, &requested_email))?;
        Ok(User::from(updated_model))
    }

    /// Retrieves every member account, ordered by name.
    #[tracing::instrument(skip(self))]
    pub async fn get_members(&self) -> Result<Vec<User>, UserServiceError> {
        let members = user::Entity::find()
            .filter(user::Column::Role.eq(Role::Member))
            .order_by_asc(user::Column::Name)
            .order_by_asc(user::Column::Id)
            .all(self.db)
            .await?
            .into_iter()
            .map(User::from)
            .collect();
        Ok(members)
    }

    /// Retrieves every member together with their pending, in-progress and
    /// completed task counts.
    #[tracing::instrument(skip(self))]
    pub async fn get_members_with_task_counts(
        &self,
    ) -> Result<Vec<(User, UserTaskCounts)>, UserServiceError> {
        let members = self.get_members().await?;
        let tasks = TaskService::new(self.db)
            .get_tasks(&TaskFilter::default())
            .await?;
        let counts = stats::per_user_counts(&tasks);

        Ok(members
            .into_iter()
            .map(|member| {
                let member_counts = counts.get(&member.id()).copied().unwrap_or_default();
                (member, member_counts)
            })
            .collect())
    }

    #[tracing::instrument(skip(self))]
    async fn email_exists(&self, email: &str) -> Result<bool, UserServiceError> {
        let existing = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(self.db)
            .await?;
        Ok(existing.is_some())
    }
}

/// A concurrent registration can pass the existence check and still hit the
/// unique index on `users.email`.
fn duplicate_email_or_database(err: DbErr, email: &str) -> UserServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            UserServiceError::DuplicateEmail(email.to_string())
        }
        _ => UserServiceError::Database(err),
    }
}
