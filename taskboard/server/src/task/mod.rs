use crate::auth::CurrentUser;
use crate::entities::{task, task_assignee, task_attachment, todo_item, user};
use crate::user::User;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::*;
use std::collections::{BTreeSet, HashMap};

pub use crate::entities::sea_orm_active_enums::{Priority, TaskStatus};

pub mod api;
pub mod stats;

/// A single checklist entry of a task.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct TodoItem {
    pub text: String,
    pub completed: bool,
}

/// A task with its assignees, checklist and attachments resolved.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Task {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub due_date: DateTime<Utc>,
    pub created_by: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub assignees: Vec<User>,
    pub todo_checklist: Vec<TodoItem>,
    pub attachments: Vec<String>,
}

impl Task {
    /// Fraction of completed checklist items, `0.0` when the checklist is empty.
    pub fn progress(&self) -> f64 {
        stats::progress(&self.todo_checklist)
    }

    /// Number of completed checklist items.
    pub fn completed_todo_count(&self) -> usize {
        stats::checklist_counts(&self.todo_checklist).0
    }

    pub fn is_assigned_to(&self, user_id: i32) -> bool {
        self.assignees.iter().any(|assignee| assignee.id() == user_id)
    }
}

/// Selects which tasks a query returns. Unset fields do not filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub assignee_id: Option<i32>,
}

impl TaskFilter {
    /// The tasks a user may see: everything for admins, assigned tasks otherwise.
    pub fn visible_to(user: &CurrentUser) -> Self {
        Self {
            status: None,
            assignee_id: (!user.is_admin()).then_some(user.id),
        }
    }
}

/// Data needed to create a task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub due_date: DateTime<Utc>,
    pub assignee_ids: Vec<i32>,
    pub todo_checklist: Vec<TodoItem>,
    pub attachments: Vec<String>,
}

/// Fields of a task an admin may change. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<DateTime<Utc>>,
    pub assignee_ids: Option<Vec<i32>>,
    pub todo_checklist: Option<Vec<TodoItem>>,
    pub attachments: Option<Vec<String>>,
}

/// The tasks of a list view plus the counters of its status tabs.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskList {
    pub tasks: Vec<Task>,
    pub status_summary: stats::StatusSummary,
}

/// Everything a dashboard shows.
#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub statistics: stats::DashboardStatistics,
    pub charts: stats::TaskCharts,
    pub recent_tasks: Vec<Task>,
}

impl Dashboard {
    /// Aggregates a dashboard from an already scoped task collection.
    pub fn from_tasks(tasks: &[Task], now: DateTime<Utc>) -> Self {
        let charts = stats::TaskCharts::from_tasks(tasks);
        Self {
            statistics: stats::DashboardStatistics::new(
                charts.task_distribution,
                stats::overdue_count(tasks, now),
            ),
            charts,
            recent_tasks: stats::recent_tasks(tasks, stats::RECENT_TASKS_LIMIT)
                .into_iter()
                .cloned()
                .collect(),
        }
    }
}

/// Error type for TaskService operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskServiceError {
    /// Represents a task not found error.
    #[error("Task with ID {0} not found")]
    TaskNotFound(i32),
    /// Represents an assignee ID that does not belong to any user.
    #[error("User with ID {0} cannot be assigned because it does not exist")]
    UnknownAssignee(i32),
    /// Represents a user acting on a task that is not assigned to them.
    #[error("User {user_id} is not allowed to access task {task_id}")]
    Forbidden { task_id: i32, user_id: i32 },
    /// Represents rejected input such as a blank title.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub struct TaskService<'a> {
    db: &'a sea_orm::DatabaseConnection,
}

impl TaskService<'_> {
    pub fn new(db: &sea_orm::DatabaseConnection) -> TaskService<'_> {
        TaskService { db }
    }

    /// Creates a task with its assignees, checklist and attachments.
    ///
    /// # Arguments
    ///
    /// * `new_task` - The task to create.
    /// * `created_by` - The ID of the admin creating the task.
    ///
    /// # Returns
    ///
    /// A `Result` containing the created `Task` if successful, or an error otherwise.
    #[tracing::instrument(skip(self, new_task), fields(title = %new_task.title))]
    pub async fn create_task(
        &self,
        new_task: NewTask,
        created_by: i32,
    ) -> Result<Task, TaskServiceError> {
        let title = validate_title(&new_task.title)?;
        let assignee_ids = dedup_ids(&new_task.assignee_ids);
        ensure_users_exist(self.db, &assignee_ids).await?;

        let now = Utc::now();
        let txn = self.db.begin().await?;
        let active_model = task::ActiveModel {
            title: ActiveValue::Set(title),
            description: ActiveValue::Set(new_task.description),
            priority: ActiveValue::Set(new_task.priority),
            status: ActiveValue::Set(TaskStatus::Pending),
            due_date: ActiveValue::Set(new_task.due_date),
            created_by: ActiveValue::Set(created_by),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
            ..Default::default()
        };
        let created_model = active_model.insert(&txn).await?;
        replace_assignees(&txn, created_model.id, &assignee_ids).await?;
        replace_checklist(&txn, created_model.id, &new_task.todo_checklist).await?;
        replace_attachments(&txn, created_model.id, &new_task.attachments).await?;
        txn.commit().await?;

        self.get_task_by_id(created_model.id).await
    }

    /// Retrieves tasks matching the filter, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn get_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, TaskServiceError> {
        let mut query = task::Entity::find();
        if let Some(status) = filter.status {
            query = query.filter(task::Column::Status.eq(status));
        }
        if let Some(assignee_id) = filter.assignee_id {
            query = query
                .inner_join(task_assignee::Entity)
                .filter(task_assignee::Column::UserId.eq(assignee_id));
        }
        let models = query
            .order_by_desc(task::Column::CreatedAt)
            .order_by_desc(task::Column::Id)
            .all(self.db)
            .await?;
        Ok(resolve_tasks(self.db, models).await?)
    }

    /// Retrieves a task by its ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_task_by_id(&self, id: i32) -> Result<Task, TaskServiceError> {
        let model = find_task_model(self.db, id).await?;
        let mut tasks = resolve_tasks(self.db, vec![model]).await?;
        tasks.pop().ok_or(TaskServiceError::TaskNotFound(id))
    }

    /// Retrieves a task the given user is allowed to see.
    #[tracing::instrument(skip(self, actor), fields(user_id = actor.id))]
    pub async fn get_visible_task(
        &self,
        id: i32,
        actor: &CurrentUser,
    ) -> Result<Task, TaskServiceError> {
        let task = self.get_task_by_id(id).await?;
        ensure_can_access(&task, actor)?;
        Ok(task)
    }

    /// Lists the tasks visible to `actor`, optionally narrowed to one status.
    ///
    /// The status summary always counts the whole visible set so that every
    /// tab keeps its count while another tab is selected.
    #[tracing::instrument(skip(self, actor), fields(user_id = actor.id))]
    pub async fn list_tasks(
        &self,
        actor: &CurrentUser,
        status: Option<TaskStatus>,
    ) -> Result<TaskList, TaskServiceError> {
        let visible = self.get_tasks(&TaskFilter::visible_to(actor)).await?;
        let status_summary = stats::StatusSummary::from_tasks(&visible);
        let tasks = match status {
            Some(status) => visible
                .into_iter()
                .filter(|task| task.status == status)
                .collect(),
            None => visible,
        };
        Ok(TaskList {
            tasks,
            status_summary,
        })
    }

    /// Builds the dashboard over every task, or over the tasks assigned to
    /// `assignee_id` when given.
    #[tracing::instrument(skip(self))]
    pub async fn dashboard(&self, assignee_id: Option<i32>) -> Result<Dashboard, TaskServiceError> {
        let tasks = self
            .get_tasks(&TaskFilter {
                status: None,
                assignee_id,
            })
            .await?;
        Ok(Dashboard::from_tasks(&tasks, Utc::now()))
    }

    /// Edits a task by its ID.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_task(&self, id: i32, update: TaskUpdate) -> Result<Task, TaskServiceError> {
        let task_to_update = find_task_model(self.db, id).await?;
        let assignee_ids = update.assignee_ids.as_deref().map(dedup_ids);
        if let Some(ids) = &assignee_ids {
            ensure_users_exist(self.db, ids).await?;
        }

        let mut active_model: task::ActiveModel = task_to_update.into();
        if let Some(title) = update.title {
            active_model.title = ActiveValue::Set(validate_title(&title)?);
        }
        if let Some(description) = update.description {
            active_model.description = ActiveValue::Set(description);
        }
        if let Some(priority) = update.priority {
            active_model.priority = ActiveValue::Set(priority);
        }
        if let Some(due_date) = update.due_date {
            active_model.due_date = ActiveValue::Set(due_date);
        }
        active_model.updated_at = ActiveValue::Set(Utc::now());

        let txn = self.db.begin().await?;
        active_model.update(&txn).await?;
        if let Some(ids) = &assignee_ids {
            replace_assignees(&txn, id, ids).await?;
        }
        if let Some(items) = &update.todo_checklist {
            replace_checklist(&txn, id, items).await?;
        }
        if let Some(urls) = &update.attachments {
            replace_attachments(&txn, id, urls).await?;
        }
        txn.commit().await?;

        self.get_task_by_id(id).await
    }

    /// Deletes a task together with its assignee links, checklist and attachments.
    #[tracing::instrument(skip(self))]
    pub async fn delete_task(&self, id: i32) -> Result<Task, TaskServiceError> {
        let task_copy = self.get_task_by_id(id).await?;

        let txn = self.db.begin().await?;
        replace_assignees(&txn, id, &[]).await?;
        replace_checklist(&txn, id, &[]).await?;
        replace_attachments(&txn, id, &[]).await?;
        task::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        Ok(task_copy)
    }

    /// Sets the status of a task. Completing a task also completes every
    /// checklist item.
    #[tracing::instrument(skip(self, actor), fields(user_id = actor.id))]
    pub async fn update_status(
        &self,
        id: i32,
        status: TaskStatus,
        actor: &CurrentUser,
    ) -> Result<Task, TaskServiceError> {
        let task = self.get_task_by_id(id).await?;
        ensure_can_access(&task, actor)?;

        let txn = self.db.begin().await?;
        task::Entity::update_many()
            .col_expr(task::Column::Status, Expr::value(status))
            .col_expr(task::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(task::Column::Id.eq(id))
            .exec(&txn)
            .await?;
        if status == TaskStatus::Completed {
            todo_item::Entity::update_many()
                .col_expr(todo_item::Column::Completed, Expr::value(true))
                .filter(todo_item::Column::TaskId.eq(id))
                .exec(&txn)
                .await?;
        }
        txn.commit().await?;

        self.get_task_by_id(id).await
    }

    /// Replaces the checklist of a task and derives its status from the new
    /// completion state.
    #[tracing::instrument(skip(self, items, actor), fields(user_id = actor.id))]
    pub async fn update_checklist(
        &self,
        id: i32,
        items: Vec<TodoItem>,
        actor: &CurrentUser,
    ) -> Result<Task, TaskServiceError> {
        let task = self.get_task_by_id(id).await?;
        ensure_can_access(&task, actor)?;
        let status = stats::status_for_checklist(&items);

        let txn = self.db.begin().await?;
        replace_checklist(&txn, id, &items).await?;
        task::Entity::update_many()
            .col_expr(task::Column::Status, Expr::value(status))
            .col_expr(task::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(task::Column::Id.eq(id))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        if task.status != status {
            tracing::info!("Task {} moved from {:?} to {:?}", id, task.status, status);
        }
        self.get_task_by_id(id).await
    }
}

fn validate_title(title: &str) -> Result<String, TaskServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(TaskServiceError::InvalidInput(
            "title must not be empty".to_string(),
        ));
    }
    Ok(title.to_string())
}

fn dedup_ids(ids: &[i32]) -> Vec<i32> {
    ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

fn ensure_can_access(task: &Task, actor: &CurrentUser) -> Result<(), TaskServiceError> {
    if actor.is_admin() || task.is_assigned_to(actor.id) {
        Ok(())
    } else {
        Err(TaskServiceError::Forbidden {
            task_id: task.id,
            user_id: actor.id,
        })
    }
}

async fn find_task_model<C: ConnectionTrait>(
    conn: &C,
    id: i32,
) -> Result<task::Model, TaskServiceError> {
    task::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or(TaskServiceError::TaskNotFound(id))
}

async fn ensure_users_exist<C: ConnectionTrait>(
    conn: &C,
    ids: &[i32],
) -> Result<(), TaskServiceError> {
    if ids.is_empty() {
        return Ok(());
    }
    let found: BTreeSet<i32> = user::Entity::find()
        .filter(user::Column::Id.is_in(ids.iter().copied()))
        .all(conn)
        .await?
        .into_iter()
        .map(|model| model.id)
        .collect();
    match ids.iter().find(|id| !found.contains(id)) {
        Some(&missing) => Err(TaskServiceError::UnknownAssignee(missing)),
        None => Ok(()),
    }
}

async fn replace_assignees<C: ConnectionTrait>(
    conn: &C,
    task_id: i32,
    user_ids: &[i32],
) -> Result<(), DbErr> {
    task_assignee::Entity::delete_many()
        .filter(task_assignee::Column::TaskId.eq(task_id))
        .exec(conn)
        .await?;
    if user_ids.is_empty() {
        return Ok(());
    }
    let rows = user_ids.iter().map(|&user_id| task_assignee::ActiveModel {
        task_id: ActiveValue::Set(task_id),
        user_id: ActiveValue::Set(user_id),
    });
    task_assignee::Entity::insert_many(rows)
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

async fn replace_checklist<C: ConnectionTrait>(
    conn: &C,
    task_id: i32,
    items: &[TodoItem],
) -> Result<(), DbErr> {
    todo_item::Entity::delete_many()
        .filter(todo_item::Column::TaskId.eq(task_id))
        .exec(conn)
        .await?;
    if items.is_empty() {
        return Ok(());
    }
    let rows = items
        .iter()
        .enumerate()
        .map(|(position, item)| todo_item::ActiveModel {
            task_id: ActiveValue::Set(task_id),
            position: ActiveValue::Set(position as i32),
            text: ActiveValue::Set(item.text.clone()),
            completed: ActiveValue::Set(item.completed),
            ..Default::default()
        });
    todo_item::Entity::insert_many(rows)
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

async fn replace_attachments<C: ConnectionTrait>(
    conn: &C,
    task_id: i32,
    urls: &[String],
) -> Result<(), DbErr> {
    task_attachment::Entity::delete_many()
        .filter(task_attachment::Column::TaskId.eq(task_id))
        .exec(conn)
        .await?;
    if urls.is_empty() {
        return Ok(());
    }
    let rows = urls.iter().map(|url| task_attachment::ActiveModel {
        task_id: ActiveValue::Set(task_id),
        url: ActiveValue::Set(url.clone()),
        ..Default::default()
    });
    task_attachment::Entity::insert_many(rows)
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

/// Loads the assignees, checklists and attachments of `models` with one query
/// per child table and assembles them into `Task`s, keeping the input order.
async fn resolve_tasks<C: ConnectionTrait>(
    conn: &C,
    models: Vec<task::Model>,
) -> Result<Vec<Task>, DbErr> {
    if models.is_empty() {
        return Ok(Vec::new());
    }
    let task_ids: Vec<i32> = models.iter().map(|model| model.id).collect();

    let assignee_links = task_assignee::Entity::find()
        .filter(task_assignee::Column::TaskId.is_in(task_ids.clone()))
        .all(conn)
        .await?;
    let user_ids: BTreeSet<i32> = assignee_links.iter().map(|link| link.user_id).collect();
    let users: HashMap<i32, User> = if user_ids.is_empty() {
        HashMap::new()
    } else {
        user::Entity::find()
            .filter(user::Column::Id.is_in(user_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|model| (model.id, User::from(model)))
            .collect()
    };
    let mut assignees: HashMap<i32, Vec<User>> = HashMap::new();
    for link in assignee_links {
        if let Some(user) = users.get(&link.user_id) {
            assignees.entry(link.task_id).or_default().push(user.clone());
        }
    }
    for list in assignees.values_mut() {
        list.sort_by_key(User::id);
    }

    let mut checklists: HashMap<i32, Vec<TodoItem>> = HashMap::new();
    for item in todo_item::Entity::find()
        .filter(todo_item::Column::TaskId.is_in(task_ids.clone()))
        .order_by_asc(todo_item::Column::Position)
        .all(conn)
        .await?
    {
        checklists.entry(item.task_id).or_default().push(TodoItem {
            text: item.text,
            completed: item.completed,
        });
    }

    let mut attachments: HashMap<i32, Vec<String>> = HashMap::new();
    for attachment in task_attachment::Entity::find()
        .filter(task_attachment::Column::TaskId.is_in(task_ids))
        .order_by_asc(task_attachment::Column::Id)
        .all(conn)
        .await?
    {
        attachments
            .entry(attachment.task_id)
            .or_default()
            .push(attachment.url);
    }

    Ok(models
        .into_iter()
        .map(|model| Task {
            assignees: assignees.remove(&model.id).unwrap_or_default(),
            todo_checklist: checklists.remove(&model.id).unwrap_or_default(),
            attachments: attachments.remove(&model.id).unwrap_or_default(),
            id: model.id,
            title: model.title,
            description: model.description,
            priority: model.priority,
            status: model.status,
            due_date: model.due_date,
            created_by: model.created_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
        .collect())
}
