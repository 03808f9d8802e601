pub use sea_orm_migration::prelude::*;

mod m20250901_000001_create_users_table;
mod m20250901_000002_create_tasks_table;
mod m20250901_000003_create_task_assignees_table;
mod m20250901_000004_create_todo_items_table;
mod m20250903_000001_create_task_attachments_table;
mod m20250910_000001_add_task_status_index;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250901_000001_create_users_table::Migration),
            Box::new(m20250901_000002_create_tasks_table::Migration),
            Box::new(m20250901_000003_create_task_assignees_table::Migration),
            Box::new(m20250901_000004_create_todo_items_table::Migration),
            Box::new(m20250903_000001_create_task_attachments_table::Migration),
            Box::new(m20250910_000001_add_task_status_index::Migration),
        ]
    }
}
