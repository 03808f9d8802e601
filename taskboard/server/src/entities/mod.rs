pub mod sea_orm_active_enums;
pub mod task;
pub mod task_assignee;
pub mod task_attachment;
pub mod todo_item;
pub mod user;
