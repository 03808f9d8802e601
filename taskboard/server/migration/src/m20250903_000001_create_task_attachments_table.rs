use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TaskAttachments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TaskAttachments::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TaskAttachments::TaskId).integer().not_null())
                    .col(ColumnDef::new(TaskAttachments::Url).string().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_task_attachments_task")
                            .from(TaskAttachments::Table, TaskAttachments::TaskId)
                            .to(Tasks::Table, Tasks::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TaskAttachments::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TaskAttachments {
    Table,
    Id,
    TaskId,
    Url,
}

#[derive(DeriveIden)]
enum Tasks {
    Table,
    Id,
}
