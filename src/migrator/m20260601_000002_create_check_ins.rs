use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CheckIns::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CheckIns::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CheckIns::RecipientId).integer().not_null())
                    .col(
                        ColumnDef::new(CheckIns::Status)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(CheckIns::CallSid).string().null())
                    .col(ColumnDef::new(CheckIns::Script).text().null())
                    .col(ColumnDef::new(CheckIns::Transcript).text().null())
                    .col(ColumnDef::new(CheckIns::AiNotes).text().null())
                    .col(ColumnDef::new(CheckIns::CreatedAt).date_time().not_null())
                    .col(ColumnDef::new(CheckIns::CompletedAt).date_time().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-check_in-recipient_id")
                            .from(CheckIns::Table, CheckIns::RecipientId)
                            .to(Recipients::Table, Recipients::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Webhook correlation must be an indexed lookup on the call SID.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-check_ins-call_sid")
                    .table(CheckIns::Table)
                    .col(CheckIns::CallSid)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx-check_ins-call_sid")
                    .table(CheckIns::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(CheckIns::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CheckIns {
    Table,
    Id,
    RecipientId,
    Status,
    CallSid,
    Script,
    Transcript,
    AiNotes,
    CreatedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
enum Recipients {
    Table,
    Id,
}
