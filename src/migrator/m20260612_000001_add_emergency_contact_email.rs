use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(Recipients::Table)
                    .add_column(
                        ColumnDef::new(Recipients::EmergencyContactEmail)
                            .string()
                            .null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(Recipients::Table)
                    .drop_column(Recipients::EmergencyContactEmail)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum Recipients {
    Table,
    EmergencyContactEmail,
}
