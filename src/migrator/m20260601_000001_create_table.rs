use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create Users (caregivers) Table
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Users::Email)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Users::Name).string().not_null())
                    .col(ColumnDef::new(Users::CreatedAt).date_time().not_null())
                    .col(ColumnDef::new(Users::UpdatedAt).date_time().not_null())
                    .to_owned(),
            )
            .await?;

        // Create Recipients Table
        manager
            .create_table(
                Table::create()
                    .table(Recipients::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Recipients::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Recipients::UserId).integer().not_null())
                    .col(ColumnDef::new(Recipients::Name).string().not_null())
                    .col(ColumnDef::new(Recipients::PhoneNumber).string().not_null())
                    .col(ColumnDef::new(Recipients::Condition).string().not_null())
                    .col(ColumnDef::new(Recipients::PreferredTime).string().not_null())
                    .col(ColumnDef::new(Recipients::EmergencyContactName).string().null())
                    .col(ColumnDef::new(Recipients::EmergencyContactPhone).string().null())
                    .col(ColumnDef::new(Recipients::CreatedAt).date_time().not_null())
                    .col(ColumnDef::new(Recipients::UpdatedAt).date_time().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-recipient-user_id")
                            .from(Recipients::Table, Recipients::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Recipients::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Email,
    Name,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Recipients {
    Table,
    Id,
    UserId,
    Name,
    PhoneNumber,
    Condition,
    PreferredTime,
    EmergencyContactName,
    EmergencyContactPhone,
    CreatedAt,
    UpdatedAt,
}
