use sea_orm_migration::prelude::*;

mod m20260601_000001_create_table;
mod m20260601_000002_create_check_ins;
mod m20260612_000001_add_emergency_contact_email;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260601_000001_create_table::Migration),
            Box::new(m20260601_000002_create_check_ins::Migration),
            Box::new(m20260612_000001_add_emergency_contact_email::Migration),
        ]
    }
}
