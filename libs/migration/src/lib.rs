pub use sea_orm_migration::prelude::*;

pub mod embedding_schema;

mod m20250301_000000_create_chat_tables;
mod m20250301_000001_install_embeddings;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000000_create_chat_tables::Migration),
            Box::new(m20250301_000001_install_embeddings::Migration),
        ]
    }
}
