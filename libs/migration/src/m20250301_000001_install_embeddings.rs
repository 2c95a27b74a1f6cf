use sea_orm_migration::prelude::*;

use crate::embedding_schema::{DEFAULT_DIMENSION, EmbeddingSchema};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared("CREATE EXTENSION IF NOT EXISTS vector")
            .await?;

        for sql in EmbeddingSchema::new(DEFAULT_DIMENSION)?.install_statements() {
            db.execute_unprepared(&sql).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        for sql in EmbeddingSchema::drop_statements() {
            db.execute_unprepared(&sql).await?;
        }

        db.execute_unprepared("DROP EXTENSION IF EXISTS vector")
            .await?;

        Ok(())
    }
}
