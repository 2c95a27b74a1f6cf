use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Conversations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Conversations::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(string_len(Conversations::UserId, 64))
                    .col(text_null(Conversations::Title))
                    .col(boolean(Conversations::IsGuest).default(false))
                    .col(
                        timestamp_with_time_zone(Conversations::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Conversations::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_conversations_user")
                    .table(Conversations::Table)
                    .col(Conversations::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Messages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Messages::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(string_len(Messages::ConversationId, 64))
                    .col(string_len(Messages::Role, 20))
                    .col(text(Messages::Content))
                    .col(json_binary_null(Messages::Citations))
                    .col(json_binary_null(Messages::SearchResults))
                    .col(string_len_null(Messages::Model, 100))
                    .col(
                        timestamp_with_time_zone(Messages::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_messages_conversation")
                            .from(Messages::Table, Messages::ConversationId)
                            .to(Conversations::Table, Conversations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_messages_conversation")
                    .table(Messages::Table)
                    .col(Messages::ConversationId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PatientMemory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PatientMemory::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(string_len(PatientMemory::UserId, 64))
                    .col(string_len(PatientMemory::EntityType, 50))
                    .col(text(PatientMemory::EntityName))
                    .col(json_binary_null(PatientMemory::Relationships))
                    .col(json_binary_null(PatientMemory::Metadata))
                    .col(string_len_null(PatientMemory::ConversationId, 64))
                    .col(
                        timestamp_with_time_zone(PatientMemory::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(PatientMemory::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_patient_memory_conversation")
                            .from(PatientMemory::Table, PatientMemory::ConversationId)
                            .to(Conversations::Table, Conversations::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_patient_memory_user")
                    .table(PatientMemory::Table)
                    .col(PatientMemory::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PatientMemory::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Messages::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Conversations::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Conversations {
    Table,
    Id,
    #[sea_orm(iden = "userId")]
    UserId,
    Title,
    #[sea_orm(iden = "isGuest")]
    IsGuest,
    #[sea_orm(iden = "createdAt")]
    CreatedAt,
    #[sea_orm(iden = "updatedAt")]
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Messages {
    Table,
    Id,
    #[sea_orm(iden = "conversationId")]
    ConversationId,
    Role,
    Content,
    Citations,
    #[sea_orm(iden = "searchResults")]
    SearchResults,
    Model,
    #[sea_orm(iden = "createdAt")]
    CreatedAt,
}

#[derive(DeriveIden)]
enum PatientMemory {
    #[sea_orm(iden = "patientMemory")]
    Table,
    Id,
    #[sea_orm(iden = "userId")]
    UserId,
    #[sea_orm(iden = "entityType")]
    EntityType,
    #[sea_orm(iden = "entityName")]
    EntityName,
    Relationships,
    Metadata,
    #[sea_orm(iden = "conversationId")]
    ConversationId,
    #[sea_orm(iden = "createdAt")]
    CreatedAt,
    #[sea_orm(iden = "updatedAt")]
    UpdatedAt,
}
