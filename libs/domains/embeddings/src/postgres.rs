use async_trait::async_trait;
use chrono::{DateTime, Utc};
use migration::embedding_schema::{EMBEDDING_COLUMN, EmbeddingSchema};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, DbErr, FromQueryResult, SqlErr, Statement,
    TransactionTrait,
};
use serde_json::Value;

use crate::error::{EmbeddingError, EmbeddingResult};
use crate::models::{
    BackfillScope, Conversation, EmbeddingStats, EmbeddingTable, MemoryMatch, MemorySearch,
    Message, MessageMatch, MessageSearch, NewConversation, NewMessage, NewPatientMemory,
    PatientMemory, TableCoverage,
};
use crate::repository::EmbeddingRepository;
use crate::similarity::{parse_vector_literal, vector_to_literal};

const MESSAGE_COLUMNS: &str = r#"m.id, m."conversationId" AS conversation_id, m.role, m.content,
    m.citations, m."searchResults" AS search_results, m.model, m."createdAt" AS created_at"#;

const MEMORY_COLUMNS: &str = r#"pm.id, pm."userId" AS user_id, pm."entityType" AS entity_type,
    pm."entityName" AS entity_name, pm.relationships, pm.metadata,
    pm."conversationId" AS conversation_id, pm."createdAt" AS created_at,
    pm."updatedAt" AS updated_at"#;

/// PostgreSQL + pgvector implementation of [`EmbeddingRepository`].
///
/// Vectors travel as `[a,b,...]` text and are cast to `vector` server-side,
/// so the declared column width is what rejects a wrong-sized vector.
pub struct PgEmbeddingRepository {
    db: DatabaseConnection,
}

impl PgEmbeddingRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[derive(Debug, FromQueryResult)]
struct ConversationRow {
    id: String,
    user_id: String,
    title: Option<String>,
    is_guest: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            is_guest: row.is_guest,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromQueryResult)]
struct MessageRow {
    id: String,
    conversation_id: String,
    role: String,
    content: String,
    citations: Option<Value>,
    search_results: Option<Value>,
    model: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            conversation_id: row.conversation_id,
            role: row.role,
            content: row.content,
            citations: row.citations,
            search_results: row.search_results,
            model: row.model,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromQueryResult)]
struct MessageMatchRow {
    id: String,
    conversation_id: String,
    role: String,
    content: String,
    citations: Option<Value>,
    search_results: Option<Value>,
    model: Option<String>,
    created_at: DateTime<Utc>,
    similarity: f64,
}

impl From<MessageMatchRow> for MessageMatch {
    fn from(row: MessageMatchRow) -> Self {
        Self {
            id: row.id,
            conversation_id: row.conversation_id,
            role: row.role,
            content: row.content,
            citations: row.citations,
            search_results: row.search_results,
            model: row.model,
            created_at: row.created_at,
            similarity: row.similarity,
        }
    }
}

#[derive(Debug, FromQueryResult)]
struct MemoryRow {
    id: String,
    user_id: String,
    entity_type: String,
    entity_name: String,
    relationships: Option<Value>,
    metadata: Option<Value>,
    conversation_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MemoryRow> for PatientMemory {
    fn from(row: MemoryRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            entity_type: row.entity_type,
            entity_name: row.entity_name,
            relationships: row.relationships,
            metadata: row.metadata,
            conversation_id: row.conversation_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromQueryResult)]
struct MemoryMatchRow {
    id: String,
    user_id: String,
    entity_type: String,
    entity_name: String,
    relationships: Option<Value>,
    metadata: Option<Value>,
    conversation_id: Option<String>,
    similarity: f64,
}

impl From<MemoryMatchRow> for MemoryMatch {
    fn from(row: MemoryMatchRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            entity_type: row.entity_type,
            entity_name: row.entity_name,
            relationships: row.relationships,
            metadata: row.metadata,
            conversation_id: row.conversation_id,
            similarity: row.similarity,
        }
    }
}

#[derive(Debug, FromQueryResult)]
struct StatsRow {
    table_name: String,
    total_rows: i64,
    embedded_rows: i64,
    embedding_percentage: f64,
}

#[derive(Debug, FromQueryResult)]
struct CountRow {
    count: i64,
}

#[derive(Debug, FromQueryResult)]
struct EmbeddingRow {
    embedding: Option<String>,
}

#[derive(Debug, FromQueryResult)]
struct DimensionRow {
    dimension: i32,
}

/// pgvector reports a wrong width as `expected 384 dimensions, not 1536` when
/// casting into the column and `different vector dimensions 384 and 1536`
/// when comparing against stored vectors.
fn dimension_err(err: &DbErr) -> Option<EmbeddingError> {
    let msg = err.to_string();
    let widths = |marker: &str, separator: &str| -> Option<(usize, usize)> {
        let rest = &msg[msg.find(marker)? + marker.len()..];
        let (expected, actual) = rest.split_once(separator)?;
        let actual: String = actual.chars().take_while(char::is_ascii_digit).collect();
        Some((expected.trim().parse().ok()?, actual.parse().ok()?))
    };

    let (expected, actual) = widths("expected ", " dimensions, not ")
        .or_else(|| widths("different vector dimensions ", " and "))?;
    Some(EmbeddingError::DimensionMismatch { expected, actual })
}

fn read_err(err: DbErr) -> EmbeddingError {
    dimension_err(&err).unwrap_or_else(|| err.into())
}

/// Constraint violations and width mismatches are the caller's fault;
/// everything else is ours.
fn write_err(err: DbErr, what: &str) -> EmbeddingError {
    if let Some(mismatch) = dimension_err(&err) {
        return mismatch;
    }
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            EmbeddingError::Validation(format!("{} already exists", what))
        }
        Some(SqlErr::ForeignKeyConstraintViolation(_)) => {
            EmbeddingError::Validation(format!("{} references a missing conversation", what))
        }
        _ => err.into(),
    }
}

fn stmt(sql: &str, values: Vec<sea_orm::Value>) -> Statement {
    Statement::from_sql_and_values(DbBackend::Postgres, sql, values)
}

#[async_trait]
impl EmbeddingRepository for PgEmbeddingRepository {
    async fn create_conversation(&self, input: NewConversation) -> EmbeddingResult<Conversation> {
        let sql = r#"
            INSERT INTO conversations (id, "userId", title, "isGuest")
            VALUES ($1, $2, $3, $4)
            RETURNING id, "userId" AS user_id, title, "isGuest" AS is_guest,
                      "createdAt" AS created_at, "updatedAt" AS updated_at
        "#;
        let what = format!("Conversation {}", input.id);

        let row = ConversationRow::find_by_statement(stmt(
            sql,
            vec![
                input.id.into(),
                input.user_id.into(),
                input.title.into(),
                input.is_guest.into(),
            ],
        ))
        .one(&self.db)
        .await
        .map_err(|e| write_err(e, &what))?
        .ok_or_else(|| EmbeddingError::Internal("Failed to insert conversation".to_string()))?;

        tracing::info!(conversation_id = %row.id, "Created conversation");
        Ok(row.into())
    }

    async fn insert_message(
        &self,
        input: NewMessage,
        embedding: Option<Vec<f32>>,
    ) -> EmbeddingResult<Message> {
        let sql = r#"
            INSERT INTO messages AS m (id, "conversationId", role, content, citations,
                                       "searchResults", model, "contentEmbedding")
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8::vector)
            RETURNING m.id, m."conversationId" AS conversation_id, m.role, m.content,
                      m.citations, m."searchResults" AS search_results, m.model,
                      m."createdAt" AS created_at
        "#;
        let what = format!("Message {}", input.id);
        let conversation_id = input.conversation_id.clone();

        let txn = self.db.begin().await?;

        let row = MessageRow::find_by_statement(stmt(
            sql,
            vec![
                input.id.into(),
                input.conversation_id.into(),
                input.role.into(),
                input.content.into(),
                input.citations.into(),
                input.search_results.into(),
                input.model.into(),
                embedding.as_deref().map(vector_to_literal).into(),
            ],
        ))
        .one(&txn)
        .await
        .map_err(|e| write_err(e, &what))?
        .ok_or_else(|| EmbeddingError::Internal("Failed to insert message".to_string()))?;

        txn.execute_raw(stmt(
            r#"UPDATE conversations SET "updatedAt" = now() WHERE id = $1"#,
            vec![conversation_id.into()],
        ))
        .await?;

        txn.commit().await?;

        tracing::debug!(message_id = %row.id, embedded = embedding.is_some(), "Inserted message");
        Ok(row.into())
    }

    async fn insert_memory(
        &self,
        input: NewPatientMemory,
        embedding: Option<Vec<f32>>,
    ) -> EmbeddingResult<PatientMemory> {
        let sql = format!(
            r#"
            INSERT INTO "patientMemory" AS pm (id, "userId", "entityType", "entityName",
                                               relationships, metadata, "conversationId",
                                               "contentEmbedding")
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8::vector)
            RETURNING {MEMORY_COLUMNS}
        "#
        );
        let what = format!("Patient memory {}", input.id);

        let row = MemoryRow::find_by_statement(stmt(
            &sql,
            vec![
                input.id.into(),
                input.user_id.into(),
                input.entity_type.into(),
                input.entity_name.into(),
                input.relationships.into(),
                input.metadata.into(),
                input.conversation_id.into(),
                embedding.as_deref().map(vector_to_literal).into(),
            ],
        ))
        .one(&self.db)
        .await
        .map_err(|e| write_err(e, &what))?
        .ok_or_else(|| EmbeddingError::Internal("Failed to insert patient memory".to_string()))?;

        tracing::debug!(memory_id = %row.id, embedded = embedding.is_some(), "Inserted patient memory");
        Ok(row.into())
    }

    async fn search_messages(
        &self,
        query: &[f32],
        filter: MessageSearch,
    ) -> EmbeddingResult<Vec<MessageMatch>> {
        let sql = r#"
            SELECT id, "conversationId" AS conversation_id, role, content, citations,
                   "searchResults" AS search_results, model, "createdAt" AS created_at,
                   similarity
            FROM search_similar_messages($1::vector, $2, $3, $4, $5)
        "#;

        let rows = MessageMatchRow::find_by_statement(stmt(
            sql,
            vec![
                vector_to_literal(query).into(),
                filter.conversation_id.into(),
                filter.threshold.into(),
                (filter.limit as i32).into(),
                filter.owner_id.into(),
            ],
        ))
        .all(&self.db)
        .await
        .map_err(read_err)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn search_memories(
        &self,
        query: &[f32],
        filter: MemorySearch,
    ) -> EmbeddingResult<Vec<MemoryMatch>> {
        let sql = r#"
            SELECT id, "userId" AS user_id, "entityType" AS entity_type,
                   "entityName" AS entity_name, relationships, metadata,
                   "conversationId" AS conversation_id, similarity
            FROM search_similar_patient_memories($1::vector, $2, $3, $4)
        "#;

        let rows = MemoryMatchRow::find_by_statement(stmt(
            sql,
            vec![
                vector_to_literal(query).into(),
                filter.owner_id.into(),
                filter.threshold.into(),
                (filter.limit as i32).into(),
            ],
        ))
        .all(&self.db)
        .await
        .map_err(read_err)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn pending_messages(
        &self,
        scope: &BackfillScope,
        after: Option<String>,
        limit: u64,
    ) -> EmbeddingResult<Vec<Message>> {
        let sql = format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages m
            JOIN conversations c ON c.id = m."conversationId"
            WHERE m."contentEmbedding" IS NULL
              AND ($1::text IS NULL OR m."conversationId" = $1)
              AND ($2::text IS NULL OR c."userId" = $2)
              AND ($3::text IS NULL OR m.id > $3)
            ORDER BY m.id
            LIMIT $4
        "#
        );

        let rows = MessageRow::find_by_statement(stmt(
            &sql,
            vec![
                scope.conversation_id.clone().into(),
                scope.user_id.clone().into(),
                after.into(),
                (limit.min(i64::MAX as u64) as i64).into(),
            ],
        ))
        .all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn pending_memories(
        &self,
        scope: &BackfillScope,
        after: Option<String>,
        limit: u64,
    ) -> EmbeddingResult<Vec<PatientMemory>> {
        let sql = format!(
            r#"
            SELECT {MEMORY_COLUMNS}
            FROM "patientMemory" pm
            WHERE pm."contentEmbedding" IS NULL
              AND ($1::text IS NULL OR pm."userId" = $1)
              AND ($2::text IS NULL OR pm.id > $2)
            ORDER BY pm.id
            LIMIT $3
        "#
        );

        let rows = MemoryRow::find_by_statement(stmt(
            &sql,
            vec![
                scope.user_id.clone().into(),
                after.into(),
                (limit.min(i64::MAX as u64) as i64).into(),
            ],
        ))
        .all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count_pending(&self, table: EmbeddingTable, scope: &BackfillScope) -> EmbeddingResult<u64> {
        let statement = match table {
            EmbeddingTable::Messages => stmt(
                r#"
                SELECT COUNT(*) AS count
                FROM messages m
                JOIN conversations c ON c.id = m."conversationId"
                WHERE m."contentEmbedding" IS NULL
                  AND ($1::text IS NULL OR m."conversationId" = $1)
                  AND ($2::text IS NULL OR c."userId" = $2)
                "#,
                vec![scope.conversation_id.clone().into(), scope.user_id.clone().into()],
            ),
            EmbeddingTable::PatientMemory => stmt(
                r#"
                SELECT COUNT(*) AS count
                FROM "patientMemory" pm
                WHERE pm."contentEmbedding" IS NULL
                  AND ($1::text IS NULL OR pm."userId" = $1)
                "#,
                vec![scope.user_id.clone().into()],
            ),
        };

        let count = CountRow::find_by_statement(statement)
            .one(&self.db)
            .await?
            .map(|row| row.count)
            .unwrap_or_default();

        Ok(count.max(0) as u64)
    }

    async fn store_embedding(
        &self,
        table: EmbeddingTable,
        id: &str,
        embedding: &[f32],
    ) -> EmbeddingResult<bool> {
        let sql = format!(
            r#"UPDATE "{table}" SET "{EMBEDDING_COLUMN}" = $1::vector WHERE id = $2 AND "{EMBEDDING_COLUMN}" IS NULL"#,
            table = table.table_name(),
        );

        let result = self
            .db
            .execute_raw(stmt(&sql, vec![vector_to_literal(embedding).into(), id.into()]))
            .await
            .map_err(read_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_embedding(&self, table: EmbeddingTable, id: &str) -> EmbeddingResult<Option<Vec<f32>>> {
        let sql = format!(
            r#"SELECT "{EMBEDDING_COLUMN}"::text AS embedding FROM "{table}" WHERE id = $1"#,
            table = table.table_name(),
        );

        let row = EmbeddingRow::find_by_statement(stmt(&sql, vec![id.into()]))
            .one(&self.db)
            .await?;

        row.and_then(|r| r.embedding)
            .map(|literal| parse_vector_literal(&literal))
            .transpose()
    }

    async fn embedding_stats(&self) -> EmbeddingResult<EmbeddingStats> {
        let rows = StatsRow::find_by_statement(stmt(
            "SELECT table_name, total_rows, embedded_rows, embedding_percentage FROM get_embedding_stats()",
            vec![],
        ))
        .all(&self.db)
        .await?;

        let mut stats = EmbeddingStats::default();
        for row in rows {
            let coverage = TableCoverage {
                total_rows: row.total_rows,
                embedded_rows: row.embedded_rows,
                embedding_percentage: row.embedding_percentage,
            };
            match row.table_name.parse::<EmbeddingTable>() {
                Ok(EmbeddingTable::Messages) => stats.messages = coverage,
                Ok(EmbeddingTable::PatientMemory) => stats.patient_memory = coverage,
                Err(_) => tracing::warn!(table = %row.table_name, "Ignoring unknown table in embedding stats"),
            }
        }

        Ok(stats)
    }

    async fn embedding_dimension(&self, table: EmbeddingTable) -> EmbeddingResult<Option<usize>> {
        // pgvector stores the declared width as the type modifier; -1 means unconstrained.
        let sql = r#"
            SELECT a.atttypmod AS dimension
            FROM pg_attribute a
            WHERE a.attrelid = to_regclass($1)
              AND a.attname = $2
              AND NOT a.attisdropped
        "#;

        let row = DimensionRow::find_by_statement(stmt(
            sql,
            vec![
                format!(r#""{}""#, table.table_name()).into(),
                EMBEDDING_COLUMN.into(),
            ],
        ))
        .one(&self.db)
        .await?;

        Ok(row
            .filter(|r| r.dimension > 0)
            .map(|r| r.dimension as usize))
    }

    async fn resize_embedding_column(&self, dimension: usize, lists: u32) -> EmbeddingResult<()> {
        let dimension = u32::try_from(dimension)
            .map_err(|_| EmbeddingError::Validation(format!("Invalid dimension {}", dimension)))?;
        let schema = EmbeddingSchema::new(dimension)
            .map_err(|e| EmbeddingError::Validation(e.to_string()))?
            .with_lists(lists);

        schema.resize(&self.db).await?;

        tracing::warn!(dimension, lists, "Resized embedding columns; all vectors cleared");
        Ok(())
    }
}
