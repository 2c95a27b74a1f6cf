//! DDL for the `"contentEmbedding"` vector columns.
//!
//! The column width, the IVFFlat indexes and the three search/stat functions
//! all depend on the embedding dimension, so they are generated together
//! from an [`EmbeddingSchema`]. The initial migration installs them at
//! [`DEFAULT_DIMENSION`]; [`EmbeddingSchema::resize`] swaps them atomically.

use sea_orm::{ConnectionTrait, DbErr, TransactionSession, TransactionTrait};

pub const MESSAGES_TABLE: &str = "messages";
pub const PATIENT_MEMORY_TABLE: &str = "patientMemory";
pub const EMBEDDING_COLUMN: &str = "contentEmbedding";

/// Width installed by the initial migration (all-MiniLM-L6-v2).
pub const DEFAULT_DIMENSION: u32 = 384;
/// IVFFlat lists for tables below 10k rows.
pub const DEFAULT_LISTS: u32 = 100;
/// Lists scanned before iterative scanning widens the search.
pub const DEFAULT_SCANNED_LISTS: u32 = 10;
/// pgvector refuses to index wider vectors with IVFFlat.
pub const MAX_INDEXED_DIMENSION: u32 = 2000;

/// IVFFlat `lists` for a table of `rows` rows: 100 below 10k rows,
/// `rows / 1000` up to 1M rows, `sqrt(rows)` beyond.
pub fn recommended_lists(rows: u64) -> u32 {
    if rows < 10_000 {
        DEFAULT_LISTS
    } else if rows <= 1_000_000 {
        ((rows / 1000) as u32).max(DEFAULT_LISTS)
    } else {
        (rows as f64).sqrt() as u32
    }
}

/// Parameters of the embedding DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingSchema {
    dimension: u32,
    lists: u32,
    scanned_lists: u32,
}

impl EmbeddingSchema {
    /// Fails for dimensions pgvector cannot index.
    pub fn new(dimension: u32) -> Result<Self, DbErr> {
        if dimension == 0 || dimension > MAX_INDEXED_DIMENSION {
            return Err(DbErr::Custom(format!(
                "embedding dimension must be between 1 and {}, got {}",
                MAX_INDEXED_DIMENSION, dimension
            )));
        }

        Ok(Self {
            dimension,
            lists: DEFAULT_LISTS,
            scanned_lists: DEFAULT_SCANNED_LISTS,
        })
    }

    pub fn with_lists(mut self, lists: u32) -> Self {
        self.lists = lists.max(1);
        self.scanned_lists = self.scanned_lists.min(self.lists);
        self
    }

    pub fn dimension(&self) -> u32 {
        self.dimension
    }

    pub fn lists(&self) -> u32 {
        self.lists
    }

    /// Adds the columns, indexes and functions. Expects none of them to exist.
    pub fn install_statements(&self) -> Vec<String> {
        let d = self.dimension;
        let mut statements = Vec::with_capacity(7);

        for table in [MESSAGES_TABLE, PATIENT_MEMORY_TABLE] {
            statements.push(format!(
                r#"ALTER TABLE "{table}" ADD COLUMN "{EMBEDDING_COLUMN}" vector({d}) NULL"#
            ));
        }
        for table in [MESSAGES_TABLE, PATIENT_MEMORY_TABLE] {
            statements.push(format!(
                r#"CREATE INDEX "{index}" ON "{table}" USING ivfflat ("{EMBEDDING_COLUMN}" vector_cosine_ops) WITH (lists = {lists})"#,
                index = index_name(table),
                lists = self.lists,
            ));
        }

        statements.push(self.search_messages_function());
        statements.push(self.search_memories_function());
        statements.push(stats_function());
        statements
    }

    /// Removes everything [`Self::install_statements`] creates, tolerating absence.
    pub fn drop_statements() -> Vec<String> {
        let mut statements = vec![
            "DROP FUNCTION IF EXISTS search_similar_messages(vector, text, double precision, integer, text)".to_string(),
            "DROP FUNCTION IF EXISTS search_similar_patient_memories(vector, text, double precision, integer)".to_string(),
            "DROP FUNCTION IF EXISTS get_embedding_stats()".to_string(),
        ];

        for table in [MESSAGES_TABLE, PATIENT_MEMORY_TABLE] {
            statements.push(format!(r#"DROP INDEX IF EXISTS "{}""#, index_name(table)));
        }
        for table in [MESSAGES_TABLE, PATIENT_MEMORY_TABLE] {
            statements.push(format!(
                r#"ALTER TABLE "{table}" DROP COLUMN IF EXISTS "{EMBEDDING_COLUMN}""#
            ));
        }

        statements
    }

    /// Lock both tables, drop, reinstall. Every stored vector is discarded.
    pub fn resize_statements(&self) -> Vec<String> {
        let mut statements = vec![format!(
            r#"LOCK TABLE "{MESSAGES_TABLE}", "{PATIENT_MEMORY_TABLE}" IN ACCESS EXCLUSIVE MODE"#
        )];
        statements.extend(Self::drop_statements());
        statements.extend(self.install_statements());
        statements
    }

    /// Runs [`Self::resize_statements`] in one transaction.
    ///
    /// Concurrent readers and writers block until commit and then see only
    /// the new width with every vector NULL.
    pub async fn resize<C>(&self, db: &C) -> Result<(), DbErr>
    where
        C: TransactionTrait,
    {
        let txn = db.begin().await?;
        for sql in self.resize_statements() {
            txn.execute_unprepared(&sql).await?;
        }
        txn.commit().await
    }

    fn search_messages_function(&self) -> String {
        format!(
            r#"
CREATE OR REPLACE FUNCTION search_similar_messages(
    query_embedding vector({d}),
    filter_conversation_id text DEFAULT NULL,
    match_threshold double precision DEFAULT 0.7,
    match_count integer DEFAULT 10,
    filter_user_id text DEFAULT NULL
)
RETURNS TABLE (
    id text,
    "conversationId" text,
    role text,
    content text,
    citations jsonb,
    "searchResults" jsonb,
    model text,
    "createdAt" timestamptz,
    similarity double precision
)
LANGUAGE sql STABLE
SET ivfflat.probes = {scanned_lists}
SET ivfflat.iterative_scan = 'relaxed_order'
AS $$
    WITH candidates AS MATERIALIZED (
        SELECT m.id, m."conversationId", m.role, m.content, m.citations,
               m."searchResults", m.model, m."createdAt",
               m."contentEmbedding" <=> query_embedding AS distance
        FROM messages m
        JOIN conversations c ON c.id = m."conversationId"
        WHERE m."contentEmbedding" IS NOT NULL
          AND (filter_conversation_id IS NULL OR m."conversationId" = filter_conversation_id)
          AND (filter_user_id IS NULL OR c."userId" = filter_user_id)
          AND 1 - (m."contentEmbedding" <=> query_embedding) > match_threshold
        ORDER BY distance
        LIMIT match_count
    )
    SELECT id::text, "conversationId"::text, role::text, content, citations,
           "searchResults", model::text, "createdAt",
           (1 - distance)::double precision AS similarity
    FROM candidates
    ORDER BY distance, id
$$"#,
            d = self.dimension,
            scanned_lists = self.scanned_lists,
        )
    }

    fn search_memories_function(&self) -> String {
        format!(
            r#"
CREATE OR REPLACE FUNCTION search_similar_patient_memories(
    query_embedding vector({d}),
    filter_user_id text,
    match_threshold double precision DEFAULT 0.7,
    match_count integer DEFAULT 5
)
RETURNS TABLE (
    id text,
    "userId" text,
    "entityType" text,
    "entityName" text,
    relationships jsonb,
    metadata jsonb,
    "conversationId" text,
    similarity double precision
)
LANGUAGE sql STABLE
SET ivfflat.probes = {scanned_lists}
SET ivfflat.iterative_scan = 'relaxed_order'
AS $$
    WITH candidates AS MATERIALIZED (
        SELECT pm.id, pm."userId", pm."entityType", pm."entityName",
               pm.relationships, pm.metadata, pm."conversationId",
               pm."contentEmbedding" <=> query_embedding AS distance
        FROM "patientMemory" pm
        WHERE pm."userId" = filter_user_id
          AND pm."contentEmbedding" IS NOT NULL
          AND 1 - (pm."contentEmbedding" <=> query_embedding) > match_threshold
        ORDER BY distance
        LIMIT match_count
    )
    SELECT id::text, "userId"::text, "entityType"::text, "entityName",
           relationships, metadata, "conversationId"::text,
           (1 - distance)::double precision AS similarity
    FROM candidates
    ORDER BY distance, id
$$"#,
            d = self.dimension,
            scanned_lists = self.scanned_lists,
        )
    }
}

fn index_name(table: &str) -> &'static str {
    if table == MESSAGES_TABLE {
        "messages_content_embedding_idx"
    } else {
        "patient_memory_content_embedding_idx"
    }
}

fn stats_function() -> String {
    r#"
CREATE OR REPLACE FUNCTION get_embedding_stats()
RETURNS TABLE (
    table_name text,
    total_rows bigint,
    embedded_rows bigint,
    embedding_percentage double precision
)
LANGUAGE sql STABLE
AS $$
    SELECT 'messages'::text,
           COUNT(*),
           COUNT("contentEmbedding"),
           CASE WHEN COUNT(*) = 0 THEN 0::double precision
                ELSE ROUND(COUNT("contentEmbedding")::numeric * 100 / COUNT(*), 2)::double precision
           END
    FROM messages
    UNION ALL
    SELECT 'patientMemory'::text,
           COUNT(*),
           COUNT("contentEmbedding"),
           CASE WHEN COUNT(*) = 0 THEN 0::double precision
                ELSE ROUND(COUNT("contentEmbedding")::numeric * 100 / COUNT(*), 2)::double precision
           END
    FROM "patientMemory"
$$"#
    .to_string()
}
