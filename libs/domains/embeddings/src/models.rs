use chrono::{DateTime, Utc};
use migration::embedding_schema::{MESSAGES_TABLE, PATIENT_MEMORY_TABLE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Tables carrying a `"contentEmbedding"` column.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize, ToSchema,
)]
pub enum EmbeddingTable {
    #[strum(serialize = "messages")]
    #[serde(rename = "messages")]
    Messages,
    #[strum(serialize = "patientMemory")]
    #[serde(rename = "patientMemory")]
    PatientMemory,
}

impl EmbeddingTable {
    pub const ALL: [EmbeddingTable; 2] = [EmbeddingTable::Messages, EmbeddingTable::PatientMemory];

    pub fn table_name(&self) -> &'static str {
        match self {
            EmbeddingTable::Messages => MESSAGES_TABLE,
            EmbeddingTable::PatientMemory => PATIENT_MEMORY_TABLE,
        }
    }
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewConversation {
    pub id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub is_guest: bool,
}

impl NewConversation {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.into(),
            title: None,
            is_guest: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub is_guest: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub citations: Option<Value>,
    pub search_results: Option<Value>,
    pub model: Option<String>,
}

impl NewMessage {
    pub fn new(
        conversation_id: impl Into<String>,
        role: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            conversation_id: conversation_id.into(),
            role: role.into(),
            content: content.into(),
            citations: None,
            search_results: None,
            model: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_search_results(mut self, search_results: Value) -> Self {
        self.search_results = Some(search_results);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub citations: Option<Value>,
    pub search_results: Option<Value>,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewPatientMemory {
    pub id: String,
    pub user_id: String,
    pub entity_type: String,
    pub entity_name: String,
    pub relationships: Option<Value>,
    pub metadata: Option<Value>,
    pub conversation_id: Option<String>,
}

impl NewPatientMemory {
    pub fn new(
        user_id: impl Into<String>,
        entity_type: impl Into<String>,
        entity_name: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.into(),
            entity_type: entity_type.into(),
            entity_name: entity_name.into(),
            relationships: None,
            metadata: None,
            conversation_id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_relationships(mut self, relationships: Value) -> Self {
        self.relationships = Some(relationships);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatientMemory {
    pub id: String,
    pub user_id: String,
    pub entity_type: String,
    pub entity_name: String,
    pub relationships: Option<Value>,
    pub metadata: Option<Value>,
    pub conversation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Similarity search
// ============================================================================

pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.7;
pub const DEFAULT_MESSAGE_MATCH_COUNT: u32 = 10;
pub const DEFAULT_MEMORY_MATCH_COUNT: u32 = 5;

/// Filters for [`search_messages`](crate::EmbeddingRepository::search_messages).
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSearch {
    pub conversation_id: Option<String>,
    /// Restricts results to conversations owned by this user.
    pub owner_id: Option<String>,
    pub threshold: f64,
    pub limit: u32,
}

impl Default for MessageSearch {
    fn default() -> Self {
        Self {
            conversation_id: None,
            owner_id: None,
            threshold: DEFAULT_MATCH_THRESHOLD,
            limit: DEFAULT_MESSAGE_MATCH_COUNT,
        }
    }
}

/// Filters for [`search_memories`](crate::EmbeddingRepository::search_memories).
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySearch {
    pub owner_id: String,
    pub threshold: f64,
    pub limit: u32,
}

impl MemorySearch {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            threshold: DEFAULT_MATCH_THRESHOLD,
            limit: DEFAULT_MEMORY_MATCH_COUNT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageMatch {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub citations: Option<Value>,
    pub search_results: Option<Value>,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
    /// `1 - cosine_distance`, strictly above the requested threshold.
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMatch {
    pub id: String,
    pub user_id: String,
    pub entity_type: String,
    pub entity_name: String,
    pub relationships: Option<Value>,
    pub metadata: Option<Value>,
    pub conversation_id: Option<String>,
    pub similarity: f64,
}

// ============================================================================
// Coverage
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TableCoverage {
    pub total_rows: i64,
    pub embedded_rows: i64,
    /// Rounded to two decimals; 0 for an empty table.
    pub embedding_percentage: f64,
}

impl TableCoverage {
    pub fn new(total_rows: i64, embedded_rows: i64) -> Self {
        let embedding_percentage = if total_rows == 0 {
            0.0
        } else {
            (embedded_rows as f64 * 10_000.0 / total_rows as f64).round() / 100.0
        };

        Self {
            total_rows,
            embedded_rows,
            embedding_percentage,
        }
    }

    pub fn pending_rows(&self) -> i64 {
        self.total_rows - self.embedded_rows
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingStats {
    pub messages: TableCoverage,
    pub patient_memory: TableCoverage,
}

impl EmbeddingStats {
    pub fn table(&self, table: EmbeddingTable) -> TableCoverage {
        match table {
            EmbeddingTable::Messages => self.messages,
            EmbeddingTable::PatientMemory => self.patient_memory,
        }
    }
}

// ============================================================================
// Backfill
// ============================================================================

pub const DEFAULT_BATCH_SIZE: u64 = 100;
pub const DEFAULT_BACKFILL_DELAY: Duration = Duration::from_millis(500);

/// Narrows which rows a backfill selects.
///
/// For messages both filters apply (the user through the owning
/// conversation); for memories only `user_id` does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillScope {
    pub conversation_id: Option<String>,
    pub user_id: Option<String>,
}

impl BackfillScope {
    pub fn conversation(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: Some(conversation_id.into()),
            user_id: None,
        }
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            conversation_id: None,
            user_id: Some(user_id.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillOptions {
    pub batch_size: u64,
    /// Pause between batches.
    pub delay: Duration,
    /// Stop after this many batches even if rows remain.
    pub max_batches: Option<u64>,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            delay: DEFAULT_BACKFILL_DELAY,
            max_batches: None,
        }
    }
}

/// Result of one backfill batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Rows selected with a NULL vector.
    pub selected: usize,
    /// Rows whose vector was written.
    pub updated: u64,
    /// Rows skipped after a render, embed or write failure.
    pub failed: usize,
    /// Highest id selected; the cursor for the next batch.
    pub last_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillReport {
    pub table: EmbeddingTable,
    pub batches: u64,
    pub updated: u64,
    pub failed: u64,
    pub elapsed: Duration,
}

/// Snapshot reported after each committed backfill batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillProgress {
    pub table: EmbeddingTable,
    pub batch: u64,
    /// Batches needed for the rows pending at start.
    pub total_batches: u64,
    pub updated: u64,
    pub failed: u64,
    /// Rows pending when the run started.
    pub total_pending: u64,
    pub elapsed: Duration,
    pub estimated_remaining: Duration,
}

impl BackfillProgress {
    pub fn processed(&self) -> u64 {
        self.updated + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coverage_percentage_rounding() {
        assert_eq!(TableCoverage::new(3, 2).embedding_percentage, 66.67);
        assert_eq!(TableCoverage::new(3, 3).embedding_percentage, 100.0);
        assert_eq!(TableCoverage::new(7, 1).embedding_percentage, 14.29);
    }

    #[test]
    fn test_empty_table_coverage_is_zero() {
        let coverage = TableCoverage::new(0, 0);
        assert_eq!(coverage, TableCoverage::default());
        assert_eq!(coverage.pending_rows(), 0);
    }

    #[test]
    fn test_stats_serialize_with_table_names() {
        let stats = EmbeddingStats {
            messages: TableCoverage::new(3, 2),
            patient_memory: TableCoverage::new(0, 0),
        };
        let json = serde_json::to_value(stats).unwrap();

        assert_eq!(json["messages"]["totalRows"], 3);
        assert_eq!(json["messages"]["embeddedRows"], 2);
        assert_eq!(json["patientMemory"]["embeddingPercentage"], 0.0);
    }

    #[test]
    fn test_table_names() {
        assert_eq!(EmbeddingTable::Messages.table_name(), "messages");
        assert_eq!(EmbeddingTable::PatientMemory.to_string(), "patientMemory");
        assert_eq!("patientMemory".parse::<EmbeddingTable>().unwrap(), EmbeddingTable::PatientMemory);
    }

    #[test]
    fn test_new_records_get_distinct_ids() {
        let a = NewMessage::new("c1", "user", "hello");
        let b = NewMessage::new("c1", "user", "hello");
        assert_ne!(a.id, b.id);
        assert_eq!(NewConversation::new("u1").with_id("c1").id, "c1");
    }
}
