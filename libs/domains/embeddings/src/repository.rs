use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{EmbeddingError, EmbeddingResult};
use crate::models::{
    BackfillScope, Conversation, EmbeddingStats, EmbeddingTable, MemoryMatch, MemorySearch,
    Message, MessageMatch, MessageSearch, NewConversation, NewMessage, NewPatientMemory,
    PatientMemory, TableCoverage,
};
use crate::similarity::cosine_similarity;

/// Repository trait for the vector store
///
/// Embeddings are written only into NULL columns; a row that already has a
/// vector is never overwritten except by [`resize_embedding_column`], which
/// clears every vector.
///
/// [`resize_embedding_column`]: EmbeddingRepository::resize_embedding_column
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingRepository: Send + Sync {
    async fn create_conversation(&self, input: NewConversation) -> EmbeddingResult<Conversation>;

    /// Insert a message, with its vector if one was generated, and touch the
    /// owning conversation's `updatedAt`.
    async fn insert_message(
        &self,
        input: NewMessage,
        embedding: Option<Vec<f32>>,
    ) -> EmbeddingResult<Message>;

    async fn insert_memory(
        &self,
        input: NewPatientMemory,
        embedding: Option<Vec<f32>>,
    ) -> EmbeddingResult<PatientMemory>;

    /// Messages with similarity strictly above the threshold, best first.
    async fn search_messages(
        &self,
        query: &[f32],
        filter: MessageSearch,
    ) -> EmbeddingResult<Vec<MessageMatch>>;

    /// The owner's memories with similarity strictly above the threshold, best first.
    async fn search_memories(
        &self,
        query: &[f32],
        filter: MemorySearch,
    ) -> EmbeddingResult<Vec<MemoryMatch>>;

    /// Messages without a vector, ordered by id, starting after `after`.
    async fn pending_messages(
        &self,
        scope: &BackfillScope,
        after: Option<String>,
        limit: u64,
    ) -> EmbeddingResult<Vec<Message>>;

    /// Memories without a vector, ordered by id, starting after `after`.
    async fn pending_memories(
        &self,
        scope: &BackfillScope,
        after: Option<String>,
        limit: u64,
    ) -> EmbeddingResult<Vec<PatientMemory>>;

    /// Rows in `table` within `scope` that still lack a vector.
    async fn count_pending(&self, table: EmbeddingTable, scope: &BackfillScope) -> EmbeddingResult<u64>;

    /// Write a vector into a NULL column. Returns false when the row is
    /// gone or was embedded concurrently.
    async fn store_embedding(
        &self,
        table: EmbeddingTable,
        id: &str,
        embedding: &[f32],
    ) -> EmbeddingResult<bool>;

    async fn get_embedding(&self, table: EmbeddingTable, id: &str) -> EmbeddingResult<Option<Vec<f32>>>;

    async fn embedding_stats(&self) -> EmbeddingResult<EmbeddingStats>;

    /// Declared width of the vector column, `None` when the column is missing.
    async fn embedding_dimension(&self, table: EmbeddingTable) -> EmbeddingResult<Option<usize>>;

    /// Atomically recreate both vector columns, their indexes and the search
    /// functions at `dimension`. Every stored vector is discarded.
    async fn resize_embedding_column(&self, dimension: usize, lists: u32) -> EmbeddingResult<()>;
}

#[derive(Debug, Clone)]
struct StoredMessage {
    message: Message,
    embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone)]
struct StoredMemory {
    memory: PatientMemory,
    embedding: Option<Vec<f32>>,
}

#[derive(Debug, Default)]
struct Store {
    conversations: BTreeMap<String, Conversation>,
    messages: BTreeMap<String, StoredMessage>,
    memories: BTreeMap<String, StoredMemory>,
}

/// In-memory implementation of EmbeddingRepository (for development/testing)
///
/// Mirrors the database semantics: fixed column width, writes only into NULL
/// vectors, strict threshold, ties broken by id.
#[derive(Debug, Clone)]
pub struct InMemoryEmbeddingRepository {
    store: Arc<RwLock<Store>>,
    dimension: Arc<RwLock<usize>>,
}

impl InMemoryEmbeddingRepository {
    pub fn new(dimension: usize) -> Self {
        Self {
            store: Arc::new(RwLock::new(Store::default())),
            dimension: Arc::new(RwLock::new(dimension)),
        }
    }

    async fn check_width(&self, embedding: &[f32]) -> EmbeddingResult<()> {
        let dimension = *self.dimension.read().await;
        if embedding.len() != dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: embedding.len(),
            });
        }
        Ok(())
    }
}

fn by_similarity_then_id(a: (f64, &str), b: (f64, &str)) -> Ordering {
    b.0.partial_cmp(&a.0)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.1.cmp(b.1))
}

fn after_cursor(id: &str, after: &Option<String>) -> bool {
    after.as_deref().is_none_or(|cursor| id > cursor)
}

#[async_trait]
impl EmbeddingRepository for InMemoryEmbeddingRepository {
    async fn create_conversation(&self, input: NewConversation) -> EmbeddingResult<Conversation> {
        let mut store = self.store.write().await;
        if store.conversations.contains_key(&input.id) {
            return Err(EmbeddingError::Validation(format!(
                "Conversation {} already exists",
                input.id
            )));
        }

        let now = Utc::now();
        let conversation = Conversation {
            id: input.id,
            user_id: input.user_id,
            title: input.title,
            is_guest: input.is_guest,
            created_at: now,
            updated_at: now,
        };
        store
            .conversations
            .insert(conversation.id.clone(), conversation.clone());

        tracing::info!(conversation_id = %conversation.id, "Created conversation");
        Ok(conversation)
    }

    async fn insert_message(
        &self,
        input: NewMessage,
        embedding: Option<Vec<f32>>,
    ) -> EmbeddingResult<Message> {
        if let Some(embedding) = &embedding {
            self.check_width(embedding).await?;
        }

        let mut store = self.store.write().await;
        let now = Utc::now();
        let conversation = store
            .conversations
            .get_mut(&input.conversation_id)
            .ok_or_else(|| {
                EmbeddingError::Validation(format!(
                    "Conversation {} does not exist",
                    input.conversation_id
                ))
            })?;
        conversation.updated_at = now;

        let message = Message {
            id: input.id,
            conversation_id: input.conversation_id,
            role: input.role,
            content: input.content,
            citations: input.citations,
            search_results: input.search_results,
            model: input.model,
            created_at: now,
        };
        store.messages.insert(
            message.id.clone(),
            StoredMessage {
                message: message.clone(),
                embedding,
            },
        );

        Ok(message)
    }

    async fn insert_memory(
        &self,
        input: NewPatientMemory,
        embedding: Option<Vec<f32>>,
    ) -> EmbeddingResult<PatientMemory> {
        if let Some(embedding) = &embedding {
            self.check_width(embedding).await?;
        }

        let mut store = self.store.write().await;
        let now = Utc::now();
        let memory = PatientMemory {
            id: input.id,
            user_id: input.user_id,
            entity_type: input.entity_type,
            entity_name: input.entity_name,
            relationships: input.relationships,
            metadata: input.metadata,
            conversation_id: input.conversation_id,
            created_at: now,
            updated_at: now,
        };
        store.memories.insert(
            memory.id.clone(),
            StoredMemory {
                memory: memory.clone(),
                embedding,
            },
        );

        Ok(memory)
    }

    async fn search_messages(
        &self,
        query: &[f32],
        filter: MessageSearch,
    ) -> EmbeddingResult<Vec<MessageMatch>> {
        self.check_width(query).await?;
        let store = self.store.read().await;

        let mut matches = Vec::new();
        for stored in store.messages.values() {
            let Some(embedding) = &stored.embedding else {
                continue;
            };
            let message = &stored.message;
            if filter
                .conversation_id
                .as_ref()
                .is_some_and(|id| *id != message.conversation_id)
            {
                continue;
            }
            if let Some(owner_id) = &filter.owner_id {
                let owned = store
                    .conversations
                    .get(&message.conversation_id)
                    .is_some_and(|c| c.user_id == *owner_id);
                if !owned {
                    continue;
                }
            }

            let similarity = cosine_similarity(embedding, query)?;
            if similarity > filter.threshold {
                matches.push(MessageMatch {
                    id: message.id.clone(),
                    conversation_id: message.conversation_id.clone(),
                    role: message.role.clone(),
                    content: message.content.clone(),
                    citations: message.citations.clone(),
                    search_results: message.search_results.clone(),
                    model: message.model.clone(),
                    created_at: message.created_at,
                    similarity,
                });
            }
        }

        matches.sort_by(|a, b| by_similarity_then_id((a.similarity, a.id.as_str()), (b.similarity, b.id.as_str())));
        matches.truncate(filter.limit as usize);
        Ok(matches)
    }

    async fn search_memories(
        &self,
        query: &[f32],
        filter: MemorySearch,
    ) -> EmbeddingResult<Vec<MemoryMatch>> {
        self.check_width(query).await?;
        let store = self.store.read().await;

        let mut matches = Vec::new();
        for stored in store.memories.values() {
            let memory = &stored.memory;
            let Some(embedding) = &stored.embedding else {
                continue;
            };
            if memory.user_id != filter.owner_id {
                continue;
            }

            let similarity = cosine_similarity(embedding, query)?;
            if similarity > filter.threshold {
                matches.push(MemoryMatch {
                    id: memory.id.clone(),
                    user_id: memory.user_id.clone(),
                    entity_type: memory.entity_type.clone(),
                    entity_name: memory.entity_name.clone(),
                    relationships: memory.relationships.clone(),
                    metadata: memory.metadata.clone(),
                    conversation_id: memory.conversation_id.clone(),
                    similarity,
                });
            }
        }

        matches.sort_by(|a, b| by_similarity_then_id((a.similarity, a.id.as_str()), (b.similarity, b.id.as_str())));
        matches.truncate(filter.limit as usize);
        Ok(matches)
    }

    async fn pending_messages(
        &self,
        scope: &BackfillScope,
        after: Option<String>,
        limit: u64,
    ) -> EmbeddingResult<Vec<Message>> {
        let store = self.store.read().await;

        Ok(store
            .messages
            .values()
            .filter(|stored| stored.embedding.is_none())
            .map(|stored| &stored.message)
            .filter(|m| after_cursor(&m.id, &after))
            .filter(|m| {
                scope
                    .conversation_id
                    .as_ref()
                    .is_none_or(|id| *id == m.conversation_id)
            })
            .filter(|m| {
                scope.user_id.as_ref().is_none_or(|user_id| {
                    store
                        .conversations
                        .get(&m.conversation_id)
                        .is_some_and(|c| c.user_id == *user_id)
                })
            })
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn pending_memories(
        &self,
        scope: &BackfillScope,
        after: Option<String>,
        limit: u64,
    ) -> EmbeddingResult<Vec<PatientMemory>> {
        let store = self.store.read().await;

        Ok(store
            .memories
            .values()
            .filter(|stored| stored.embedding.is_none())
            .map(|stored| &stored.memory)
            .filter(|m| after_cursor(&m.id, &after))
            .filter(|m| scope.user_id.as_ref().is_none_or(|id| *id == m.user_id))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count_pending(&self, table: EmbeddingTable, scope: &BackfillScope) -> EmbeddingResult<u64> {
        let count = match table {
            EmbeddingTable::Messages => self.pending_messages(scope, None, u64::MAX).await?.len(),
            EmbeddingTable::PatientMemory => self.pending_memories(scope, None, u64::MAX).await?.len(),
        };
        Ok(count as u64)
    }

    async fn store_embedding(
        &self,
        table: EmbeddingTable,
        id: &str,
        embedding: &[f32],
    ) -> EmbeddingResult<bool> {
        self.check_width(embedding).await?;
        let mut store = self.store.write().await;

        let slot = match table {
            EmbeddingTable::Messages => store.messages.get_mut(id).map(|s| &mut s.embedding),
            EmbeddingTable::PatientMemory => store.memories.get_mut(id).map(|s| &mut s.embedding),
        };

        match slot {
            Some(slot) if slot.is_none() => {
                *slot = Some(embedding.to_vec());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_embedding(&self, table: EmbeddingTable, id: &str) -> EmbeddingResult<Option<Vec<f32>>> {
        let store = self.store.read().await;
        let embedding = match table {
            EmbeddingTable::Messages => store.messages.get(id).and_then(|s| s.embedding.clone()),
            EmbeddingTable::PatientMemory => store.memories.get(id).and_then(|s| s.embedding.clone()),
        };
        Ok(embedding)
    }

    async fn embedding_stats(&self) -> EmbeddingResult<EmbeddingStats> {
        let store = self.store.read().await;
        let embedded_messages = store.messages.values().filter(|s| s.embedding.is_some()).count();
        let embedded_memories = store.memories.values().filter(|s| s.embedding.is_some()).count();

        Ok(EmbeddingStats {
            messages: TableCoverage::new(store.messages.len() as i64, embedded_messages as i64),
            patient_memory: TableCoverage::new(store.memories.len() as i64, embedded_memories as i64),
        })
    }

    async fn embedding_dimension(&self, _table: EmbeddingTable) -> EmbeddingResult<Option<usize>> {
        Ok(Some(*self.dimension.read().await))
    }

    async fn resize_embedding_column(&self, dimension: usize, _lists: u32) -> EmbeddingResult<()> {
        let mut store = self.store.write().await;
        let mut width = self.dimension.write().await;

        for stored in store.messages.values_mut() {
            stored.embedding = None;
        }
        for stored in store.memories.values_mut() {
            stored.embedding = None;
        }
        *width = dimension;

        tracing::warn!(dimension, "Resized embedding columns; all vectors cleared");
        Ok(())
    }
}
