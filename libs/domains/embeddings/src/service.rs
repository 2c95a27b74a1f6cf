use migration::embedding_schema::recommended_lists;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

use crate::error::{EmbeddingError, EmbeddingResult};
use crate::generator::EmbeddingGenerator;
use crate::models::{
    BackfillOptions, BackfillProgress, BackfillReport, BackfillScope, BatchOutcome, Conversation,
    EmbeddingStats, EmbeddingTable, MemoryMatch, MemorySearch, Message, MessageMatch,
    MessageSearch, NewConversation, NewMessage, NewPatientMemory, PatientMemory,
};
use crate::render::Embeddable;
use crate::repository::EmbeddingRepository;

/// Service layer tying the generator to the vector store
///
/// Search, embedding-on-write, backfill, coverage and schema checks.
pub struct EmbeddingService<R: EmbeddingRepository> {
    repository: Arc<R>,
    generator: EmbeddingGenerator,
}

impl<R: EmbeddingRepository> Clone for EmbeddingService<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            generator: self.generator.clone(),
        }
    }
}

impl<R: EmbeddingRepository> EmbeddingService<R> {
    pub fn new(repository: R, generator: EmbeddingGenerator) -> Self {
        Self {
            repository: Arc::new(repository),
            generator,
        }
    }

    pub fn generator(&self) -> &EmbeddingGenerator {
        &self.generator
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    // ===== Writes =====

    pub async fn create_conversation(&self, input: NewConversation) -> EmbeddingResult<Conversation> {
        if input.user_id.trim().is_empty() {
            return Err(EmbeddingError::Validation("userId is required".to_string()));
        }
        self.repository.create_conversation(input).await
    }

    /// Store a message, embedding it inline when asked to.
    ///
    /// An embedding failure never fails the write: the row is stored with a
    /// NULL vector and picked up by the next backfill.
    #[instrument(skip(self, input), fields(message_id = %input.id, conversation_id = %input.conversation_id))]
    pub async fn record_message(
        &self,
        input: NewMessage,
        generate_embedding: bool,
    ) -> EmbeddingResult<Message> {
        let embedding = if generate_embedding {
            self.try_embed(&input).await
        } else {
            None
        };

        self.repository.insert_message(input, embedding).await
    }

    /// Store a patient-memory entity, embedding it inline when asked to.
    #[instrument(skip(self, input), fields(memory_id = %input.id, owner_id = %input.user_id))]
    pub async fn record_memory(
        &self,
        input: NewPatientMemory,
        generate_embedding: bool,
    ) -> EmbeddingResult<PatientMemory> {
        let embedding = if generate_embedding {
            self.try_embed(&input).await
        } else {
            None
        };

        self.repository.insert_memory(input, embedding).await
    }

    async fn try_embed<E: Embeddable + Sync>(&self, record: &E) -> Option<Vec<f32>> {
        let text = record.render();
        if text.is_empty() {
            return None;
        }

        match self.generator.embed(&text).await {
            Ok(vector) => Some(vector),
            Err(err) => {
                tracing::warn!(id = %record.id(), error = %err, "Embedding on write failed; row left for backfill");
                None
            }
        }
    }

    // ===== Search =====

    /// Messages similar to `query`, optionally within one conversation and
    /// one owner's conversations.
    #[instrument(skip(self, query, filter), fields(conversation_id = ?filter.conversation_id, owner_id = ?filter.owner_id))]
    pub async fn search_messages(
        &self,
        query: &str,
        filter: MessageSearch,
    ) -> EmbeddingResult<Vec<MessageMatch>> {
        validate_search(query, filter.threshold, filter.limit)?;

        let vector = self.generator.embed(query).await?;
        let results = self.repository.search_messages(&vector, filter).await?;

        tracing::debug!(count = results.len(), "Message search completed");
        Ok(results)
    }

    /// The owner's memories similar to `query`.
    #[instrument(skip(self, query, filter), fields(owner_id = %filter.owner_id))]
    pub async fn search_memories(
        &self,
        query: &str,
        filter: MemorySearch,
    ) -> EmbeddingResult<Vec<MemoryMatch>> {
        validate_search(query, filter.threshold, filter.limit)?;
        if filter.owner_id.trim().is_empty() {
            return Err(EmbeddingError::Validation("An owner id is required".to_string()));
        }

        let vector = self.generator.embed(query).await?;
        let results = self.repository.search_memories(&vector, filter).await?;

        tracing::debug!(count = results.len(), "Memory search completed");
        Ok(results)
    }

    // ===== Backfill =====

    /// Embed up to `batch_size` rows of `table` that lack a vector.
    ///
    /// Returns the number of rows written. Calling it again only picks up
    /// rows that are still NULL.
    pub async fn backfill(
        &self,
        table: EmbeddingTable,
        batch_size: u64,
        scope: &BackfillScope,
    ) -> EmbeddingResult<u64> {
        Ok(self.backfill_batch(table, scope, batch_size, None).await?.updated)
    }

    /// One backfill batch starting after the `after` id.
    ///
    /// Rows are embedded together; if the batch call fails they are retried
    /// one by one. Rows that still fail are logged and counted, not fatal.
    /// A configuration error (such as a missing API key) aborts the batch.
    #[instrument(skip(self, scope, after), fields(table = %table, batch_size))]
    pub async fn backfill_batch(
        &self,
        table: EmbeddingTable,
        scope: &BackfillScope,
        batch_size: u64,
        after: Option<String>,
    ) -> EmbeddingResult<BatchOutcome> {
        if batch_size == 0 {
            return Err(EmbeddingError::Validation("batchSize must be at least 1".to_string()));
        }

        let rendered: Vec<(String, String)> = match table {
            EmbeddingTable::Messages => self
                .repository
                .pending_messages(scope, after, batch_size)
                .await?
                .iter()
                .map(|m| (m.id.clone(), m.render()))
                .collect(),
            EmbeddingTable::PatientMemory => self
                .repository
                .pending_memories(scope, after, batch_size)
                .await?
                .iter()
                .map(|m| (m.id.clone(), m.render()))
                .collect(),
        };

        let mut outcome = BatchOutcome {
            selected: rendered.len(),
            last_id: rendered.last().map(|(id, _)| id.clone()),
            ..BatchOutcome::default()
        };

        let (rows, blank): (Vec<_>, Vec<_>) = rendered
            .into_iter()
            .partition(|(_, text)| !text.trim().is_empty());
        for (id, _) in &blank {
            tracing::warn!(id = %id, "Nothing to embed; skipping row");
        }
        outcome.failed += blank.len();

        if rows.is_empty() {
            return Ok(outcome);
        }

        let texts: Vec<String> = rows.iter().map(|(_, text)| text.clone()).collect();
        let vectors: Vec<Option<Vec<f32>>> = match self.generator.embed_batch(&texts).await {
            Ok(vectors) => vectors.into_iter().map(Some).collect(),
            Err(err @ EmbeddingError::Config(_)) => return Err(err),
            Err(err) => {
                tracing::warn!(error = %err, rows = rows.len(), "Batch embedding failed; retrying rows individually");
                let mut vectors = Vec::with_capacity(rows.len());
                for (id, text) in &rows {
                    match self.generator.embed(text).await {
                        Ok(vector) => vectors.push(Some(vector)),
                        Err(err) => {
                            tracing::warn!(id = %id, error = %err, "Failed to embed row");
                            vectors.push(None);
                        }
                    }
                }
                vectors
            }
        };

        for ((id, _), vector) in rows.iter().zip(vectors) {
            let Some(vector) = vector else {
                outcome.failed += 1;
                continue;
            };

            match self.repository.store_embedding(table, id, &vector).await {
                Ok(true) => outcome.updated += 1,
                Ok(false) => tracing::debug!(id = %id, "Row already embedded or removed; skipped"),
                Err(err) => {
                    tracing::warn!(id = %id, error = %err, "Failed to store embedding");
                    outcome.failed += 1;
                }
            }
        }

        Ok(outcome)
    }

    /// Backfill `table` until no NULL rows remain in `scope`.
    pub async fn run_backfill(
        &self,
        table: EmbeddingTable,
        scope: &BackfillScope,
        options: &BackfillOptions,
    ) -> EmbeddingResult<BackfillReport> {
        self.run_backfill_with_progress(table, scope, options, |_| {}).await
    }

    /// [`run_backfill`](Self::run_backfill), calling `on_progress` after each
    /// committed batch.
    ///
    /// An id cursor keeps rows that failed earlier in this run from being
    /// selected again; a later run retries them.
    #[instrument(skip(self, scope, options, on_progress), fields(table = %table, batch_size = options.batch_size))]
    pub async fn run_backfill_with_progress<F>(
        &self,
        table: EmbeddingTable,
        scope: &BackfillScope,
        options: &BackfillOptions,
        mut on_progress: F,
    ) -> EmbeddingResult<BackfillReport>
    where
        F: FnMut(&BackfillProgress) + Send,
    {
        let started = Instant::now();
        let total_pending = self.repository.count_pending(table, scope).await?;
        let total_batches = total_pending.div_ceil(options.batch_size.max(1));

        tracing::info!(pending = total_pending, total_batches, "Starting backfill");

        let mut report = BackfillReport {
            table,
            batches: 0,
            updated: 0,
            failed: 0,
            elapsed: Duration::ZERO,
        };
        let mut cursor: Option<String> = None;

        loop {
            if options.max_batches.is_some_and(|max| report.batches >= max) {
                tracing::info!(batches = report.batches, "Reached batch limit");
                break;
            }

            let outcome = self
                .backfill_batch(table, scope, options.batch_size, cursor.take())
                .await?;
            if outcome.selected == 0 {
                break;
            }

            report.batches += 1;
            report.updated += outcome.updated;
            report.failed += outcome.failed as u64;
            cursor = outcome.last_id.clone();

            let progress = BackfillProgress {
                table,
                batch: report.batches,
                total_batches,
                updated: report.updated,
                failed: report.failed,
                total_pending,
                elapsed: started.elapsed(),
                estimated_remaining: estimate_remaining(
                    started.elapsed(),
                    report.updated + report.failed,
                    total_pending,
                ),
            };
            tracing::info!(
                batch = progress.batch,
                total_batches,
                updated = outcome.updated,
                failed = outcome.failed,
                elapsed_ms = progress.elapsed.as_millis() as u64,
                remaining_secs = progress.estimated_remaining.as_secs(),
                "Backfill batch committed"
            );
            on_progress(&progress);

            if (outcome.selected as u64) < options.batch_size {
                break;
            }
            if !options.delay.is_zero() {
                tokio::time::sleep(options.delay).await;
            }
        }

        report.elapsed = started.elapsed();
        tracing::info!(
            batches = report.batches,
            updated = report.updated,
            failed = report.failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Backfill finished"
        );
        Ok(report)
    }

    // ===== Coverage & schema =====

    pub async fn stats(&self) -> EmbeddingResult<EmbeddingStats> {
        self.repository.embedding_stats().await
    }

    /// Fails unless both vector columns are declared at the generator's width.
    pub async fn verify_schema(&self) -> EmbeddingResult<()> {
        let expected = self.generator.dimension();

        for table in EmbeddingTable::ALL {
            let declared = self.repository.embedding_dimension(table).await?;
            if declared != Some(expected) {
                let found = declared.map_or_else(|| "missing".to_string(), |d| format!("vector({})", d));
                return Err(EmbeddingError::SchemaMismatch(format!(
                    "{}.\"contentEmbedding\" is {} but {} produces {}-dimensional vectors; \
                     run `embedding-backfill resize --dimension {}` to migrate (this clears every stored vector)",
                    table,
                    found,
                    self.generator.model_name(),
                    expected,
                    expected
                )));
            }
        }

        tracing::debug!(dimension = expected, "Embedding schema matches configuration");
        Ok(())
    }

    /// [`verify_schema`](Self::verify_schema), but a mismatched width is
    /// corrected when neither table holds a vector yet, since resizing then
    /// loses nothing. Returns whether the columns were resized.
    #[instrument(skip(self))]
    pub async fn prepare_schema(&self) -> EmbeddingResult<bool> {
        let mismatch = match self.verify_schema().await {
            Ok(()) => return Ok(false),
            Err(err @ EmbeddingError::SchemaMismatch(_)) => err,
            Err(err) => return Err(err),
        };

        let stats = self.repository.embedding_stats().await?;
        if stats.messages.embedded_rows > 0 || stats.patient_memory.embedded_rows > 0 {
            return Err(mismatch);
        }

        let dimension = self.generator.dimension();
        let lists = self.resize_dimension(dimension).await?;
        tracing::info!(dimension, lists, "No stored embeddings; resized vector columns to the configured width");
        self.verify_schema().await?;
        Ok(true)
    }

    /// Recreate both vector columns at `dimension`, clearing every vector.
    ///
    /// Index `lists` are sized from the larger table. Returns the lists used.
    pub async fn resize_dimension(&self, dimension: usize) -> EmbeddingResult<u32> {
        resize_embeddings(self.repository.as_ref(), dimension).await
    }
}

/// Recreate both vector columns of `repository` at `dimension`.
///
/// Needs no generator, so it also works when the configured backend is
/// unavailable. Returns the IVFFlat lists used.
#[instrument(skip(repository))]
pub async fn resize_embeddings<R: EmbeddingRepository + ?Sized>(
    repository: &R,
    dimension: usize,
) -> EmbeddingResult<u32> {
    let stats = repository.embedding_stats().await?;
    let rows = stats.messages.total_rows.max(stats.patient_memory.total_rows).max(0) as u64;
    let lists = recommended_lists(rows);

    repository.resize_embedding_column(dimension, lists).await?;
    Ok(lists)
}

fn validate_search(query: &str, threshold: f64, limit: u32) -> EmbeddingResult<()> {
    if query.trim().is_empty() {
        return Err(EmbeddingError::EmptyInput("Query text is required".to_string()));
    }
    if !(0.0..=1.0).contains(&threshold) {
        return Err(EmbeddingError::Validation(
            "matchThreshold must be between 0 and 1".to_string(),
        ));
    }
    if limit == 0 {
        return Err(EmbeddingError::Validation("matchCount must be at least 1".to_string()));
    }
    Ok(())
}

/// Linear extrapolation from the rows processed so far.
fn estimate_remaining(elapsed: Duration, processed: u64, total: u64) -> Duration {
    if processed == 0 || processed >= total {
        return Duration::ZERO;
    }
    elapsed.mul_f64((total - processed) as f64 / processed as f64)
}
