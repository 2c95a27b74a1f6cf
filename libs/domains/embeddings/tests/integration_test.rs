//! Integration tests for the embeddings domain against a real pgvector database
//!
//! Every test starts its own container, applies the migrator and embeds with
//! the deterministic `HashingProvider`, so no network or model is needed.

use domain_embeddings::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use test_utils::assertions::assert_descending;
use test_utils::{TestDatabase, TestDataBuilder};

fn local_generator() -> EmbeddingGenerator {
    EmbeddingGenerator::new(
        Arc::new(HashingProvider::new(384)),
        &EmbeddingConfig::new(EmbeddingBackend::Local),
    )
    .unwrap()
}

fn service(db: &TestDatabase) -> EmbeddingService<PgEmbeddingRepository> {
    EmbeddingService::new(PgEmbeddingRepository::new(db.connection()), local_generator())
}

async fn seed_conversation(
    service: &EmbeddingService<PgEmbeddingRepository>,
    builder: &TestDataBuilder,
    contents: &[&str],
) -> String {
    let conversation = service
        .create_conversation(NewConversation::new(builder.user_id()).with_id(builder.conversation_id()))
        .await
        .unwrap();

    for (i, content) in contents.iter().enumerate() {
        service
            .record_message(
                NewMessage::new(&conversation.id, "user", *content).with_id(builder.seq("msg", i)),
                false,
            )
            .await
            .unwrap();
    }
    conversation.id
}

#[tokio::test]
async fn test_schema_matches_local_dimension() {
    let db = TestDatabase::new().await;
    let service = service(&db);

    service.verify_schema().await.unwrap();
    for table in EmbeddingTable::ALL {
        let dimension = service.repository().embedding_dimension(table).await.unwrap();
        assert_eq!(dimension, Some(384));
    }
}

#[tokio::test]
async fn test_empty_tables_report_zero_coverage() {
    let db = TestDatabase::new().await;
    let stats = service(&db).stats().await.unwrap();

    assert_eq!(stats.messages, TableCoverage::new(0, 0));
    assert_eq!(stats.patient_memory.embedding_percentage, 0.0);
}

#[tokio::test]
async fn test_backfill_three_messages_in_batches_of_two() {
    let db = TestDatabase::new().await;
    let service = service(&db);
    let builder = TestDataBuilder::from_test_name("backfill_three_messages");
    seed_conversation(&service, &builder, &["chest pain", "shortness of breath", "dizzy spells"]).await;

    let scope = BackfillScope::default();
    assert_eq!(service.backfill(EmbeddingTable::Messages, 2, &scope).await.unwrap(), 2);
    let stats = service.stats().await.unwrap();
    assert_eq!(stats.messages.total_rows, 3);
    assert_eq!(stats.messages.embedded_rows, 2);
    assert_eq!(stats.messages.embedding_percentage, 66.67);

    assert_eq!(service.backfill(EmbeddingTable::Messages, 2, &scope).await.unwrap(), 1);
    let stats = service.stats().await.unwrap();
    assert_eq!(stats.messages.embedding_percentage, 100.0);

    // Nothing left: a second pass is a no-op
    assert_eq!(service.backfill(EmbeddingTable::Messages, 2, &scope).await.unwrap(), 0);
}

#[tokio::test]
async fn test_backfill_writes_generator_output() {
    let db = TestDatabase::new().await;
    let service = service(&db);
    let builder = TestDataBuilder::from_test_name("backfill_writes_vectors");
    seed_conversation(&service, &builder, &["persistent headache"]).await;

    service
        .backfill(EmbeddingTable::Messages, 10, &BackfillScope::default())
        .await
        .unwrap();

    let stored = service
        .repository()
        .get_embedding(EmbeddingTable::Messages, &builder.seq("msg", 0))
        .await
        .unwrap()
        .expect("vector stored");
    let expected = service.generator().embed("user: persistent headache").await.unwrap();

    assert_eq!(stored.len(), 384);
    assert!(cosine_similarity(&stored, &expected).unwrap() > 0.9999);
}

#[tokio::test]
async fn test_record_with_embedding_is_searchable_without_backfill() {
    let db = TestDatabase::new().await;
    let service = service(&db);
    let builder = TestDataBuilder::from_test_name("record_inline");
    let conversation_id = seed_conversation(&service, &builder, &[]).await;

    service
        .record_message(NewMessage::new(&conversation_id, "user", "swollen ankle after running"), true)
        .await
        .unwrap();

    let results = service
        .search_messages(
            "swollen ankle",
            MessageSearch {
                threshold: 0.4,
                ..MessageSearch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].similarity > 0.4);
    assert_eq!(service.stats().await.unwrap().messages.pending_rows(), 0);
}

#[tokio::test]
async fn test_message_search_ranks_and_filters() {
    let db = TestDatabase::new().await;
    let service = service(&db);
    let builder = TestDataBuilder::from_test_name("search_ranks");
    let conversation_id = seed_conversation(
        &service,
        &builder,
        &["sharp chest pain", "chest pain when breathing deeply", "knee injury from football"],
    )
    .await;
    service
        .backfill(EmbeddingTable::Messages, 10, &BackfillScope::default())
        .await
        .unwrap();

    let filter = MessageSearch {
        conversation_id: Some(conversation_id.clone()),
        threshold: 0.3,
        ..MessageSearch::default()
    };
    let results = service.search_messages("chest pain", filter).await.unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|m| m.content.contains("chest pain")));
    assert!(results.iter().all(|m| m.similarity > 0.3));
    let scores: Vec<f64> = results.iter().map(|m| m.similarity).collect();
    assert_descending(&scores, "message similarity");

    // Another conversation id matches nothing
    let filter = MessageSearch {
        conversation_id: Some("no-such-conversation".to_string()),
        threshold: 0.0,
        ..MessageSearch::default()
    };
    assert!(service.search_messages("chest pain", filter).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_threshold_one_returns_nothing() {
    let db = TestDatabase::new().await;
    let service = service(&db);
    let builder = TestDataBuilder::from_test_name("threshold_one");
    seed_conversation(&service, &builder, &["fever"]).await;
    service
        .backfill(EmbeddingTable::Messages, 10, &BackfillScope::default())
        .await
        .unwrap();

    let filter = MessageSearch {
        threshold: 1.0,
        ..MessageSearch::default()
    };
    assert!(service.search_messages("fever", filter).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_message_search_is_scoped_to_owner() {
    let db = TestDatabase::new().await;
    let service = service(&db);
    let builder = TestDataBuilder::from_test_name("message_owner_scope");
    seed_conversation(&service, &builder, &["migraine with aura"]).await;

    let other = service
        .create_conversation(NewConversation::new(builder.other_user_id()))
        .await
        .unwrap();
    service
        .record_message(NewMessage::new(&other.id, "user", "migraine with aura"), true)
        .await
        .unwrap();
    service
        .backfill(EmbeddingTable::Messages, 10, &BackfillScope::default())
        .await
        .unwrap();

    let filter = MessageSearch {
        owner_id: Some(builder.user_id()),
        threshold: 0.5,
        ..MessageSearch::default()
    };
    let results = service.search_messages("migraine with aura", filter).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].conversation_id, builder.conversation_id());

    // Unscoped search sees both
    let filter = MessageSearch {
        threshold: 0.5,
        ..MessageSearch::default()
    };
    assert_eq!(service.search_messages("migraine with aura", filter).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_memory_search_never_crosses_owners() {
    let db = TestDatabase::new().await;
    let service = service(&db);
    let builder = TestDataBuilder::from_test_name("memory_owner_isolation");

    for owner in [builder.user_id(), builder.other_user_id()] {
        service
            .record_memory(
                NewPatientMemory::new(&owner, "allergy", "penicillin")
                    .with_metadata(json!({"severity": "severe", "reaction": "hives"})),
                true,
            )
            .await
            .unwrap();
    }

    let results = service
        .search_memories(
            "penicillin allergy",
            MemorySearch {
                threshold: 0.2,
                ..MemorySearch::new(builder.user_id())
            },
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].user_id, builder.user_id());
    assert_eq!(results[0].entity_name, "penicillin");
    assert_eq!(results[0].metadata, Some(json!({"severity": "severe", "reaction": "hives"})));
}

#[tokio::test]
async fn test_memory_backfill_respects_user_scope() {
    let db = TestDatabase::new().await;
    let service = service(&db);
    let builder = TestDataBuilder::from_test_name("memory_backfill_scope");

    service
        .record_memory(NewPatientMemory::new(builder.user_id(), "condition", "asthma"), false)
        .await
        .unwrap();
    service
        .record_memory(NewPatientMemory::new(builder.other_user_id(), "condition", "diabetes"), false)
        .await
        .unwrap();

    let updated = service
        .backfill(EmbeddingTable::PatientMemory, 10, &BackfillScope::user(builder.user_id()))
        .await
        .unwrap();

    assert_eq!(updated, 1);
    let stats = service.stats().await.unwrap();
    assert_eq!(stats.patient_memory.total_rows, 2);
    assert_eq!(stats.patient_memory.embedded_rows, 1);
}

#[tokio::test]
async fn test_message_requires_existing_conversation() {
    let db = TestDatabase::new().await;
    let err = service(&db)
        .record_message(NewMessage::new("missing-conversation", "user", "hello"), false)
        .await
        .unwrap_err();

    assert!(matches!(err, EmbeddingError::Validation(_)));
}

#[tokio::test]
async fn test_wrong_width_vectors_are_rejected_by_the_column() {
    let db = TestDatabase::new().await;
    let service = service(&db);
    let builder = TestDataBuilder::from_test_name("wrong_width_vectors");
    let conversation_id = seed_conversation(&service, &builder, &["knee pain", "ankle swelling"]).await;
    assert_eq!(service.backfill(EmbeddingTable::Messages, 1, &BackfillScope::default()).await.unwrap(), 1);

    let repository = service.repository();
    let wide = vec![0.1_f32; 1536];
    let pending_id = builder.seq("msg", 1);

    let err = repository
        .store_embedding(EmbeddingTable::Messages, &pending_id, &wide)
        .await
        .unwrap_err();
    assert!(matches!(err, EmbeddingError::DimensionMismatch { expected: 384, actual: 1536 }));
    assert!(repository.get_embedding(EmbeddingTable::Messages, &pending_id).await.unwrap().is_none());

    let err = repository
        .insert_message(
            NewMessage::new(&conversation_id, "user", "wrist pain").with_id(builder.seq("msg", 2)),
            Some(wide.clone()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EmbeddingError::DimensionMismatch { expected: 384, actual: 1536 }));
    assert_eq!(service.stats().await.unwrap().messages.total_rows, 2);

    let err = repository
        .search_messages(&wide, MessageSearch { threshold: 0.0, ..Default::default() })
        .await
        .unwrap_err();
    assert!(matches!(err, EmbeddingError::DimensionMismatch { .. }));
    assert_eq!(
        axum::response::IntoResponse::into_response(err).status(),
        axum::http::StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn test_fresh_database_adopts_openai_width() {
    let db = TestDatabase::new().await;
    let openai = EmbeddingGenerator::new(
        Arc::new(HashingProvider::new(1536)),
        &EmbeddingConfig::new(EmbeddingBackend::OpenAi),
    )
    .unwrap();
    let service = EmbeddingService::new(PgEmbeddingRepository::new(db.connection()), openai);

    assert!(service.verify_schema().await.is_err());
    assert!(service.prepare_schema().await.unwrap());
    for table in EmbeddingTable::ALL {
        assert_eq!(service.repository().embedding_dimension(table).await.unwrap(), Some(1536));
    }
}

#[tokio::test]
async fn test_run_backfill_drains_all_batches() {
    let db = TestDatabase::new().await;
    let service = service(&db);
    let builder = TestDataBuilder::from_test_name("run_backfill");
    let contents: Vec<String> = (0..5).map(|i| format!("symptom report {}", i)).collect();
    let refs: Vec<&str> = contents.iter().map(String::as_str).collect();
    seed_conversation(&service, &builder, &refs).await;

    let options = BackfillOptions {
        batch_size: 2,
        delay: Duration::ZERO,
        max_batches: None,
    };
    let mut batches_seen = 0;
    let report = service
        .run_backfill_with_progress(EmbeddingTable::Messages, &BackfillScope::default(), &options, |p| {
            batches_seen = p.batch;
            assert_eq!(p.total_batches, 3);
        })
        .await
        .unwrap();

    assert_eq!(report.updated, 5);
    assert_eq!(report.batches, 3);
    assert_eq!(batches_seen, 3);
    assert_eq!(service.stats().await.unwrap().messages.embedding_percentage, 100.0);
}

#[tokio::test]
async fn test_resize_clears_vectors_and_changes_width() {
    let db = TestDatabase::new().await;
    let service = service(&db);
    let builder = TestDataBuilder::from_test_name("resize_dimension");
    seed_conversation(&service, &builder, &["blurred vision"]).await;
    service
        .backfill(EmbeddingTable::Messages, 10, &BackfillScope::default())
        .await
        .unwrap();
    assert_eq!(service.stats().await.unwrap().messages.embedded_rows, 1);

    let lists = service.resize_dimension(1536).await.unwrap();
    assert_eq!(lists, 100);

    let err = service.verify_schema().await.unwrap_err();
    assert!(matches!(err, EmbeddingError::SchemaMismatch(ref msg) if msg.contains("--dimension 384")));
    let stats = service.stats().await.unwrap();
    assert_eq!(stats.messages.total_rows, 1);
    assert_eq!(stats.messages.embedded_rows, 0);

    // Back to the configured width; the row is pending again
    service.resize_dimension(384).await.unwrap();
    service.verify_schema().await.unwrap();
    assert_eq!(
        service
            .backfill(EmbeddingTable::Messages, 10, &BackfillScope::default())
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_resize_rejects_unindexable_width() {
    let db = TestDatabase::new().await;
    let err = service(&db).resize_dimension(4096).await.unwrap_err();
    assert!(matches!(err, EmbeddingError::Validation(_)));
}
