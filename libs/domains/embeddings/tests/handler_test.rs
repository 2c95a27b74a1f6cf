//! Handler tests for the embeddings domain
//!
//! These tests verify that HTTP handlers work correctly:
//! - Request deserialization and validation (camelCase JSON)
//! - Response shapes
//! - HTTP status codes and the JSON error body
//! - Caller identity via `x-user-id`

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use domain_embeddings::*;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use test_utils::{TestDatabase, TestDataBuilder};
use tower::ServiceExt; // For oneshot()

const USER: &str = "user-handler";

// Helper to parse JSON response body
async fn json_body(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn generator() -> EmbeddingGenerator {
    EmbeddingGenerator::new(
        Arc::new(HashingProvider::new(384)),
        &EmbeddingConfig::new(EmbeddingBackend::Local),
    )
    .unwrap()
}

fn post(uri: &str, user: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Router over an in-memory store holding one conversation of `USER` with
/// two messages, plus one memory each for `USER` and another user.
async fn seeded_app() -> (Router, EmbeddingService<InMemoryEmbeddingRepository>) {
    let service = EmbeddingService::new(InMemoryEmbeddingRepository::new(384), generator());
    service
        .create_conversation(NewConversation::new(USER).with_id("conv-1"))
        .await
        .unwrap();
    for (id, content) in [("m1", "throbbing headache"), ("m2", "sprained wrist")] {
        service
            .record_message(NewMessage::new("conv-1", "user", content).with_id(id), false)
            .await
            .unwrap();
    }
    for owner in [USER, "someone-else"] {
        service
            .record_memory(NewPatientMemory::new(owner, "medication", "ibuprofen"), false)
            .await
            .unwrap();
    }

    (handlers::router(service.clone()), service)
}

#[tokio::test]
async fn test_stats_reports_coverage() {
    let (app, _) = seeded_app().await;

    let request = Request::get("/embeddings/stats").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response.into_body()).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["statistics"]["messages"]["totalRows"], 2);
    assert_eq!(body["statistics"]["messages"]["embeddedRows"], 0);
    assert_eq!(body["statistics"]["patientMemory"]["embeddingPercentage"], 0.0);
}

#[tokio::test]
async fn test_backfill_messages_then_search() {
    let (app, _) = seeded_app().await;

    let response = app
        .clone()
        .oneshot(post("/embeddings/backfill/messages", Some(USER), json!({"batchSize": 1})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response.into_body()).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["updatedCount"], 1);

    let response = app
        .clone()
        .oneshot(post("/embeddings/backfill/messages", Some(USER), json!({})))
        .await
        .unwrap();
    assert_eq!(json_body(response.into_body()).await["updatedCount"], 1);

    let response = app
        .oneshot(post(
            "/search/messages",
            Some(USER),
            json!({"query": "headache", "conversationId": "conv-1", "matchThreshold": 0.3}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response.into_body()).await;
    assert_eq!(body["query"], "headache");
    assert_eq!(body["conversationId"], "conv-1");
    assert_eq!(body["count"], 1);
    let result = &body["results"][0];
    assert_eq!(result["id"], "m1");
    assert_eq!(result["conversationId"], "conv-1");
    assert_eq!(result["role"], "user");
    assert!(result["similarity"].as_f64().unwrap() > 0.3);
    assert!(result.get("createdAt").is_some());
}

#[tokio::test]
async fn test_message_search_hides_other_users_conversations() {
    let (app, _) = seeded_app().await;
    app.clone()
        .oneshot(post("/embeddings/backfill/messages", Some(USER), json!({})))
        .await
        .unwrap();

    let response = app
        .oneshot(post(
            "/search/messages",
            Some("intruder"),
            json!({"query": "headache", "matchThreshold": 0.0}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response.into_body()).await;
    assert_eq!(body["count"], 0);
    assert_eq!(body["conversationId"], Value::Null);
}

#[tokio::test]
async fn test_memory_backfill_and_search_use_caller() {
    let (app, service) = seeded_app().await;

    let response = app
        .clone()
        .oneshot(post("/embeddings/backfill/memories", Some(USER), json!({})))
        .await
        .unwrap();
    let body = json_body(response.into_body()).await;
    assert_eq!(body["updatedCount"], 1);
    assert_eq!(service.stats().await.unwrap().patient_memory.embedded_rows, 1);

    let response = app
        .oneshot(post(
            "/search/memories",
            Some(USER),
            json!({"query": "ibuprofen", "matchThreshold": 0.2}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response.into_body()).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["userId"], USER);
    assert_eq!(body["results"][0]["entityType"], "medication");
    assert_eq!(body["results"][0]["entityName"], "ibuprofen");
}

#[tokio::test]
async fn test_message_backfill_only_touches_callers_conversations() {
    let (app, service) = seeded_app().await;

    for body in [json!({}), json!({"conversationId": "conv-1"})] {
        let response = app
            .clone()
            .oneshot(post("/embeddings/backfill/messages", Some("intruder"), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response.into_body()).await["updatedCount"], 0);
    }
    assert_eq!(service.stats().await.unwrap().messages.embedded_rows, 0);

    let response = app
        .oneshot(post("/embeddings/backfill/messages", Some(USER), json!({"conversationId": "conv-1"})))
        .await
        .unwrap();
    assert_eq!(json_body(response.into_body()).await["updatedCount"], 2);
}

#[tokio::test]
async fn test_missing_caller_is_unauthorized() {
    let (app, _) = seeded_app().await;

    for uri in [
        "/search/messages",
        "/search/memories",
        "/embeddings/backfill/messages",
        "/embeddings/backfill/memories",
    ] {
        let response = app
            .clone()
            .oneshot(post(uri, None, json!({"query": "ibuprofen"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
    }
}

#[tokio::test]
async fn test_blank_query_is_bad_request() {
    let (app, _) = seeded_app().await;

    let response = app
        .clone()
        .oneshot(post("/search/memories", Some(USER), json!({"query": ""})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post("/search/messages", Some(USER), json!({"query": "   "})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response.into_body()).await;
    assert_eq!(body["message"], "Query text is required");
}

#[tokio::test]
async fn test_out_of_range_parameters_are_rejected() {
    let (app, _) = seeded_app().await;

    let cases = [
        ("/search/messages", json!({"query": "x", "matchThreshold": 1.5})),
        ("/search/messages", json!({"query": "x", "matchCount": 101})),
        ("/search/memories", json!({"query": "x", "matchCount": 0})),
        ("/embeddings/backfill/messages", json!({"batchSize": 501})),
    ];

    for (uri, body) in cases {
        let response = app.clone().oneshot(post(uri, Some(USER), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let body = json_body(response.into_body()).await;
        assert!(body.get("error").is_some());
    }
}

#[tokio::test]
async fn test_handlers_against_postgres() {
    let db = TestDatabase::new().await;
    let builder = TestDataBuilder::from_test_name("handler_postgres");
    let service = EmbeddingService::new(PgEmbeddingRepository::new(db.connection()), generator());
    service
        .create_conversation(NewConversation::new(builder.user_id()).with_id(builder.conversation_id()))
        .await
        .unwrap();
    for i in 0..3 {
        service
            .record_message(
                NewMessage::new(builder.conversation_id(), "assistant", format!("rest and fluids {}", i))
                    .with_id(builder.seq("msg", i)),
                false,
            )
            .await
            .unwrap();
    }
    let app = handlers::router(service);

    let response = app
        .clone()
        .oneshot(post("/embeddings/backfill/messages", Some(builder.user_id().as_str()), json!({"batchSize": 2})))
        .await
        .unwrap();
    assert_eq!(json_body(response.into_body()).await["updatedCount"], 2);

    let response = app
        .clone()
        .oneshot(Request::get("/embeddings/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(response.into_body()).await;
    assert_eq!(body["statistics"]["messages"]["embeddingPercentage"], 66.67);

    let response = app
        .oneshot(post(
            "/search/messages",
            Some(builder.user_id().as_str()),
            json!({"query": "rest and fluids", "matchCount": 1, "matchThreshold": 0.3}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response.into_body()).await["count"], 1);
}
