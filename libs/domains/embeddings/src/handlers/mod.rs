mod dto;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use axum_helpers::{
    BadRequestValidationResponse, CallerId, InternalServerErrorResponse,
    ServiceUnavailableResponse, UnauthorizedResponse, ValidatedJson,
};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::error::EmbeddingResult;
use crate::models::{
    BackfillScope, EmbeddingStats, EmbeddingTable, MemoryMatch, MemorySearch, MessageMatch,
    MessageSearch, TableCoverage,
};
use crate::repository::EmbeddingRepository;
use crate::service::EmbeddingService;

pub use dto::{
    BackfillMemoriesRequest, BackfillMessagesRequest, BackfillResponse, MemorySearchRequest,
    MemorySearchResponse, MessageSearchRequest, MessageSearchResponse, StatsResponse,
};

const SEARCH_TAG: &str = "search";
const EMBEDDINGS_TAG: &str = "embeddings";

/// OpenAPI documentation for the vector search API
#[derive(OpenApi)]
#[openapi(
    paths(
        search_messages,
        search_memories,
        embedding_stats,
        backfill_messages,
        backfill_memories,
    ),
    components(
        schemas(
            MessageSearchRequest, MessageSearchResponse, MessageMatch,
            MemorySearchRequest, MemorySearchResponse, MemoryMatch,
            BackfillMessagesRequest, BackfillMemoriesRequest, BackfillResponse,
            StatsResponse, EmbeddingStats, TableCoverage,
        ),
        responses(
            BadRequestValidationResponse,
            UnauthorizedResponse,
            ServiceUnavailableResponse,
            InternalServerErrorResponse
        )
    ),
    tags(
        (name = SEARCH_TAG, description = "Semantic search over messages and patient memory"),
        (name = EMBEDDINGS_TAG, description = "Embedding coverage and backfill")
    )
)]
pub struct ApiDoc;

/// Create the vector router with all HTTP endpoints
pub fn router<R: EmbeddingRepository + 'static>(service: EmbeddingService<R>) -> Router {
    let shared_service = Arc::new(service);

    Router::new()
        .route("/search/messages", post(search_messages))
        .route("/search/memories", post(search_memories))
        .route("/embeddings/stats", get(embedding_stats))
        .route("/embeddings/backfill/messages", post(backfill_messages))
        .route("/embeddings/backfill/memories", post(backfill_memories))
        .with_state(shared_service)
}

/// Search the caller's messages by meaning
#[utoipa::path(
    post,
    path = "/search/messages",
    tag = SEARCH_TAG,
    request_body = MessageSearchRequest,
    params(("x-user-id" = String, Header, description = "Authenticated user id")),
    responses(
        (status = 200, description = "Matching messages, most similar first", body = MessageSearchResponse),
        (status = 400, response = BadRequestValidationResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 503, response = ServiceUnavailableResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn search_messages<R: EmbeddingRepository>(
    State(service): State<Arc<EmbeddingService<R>>>,
    CallerId(user_id): CallerId,
    ValidatedJson(input): ValidatedJson<MessageSearchRequest>,
) -> EmbeddingResult<Json<MessageSearchResponse>> {
    let filter = MessageSearch {
        conversation_id: input.conversation_id.clone(),
        owner_id: Some(user_id),
        threshold: input.threshold(),
        limit: input.limit(),
    };
    let results = service.search_messages(&input.query, filter).await?;

    Ok(Json(MessageSearchResponse {
        success: true,
        query: input.query,
        conversation_id: input.conversation_id,
        count: results.len(),
        results,
    }))
}

/// Search the caller's patient memory by meaning
#[utoipa::path(
    post,
    path = "/search/memories",
    tag = SEARCH_TAG,
    request_body = MemorySearchRequest,
    params(("x-user-id" = String, Header, description = "Authenticated user id")),
    responses(
        (status = 200, description = "Matching memory entities, most similar first", body = MemorySearchResponse),
        (status = 400, response = BadRequestValidationResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 503, response = ServiceUnavailableResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn search_memories<R: EmbeddingRepository>(
    State(service): State<Arc<EmbeddingService<R>>>,
    CallerId(user_id): CallerId,
    ValidatedJson(input): ValidatedJson<MemorySearchRequest>,
) -> EmbeddingResult<Json<MemorySearchResponse>> {
    let filter = MemorySearch {
        owner_id: user_id,
        threshold: input.threshold(),
        limit: input.limit(),
    };
    let results = service.search_memories(&input.query, filter).await?;

    Ok(Json(MemorySearchResponse {
        success: true,
        query: input.query,
        count: results.len(),
        results,
    }))
}

/// Embedding coverage per table
#[utoipa::path(
    get,
    path = "/embeddings/stats",
    tag = EMBEDDINGS_TAG,
    responses(
        (status = 200, description = "Row counts and embedding coverage", body = StatsResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn embedding_stats<R: EmbeddingRepository>(
    State(service): State<Arc<EmbeddingService<R>>>,
) -> EmbeddingResult<Json<StatsResponse>> {
    let statistics = service.stats().await?;
    Ok(Json(StatsResponse {
        success: true,
        statistics,
    }))
}

/// Embed one batch of the caller's messages that have no vector yet
///
/// Only conversations owned by the caller are touched; a `conversationId`
/// belonging to someone else selects nothing. Whole-table backfills go
/// through the `embedding-backfill` CLI.
#[utoipa::path(
    post,
    path = "/embeddings/backfill/messages",
    tag = EMBEDDINGS_TAG,
    request_body = BackfillMessagesRequest,
    params(("x-user-id" = String, Header, description = "Authenticated user id")),
    responses(
        (status = 200, description = "Batch processed", body = BackfillResponse),
        (status = 400, response = BadRequestValidationResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn backfill_messages<R: EmbeddingRepository>(
    State(service): State<Arc<EmbeddingService<R>>>,
    CallerId(user_id): CallerId,
    ValidatedJson(input): ValidatedJson<BackfillMessagesRequest>,
) -> EmbeddingResult<Json<BackfillResponse>> {
    let batch_size = input.batch_size();
    let scope = BackfillScope {
        conversation_id: input.conversation_id,
        user_id: Some(user_id),
    };
    let updated = service
        .backfill(EmbeddingTable::Messages, batch_size, &scope)
        .await?;

    Ok(Json(BackfillResponse::new(updated, "messages")))
}

/// Embed one batch of the caller's memory entities that have no vector yet
#[utoipa::path(
    post,
    path = "/embeddings/backfill/memories",
    tag = EMBEDDINGS_TAG,
    request_body = BackfillMemoriesRequest,
    params(("x-user-id" = String, Header, description = "Authenticated user id")),
    responses(
        (status = 200, description = "Batch processed", body = BackfillResponse),
        (status = 400, response = BadRequestValidationResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn backfill_memories<R: EmbeddingRepository>(
    State(service): State<Arc<EmbeddingService<R>>>,
    CallerId(user_id): CallerId,
    ValidatedJson(input): ValidatedJson<BackfillMemoriesRequest>,
) -> EmbeddingResult<Json<BackfillResponse>> {
    let updated = service
        .backfill(
            EmbeddingTable::PatientMemory,
            input.batch_size(),
            &BackfillScope::user(user_id),
        )
        .await?;

    Ok(Json(BackfillResponse::new(updated, "memory entities")))
}
