//! Request and response bodies for the vector endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{
    DEFAULT_BATCH_SIZE, DEFAULT_MATCH_THRESHOLD, DEFAULT_MEMORY_MATCH_COUNT,
    DEFAULT_MESSAGE_MATCH_COUNT, EmbeddingStats, MemoryMatch, MessageMatch,
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageSearchRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Query text is required"))]
    #[schema(example = "chest pain after exercise")]
    pub query: String,
    /// Restrict the search to one of the caller's conversations.
    pub conversation_id: Option<String>,
    /// Minimum cosine similarity, exclusive. Defaults to 0.7.
    #[validate(range(min = 0.0, max = 1.0))]
    pub match_threshold: Option<f64>,
    /// Defaults to 10.
    #[validate(range(min = 1, max = 100))]
    pub match_count: Option<u32>,
}

impl MessageSearchRequest {
    pub fn threshold(&self) -> f64 {
        self.match_threshold.unwrap_or(DEFAULT_MATCH_THRESHOLD)
    }

    pub fn limit(&self) -> u32 {
        self.match_count.unwrap_or(DEFAULT_MESSAGE_MATCH_COUNT)
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemorySearchRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Query text is required"))]
    #[schema(example = "penicillin allergy")]
    pub query: String,
    #[validate(range(min = 0.0, max = 1.0))]
    pub match_threshold: Option<f64>,
    /// Defaults to 5.
    #[validate(range(min = 1, max = 50))]
    pub match_count: Option<u32>,
}

impl MemorySearchRequest {
    pub fn threshold(&self) -> f64 {
        self.match_threshold.unwrap_or(DEFAULT_MATCH_THRESHOLD)
    }

    pub fn limit(&self) -> u32 {
        self.match_count.unwrap_or(DEFAULT_MEMORY_MATCH_COUNT)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageSearchResponse {
    pub success: bool,
    pub query: String,
    pub conversation_id: Option<String>,
    pub results: Vec<MessageMatch>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemorySearchResponse {
    pub success: bool,
    pub query: String,
    pub results: Vec<MemoryMatch>,
    pub count: usize,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackfillMessagesRequest {
    /// Defaults to 100.
    #[validate(range(min = 1, max = 500))]
    pub batch_size: Option<u64>,
    pub conversation_id: Option<String>,
}

impl BackfillMessagesRequest {
    pub fn batch_size(&self) -> u64 {
        self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackfillMemoriesRequest {
    /// Defaults to 100.
    #[validate(range(min = 1, max = 500))]
    pub batch_size: Option<u64>,
}

impl BackfillMemoriesRequest {
    pub fn batch_size(&self) -> u64 {
        self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackfillResponse {
    pub success: bool,
    pub updated_count: u64,
    pub message: String,
}

impl BackfillResponse {
    pub fn new(updated_count: u64, noun: &str) -> Self {
        Self {
            success: true,
            updated_count,
            message: format!("Generated embeddings for {} {}", updated_count, noun),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatsResponse {
    pub success: bool,
    pub statistics: EmbeddingStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_defaults() {
        let request: MessageSearchRequest = serde_json::from_str(r#"{"query":"fever"}"#).unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.threshold(), 0.7);
        assert_eq!(request.limit(), 10);

        let request: MemorySearchRequest = serde_json::from_str(r#"{"query":"fever"}"#).unwrap();
        assert_eq!(request.limit(), 5);
    }

    #[test]
    fn test_missing_query_fails_validation() {
        let request: MemorySearchRequest = serde_json::from_str("{}").unwrap();
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("query"));
    }

    #[test]
    fn test_ranges() {
        let request: MessageSearchRequest =
            serde_json::from_str(r#"{"query":"x","matchThreshold":1.2}"#).unwrap();
        assert!(request.validate().is_err());

        let request: MemorySearchRequest =
            serde_json::from_str(r#"{"query":"x","matchCount":51}"#).unwrap();
        assert!(request.validate().is_err());

        let request: BackfillMessagesRequest = serde_json::from_str(r#"{"batchSize":0}"#).unwrap();
        assert!(request.validate().is_err());
        assert_eq!(BackfillMemoriesRequest::default().batch_size(), 100);
    }

    #[test]
    fn test_backfill_response_shape() {
        let json = serde_json::to_value(BackfillResponse::new(2, "messages")).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["updatedCount"], 2);
        assert_eq!(json["message"], "Generated embeddings for 2 messages");
    }
}
