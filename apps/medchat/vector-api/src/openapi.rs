use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    components(
        schemas(axum_helpers::ErrorResponse)
    ),
    info(
        title = "MedChat Vector API",
        version = "0.1.0",
        description = "Semantic search over chat messages and patient memory, with embedding coverage and backfill"
    ),
    servers(
        (url = "/api", description = "API base path")
    ),
    nest(
        (path = crate::api::VECTOR_PATH, api = domain_embeddings::ApiDoc)
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_paths_are_nested() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();

        for expected in [
            "/vector/search/messages",
            "/vector/search/memories",
            "/vector/embeddings/stats",
            "/vector/embeddings/backfill/messages",
            "/vector/embeddings/backfill/memories",
        ] {
            assert!(paths.iter().any(|p| p.as_str() == expected), "missing {}", expected);
        }
    }
}
