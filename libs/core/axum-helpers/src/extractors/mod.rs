//! Custom extractors for Axum handlers.

pub mod caller_id;
pub mod validated_json;

pub use caller_id::{CALLER_ID_HEADER, CallerId};
pub use validated_json::ValidatedJson;
