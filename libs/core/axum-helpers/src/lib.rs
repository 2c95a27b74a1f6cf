//! # Axum Helpers
//!
//! Shared building blocks for the HTTP services in this workspace.
//!
//! - **[`server`]**: router bootstrap with OpenAPI UIs, health/ready, graceful shutdown
//! - **[`http`]**: CORS and security header middleware
//! - **[`errors`]**: `AppError` and the JSON error body
//! - **[`extractors`]**: `ValidatedJson` and `CallerId`
//!
//! ## Quick Start
//!
//! ```ignore
//! use axum_helpers::{create_production_app, create_router, health_router};
//!
//! let router = create_router::<ApiDoc>(api_routes)
//!     .await?
//!     .merge(health_router(core_config::app_info!()));
//! create_production_app(router, &config.server, Duration::from_secs(30), async {}).await?;
//! ```

pub mod errors;
pub mod extractors;
pub mod http;
pub mod server;

pub use server::{
    HealthCheckFuture, HealthResponse, ShutdownCoordinator, close_postgres,
    create_production_app, create_router, create_router_without_cors, health_router,
    run_health_checks, shutdown_signal,
};

pub use http::{create_cors_layer, cors_layer_from_env, security_headers};

pub use errors::responses::{
    BadRequestValidationResponse, InternalServerErrorResponse, ServiceUnavailableResponse,
    UnauthorizedResponse,
};
pub use errors::{AppError, ErrorCode, ErrorResponse, error_response};

pub use extractors::{CALLER_ID_HEADER, CallerId, ValidatedJson};
