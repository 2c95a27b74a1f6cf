//! Connection cleanup for graceful shutdown.

use tracing::{error, info};

/// Closes a sea-orm connection pool and logs the outcome.
///
/// ```ignore
/// create_production_app(router, &config.server, Duration::from_secs(30), async move {
///     close_postgres(db, "main").await;
/// })
/// .await?;
/// ```
pub async fn close_postgres(db: sea_orm::DatabaseConnection, name: &str) {
    match db.close().await {
        Ok(_) => info!("PostgreSQL connection '{}' closed successfully", name),
        Err(e) => error!("Error closing PostgreSQL connection '{}': {}", name, e),
    }
}
