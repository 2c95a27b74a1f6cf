/// Error type for connection management and database housekeeping.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sea_orm::DbErr),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Health check failed: {0}")]
    HealthCheckFailed(String),

    /// A required extension is absent or older than the supported version.
    #[error("Extension '{name}' {found} does not satisfy required version >= {required}")]
    ExtensionUnavailable {
        name: String,
        required: String,
        found: String,
    },

    #[error("Migration error: {0}")]
    MigrationError(String),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;
