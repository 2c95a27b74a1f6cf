use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, Statement};
use tracing::info;

use crate::common::{DatabaseError, DatabaseResult};

/// Installed version of `name`, or `None` when the extension is not installed.
pub async fn extension_version(
    db: &DatabaseConnection,
    name: &str,
) -> DatabaseResult<Option<String>> {
    let stmt = Statement::from_sql_and_values(
        DatabaseBackend::Postgres,
        "SELECT extversion FROM pg_extension WHERE extname = $1",
        [name.into()],
    );

    let row = db.query_one_raw(stmt).await?;
    Ok(match row {
        Some(row) => Some(row.try_get::<String>("", "extversion")?),
        None => None,
    })
}

/// Fails unless `name` is installed at `minimum` (`major.minor`) or newer.
///
/// ```ignore
/// require_extension(&db, "vector", (0, 8)).await?;
/// ```
pub async fn require_extension(
    db: &DatabaseConnection,
    name: &str,
    minimum: (u32, u32),
) -> DatabaseResult<String> {
    let required = format!("{}.{}", minimum.0, minimum.1);

    let Some(found) = extension_version(db, name).await? else {
        return Err(DatabaseError::ExtensionUnavailable {
            name: name.to_string(),
            required,
            found: "not installed".to_string(),
        });
    };

    if !version_at_least(&found, minimum) {
        return Err(DatabaseError::ExtensionUnavailable {
            name: name.to_string(),
            required,
            found,
        });
    }

    info!(extension = name, version = %found, "Extension available");
    Ok(found)
}

/// Compares the leading `major.minor` of a version string such as `0.8.0`.
pub fn version_at_least(version: &str, minimum: (u32, u32)) -> bool {
    let mut parts = version
        .split('.')
        .map(|part| part.trim().parse::<u32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);

    (major, minor) >= minimum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_at_least() {
        assert!(version_at_least("0.8.0", (0, 8)));
        assert!(version_at_least("0.10.1", (0, 8)));
        assert!(version_at_least("1.0", (0, 8)));
        assert!(!version_at_least("0.7.4", (0, 8)));
        assert!(!version_at_least("garbage", (0, 8)));
    }
}
