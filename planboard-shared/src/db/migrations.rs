/// Database migration runner
///
/// Migrations live in the workspace-level `migrations/` directory and are
/// embedded into the binary at compile time with `sqlx::migrate!`.
///
/// # Example
///
/// ```no_run
/// use planboard_shared::db::migrations::run_migrations;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// run_migrations(&pool).await?;
/// # Ok(())
/// # }
/// ```

use sqlx::{migrate::MigrateDatabase, migrate::Migrator, postgres::PgPool, Postgres};
use tracing::{debug, info, warn};

/// Embedded migrations
pub static MIGRATOR: Migrator = sqlx::migrate!("../migrations");

/// Migration status information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Number of migrations recorded as applied
    pub applied_migrations: usize,

    /// Latest applied version
    pub latest_version: Option<i64>,

    /// Number of embedded migrations not yet applied
    pub pending_migrations: usize,
}

impl MigrationStatus {
    /// Whether every embedded migration has been applied
    pub fn is_up_to_date(&self) -> bool {
        self.pending_migrations == 0
    }
}

/// Runs all pending migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    info!(
        embedded = MIGRATOR.iter().count(),
        "Running database migrations"
    );

    match MIGRATOR.run(pool).await {
        Ok(()) => {
            info!("Database migrations completed");
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "Migration failed");
            Err(e)
        }
    }
}

/// Compares applied migrations against the embedded set
pub async fn get_migration_status(pool: &PgPool) -> Result<MigrationStatus, sqlx::Error> {
    let table_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (
            SELECT FROM information_schema.tables
            WHERE table_schema = 'public'
            AND table_name = '_sqlx_migrations'
        )",
    )
    .fetch_one(pool)
    .await?;

    let embedded: Vec<i64> = MIGRATOR.iter().map(|m| m.version).collect();

    if !table_exists {
        debug!("Migrations table does not exist yet");
        return Ok(MigrationStatus {
            applied_migrations: 0,
            latest_version: None,
            pending_migrations: embedded.len(),
        });
    }

    let applied: Vec<i64> = sqlx::query_scalar(
        "SELECT version FROM _sqlx_migrations WHERE success = true ORDER BY version",
    )
    .fetch_all(pool)
    .await?;

    Ok(summarize(&embedded, &applied))
}

fn summarize(embedded: &[i64], applied: &[i64]) -> MigrationStatus {
    MigrationStatus {
        applied_migrations: applied.len(),
        latest_version: applied.iter().copied().max(),
        pending_migrations: embedded.iter().filter(|v| !applied.contains(v)).count(),
    }
}

/// Creates the database if it doesn't exist (development and tests)
pub async fn ensure_database_exists(database_url: &str) -> Result<(), sqlx::Error> {
    if !Postgres::database_exists(database_url).await? {
        info!("Database does not exist, creating it");
        Postgres::create_database(database_url).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_embedded() {
        assert!(MIGRATOR.iter().count() >= 1);
    }

    #[test]
    fn test_summarize_pending() {
        let status = summarize(&[1, 2, 3], &[1, 2]);
        assert_eq!(status.applied_migrations, 2);
        assert_eq!(status.latest_version, Some(2));
        assert_eq!(status.pending_migrations, 1);
        assert!(!status.is_up_to_date());
    }

    #[test]
    fn test_summarize_up_to_date() {
        let status = summarize(&[1, 2], &[1, 2]);
        assert!(status.is_up_to_date());
    }
}
