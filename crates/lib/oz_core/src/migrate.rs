//! Embedded schema migrations (`oz_core/migrations/`).

use sqlx::PgPool;

/// Bring the schema up to date.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
