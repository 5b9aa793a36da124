use sqlx::PgPool;
use tracing::info;

pub const SCHEMA_SQL: &str = include_str!("../sql/schema.sql");

/// Create the search tables if missing.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;
    info!("search schema ensured");
    Ok(())
}
