//! Database adapters wiring: pool creation and schema bootstrap.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

/// DDL for every table the infra Postgres adapters touch.
pub const SCHEMA_SQL: &str = include_str!("../sql/schema.sql");

pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    info!(max_connections, "postgres pool ready");
    Ok(pool)
}

/// Create missing tables and indexes. Safe to run on every start.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;
    info!("infra schema ensured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_covers_every_adapter_table() {
        for table in [
            "job_queue_jobs",
            "job_buffer_items",
            "facets",
            "facet_values",
            "assets",
            "collections",
            "job_posts",
        ] {
            assert!(
                SCHEMA_SQL.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")),
                "missing table {table}"
            );
        }
    }
}
