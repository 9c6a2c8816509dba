//! PostgreSQL sink
//!
//! Each upsert is its own statement, so a failed batch can be retried
//! record by record without partial-batch visibility concerns.

use super::{FilingSink, UpsertOutcome};
use crate::error::SinkError;
use async_trait::async_trait;
use fidx_common::types::FilingRecord;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

pub struct PgSink {
    pool: PgPool,
}

impl PgSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and bring the `filings` table up to date
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, SinkError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| SinkError(format!("migration failed: {}", e)))?;

        info!("Connected to filings database");
        Ok(Self { pool })
    }
}

#[async_trait]
impl FilingSink for PgSink {
    async fn upsert(&self, record: &FilingRecord) -> Result<UpsertOutcome, SinkError> {
        let cik = i64::try_from(record.company_id.value())
            .map_err(|_| SinkError(format!("company identifier {} out of range", record.company_id)))?;

        let result = sqlx::query(
            r#"
            INSERT INTO filings (cik, company_name, form_type, filed_date, document_path)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (cik, form_type, filed_date, document_path)
            DO NOTHING
            "#,
        )
        .bind(cik)
        .bind(&record.company_name)
        .bind(&record.form_type)
        .bind(record.filed_date)
        .bind(&record.document_path)
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() == 0 {
            UpsertOutcome::Duplicate
        } else {
            UpsertOutcome::Committed
        })
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
