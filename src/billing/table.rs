//! BILLING_DATA table source and sink

use crate::billing::model::BillingData;
use crate::core::{ItemError, ItemReader, ItemWriter, StepContext};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Create the BILLING_DATA table if it does not exist
pub async fn ensure_billing_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS BILLING_DATA (
            DATA_YEAR INTEGER NOT NULL,
            DATA_MONTH INTEGER NOT NULL,
            ACCOUNT_ID INTEGER NOT NULL,
            PHONE_NUMBER TEXT NOT NULL,
            DATA_USAGE REAL NOT NULL,
            CALL_DURATION INTEGER NOT NULL,
            SMS_COUNT INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_billing_period ON BILLING_DATA(DATA_YEAR, DATA_MONTH);
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create BILLING_DATA table")?;

    Ok(())
}

/// Number of rows in BILLING_DATA
pub async fn count_billing_rows(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM BILLING_DATA")
        .fetch_one(pool)
        .await
        .context("Failed to count BILLING_DATA rows")?;
    Ok(row.try_get("n")?)
}

/// Inserts each chunk in a single transaction.
///
/// Opening the writer clears the rows of the month named by the `data.year`
/// and `data.month` job parameters, so a restarted ingestion does not insert
/// the chunks an earlier attempt committed a second time.
pub struct BillingTableWriter {
    pool: SqlitePool,
}

impl BillingTableWriter {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ItemWriter<BillingData> for BillingTableWriter {
    async fn open(&mut self, ctx: &StepContext) -> anyhow::Result<()> {
        let year = ctx.require_int("data.year")?;
        let month = ctx.require_int("data.month")?;
        ensure_billing_table(&self.pool).await?;

        let cleared = sqlx::query("DELETE FROM BILLING_DATA WHERE DATA_YEAR = ?1 AND DATA_MONTH = ?2")
            .bind(year)
            .bind(month)
            .execute(&self.pool)
            .await
            .context("Failed to clear BILLING_DATA")?
            .rows_affected();
        if cleared > 0 {
            info!(
                step = %ctx.step_name,
                year,
                month,
                rows = cleared,
                "Cleared rows left by an earlier attempt"
            );
        }
        Ok(())
    }

    async fn write(&mut self, items: &[BillingData]) -> Result<(), ItemError> {
        let sink_error = |e: sqlx::Error| ItemError::sink_write(format!("BILLING_DATA insert failed: {}", e));

        let mut tx = self.pool.begin().await.map_err(sink_error)?;
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO BILLING_DATA
                (DATA_YEAR, DATA_MONTH, ACCOUNT_ID, PHONE_NUMBER, DATA_USAGE, CALL_DURATION, SMS_COUNT)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(item.data_year)
            .bind(item.data_month)
            .bind(item.account_id)
            .bind(&item.phone_number)
            .bind(f64::from(item.data_usage))
            .bind(item.call_duration)
            .bind(item.sms_count)
            .execute(&mut *tx)
            .await
            .map_err(sink_error)?;
        }
        tx.commit().await.map_err(sink_error)?;

        debug!(rows = items.len(), "Inserted BILLING_DATA chunk");
        Ok(())
    }
}

/// Reads the BILLING_DATA rows of the month named by the `data.year` and
/// `data.month` job parameters, in insertion order
pub struct BillingTableReader {
    pool: SqlitePool,
    rows: VecDeque<BillingData>,
}

impl BillingTableReader {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            rows: VecDeque::new(),
        }
    }
}

#[async_trait]
impl ItemReader<BillingData> for BillingTableReader {
    async fn open(&mut self, ctx: &StepContext) -> anyhow::Result<()> {
        let year = ctx.require_int("data.year")?;
        let month = ctx.require_int("data.month")?;
        ensure_billing_table(&self.pool).await?;

        let rows = sqlx::query(
            r#"
            SELECT DATA_YEAR, DATA_MONTH, ACCOUNT_ID, PHONE_NUMBER, DATA_USAGE, CALL_DURATION, SMS_COUNT
            FROM BILLING_DATA
            WHERE DATA_YEAR = ?1 AND DATA_MONTH = ?2
            ORDER BY rowid ASC
            "#,
        )
        .bind(year)
        .bind(month)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query BILLING_DATA")?;

        self.rows = rows
            .iter()
            .map(|row| -> Result<BillingData> {
                Ok(BillingData {
                    data_year: row.try_get("DATA_YEAR")?,
                    data_month: row.try_get("DATA_MONTH")?,
                    account_id: row.try_get("ACCOUNT_ID")?,
                    phone_number: row.try_get("PHONE_NUMBER")?,
                    data_usage: row.try_get::<f64, _>("DATA_USAGE")? as f32,
                    call_duration: row.try_get("CALL_DURATION")?,
                    sms_count: row.try_get("SMS_COUNT")?,
                })
            })
            .collect::<Result<_>>()?;

        info!(
            step = %ctx.step_name,
            year,
            month,
            rows = self.rows.len(),
            "Loaded billing rows"
        );
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<BillingData>, ItemError> {
        Ok(self.rows.pop_front())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.rows.clear();
        Ok(())
    }
}
