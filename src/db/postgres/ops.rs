use std::str::FromStr;

use anyhow::Context;
use bigdecimal::BigDecimal;
use log::error;

use crate::db::models::{
    Period, PlentyAggregateRow, PoolAggregateRow, PoolCheckpoint, SpotPrice, Token,
    TokenAggregateRow, TokenStandard, TransactionRecord,
};
use crate::db::postgres::PostgresClient;

/// Registry row for a paired-reserve pool (`pool_v2` table).
#[derive(Debug, Clone)]
pub struct V2PoolRow {
    pub address: String,
    pub token_1: i64,
    pub token_2: i64,
    pub fees: i64,
    pub kind: String,
}

/// Registry row for a concentrated-liquidity pool (`pool_v3` table).
#[derive(Debug, Clone)]
pub struct V3PoolRow {
    pub address: String,
    pub token_x: i64,
    pub token_y: i64,
    pub fee_bps: i64,
}

/// Read a `numeric` column selected with a `::text` cast.
fn numeric_col(row: &tokio_postgres::Row, col: &str) -> anyhow::Result<BigDecimal> {
    let text: String = row.try_get(col)?;
    BigDecimal::from_str(&text).with_context(|| format!("Invalid numeric in column {}", col))
}

impl PostgresClient {
    // ==================== TRANSACTIONS ====================

    /// Whether a transaction row with this operation id already exists.
    ///
    /// Operation ids are unique across the whole transaction log; a hit
    /// means the operation was fully recorded, aggregate updates included.
    pub async fn transaction_exists(&self, id: i64) -> anyhow::Result<bool> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT 1 FROM transaction WHERE id = $1", &[&id])
            .await?;
        Ok(row.is_some())
    }

    /// Insert the canonical transaction row. Uniqueness of `id` is
    /// guaranteed by the caller's idempotency gate.
    pub async fn insert_transaction(&self, txn: &TransactionRecord) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO transaction (
                id, ts, hash, pool, account, type,
                token_1_amount, token_2_amount, value
            ) VALUES (
                $1, $2, $3, $4, $5, $6,
                $7::text::numeric, $8::text::numeric, $9::text::numeric
            )
        "#;

        let token_1_amount = txn.amounts.token1.to_string();
        let token_2_amount = txn.amounts.token2.to_string();
        let value = txn.recorded_value().to_string();

        client
            .execute(
                query,
                &[
                    &txn.id,
                    &txn.timestamp,
                    &txn.hash,
                    &txn.pool.address,
                    &txn.account,
                    &txn.kind,
                    &token_1_amount,
                    &token_2_amount,
                    &value,
                ],
            )
            .await
            .map_err(|e| {
                error!("Failed to insert transaction {}: {:?}", txn.id, e);
                e
            })?;

        Ok(())
    }

    // ==================== POOL AGGREGATES ====================

    /// Whether a pool has ever been aggregated before.
    ///
    /// Used by the token-aggregate reconciliation to decide between the
    /// delta adjustment and the full-reserve bootstrap on the first
    /// observation of a pool.
    pub async fn pool_seen(&self, pool: &str) -> anyhow::Result<bool> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT 1 FROM pool_aggregate_day WHERE pool = $1 LIMIT 1",
                &[&pool],
            )
            .await?;
        Ok(row.is_some())
    }

    /// Get the pool aggregate row for a bucket, if present.
    pub async fn get_pool_aggregate(
        &self,
        period: Period,
        ts: i64,
        pool: &str,
    ) -> anyhow::Result<Option<PoolAggregateRow>> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            SELECT
                ts, pool,
                token_1_volume::text, token_2_volume::text, volume_value::text,
                token_1_fees::text, token_2_fees::text, fees_value::text,
                token_1_locked::text, token_2_locked::text, locked_value::text
            FROM pool_aggregate_{}
            WHERE ts = $1 AND pool = $2
            "#,
            period.suffix()
        );

        let row = client.query_opt(&query, &[&ts, &pool]).await?;
        row.map(|r| row_to_pool_aggregate(&r)).transpose()
    }

    pub async fn insert_pool_aggregate(
        &self,
        period: Period,
        row: &PoolAggregateRow,
    ) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            INSERT INTO pool_aggregate_{} (
                ts, pool,
                token_1_volume, token_2_volume, volume_value,
                token_1_fees, token_2_fees, fees_value,
                token_1_locked, token_2_locked, locked_value
            ) VALUES (
                $1, $2,
                $3::text::numeric, $4::text::numeric, $5::text::numeric,
                $6::text::numeric, $7::text::numeric, $8::text::numeric,
                $9::text::numeric, $10::text::numeric, $11::text::numeric
            )
            "#,
            period.suffix()
        );

        let vals = [
            row.token_1_volume.to_string(),
            row.token_2_volume.to_string(),
            row.volume_value.to_string(),
            row.token_1_fees.to_string(),
            row.token_2_fees.to_string(),
            row.fees_value.to_string(),
            row.token_1_locked.to_string(),
            row.token_2_locked.to_string(),
            row.locked_value.to_string(),
        ];

        client
            .execute(
                &query,
                &[
                    &row.ts, &row.pool, &vals[0], &vals[1], &vals[2], &vals[3], &vals[4], &vals[5],
                    &vals[6], &vals[7], &vals[8],
                ],
            )
            .await
            .map_err(|e| {
                error!(
                    "Failed to insert pool aggregate for {} at {}: {:?}",
                    row.pool, row.ts, e
                );
                e
            })?;

        Ok(())
    }

    pub async fn update_pool_aggregate(
        &self,
        period: Period,
        row: &PoolAggregateRow,
    ) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            UPDATE pool_aggregate_{} SET
                token_1_volume = $3::text::numeric,
                token_2_volume = $4::text::numeric,
                volume_value = $5::text::numeric,
                token_1_fees = $6::text::numeric,
                token_2_fees = $7::text::numeric,
                fees_value = $8::text::numeric,
                token_1_locked = $9::text::numeric,
                token_2_locked = $10::text::numeric,
                locked_value = $11::text::numeric
            WHERE ts = $1 AND pool = $2
            "#,
            period.suffix()
        );

        let vals = [
            row.token_1_volume.to_string(),
            row.token_2_volume.to_string(),
            row.volume_value.to_string(),
            row.token_1_fees.to_string(),
            row.token_2_fees.to_string(),
            row.fees_value.to_string(),
            row.token_1_locked.to_string(),
            row.token_2_locked.to_string(),
            row.locked_value.to_string(),
        ];

        client
            .execute(
                &query,
                &[
                    &row.ts, &row.pool, &vals[0], &vals[1], &vals[2], &vals[3], &vals[4], &vals[5],
                    &vals[6], &vals[7], &vals[8],
                ],
            )
            .await
            .map_err(|e| {
                error!(
                    "Failed to update pool aggregate for {} at {}: {:?}",
                    row.pool, row.ts, e
                );
                e
            })?;

        Ok(())
    }

    // ==================== TOKEN AGGREGATES ====================

    /// Get the token aggregate row for a bucket, if present.
    pub async fn get_token_aggregate(
        &self,
        period: Period,
        ts: i64,
        token: i64,
    ) -> anyhow::Result<Option<TokenAggregateRow>> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            SELECT
                ts, token,
                open_price::text, high_price::text, low_price::text, close_price::text,
                volume::text, volume_value::text, fees::text, fees_value::text,
                locked::text, locked_value::text
            FROM token_aggregate_{}
            WHERE ts = $1 AND token = $2
            "#,
            period.suffix()
        );

        let row = client.query_opt(&query, &[&ts, &token]).await?;
        row.map(|r| row_to_token_aggregate(&r)).transpose()
    }

    /// Latest token aggregate row strictly before `ts`, used to carry the
    /// locked figure forward into a new bucket.
    pub async fn latest_token_aggregate_before(
        &self,
        period: Period,
        token: i64,
        ts: i64,
    ) -> anyhow::Result<Option<TokenAggregateRow>> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            SELECT
                ts, token,
                open_price::text, high_price::text, low_price::text, close_price::text,
                volume::text, volume_value::text, fees::text, fees_value::text,
                locked::text, locked_value::text
            FROM token_aggregate_{}
            WHERE token = $1 AND ts < $2
            ORDER BY ts DESC
            LIMIT 1
            "#,
            period.suffix()
        );

        let row = client.query_opt(&query, &[&token, &ts]).await?;
        row.map(|r| row_to_token_aggregate(&r)).transpose()
    }

    pub async fn insert_token_aggregate(
        &self,
        period: Period,
        row: &TokenAggregateRow,
    ) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            INSERT INTO token_aggregate_{} (
                ts, token,
                open_price, high_price, low_price, close_price,
                volume, volume_value, fees, fees_value,
                locked, locked_value
            ) VALUES (
                $1, $2,
                $3::text::numeric, $4::text::numeric, $5::text::numeric, $6::text::numeric,
                $7::text::numeric, $8::text::numeric, $9::text::numeric, $10::text::numeric,
                $11::text::numeric, $12::text::numeric
            )
            "#,
            period.suffix()
        );

        let vals = [
            row.open_price.to_string(),
            row.high_price.to_string(),
            row.low_price.to_string(),
            row.close_price.to_string(),
            row.volume.to_string(),
            row.volume_value.to_string(),
            row.fees.to_string(),
            row.fees_value.to_string(),
            row.locked.to_string(),
            row.locked_value.to_string(),
        ];

        client
            .execute(
                &query,
                &[
                    &row.ts, &row.token, &vals[0], &vals[1], &vals[2], &vals[3], &vals[4], &vals[5],
                    &vals[6], &vals[7], &vals[8], &vals[9],
                ],
            )
            .await
            .map_err(|e| {
                error!(
                    "Failed to insert token aggregate for {} at {}: {:?}",
                    row.token, row.ts, e
                );
                e
            })?;

        Ok(())
    }

    pub async fn update_token_aggregate(
        &self,
        period: Period,
        row: &TokenAggregateRow,
    ) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        // open_price is immutable once the bucket exists
        let query = format!(
            r#"
            UPDATE token_aggregate_{} SET
                high_price = $3::text::numeric,
                low_price = $4::text::numeric,
                close_price = $5::text::numeric,
                volume = $6::text::numeric,
                volume_value = $7::text::numeric,
                fees = $8::text::numeric,
                fees_value = $9::text::numeric,
                locked = $10::text::numeric,
                locked_value = $11::text::numeric
            WHERE ts = $1 AND token = $2
            "#,
            period.suffix()
        );

        let vals = [
            row.high_price.to_string(),
            row.low_price.to_string(),
            row.close_price.to_string(),
            row.volume.to_string(),
            row.volume_value.to_string(),
            row.fees.to_string(),
            row.fees_value.to_string(),
            row.locked.to_string(),
            row.locked_value.to_string(),
        ];

        client
            .execute(
                &query,
                &[
                    &row.ts, &row.token, &vals[0], &vals[1], &vals[2], &vals[3], &vals[4], &vals[5],
                    &vals[6], &vals[7], &vals[8],
                ],
            )
            .await
            .map_err(|e| {
                error!(
                    "Failed to update token aggregate for {} at {}: {:?}",
                    row.token, row.ts, e
                );
                e
            })?;

        Ok(())
    }

    // ==================== SYSTEM AGGREGATES ====================

    /// Get the system-wide aggregate row for a bucket, if present.
    pub async fn get_plenty_aggregate(
        &self,
        period: Period,
        ts: i64,
    ) -> anyhow::Result<Option<PlentyAggregateRow>> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            SELECT ts, volume_value::text, fees_value::text, tvl_value::text
            FROM plenty_aggregate_{}
            WHERE ts = $1
            "#,
            period.suffix()
        );

        let row = client.query_opt(&query, &[&ts]).await?;
        row.map(|r| row_to_plenty_aggregate(&r)).transpose()
    }

    /// TVL of the latest hourly system bucket at or before `ts`.
    pub async fn latest_hour_tvl(&self, ts: i64) -> anyhow::Result<Option<BigDecimal>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT tvl_value::text
                FROM plenty_aggregate_hour
                WHERE ts <= $1
                ORDER BY ts DESC
                LIMIT 1
                "#,
                &[&ts],
            )
            .await?;

        row.map(|r| numeric_col(&r, "tvl_value")).transpose()
    }

    /// Sum of locked value over the latest hourly token aggregate of every
    /// token at or before `ts`. Seeds the TVL of a brand-new system bucket.
    pub async fn total_locked_value(&self, ts: i64) -> anyhow::Result<BigDecimal> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                r#"
                SELECT COALESCE(SUM(t.locked_value), 0)::text AS tvl
                FROM (
                    SELECT token, MAX(ts) AS mts
                    FROM token_aggregate_hour
                    WHERE ts <= $1
                    GROUP BY token
                ) r
                JOIN token_aggregate_hour t
                    ON r.token = t.token AND r.mts = t.ts
                "#,
                &[&ts],
            )
            .await?;

        numeric_col(&row, "tvl")
    }

    pub async fn insert_plenty_aggregate(
        &self,
        period: Period,
        row: &PlentyAggregateRow,
    ) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            INSERT INTO plenty_aggregate_{} (ts, volume_value, fees_value, tvl_value)
            VALUES ($1, $2::text::numeric, $3::text::numeric, $4::text::numeric)
            "#,
            period.suffix()
        );

        let vals = [
            row.volume_value.to_string(),
            row.fees_value.to_string(),
            row.tvl_value.to_string(),
        ];

        client
            .execute(&query, &[&row.ts, &vals[0], &vals[1], &vals[2]])
            .await
            .map_err(|e| {
                error!("Failed to insert system aggregate at {}: {:?}", row.ts, e);
                e
            })?;

        Ok(())
    }

    pub async fn update_plenty_aggregate(
        &self,
        period: Period,
        row: &PlentyAggregateRow,
    ) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            UPDATE plenty_aggregate_{} SET
                volume_value = $2::text::numeric,
                fees_value = $3::text::numeric,
                tvl_value = $4::text::numeric
            WHERE ts = $1
            "#,
            period.suffix()
        );

        let vals = [
            row.volume_value.to_string(),
            row.fees_value.to_string(),
            row.tvl_value.to_string(),
        ];

        client
            .execute(&query, &[&row.ts, &vals[0], &vals[1], &vals[2]])
            .await
            .map_err(|e| {
                error!("Failed to update system aggregate at {}: {:?}", row.ts, e);
                e
            })?;

        Ok(())
    }

    // ==================== SPOT PRICES ====================

    /// Most recent spot price of a token at or before `ts`.
    pub async fn latest_spot_price(
        &self,
        token: i64,
        ts: i64,
    ) -> anyhow::Result<Option<BigDecimal>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT value::text
                FROM price_spot
                WHERE token = $1 AND ts <= $2
                ORDER BY ts DESC
                LIMIT 1
                "#,
                &[&token, &ts],
            )
            .await?;

        row.map(|r| numeric_col(&r, "value")).transpose()
    }

    /// Insert or overwrite the spot price at an instant.
    pub async fn upsert_spot_price(&self, spot: &SpotPrice) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO price_spot (ts, token, value)
            VALUES ($1, $2, $3::text::numeric)
            ON CONFLICT (ts, token) DO UPDATE SET
                value = EXCLUDED.value
        "#;

        let value = spot.value.to_string();

        client
            .execute(query, &[&spot.ts, &spot.token, &value])
            .await
            .map_err(|e| {
                error!(
                    "Failed to upsert spot price for token {} at {}: {:?}",
                    spot.token, spot.ts, e
                );
                e
            })?;

        Ok(())
    }

    // ==================== CHECKPOINTS ====================

    /// Last indexed level for a pool, if any.
    pub async fn get_last_indexed(&self, pool: &str) -> anyhow::Result<Option<i64>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT level FROM last_indexed WHERE pool = $1", &[&pool])
            .await?;

        Ok(row.map(|r| r.get("level")))
    }

    /// Record the last indexed level for a pool.
    pub async fn set_last_indexed(&self, checkpoint: &PoolCheckpoint) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO last_indexed (pool, level, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (pool) DO UPDATE SET
                level = EXCLUDED.level,
                updated_at = EXCLUDED.updated_at
        "#;

        client
            .execute(
                query,
                &[&checkpoint.pool, &checkpoint.level, &checkpoint.updated_at],
            )
            .await
            .map_err(|e| {
                error!(
                    "Failed to record last indexed level for pool {}: {:?}",
                    checkpoint.pool, e
                );
                e
            })?;

        Ok(())
    }

    // ==================== REGISTRY ====================

    /// All tokens known to the registry.
    pub async fn get_registry_tokens(&self) -> anyhow::Result<Vec<Token>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, name, symbol, decimals, standard, address, token_id FROM token",
                &[],
            )
            .await?;

        rows.iter().map(row_to_token).collect()
    }

    /// All paired-reserve pools known to the registry.
    pub async fn get_v2_pools(&self) -> anyhow::Result<Vec<V2PoolRow>> {
        let client = self.pool.get().await?;
        let rows = client
            .query("SELECT address, token_1, token_2, fees, type FROM pool_v2", &[])
            .await?;

        Ok(rows
            .iter()
            .map(|row| V2PoolRow {
                address: row.get("address"),
                token_1: row.get("token_1"),
                token_2: row.get("token_2"),
                fees: row.get("fees"),
                kind: row.get("type"),
            })
            .collect())
    }

    /// All concentrated-liquidity pools known to the registry.
    pub async fn get_v3_pools(&self) -> anyhow::Result<Vec<V3PoolRow>> {
        let client = self.pool.get().await?;
        let rows = client
            .query("SELECT address, token_x, token_y, fee_bps FROM pool_v3", &[])
            .await?;

        Ok(rows
            .iter()
            .map(|row| V3PoolRow {
                address: row.get("address"),
                token_x: row.get("token_x"),
                token_y: row.get("token_y"),
                fee_bps: row.get("fee_bps"),
            })
            .collect())
    }
}

// ==================== HELPER FUNCTIONS ====================

fn row_to_token(row: &tokio_postgres::Row) -> anyhow::Result<Token> {
    let standard: String = row.get("standard");
    let decimals: i32 = row.get("decimals");

    Ok(Token {
        id: row.get("id"),
        name: row.get("name"),
        symbol: row.get("symbol"),
        decimals: decimals as u8,
        standard: TokenStandard::from_db(&standard)?,
        address: row.get("address"),
        token_id: row.get("token_id"),
    })
}

fn row_to_pool_aggregate(row: &tokio_postgres::Row) -> anyhow::Result<PoolAggregateRow> {
    Ok(PoolAggregateRow {
        ts: row.get("ts"),
        pool: row.get("pool"),
        token_1_volume: numeric_col(row, "token_1_volume")?,
        token_2_volume: numeric_col(row, "token_2_volume")?,
        volume_value: numeric_col(row, "volume_value")?,
        token_1_fees: numeric_col(row, "token_1_fees")?,
        token_2_fees: numeric_col(row, "token_2_fees")?,
        fees_value: numeric_col(row, "fees_value")?,
        token_1_locked: numeric_col(row, "token_1_locked")?,
        token_2_locked: numeric_col(row, "token_2_locked")?,
        locked_value: numeric_col(row, "locked_value")?,
    })
}

fn row_to_token_aggregate(row: &tokio_postgres::Row) -> anyhow::Result<TokenAggregateRow> {
    Ok(TokenAggregateRow {
        ts: row.get("ts"),
        token: row.get("token"),
        open_price: numeric_col(row, "open_price")?,
        high_price: numeric_col(row, "high_price")?,
        low_price: numeric_col(row, "low_price")?,
        close_price: numeric_col(row, "close_price")?,
        volume: numeric_col(row, "volume")?,
        volume_value: numeric_col(row, "volume_value")?,
        fees: numeric_col(row, "fees")?,
        fees_value: numeric_col(row, "fees_value")?,
        locked: numeric_col(row, "locked")?,
        locked_value: numeric_col(row, "locked_value")?,
    })
}

fn row_to_plenty_aggregate(row: &tokio_postgres::Row) -> anyhow::Result<PlentyAggregateRow> {
    Ok(PlentyAggregateRow {
        ts: row.get("ts"),
        volume_value: numeric_col(row, "volume_value")?,
        fees_value: numeric_col(row, "fees_value")?,
        tvl_value: numeric_col(row, "tvl_value")?,
    })
}
