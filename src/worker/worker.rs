use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use log::{info, warn};

use crate::config::Settings;
use crate::db::models::{AmountPair, Pool, PoolCheckpoint, PoolKind, TransactionRecord};
use crate::tzkt::OperationStep;
use crate::utils::{round_stored, LevelCursor};
use crate::worker::{
    aggregator::Aggregator,
    classifier::{self, PoolGeneration},
    price_resolver::PriceResolver,
    registry::PoolRegistry,
};
use crate::{Database, TzktProvider};

/// Interval for logging progress updates
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// The ingestion pipeline for one deployment.
///
/// Processes block levels strictly sequentially; within a level, pools
/// sequentially; within a pool, operations sequentially. The aggregate
/// updates read previous state before writing, so serializing the whole
/// walk removes any need for per-bucket locking.
pub struct Indexer {
    db: Arc<Database>,
    tzkt: Arc<TzktProvider>,
    registry: PoolRegistry,
    resolver: PriceResolver,
    aggregator: Aggregator,
    cursor: LevelCursor,
    tez_ctez_pool: String,
}

impl Indexer {
    pub fn new(db: Arc<Database>, tzkt: Arc<TzktProvider>, settings: Arc<Settings>) -> Self {
        let registry = PoolRegistry::new(
            db.clone(),
            Duration::from_secs(settings.indexer.registry_ttl_seconds),
        );
        let resolver = PriceResolver::new(db.clone(), settings.indexer.pricing_tree.clone());
        let aggregator = Aggregator::new(db.clone());
        let cursor = LevelCursor::new(
            settings.indexer.level_file.clone(),
            settings.indexer.indexing_start,
        );

        Self {
            db,
            tzkt,
            registry,
            resolver,
            aggregator,
            cursor,
            tez_ctez_pool: settings.indexer.tez_ctez_pool.clone(),
        }
    }

    /// Process every level from the cursor up to `target` and advance the
    /// cursor level by level, so a restart resumes where this pass ended.
    pub async fn process_up_to(&self, target: u64) -> anyhow::Result<()> {
        let pools = self.registry.get_pools().await?;

        let start = self.cursor.last_level().await? + 1;
        if start > target {
            return Ok(());
        }

        info!(
            "Processing levels {}..={} across {} pools",
            start,
            target,
            pools.len()
        );

        let mut last_progress_log = Instant::now();

        for level in start..=target {
            for pool in pools.values() {
                // A previous run may have covered this level for this pool
                // before crashing; the per-pool checkpoint makes the
                // range re-fetch idempotent
                if let Some(done) = self.db.postgres.get_last_indexed(&pool.address).await? {
                    if done >= level as i64 {
                        continue;
                    }
                }

                self.process_pool_level(pool, level)
                    .await
                    .with_context(|| {
                        format!("Processing pool {} at level {}", pool.address, level)
                    })?;

                self.db
                    .postgres
                    .set_last_indexed(&PoolCheckpoint::new(pool.address.clone(), level as i64))
                    .await?;
            }

            self.cursor.record(level).await?;

            if last_progress_log.elapsed() >= PROGRESS_LOG_INTERVAL {
                info!("Synced to level {} (target {})", level, target);
                last_progress_log = Instant::now();
            }
        }

        Ok(())
    }

    async fn process_pool_level(&self, pool: &Pool, level: u64) -> anyhow::Result<()> {
        let generation = PoolGeneration::for_pool(pool, &self.tez_ctez_pool);

        let hashes = self
            .tzkt
            .get_operation_hashes(&pool.address, generation.entrypoints(), level)
            .await?;

        for hash in hashes {
            let operation = self.tzkt.get_operation(&hash).await?;

            // Per-operation isolation: a malformed operation is logged and
            // skipped, it must not take the rest of the level down with it
            if let Err(e) = self.process_operation(&operation, pool, generation).await {
                warn!(
                    "Skipping operation {} (pool {}, level {}): {:#}",
                    hash, pool.address, level, e
                );
            }
        }

        Ok(())
    }

    /// Classify, price and record every qualifying step of one operation
    /// group.
    async fn process_operation(
        &self,
        operation: &[OperationStep],
        pool: &Pool,
        generation: PoolGeneration,
    ) -> anyhow::Result<()> {
        for (index, step) in operation.iter().enumerate() {
            if !step.targets(&pool.address) {
                continue;
            }
            let Some(entrypoint) = step.entrypoint() else {
                continue;
            };
            let Some(action) = generation.classify_entrypoint(entrypoint) else {
                continue;
            };

            // Idempotency gate: operation ids are unique across the whole
            // transaction log, so a known id means this operation was
            // already fully recorded, aggregate updates included
            if self.db.postgres.transaction_exists(step.id).await? {
                return Ok(());
            }

            // Zero-delta fee collections are deliberately not recorded
            let Some(kind) = classifier::resolve_kind(pool, step, action)? else {
                continue;
            };

            let token1_amount = classifier::token_amount(&pool.token1, operation, index)?;
            let token2_amount = classifier::token_amount(&pool.token2, operation, index)?;

            // Concentrated pools do not expose paired reserves in storage;
            // their current balances are queried directly instead
            let reserves = if pool.kind == PoolKind::Concentrated {
                let token1_reserve = self
                    .tzkt
                    .get_token_balance(&pool.token1, &pool.address)
                    .await?;
                let token2_reserve = self
                    .tzkt
                    .get_token_balance(&pool.token2, &pool.address)
                    .await?;
                AmountPair::new(token1_reserve, token2_reserve)
            } else {
                classifier::reserves_from_storage(step, pool)?
            };

            let timestamp = step
                .timestamp
                .context("Operation step has no timestamp")?
                .timestamp();
            let account = step
                .originator()
                .context("Operation step has no sender")?
                .to_string();

            let fees = AmountPair::new(
                pool.fee.amount(&token1_amount),
                pool.fee.amount(&token2_amount),
            );

            let mut txn = TransactionRecord {
                id: step.id,
                hash: step.hash.clone(),
                timestamp,
                account,
                pool: pool.clone(),
                kind,
                amounts: AmountPair::new(token1_amount, token2_amount),
                reserves,
                fees,
                prices: AmountPair::default(),
                values: AmountPair::default(),
                fee_values: AmountPair::default(),
            };

            let prices = self.resolver.resolve(&txn).await?;
            txn.values = AmountPair::new(
                round_stored(&txn.amounts.token1 * &prices.token1),
                round_stored(&txn.amounts.token2 * &prices.token2),
            );
            txn.fee_values = AmountPair::new(
                pool.fee.amount(&txn.values.token1),
                pool.fee.amount(&txn.values.token2),
            );
            txn.prices = prices;

            self.resolver.record_spot_prices(&txn).await?;
            self.aggregator.record(&txn).await?;
        }

        Ok(())
    }
}
