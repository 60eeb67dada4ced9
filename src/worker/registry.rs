use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use log::info;
use moka::future::Cache;
use rustc_hash::FxHashMap;

use crate::db::models::{Pool, PoolFee, PoolKind, Token};
use crate::Database;

/// Registry of known pools and their token metadata.
///
/// Loaded from the store (`pool_v2`, `pool_v3`, `token` tables, seeded by
/// an external tracker) and cached with a time-to-live; expiry refreshes
/// the set transparently, so pools created mid-run are picked up on the
/// next pass.
pub struct PoolRegistry {
    db: Arc<Database>,
    cache: Cache<(), Arc<FxHashMap<String, Pool>>>,
}

impl PoolRegistry {
    pub fn new(db: Arc<Database>, ttl: Duration) -> Self {
        let cache = Cache::builder().max_capacity(1).time_to_live(ttl).build();

        Self {
            db,
            cache,
        }
    }

    /// Current pool set, keyed by pool address.
    pub async fn get_pools(&self) -> anyhow::Result<Arc<FxHashMap<String, Pool>>> {
        if let Some(pools) = self.cache.get(&()).await {
            return Ok(pools);
        }

        let pools = Arc::new(self.load_pools().await?);
        self.cache.insert((), pools.clone()).await;

        Ok(pools)
    }

    async fn load_pools(&self) -> anyhow::Result<FxHashMap<String, Pool>> {
        let tokens: HashMap<i64, Token> = self
            .db
            .postgres
            .get_registry_tokens()
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let token = |id: i64| -> anyhow::Result<Token> {
            tokens
                .get(&id)
                .cloned()
                .with_context(|| format!("Registry references unknown token id {}", id))
        };

        let mut pools = FxHashMap::default();

        for row in self.db.postgres.get_v2_pools().await? {
            let pool = Pool {
                token1: token(row.token_1)?,
                token2: token(row.token_2)?,
                fee: PoolFee::Divisor(row.fees as u64),
                kind: PoolKind::from_db(&row.kind)?,
                address: row.address,
            };
            pools.insert(pool.address.clone(), pool);
        }

        for row in self.db.postgres.get_v3_pools().await? {
            let pool = Pool {
                token1: token(row.token_x)?,
                token2: token(row.token_y)?,
                fee: PoolFee::BasisPoints(row.fee_bps as u64),
                kind: PoolKind::Concentrated,
                address: row.address,
            };
            pools.insert(pool.address.clone(), pool);
        }

        info!("Loaded {} pools from registry", pools.len());

        Ok(pools)
    }
}
