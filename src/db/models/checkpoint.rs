use chrono::{DateTime, Utc};

/// Per-pool indexing progress (`last_indexed` table).
///
/// Records the last level whose operations were fully fetched for a pool,
/// so a restarted range fetch skips levels already covered.
#[derive(Debug, Clone)]
pub struct PoolCheckpoint {
    pub pool: String,
    pub level: i64,
    pub updated_at: DateTime<Utc>,
}

impl PoolCheckpoint {
    pub fn new(pool: String, level: i64) -> Self {
        Self {
            pool,
            level,
            updated_at: Utc::now(),
        }
    }
}
