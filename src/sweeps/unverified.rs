use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use super::Sweep;
use crate::accounts;
use crate::metrics::Metrics;
use crate::state::AppState;

/// Deletes registrations that were never verified within `max_age`.
pub struct PurgeUnverified {
    db: SqlitePool,
    metrics: Metrics,
    max_age: Duration,
}

impl PurgeUnverified {
    pub fn from_state(state: &AppState) -> Self {
        Self {
            db: state.db.clone(),
            metrics: state.metrics.clone(),
            max_age: Duration::seconds(state.config.sweeps.unverified_max_age_secs),
        }
    }

    /// Returns the number of accounts removed.
    pub async fn run_once(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let removed = accounts::delete_unverified_before(&self.db, now - self.max_age).await?;
        self.metrics.add_purged(removed);
        Ok(removed)
    }
}

#[async_trait]
impl Sweep for PurgeUnverified {
    fn name(&self) -> &'static str {
        "purge-unverified"
    }

    async fn run(&self, now: DateTime<Utc>) -> anyhow::Result<()> {
        let removed = self.run_once(now).await?;
        if removed > 0 {
            tracing::info!(removed, "stale unverified accounts purged");
        }
        Ok(())
    }
}
