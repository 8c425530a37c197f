use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use sqlx::SqlitePool;

use super::Sweep;
use crate::ledger;
use crate::mail::{self, Mailer};
use crate::metrics::Metrics;
use crate::state::AppState;
use crate::types::BorrowRecord;

/// Outcome of one reminder pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReminderReport {
    /// Candidates selected by the query.
    pub scanned: usize,
    pub sent: usize,
    /// Claimed by a concurrent pass before this one got to them.
    pub skipped: usize,
    pub failed: usize,
}

/// Mails borrowers whose loans are past due by more than the grace period.
///
/// A record is claimed (`notified` 0 -> 1) before its mail goes out and released again
/// if the send fails or times out, so each loan produces at most one reminder and
/// failed ones are retried by a later pass.
pub struct NotifyOverdue {
    db: SqlitePool,
    mailer: Arc<dyn Mailer>,
    metrics: Metrics,
    grace: chrono::Duration,
    concurrency: usize,
    send_timeout: Duration,
}

impl NotifyOverdue {
    pub fn from_state(state: &AppState) -> Self {
        let cfg = &state.config.sweeps;
        Self {
            db: state.db.clone(),
            mailer: state.mailer.clone(),
            metrics: state.metrics.clone(),
            grace: chrono::Duration::seconds(cfg.overdue_grace_secs),
            concurrency: cfg.reminder_concurrency.max(1),
            send_timeout: Duration::from_secs(cfg.send_timeout_secs),
        }
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> anyhow::Result<ReminderReport> {
        let candidates = ledger::overdue_unnotified(&self.db, now - self.grace).await?;
        let scanned = candidates.len();
        let sent = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        stream::iter(candidates)
            .for_each_concurrent(self.concurrency, |record| {
                let (sent, skipped, failed) = (&sent, &skipped, &failed);
                async move {
                    match self.remind(&record).await {
                        Ok(true) => {
                            sent.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(false) => {
                            skipped.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(record_id = %record.id, to = %record.user.email, "overdue reminder failed: {:#}", e);
                        }
                    }
                }
            })
            .await;

        let report = ReminderReport {
            scanned,
            sent: sent.into_inner(),
            skipped: skipped.into_inner(),
            failed: failed.into_inner(),
        };
        self.metrics.add_reminders(report.sent as u64, report.failed as u64);
        Ok(report)
    }

    /// Returns `Ok(false)` when the record was already claimed.
    async fn remind(&self, record: &BorrowRecord) -> anyhow::Result<bool> {
        if !ledger::claim_reminder(&self.db, &record.id).await? {
            return Ok(false);
        }

        let email = mail::overdue_reminder(&record.user.email, &record.user.name, &record.book_title, record.due_date);
        let error = match tokio::time::timeout(self.send_timeout, self.mailer.send(email)).await {
            Ok(Ok(())) => return Ok(true),
            Ok(Err(e)) => e,
            Err(_) => anyhow::anyhow!("send timed out after {}s", self.send_timeout.as_secs()),
        };

        if let Err(release) = ledger::release_reminder(&self.db, &record.id).await {
            tracing::error!(record_id = %record.id, "failed to release reminder claim: {}", release);
        }
        Err(error)
    }
}

#[async_trait]
impl Sweep for NotifyOverdue {
    fn name(&self) -> &'static str {
        "notify-overdue"
    }

    async fn run(&self, now: DateTime<Utc>) -> anyhow::Result<()> {
        let report = self.run_once(now).await?;
        if report.scanned > 0 {
            tracing::info!(
                scanned = report.scanned,
                sent = report.sent,
                skipped = report.skipped,
                failed = report.failed,
                "overdue reminders processed"
            );
        }
        Ok(())
    }
}
