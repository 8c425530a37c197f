use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Operational counters for monitoring
#[derive(Clone)]
pub struct Metrics {
    pub registrations: Arc<AtomicU64>,
    pub logins: Arc<AtomicU64>,
    pub borrows: Arc<AtomicU64>,
    pub returns: Arc<AtomicU64>,
    pub fines_cents: Arc<AtomicU64>,
    pub reminders_sent: Arc<AtomicU64>,
    pub reminders_failed: Arc<AtomicU64>,
    pub accounts_purged: Arc<AtomicU64>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            registrations: Arc::new(AtomicU64::new(0)),
            logins: Arc::new(AtomicU64::new(0)),
            borrows: Arc::new(AtomicU64::new(0)),
            returns: Arc::new(AtomicU64::new(0)),
            fines_cents: Arc::new(AtomicU64::new(0)),
            reminders_sent: Arc::new(AtomicU64::new(0)),
            reminders_failed: Arc::new(AtomicU64::new(0)),
            accounts_purged: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_registrations(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_logins(&self) {
        self.logins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_borrows(&self) {
        self.borrows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_return(&self, fine_cents: i64) {
        self.returns.fetch_add(1, Ordering::Relaxed);
        if fine_cents > 0 {
            self.fines_cents.fetch_add(fine_cents as u64, Ordering::Relaxed);
        }
    }

    pub fn add_reminders(&self, sent: u64, failed: u64) {
        self.reminders_sent.fetch_add(sent, Ordering::Relaxed);
        self.reminders_failed.fetch_add(failed, Ordering::Relaxed);
    }

    pub fn add_purged(&self, count: u64) {
        self.accounts_purged.fetch_add(count, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            registrations: self.registrations.load(Ordering::Relaxed),
            logins: self.logins.load(Ordering::Relaxed),
            borrows: self.borrows.load(Ordering::Relaxed),
            returns: self.returns.load(Ordering::Relaxed),
            fines_cents: self.fines_cents.load(Ordering::Relaxed),
            reminders_sent: self.reminders_sent.load(Ordering::Relaxed),
            reminders_failed: self.reminders_failed.load(Ordering::Relaxed),
            accounts_purged: self.accounts_purged.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub registrations: u64,
    pub logins: u64,
    pub borrows: u64,
    pub returns: u64,
    pub fines_cents: u64,
    pub reminders_sent: u64,
    pub reminders_failed: u64,
    pub accounts_purged: u64,
    pub uptime_seconds: u64,
}
