use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;

/// How often [`Clock::spawn_updater`] refreshes the cached time.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Cached wall-clock time in milliseconds, shared by every connection of a
/// worker.
///
/// Timeout arithmetic reads the cached value instead of asking the OS on
/// every check. A worker refreshes it once per [`REFRESH_INTERVAL`]; a
/// manual clock is only moved by [`set`](Clock::set) and
/// [`advance`](Clock::advance).
#[derive(Debug, Clone)]
pub struct Clock {
    millis: Arc<AtomicU64>,
    manual: Arc<AtomicBool>,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(system_millis())),
            manual: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A clock frozen at `millis` that ignores refreshes.
    pub fn manual(millis: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(millis)),
            manual: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn now(&self) -> u64 {
        self.millis.load(Ordering::Relaxed)
    }

    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::Relaxed);
    }

    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.millis.fetch_add(by, Ordering::Relaxed);
    }

    pub fn is_manual(&self) -> bool {
        self.manual.load(Ordering::Relaxed)
    }

    /// Re-reads the system time. No-op on a manual clock.
    pub fn refresh(&self) {
        if !self.is_manual() {
            self.set(system_millis());
        }
    }

    /// Starts the periodic refresh on the current runtime.
    pub fn spawn_updater(&self) -> JoinHandle<()> {
        let clock = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
            loop {
                ticker.tick().await;
                clock.refresh();
            }
        })
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

fn system_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
