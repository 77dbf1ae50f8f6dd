use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::watch;

/// Per-worker stop flag.
///
/// Once stopped, connections stop offering keep-alive and idle ones close.
/// The flag never goes back to running.
#[derive(Debug, Clone)]
pub struct Signal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Signal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once [`stop`](Signal::stop) has been called.
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow_and_update() {
            // The sender lives in `self`, so the channel cannot close here.
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of live connections in a worker.
#[derive(Debug, Clone, Default)]
pub struct Connections {
    count: Arc<AtomicUsize>,
}

impl Connections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection until the returned guard is dropped.
    pub fn track(&self) -> ConnectionGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            count: Arc::clone(&self.count),
        }
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct ConnectionGuard {
    count: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stopped_resolves_after_stop() {
        let signal = Signal::new();
        assert!(!signal.is_stopped());

        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.stopped().await })
        };
        signal.stop();
        waiter.await.unwrap();
        assert!(signal.is_stopped());
    }

    #[test]
    fn guards_count_connections() {
        let connections = Connections::new();
        let a = connections.track();
        let b = connections.track();
        assert_eq!(connections.len(), 2);
        drop(a);
        drop(b);
        assert!(connections.is_empty());
    }
}
