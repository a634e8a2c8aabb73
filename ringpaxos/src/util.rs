//! Small runtime helpers shared across subsystems: a broadcast-to-N-waiters
//! notifier and jittered retry backoff.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use tokio::sync::Notify;

/// Milliseconds since the Unix epoch, clamped to zero if the clock is somehow before it.
pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Wraps [tokio::sync::Notify] to give every subsystem that needs "wake everyone waiting on
/// this condition" (ring changed, instance committed) a single, cheaply-cloneable handle.
#[derive(Clone, Default)]
pub struct Notifier {
    inner: Arc<Notify>,
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Notify::new()),
        }
    }

    /// Wake every task currently waiting, and arrange for the next `notified()` call made before
    /// any wakeup to also fire immediately (permit semantics of the underlying [Notify]).
    pub fn notify_all(&self) {
        self.inner.notify_waiters();
    }

    pub async fn wait(&self) {
        self.inner.notified().await;
    }
}

/// Sleep for `base` plus a uniformly random amount up to `base`, so that competing masters (for
/// instance, during a ring takeover race) do not lockstep-retry against each other.
pub async fn jittered_sleep(base: Duration) {
    let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis().max(1) as u64);
    tokio::time::sleep(base + Duration::from_millis(jitter_ms)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notifier_wakes_waiter() {
        let n = Notifier::new();
        let n2 = n.clone();
        let handle = tokio::spawn(async move {
            n2.wait().await;
        });
        tokio::task::yield_now().await;
        n.notify_all();
        handle.await.unwrap();
    }
}
