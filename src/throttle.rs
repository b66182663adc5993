use std::future::Future;
use std::time::Duration;

pub const DEFAULT_DELAY_MS: u64 = 350;

/// Fixed pause after every call that mutates the remote store.
///
/// Calls are never overlapped: the next mutation can only start once the
/// previous one has returned and the delay has elapsed.
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    delay: Duration,
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_DELAY_MS))
    }
}

impl Throttle {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    /// Awaits `call`, then waits out the delay whether or not it succeeded.
    pub async fn call<F, T>(&self, call: F) -> T
    where
        F: Future<Output = T>,
    {
        let out = call.await;
        self.pause().await;
        out
    }
}
