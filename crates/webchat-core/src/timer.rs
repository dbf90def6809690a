// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A first-class, idempotently-cancellable timer handle.
//!
//! Every timeout in the core (ping, reconnect, typing, cache expiry, contact
//! timeout, inter-message delay) is armed through a [`Timer`] rather than a
//! raw `tokio::spawn`, so that `shutdown()` on the owning component can
//! cancel every outstanding timer without tracking join handles ad hoc.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

/// A single-slot, replaceable, cancellable timer.
///
/// Arming a new timer while one is already armed cancels the previous one
/// first -- this is what makes rearming typing/reconnect timeouts safe.
#[derive(Debug, Default)]
pub struct Timer {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Timer {
    /// Creates a disarmed timer.
    pub fn new() -> Self {
        Self {
            handle: Mutex::new(None),
        }
    }

    /// Cancels any previously armed timer and schedules `fut` to run after
    /// `delay`.
    pub fn arm<F>(&self, delay: Duration, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fut.await;
        });
        *self.handle.lock().expect("timer mutex poisoned") = Some(handle);
    }

    /// Cancels the armed timer, if any. Idempotent: calling this on a
    /// disarmed timer is a no-op.
    pub fn cancel(&self) {
        if let Some(handle) = self.handle.lock().expect("timer mutex poisoned").take() {
            handle.abort();
        }
    }

    /// `true` if a timer is currently armed (best-effort: a timer that has
    /// just fired but not yet been reaped by a `cancel`/`arm` call may
    /// briefly still report armed).
    pub fn is_armed(&self) -> bool {
        self.handle.lock().expect("timer mutex poisoned").is_some()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn arm_fires_after_delay() {
        let timer = Timer::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        timer.arm(Duration::from_millis(50), async move {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_cancels_previous_timer() {
        let timer = Timer::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let c1 = counter.clone();
        timer.arm(Duration::from_millis(50), async move {
            c1.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::advance(Duration::from_millis(10)).await;

        let c2 = counter.clone();
        timer.arm(Duration::from_millis(50), async move {
            c2.fetch_add(10, Ordering::SeqCst);
        });

        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;
        // Only the second timer should have fired.
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let timer = Timer::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        timer.arm(Duration::from_millis(50), async move {
            c.fetch_add(1, Ordering::SeqCst);
        });
        timer.cancel();
        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_on_disarmed_timer_is_a_no_op() {
        let timer = Timer::new();
        timer.cancel();
        assert!(!timer.is_armed());
    }
}
