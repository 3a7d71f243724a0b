//! Cancellation (spec.md §5, §9): a token checked at every suspension
//! point, grounded on the teacher's `runtime::cancel::CancelToken` but
//! reduced to a single flag — the harness runs one root loop per
//! `completion` call, with no child-turn fan-out that would need group
//! cascade. Backed by a `watch` channel rather than a bare atomic so
//! cancellation is awaitable: `iterate()` races `cancelled()` against
//! in-flight root/worker calls with `tokio::select!` instead of only
//! polling between them (spec.md §5: "aborts the current in-flight I/O").

use tokio::sync::watch;

#[derive(Clone)]
pub struct CancelToken {
    tx: std::sync::Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: std::sync::Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `cancel()` is called, or immediately if it already
    /// has been. A `watch` channel always holds the latest value, so unlike
    /// a bare `Notify` this can't miss a cancellation that lands between
    /// the initial check and the await.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.wait_for(|&cancelled| cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled() {
        assert!(!CancelToken::new().is_cancelled());
    }

    #[test]
    fn cancel_is_observed_through_clone() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_immediately_if_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(std::time::Duration::from_millis(50), token.cancelled())
            .await
            .expect("cancelled() must not block once already cancelled");
    }

    #[tokio::test]
    async fn cancelled_resolves_once_cancel_is_called_later() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        token.cancel();
        tokio::time::timeout(std::time::Duration::from_millis(200), handle)
            .await
            .expect("cancelled() should resolve after cancel()")
            .unwrap();
    }
}
