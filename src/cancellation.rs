//! Cooperative cancellation for activations
//!
//! An activation and whoever may abandon it share a [`CancellationToken`].
//! Producers observe it at checkpoints; nothing is preempted. Operators that
//! short-circuit (such as `take`) hand their upstream a
//! [`child token`](CancellationToken::child_token), which stops the upstream
//! producer without cancelling the downstream consumer.

pub use tokio_util::sync::{CancellationToken, DropGuard};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn child_follows_parent() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        assert!(!child.is_cancelled());

        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn child_cancel_leaves_parent_alone() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        child.cancel();

        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn child_of_cancelled_parent_starts_cancelled() {
        let parent = CancellationToken::new();
        parent.cancel();
        assert!(parent.child_token().is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_wakes_waiter() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[test]
    fn drop_guard_cancels() {
        let token = CancellationToken::new();
        let guard: DropGuard = token.clone().drop_guard();
        drop(guard);
        assert!(token.is_cancelled());

        let other = CancellationToken::new();
        let kept = other.clone().drop_guard().disarm();
        assert!(!kept.is_cancelled());
        assert!(!other.is_cancelled());
    }
}
