//! Cancellable call context
//!
//! One context is created per user-invoked command and passed down to every
//! client call. Cancellation fans out through child tokens; an optional
//! deadline cancels the token when it passes. Tasks either select on
//! `cancelled()` or own a sub-resource (a child process) that is killed on
//! cancellation.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::ClientError;

/// A cancellable context with an optional deadline
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled implicitly
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A context bounded by the given timeout. With `None` the context has
    /// no deadline. Must be called within a tokio runtime.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        match timeout {
            Some(t) => Self::background().deadline_at(Instant::now() + t),
            None => Self::background(),
        }
    }

    /// Derives a child context cancelled with (but not cancelling) this one
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derives a child context with its own, earlier deadline
    pub fn child_with_deadline(&self, deadline: Instant) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: None,
        }
        .deadline_at(deadline)
    }

    fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
                    token.cancel();
                }
            }
        });
        self
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Resolves once the context is cancelled or its deadline passed
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The error this context is currently carrying, if any. Deadline expiry
    /// wins over plain cancellation.
    pub fn error(&self) -> Option<ClientError> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Some(ClientError::DeadlineExceeded);
            }
        }
        if self.token.is_cancelled() {
            return Some(ClientError::Cancelled);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_propagates_to_children() {
        let ctx = Context::background();
        let child = ctx.child();
        assert!(child.error().is_none());
        ctx.cancel();
        child.cancelled().await;
        assert!(matches!(child.error(), Some(ClientError::Cancelled)));
    }

    #[tokio::test]
    async fn test_child_cancel_does_not_cancel_parent() {
        let ctx = Context::background();
        let child = ctx.child();
        child.cancel();
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_deadline_cancels_token() {
        let ctx = Context::with_timeout(Some(Duration::from_millis(10)));
        ctx.cancelled().await;
        assert!(matches!(ctx.error(), Some(ClientError::DeadlineExceeded)));
    }
}
