use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;

/// Callback receiving `(bytes_done, bytes_total)` during long-running stages.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Cloneable cancellation handle threaded through diff and apply.
///
/// Timeouts are the caller's concern: construct the token with a deadline and
/// the core observes it at its regular poll points. The core itself never
/// arms timers.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Options consumed by the diff pipeline, passed by value; the core keeps no
/// global state.
#[derive(Clone, Default)]
pub struct DiffOptions {
    pub config: Config,
    pub progress: Option<ProgressFn>,
    pub cancel: CancelToken,
}

/// Options consumed by the apply pipeline.
#[derive(Clone)]
pub struct ApplyOptions {
    pub config: Config,
    /// Recompute and check the result digest after replay.
    pub verify_result: bool,
    pub progress: Option<ProgressFn>,
    pub cancel: CancelToken,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            config: Config::default(),
            verify_result: true,
            progress: None,
            cancel: CancelToken::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fresh_token_is_not_cancelled() {
        assert!(!CancelToken::new().is_cancelled());
    }

    #[test]
    fn cancel_is_visible_through_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn expired_deadline_cancels() {
        let token = CancelToken::with_deadline(Instant::now() - Duration::from_secs(1));
        assert!(token.is_cancelled());
    }

    #[test]
    fn future_deadline_does_not_cancel() {
        let token = CancelToken::with_deadline(Instant::now() + Duration::from_secs(3600));
        assert!(!token.is_cancelled());
    }
}
