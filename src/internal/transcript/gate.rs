//! One-shot readiness gate for clients that must log in before first use.

use std::future::Future;

use tokio::sync::OnceCell;

/// Memoizes the first successful initialisation.
///
/// Concurrent callers share a single in-flight attempt; a failed attempt leaves
/// the gate empty so the next caller starts a fresh one.
#[derive(Debug)]
pub struct ReadinessGate<T> {
    cell: OnceCell<T>,
}

impl<T> Default for ReadinessGate<T> {
    fn default() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }
}

impl<T> ReadinessGate<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.cell.initialized()
    }

    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    /// Waits until the gate is open, running `init` if nobody has yet.
    pub async fn ready<E, F, Fut>(&self, init: F) -> Result<&T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cell.get_or_try_init(init).await
    }
}
