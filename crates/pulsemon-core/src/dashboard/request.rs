// ── Logical request gate ──
//
// At most one logical request is outstanding per controller. Starting a
// new one cancels the previous token; the superseded call resolves to
// `Fetched::Cancelled`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

/// Result of a fetch that may have been superseded by a newer one.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Fetched<T> {
    Completed(T),
    /// A newer request (or teardown) cancelled this one. Not an error.
    Cancelled,
}

impl<T> Fetched<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        match self {
            Self::Completed(value) => Fetched::Completed(f(value)),
            Self::Cancelled => Fetched::Cancelled,
        }
    }
}

#[derive(Default)]
pub(crate) struct RequestGate {
    seq: AtomicU64,
    current: Mutex<Option<(u64, CancellationToken)>>,
}

impl RequestGate {
    /// Register a new logical request under `parent`, cancelling whichever
    /// one was outstanding.
    pub(crate) fn begin(&self, parent: &CancellationToken) -> (u64, CancellationToken) {
        let id = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let token = parent.child_token();
        let previous = self.slot().replace((id, token.clone()));
        if let Some((_, previous)) = previous {
            previous.cancel();
        }
        (id, token)
    }

    /// Release the slot if `id` still owns it.
    pub(crate) fn finish(&self, id: u64) {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|(current, _)| *current == id) {
            *slot = None;
        }
    }

    pub(crate) fn cancel_current(&self) {
        if let Some((_, token)) = self.slot().take() {
            token.cancel();
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<(u64, CancellationToken)>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
