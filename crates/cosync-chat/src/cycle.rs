//! Ownership of the single active completion cycle.

use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio_util::sync::CancellationToken;

use crate::store::MessageStore;

struct ActiveCycle {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct SlotState {
    active: Option<ActiveCycle>,
    /// Tickets not yet dropped, superseded ones included
    live: usize,
}

/// Holds the cancellation token of the cycle currently allowed to run.
///
/// Registering a new cycle cancels the previous one, so at most one token is
/// live at any time. The store is busy from the first registration until the
/// last ticket is dropped.
pub(crate) struct CycleSlot {
    state: Mutex<SlotState>,
    next_id: AtomicU64,
    store: Arc<MessageStore>,
}

impl CycleSlot {
    pub(crate) fn new(store: Arc<MessageStore>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SlotState::default()),
            next_id: AtomicU64::new(0),
            store,
        })
    }

    /// Cancel whatever is running and register a fresh cycle.
    pub(crate) fn begin(self: &Arc<Self>) -> CycleTicket {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();

        let mut state = self.state.lock();
        if let Some(previous) = state.active.take() {
            tracing::debug!("Cycle {} superseded by cycle {}", previous.id, id);
            previous.cancel.cancel();
        }
        state.active = Some(ActiveCycle {
            id,
            cancel: cancel.clone(),
        });
        state.live += 1;
        self.store.set_busy(true);

        CycleTicket {
            id,
            cancel,
            slot: Arc::clone(self),
        }
    }

    /// Cancel the active cycle. Returns whether there was one.
    pub(crate) fn stop(&self) -> bool {
        match self.state.lock().active.as_ref() {
            Some(active) => {
                tracing::debug!("Stopping cycle {}", active.id);
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a cycle currently holds a token
    pub(crate) fn is_active(&self) -> bool {
        self.state.lock().active.is_some()
    }
}

/// The right to run one cycle. Dropping it cancels the cycle's token,
/// releases the slot if no newer cycle has taken it, and clears the busy flag
/// once no ticket is left.
pub(crate) struct CycleTicket {
    id: u64,
    cancel: CancellationToken,
    slot: Arc<CycleSlot>,
}

impl CycleTicket {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Drop for CycleTicket {
    fn drop(&mut self) {
        self.cancel.cancel();
        let mut state = self.slot.state.lock();
        if state.active.as_ref().is_some_and(|a| a.id == self.id) {
            state.active = None;
        }
        state.live -= 1;
        if state.live == 0 {
            self.slot.store.set_busy(false);
        }
    }
}
