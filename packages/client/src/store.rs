//! Observable conversation store.
//!
//! Wraps [`ChatState`] in a `watch` channel: every dispatch applies one
//! [`StoreAction`] through the reducer and publishes the new snapshot to all
//! subscribers.

use tokio::sync::watch;
use tracing::trace;

use crate::domain::{ChatState, StoreAction};

pub struct ChatStore {
    state: watch::Sender<ChatState>,
}

impl ChatStore {
    pub fn new(initial: ChatState) -> Self {
        let (state, _) = watch::channel(initial);
        Self { state }
    }

    /// Apply one action and notify subscribers
    pub fn dispatch(&self, action: StoreAction) {
        trace!("Store action: {:?}", action);
        self.state.send_modify(|state| {
            let current = std::mem::take(state);
            *state = current.apply(action);
        });
    }

    /// Apply several actions as one published change
    pub fn dispatch_all(&self, actions: impl IntoIterator<Item = StoreAction>) {
        self.state.send_modify(|state| {
            let mut current = std::mem::take(state);
            for action in actions {
                current = current.apply(action);
            }
            *state = current;
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    /// Current snapshot
    pub fn snapshot(&self) -> ChatState {
        self.state.borrow().clone()
    }

    /// Read the current state without cloning it
    pub fn read<R>(&self, f: impl FnOnce(&ChatState) -> R) -> R {
        f(&self.state.borrow())
    }

    pub fn reset(&self) {
        self.dispatch(StoreAction::Reset);
    }
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new(ChatState::default())
    }
}
