//! Single-slot transient display
//!
//! At most one value is visible. `show` replaces it and restarts the
//! timer, so a burst of updates never stacks; the value disappears one
//! full duration after the latest `show`.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Popup duration of the order tracker
pub const POPUP_DURATION: Duration = Duration::from_secs(5);

/// Duration of success/error notices
pub const NOTICE_DURATION: Duration = Duration::from_secs(3);

struct SlotState<T> {
    value: Option<T>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

pub struct TransientSlot<T> {
    state: Arc<Mutex<SlotState<T>>>,
    duration: Duration,
}

impl<T> std::fmt::Debug for TransientSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransientSlot")
            .field("duration", &self.duration)
            .field("visible", &self.state.lock().value.is_some())
            .finish()
    }
}

impl<T: Clone + Send + 'static> TransientSlot<T> {
    pub fn new(duration: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(SlotState {
                value: None,
                generation: 0,
                timer: None,
            })),
            duration,
        }
    }

    /// Show `value`, replacing the current one and restarting the timer
    pub fn show(&self, value: T) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.value = Some(value);
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        let generation = state.generation;
        let weak: Weak<Mutex<SlotState<T>>> = Arc::downgrade(&self.state);
        let duration = self.duration;
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(state) = weak.upgrade() {
                let mut state = state.lock();
                // a newer show owns the slot
                if state.generation == generation {
                    state.value = None;
                    state.timer = None;
                }
            }
        }));
    }

    /// Currently visible value
    pub fn current(&self) -> Option<T> {
        self.state.lock().value.clone()
    }

    pub fn is_visible(&self) -> bool {
        self.state.lock().value.is_some()
    }

    /// Hide now and cancel the pending timer
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.value = None;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }
}

/// Notice severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Transient user-facing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub level: NoticeLevel,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: NoticeLevel::Success,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: NoticeLevel::Error,
        }
    }
}

/// Shared notice area (one visible notice, 3 s)
pub type NoticeBoard = TransientSlot<Notice>;

impl<T> Drop for TransientSlot<T> {
    fn drop(&mut self) {
        if let Some(timer) = self.state.lock().timer.take() {
            timer.abort();
        }
    }
}
