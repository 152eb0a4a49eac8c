//! Execution guard
//! Single-flight coordination per check: for every unique id at most one
//! operation callback is in flight. Late arrivals are refused immediately
//! instead of queueing. A slot is released when its worker finishes or when
//! the bound (operation timeout plus grace) fires, so a stuck callback can
//! never block the id forever.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
enum SlotState {
    Idle,
    InFlight,
}

#[derive(Debug)]
struct Slot {
    state: Mutex<SlotState>,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Idle),
        }
    }

    /// Claims the slot, failing when an operation is already in flight.
    fn take(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state == SlotState::InFlight {
            return false;
        }
        *state = SlotState::InFlight;
        true
    }

    fn release(&self) {
        *self.state.lock().unwrap() = SlotState::Idle;
    }
}

/// Registry of single-flight slots. The registry lock covers only slot
/// lookup and creation; slot state is manipulated under the slot's own lock.
#[derive(Debug, Default)]
pub struct ExecGuard {
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

impl ExecGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `callback` on a fresh task unless an operation for `unique_id`
    /// is already in flight. Returns whether the callback was accepted.
    pub fn submit<F>(&self, unique_id: &str, timeout: Duration, callback: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let slot = {
            let mut slots = self.slots.lock().unwrap();
            slots
                .entry(unique_id.to_string())
                .or_insert_with(|| Arc::new(Slot::new()))
                .clone()
        };
        if !slot.take() {
            warn!(check = %unique_id, "A previous operation is still in progress");
            return false;
        }

        let id = unique_id.to_string();
        tokio::spawn(async move {
            if tokio::time::timeout(timeout, callback).await.is_err() {
                debug!(check = %id, "Execution slot expired. Cleaning up...");
            }
            slot.release();
        });
        true
    }
}
