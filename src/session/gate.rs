use std::sync::{Mutex, MutexGuard, PoisonError};

/// Admits at most one active peer. A second peer is rejected, never queued.
///
/// The holder may re-enter (a browser opens several requests); the slot frees
/// once every admission of the current epoch is released. Forcing the slot
/// open starts a new epoch, so releases from before it are ignored.
#[derive(Debug, Default)]
pub struct AdmissionGate {
    state: Mutex<GateState>,
}

#[derive(Debug, Default)]
struct GateState {
    slot: Option<Slot>,
    epoch: u64,
}

#[derive(Debug)]
struct Slot {
    peer: String,
    admissions: usize,
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `peer`, returning the epoch to release it with.
    pub fn try_acquire(&self, peer: &str) -> Option<u64> {
        let mut guard = self.lock();
        let state = &mut *guard;

        if let Some(slot) = state.slot.as_mut() {
            if slot.peer != peer {
                return None;
            }
            slot.admissions += 1;
            return Some(state.epoch);
        }

        state.epoch += 1;
        state.slot = Some(Slot {
            peer: peer.to_string(),
            admissions: 1,
        });
        Some(state.epoch)
    }

    /// Drop one admission of `peer` taken in `epoch`. Returns true when this
    /// freed the slot.
    pub fn release(&self, peer: &str, epoch: u64) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.epoch != epoch {
            return false;
        }

        let Some(slot) = state.slot.as_mut().filter(|slot| slot.peer == peer) else {
            return false;
        };
        slot.admissions = slot.admissions.saturating_sub(1);
        if slot.admissions > 0 {
            return false;
        }
        state.slot = None;
        true
    }

    /// Clear the slot regardless of holder, returning who held it.
    pub fn force_release(&self) -> Option<String> {
        let mut state = self.lock();
        let previous = state.slot.take().map(|slot| slot.peer);
        if previous.is_some() {
            // Outstanding admissions belong to the old epoch now
            state.epoch += 1;
        }
        previous
    }

    pub fn holder(&self) -> Option<String> {
        self.lock().slot.as_ref().map(|slot| slot.peer.clone())
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        // Every update leaves the state consistent, so a poisoned lock is still usable
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
