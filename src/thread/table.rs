//! Fixed-capacity TCB table and slot allocation.
//!
//! Slot 0 is reserved for the thread that calls `init`. All other slots
//! are claimed by `spawn`: a finished occupant whose value has been
//! joined away is reclaimed first, then a never-used slot. Vacancy is
//! explicit (`None`) rather than an id sentinel, so id wraparound can
//! never confuse the scan.

use super::{Tcb, ThreadId, ThreadState};

/// Maximum number of concurrently live threads, including the initial one.
pub const MAX_THREADS: usize = 128;

pub(crate) struct TcbTable {
    slots: [Option<Tcb>; MAX_THREADS],
}

impl TcbTable {
    const VACANT: Option<Tcb> = None;

    pub(crate) const fn new() -> Self {
        Self {
            slots: [Self::VACANT; MAX_THREADS],
        }
    }

    /// Register the calling thread in slot 0.
    pub(crate) fn register_initial(&mut self, tcb: Tcb) {
        self.slots[0] = Some(tcb);
    }

    /// Claim a slot for a new thread.
    ///
    /// Scans for a finished occupant other than the caller's own slot
    /// whose return value has already been consumed by a joiner, then for
    /// a never-used slot. An unreaped finished occupant is not
    /// displaceable: its return value must stay retrievable by id. On
    /// success returns the slot index and the displaced occupant so the
    /// caller can roll the claim back if kernel creation fails.
    pub(crate) fn claim(
        &mut self,
        own_slot: Option<usize>,
        tcb: Tcb,
    ) -> Option<(usize, Option<Tcb>)> {
        let mut found = None;
        for (i, slot) in self.slots.iter().enumerate() {
            if own_slot == Some(i) {
                continue;
            }
            if let Some(occupant) = slot {
                if occupant.state == ThreadState::Finished && occupant.reaped {
                    found = Some(i);
                    break;
                }
            }
        }
        if found.is_none() {
            found = self.slots.iter().position(|slot| slot.is_none());
        }
        let idx = found?;
        let prev = self.slots[idx].replace(tcb);
        Some((idx, prev))
    }

    /// Undo a claim, putting the displaced occupant back.
    pub(crate) fn restore(&mut self, idx: usize, prev: Option<Tcb>) {
        self.slots[idx] = prev;
    }

    pub(crate) fn get_mut(&mut self, idx: usize) -> Option<&mut Tcb> {
        self.slots.get_mut(idx).and_then(|slot| slot.as_mut())
    }

    /// Linear search by thread id.
    pub(crate) fn find_by_id_mut(&mut self, id: ThreadId) -> Option<(usize, &mut Tcb)> {
        self.slots
            .iter_mut()
            .enumerate()
            .find_map(|(i, slot)| match slot {
                Some(tcb) if tcb.id == id => Some((i, &mut *tcb)),
                _ => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcb(id: u64, state: ThreadState) -> Tcb {
        Tcb::new(ThreadId::new(id), state)
    }

    fn reaped_tcb(id: u64) -> Tcb {
        let mut tcb = tcb(id, ThreadState::Finished);
        tcb.reaped = true;
        tcb
    }

    #[test]
    fn claim_prefers_reaped_finished_slot_over_vacant() {
        let mut table = TcbTable::new();
        table.register_initial(tcb(0, ThreadState::Running));
        table.slots[3] = Some(reaped_tcb(1));

        let (idx, prev) = table.claim(Some(0), tcb(2, ThreadState::Ready)).unwrap();
        assert_eq!(idx, 3);
        assert_eq!(prev.unwrap().id, ThreadId::new(1));
    }

    #[test]
    fn claim_skips_callers_own_slot() {
        let mut table = TcbTable::new();
        table.slots[0] = Some(reaped_tcb(5));

        let (idx, prev) = table.claim(Some(0), tcb(6, ThreadState::Ready)).unwrap();
        assert_ne!(idx, 0);
        assert!(prev.is_none());
    }

    #[test]
    fn claim_never_displaces_an_unreaped_finished_slot() {
        // A finished thread nobody has joined yet still owes its return
        // value to a future joiner; its slot goes to a vacant one instead.
        let mut table = TcbTable::new();
        let mut finished = tcb(1, ThreadState::Finished);
        finished.retval = Some(5);
        table.slots[0] = Some(finished);

        let (idx, prev) = table.claim(None, tcb(2, ThreadState::Ready)).unwrap();
        assert_ne!(idx, 0);
        assert!(prev.is_none());
        let (_, kept) = table.find_by_id_mut(ThreadId::new(1)).unwrap();
        assert_eq!(kept.retval, Some(5));
    }

    #[test]
    fn claim_fails_when_every_slot_is_live() {
        let mut table = TcbTable::new();
        for (i, slot) in table.slots.iter_mut().enumerate() {
            *slot = Some(tcb(i as u64, ThreadState::Running));
        }
        assert!(table.claim(None, tcb(999, ThreadState::Ready)).is_none());
    }

    #[test]
    fn restore_puts_the_displaced_occupant_back() {
        let mut table = TcbTable::new();
        table.slots[2] = Some(reaped_tcb(1));

        let (idx, prev) = table.claim(None, tcb(2, ThreadState::Ready)).unwrap();
        table.restore(idx, prev);
        assert_eq!(table.slots[2].as_ref().unwrap().id, ThreadId::new(1));
        assert!(table.find_by_id_mut(ThreadId::new(2)).is_none());
    }
}
