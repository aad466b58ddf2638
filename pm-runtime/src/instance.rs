//! A single open program instance: the live `(sigval, count)` slot state
//! plus the running span it has accumulated so far.

use pm_events::EventData;
use pm_model::{ActionSlotDef, SigType, Trigger};

/// Lifecycle state of an open instance. Only `Live` instances receive
/// events; the other three are terminal and removed from the arena the
/// moment they are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Live,
    Fired,
    Expired,
    Aborted,
}

/// A dynamically created program instance, seeded when one of its
/// program's key events is observed.
#[derive(Debug, Clone)]
pub struct Instance {
    pub program_id: u32,
    pub state: InstanceState,
    /// `Sequence`/`SequenceImm`: the expected next `sig_val`, counting
    /// down from `argc` to `0`. `Any`: remaining fires needed. Unused by
    /// `And`/`Within`, which track their own bitsets below.
    pub counter: u32,
    /// `And`: bitset of trigger indices that have fired at least once.
    /// `Within`: bitset of required bits not yet cleared.
    pub mask: u32,
    pub span: EventData,
    pub expires_at: u32,
    pub bindings_head: u32,
    /// The key this instance is registered under in the state machine's
    /// open-instance index; recorded here so removal always uses the same
    /// key it was inserted with (see [`dedup_key`]).
    pub open_key: (u32, u32),
}

/// The key used to suppress duplicate instance creation (§4.4 step 1).
///
/// `Sequence`/`SequenceImm`/`Within`-family joins are position-sensitive:
/// several overlapping candidate windows of the same program can be open
/// at once, so they are keyed on `(program_id, start_ordpos)`. `Any`/`And`
/// are order-insensitive accumulators with no natural per-occurrence
/// window — only one instance per program is ever open at a time, so they
/// collapse to a fixed second component.
pub fn dedup_key(sig_type: SigType, program_id: u32, start_ordpos: u32) -> (u32, u32) {
    match sig_type {
        SigType::Any | SigType::And => (program_id, u32::MAX),
        _ => (program_id, start_ordpos),
    }
}

impl Instance {
    /// Seed a new instance from `slot` and the event `data` that created
    /// it. `within_required_bits` is the OR of every `Within`/`WithinStruct`
    /// trigger's `sig_val` for this program (irrelevant for other slot
    /// types, pass `0`).
    pub fn seed(
        program_id: u32,
        range: u32,
        slot: &ActionSlotDef,
        data: EventData,
        within_required_bits: u32,
    ) -> Self {
        let mask = match slot.sig_type {
            SigType::Within => within_required_bits,
            _ => 0,
        };
        // `Any`'s remaining-fires-needed lives in `init_count`
        // (`cardinality`), not `init_sigval` (always 0 for Any/And; only
        // `Sequence`/`SequenceImm` count down from `init_sigval`).
        let counter = match slot.sig_type {
            SigType::Any => slot.init_count,
            _ => slot.init_sigval,
        };
        let open_key = dedup_key(slot.sig_type, program_id, data.start_ordpos);
        Self {
            program_id,
            state: InstanceState::Live,
            counter,
            mask,
            expires_at: data.start_ordpos.saturating_add(range),
            bindings_head: 0,
            span: data,
            open_key,
        }
    }

    /// Apply one matching trigger fire to this instance's slot state,
    /// returning whether the slot is now satisfied. `trigger_idx` is this
    /// trigger's position within its program's trigger list (used as the
    /// bit/position identity for `And`).
    ///
    /// Returns `None` when the fire is rejected without changing state
    /// (the only case: a `SequenceImm` witness that is not ordinally
    /// adjacent to the instance's current end).
    pub fn apply(
        &mut self,
        trigger: &Trigger,
        trigger_idx: usize,
        slot_init_count: u32,
        data: &EventData,
    ) -> Option<bool> {
        let satisfied = match trigger.sig_type {
            SigType::Del => {
                // Handled by the dispatcher before `apply` is called; Del
                // never reaches here in the Live path.
                return None;
            }
            SigType::Sequence => {
                if trigger.sig_val != self.counter {
                    return None;
                }
                self.counter -= 1;
                self.counter == 0
            }
            SigType::SequenceImm => {
                if trigger.sig_val != self.counter {
                    return None;
                }
                // trigger index 0 is always compiled as plain `Sequence`
                // (see pm-table::compile), so any `SequenceImm` trigger
                // reaching this arm has a predecessor to be adjacent to.
                if data.start_ordpos != self.span.end_ordpos {
                    return None;
                }
                self.counter -= 1;
                self.counter == 0
            }
            SigType::Within => {
                self.mask &= !trigger.sig_val;
                self.mask == 0
            }
            SigType::Any => {
                self.counter = self.counter.saturating_sub(1);
                self.counter == 0
            }
            SigType::And => {
                debug_assert!(trigger_idx < 32, "And join supports at most 32 members");
                self.mask |= 1 << trigger_idx;
                self.mask.count_ones() >= slot_init_count
            }
        };

        self.span.enlarge(data);
        Some(satisfied)
    }
}
