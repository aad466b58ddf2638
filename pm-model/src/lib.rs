//! Static data types describing a compiled program table.
//!
//! Everything here is inert: constructors and accessors only, no dispatch
//! behavior. The builder (`pm-builder`) and table compiler (`pm-table`)
//! populate these types; the runtime (`pm-runtime`) only ever reads them.

use pm_events::EventHandle;

/// How a program's action slot and its individual triggers accumulate
/// evidence before firing. See the join-operation compilation table for how
/// a [`crate::JoinOp`] is lowered into one slot `SigType` plus a per-trigger
/// `SigType` assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigType {
    /// Fires once `count` of its triggers have matched, any order.
    Any,
    /// Fires once every distinct trigger position has matched, any order.
    And,
    /// Fires once triggers match in strictly descending `sig_val` order.
    Sequence,
    /// As `Sequence`, but consecutive witnesses must be ordinally adjacent.
    SequenceImm,
    /// Fires once every one-hot bit required has been cleared from the
    /// slot's bitmask.
    Within,
    /// A delimiter: firing before the slot is satisfied aborts the
    /// instance rather than contributing evidence.
    Del,
}

/// The join operator exposed to the builder DSL. Each variant lowers to one
/// row of the slot/trigger compilation table (`pm-table::compile`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinOp {
    Sequence,
    SequenceImm,
    SequenceStruct,
    Within,
    WithinStruct,
    Any,
    And,
}

/// The firing condition owned by a [`Program`]: a `(sigval, count)` pair
/// that the runtime mutates per-instance, and what happens once it reaches
/// its satisfied state.
#[derive(Debug, Clone, Copy)]
pub struct ActionSlotDef {
    pub sig_type: SigType,
    pub init_sigval: u32,
    pub init_count: u32,
    /// Synthetic event emitted (and recursively dispatched) when the slot
    /// is satisfied.
    pub event_on_fire: EventHandle,
    /// Non-zero iff firing this program also emits a user-visible named
    /// result; the value is the symbol id of the pattern's declared name.
    pub result_handle: u32,
}

impl ActionSlotDef {
    pub fn emits_result(&self) -> bool {
        self.result_handle != 0
    }
}

/// One incoming event subscription on a [`Program`].
#[derive(Debug, Clone, Copy)]
pub struct Trigger {
    pub event: EventHandle,
    /// Eligible to seed a new program instance when observed.
    pub is_key: bool,
    pub sig_type: SigType,
    pub sig_val: u32,
    /// Non-zero iff a matching fire binds `data` to this variable name.
    pub variable: u32,
}

/// A compiled, static program: one firing condition plus the ordered list
/// of events that feed it.
#[derive(Debug, Clone)]
pub struct Program {
    pub id: u32,
    /// Proximity distance, in ordinal positions, beyond which an open
    /// instance of this program expires unfired.
    pub range: u32,
    pub slot: ActionSlotDef,
    pub triggers: Vec<Trigger>,
}

impl Program {
    pub fn new(id: u32, range: u32, slot: ActionSlotDef) -> Self {
        Self {
            id,
            range,
            slot,
            triggers: Vec::new(),
        }
    }

    /// Triggers eligible to seed a new instance on first observation.
    pub fn key_triggers(&self) -> impl Iterator<Item = &Trigger> {
        self.triggers.iter().filter(|t| t.is_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pm_events::EventKind;

    fn handle(idx: u32) -> EventHandle {
        EventHandle::new(EventKind::Expression, idx).unwrap()
    }

    #[test]
    fn emits_result_reflects_nonzero_handle() {
        let slot_no_result = ActionSlotDef {
            sig_type: SigType::Sequence,
            init_sigval: 2,
            init_count: 2,
            event_on_fire: handle(1),
            result_handle: 0,
        };
        assert!(!slot_no_result.emits_result());

        let slot_with_result = ActionSlotDef {
            result_handle: 7,
            ..slot_no_result
        };
        assert!(slot_with_result.emits_result());
    }

    #[test]
    fn key_triggers_filters_non_key() {
        let slot = ActionSlotDef {
            sig_type: SigType::Any,
            init_sigval: 0,
            init_count: 1,
            event_on_fire: handle(99),
            result_handle: 0,
        };
        let mut program = Program::new(0, 10, slot);
        program.triggers.push(Trigger {
            event: handle(1),
            is_key: true,
            sig_type: SigType::Any,
            sig_val: 0,
            variable: 0,
        });
        program.triggers.push(Trigger {
            event: handle(2),
            is_key: false,
            sig_type: SigType::Any,
            sig_val: 0,
            variable: 0,
        });

        let keys: Vec<_> = program.key_triggers().collect();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].event, handle(1));
    }
}
