//! Lowers a [`JoinOp`] plus its member events into one [`ActionSlotDef`] and
//! an ordered list of [`Trigger`]s, per the join-operation compilation
//! table. This is a pure function: it neither mutates a [`crate::ProgramTable`]
//! nor looks at runtime state.

use pm_events::EventHandle;
use pm_model::{ActionSlotDef, JoinOp, SigType, Trigger};

use crate::error::BuildError;

/// Largest argument count a `Within`-family join may address; each member
/// claims one bit of a 32-bit mask.
const WITHIN_MAX_ARGC: u32 = 32;

/// One member event feeding a join expression, with its optional attached
/// variable (`0` meaning none).
#[derive(Debug, Clone, Copy)]
pub struct JoinMember {
    pub event: EventHandle,
    pub variable: u32,
}

impl JoinMember {
    pub fn new(event: EventHandle, variable: u32) -> Self {
        Self { event, variable }
    }
}

/// The slot and triggers a [`JoinOp`] compiles to, ready to install into a
/// [`crate::ProgramTable`] via `create_program`/`create_trigger`.
#[derive(Debug)]
pub struct CompiledJoin {
    pub range: u32,
    pub slot: ActionSlotDef,
    pub triggers: Vec<Trigger>,
}

/// Compile `op` applied to `members` into a slot/trigger set.
///
/// `cardinality` is only meaningful for `Any`/`And`; pass `0` to use the
/// join operator's default (`1` for `Any`, `argc` for `And`). A
/// `cardinality` greater than `argc` is clamped rather than rejected.
pub fn compile_join_op(
    op: JoinOp,
    members: &[JoinMember],
    range: u32,
    cardinality: u32,
    event_on_fire: EventHandle,
    result_handle: u32,
) -> Result<CompiledJoin, BuildError> {
    let argc = members.len() as u32;
    if argc == 0 {
        return Err(BuildError::ArgOutOfRange {
            what: "argc",
            value: 0,
            max: u32::MAX,
        });
    }

    match op {
        JoinOp::Sequence | JoinOp::SequenceImm => {
            let slot_sig_type = if op == JoinOp::Sequence {
                SigType::Sequence
            } else {
                SigType::SequenceImm
            };
            let slot = ActionSlotDef {
                sig_type: slot_sig_type,
                init_sigval: argc,
                init_count: argc,
                event_on_fire,
                result_handle,
            };
            let triggers = members
                .iter()
                .enumerate()
                .map(|(i, m)| {
                    let i = i as u32;
                    let sig_type = if op == JoinOp::SequenceImm && i > 0 {
                        SigType::SequenceImm
                    } else {
                        SigType::Sequence
                    };
                    Trigger {
                        event: m.event,
                        is_key: i == 0,
                        sig_type,
                        sig_val: argc - i,
                        variable: m.variable,
                    }
                })
                .collect();
            Ok(CompiledJoin {
                range,
                slot,
                triggers,
            })
        }

        JoinOp::SequenceStruct => {
            require_delimiter_and_member(argc)?;
            let slot = ActionSlotDef {
                sig_type: SigType::Sequence,
                init_sigval: argc - 1,
                init_count: argc - 1,
                event_on_fire,
                result_handle,
            };
            let triggers = members
                .iter()
                .enumerate()
                .map(|(i, m)| {
                    let i = i as u32;
                    if i == 0 {
                        Trigger {
                            event: m.event,
                            is_key: false,
                            sig_type: SigType::Del,
                            sig_val: 0,
                            variable: m.variable,
                        }
                    } else {
                        Trigger {
                            event: m.event,
                            is_key: i == 1,
                            sig_type: SigType::Sequence,
                            sig_val: argc - i,
                            variable: m.variable,
                        }
                    }
                })
                .collect();
            Ok(CompiledJoin {
                range,
                slot,
                triggers,
            })
        }

        JoinOp::Within => {
            if argc > WITHIN_MAX_ARGC {
                return Err(BuildError::ArgOutOfRange {
                    what: "Within argc",
                    value: argc,
                    max: WITHIN_MAX_ARGC,
                });
            }
            let slot = ActionSlotDef {
                sig_type: SigType::Within,
                init_sigval: u32::MAX,
                init_count: argc,
                event_on_fire,
                result_handle,
            };
            let triggers = members
                .iter()
                .enumerate()
                .map(|(i, m)| {
                    let i = i as u32;
                    Trigger {
                        event: m.event,
                        is_key: true,
                        sig_type: SigType::Within,
                        sig_val: 1 << (argc - i - 1),
                        variable: m.variable,
                    }
                })
                .collect();
            Ok(CompiledJoin {
                range,
                slot,
                triggers,
            })
        }

        JoinOp::WithinStruct => {
            require_delimiter_and_member(argc)?;
            let non_delim = argc - 1;
            if non_delim >= WITHIN_MAX_ARGC {
                return Err(BuildError::ArgOutOfRange {
                    what: "WithinStruct argc",
                    value: non_delim,
                    max: WITHIN_MAX_ARGC - 1,
                });
            }
            let slot = ActionSlotDef {
                sig_type: SigType::Within,
                init_sigval: u32::MAX,
                init_count: non_delim,
                event_on_fire,
                result_handle,
            };
            let triggers = members
                .iter()
                .enumerate()
                .map(|(i, m)| {
                    let i = i as u32;
                    if i == 0 {
                        Trigger {
                            event: m.event,
                            is_key: false,
                            sig_type: SigType::Del,
                            sig_val: 0,
                            variable: m.variable,
                        }
                    } else {
                        Trigger {
                            event: m.event,
                            is_key: true,
                            sig_type: SigType::Within,
                            sig_val: 1 << (argc - i),
                            variable: m.variable,
                        }
                    }
                })
                .collect();
            Ok(CompiledJoin {
                range,
                slot,
                triggers,
            })
        }

        JoinOp::Any | JoinOp::And => {
            let sig_type = if op == JoinOp::Any {
                SigType::Any
            } else {
                SigType::And
            };
            let default_count = if op == JoinOp::Any { 1 } else { argc };
            let mut count = if cardinality == 0 {
                default_count
            } else {
                cardinality
            };
            if count > argc {
                // Open question (see DESIGN.md): clamp rather than reject.
                count = argc;
            }
            let slot = ActionSlotDef {
                sig_type,
                init_sigval: 0,
                init_count: count,
                event_on_fire,
                result_handle,
            };
            let triggers = members
                .iter()
                .map(|m| Trigger {
                    event: m.event,
                    is_key: true,
                    sig_type,
                    sig_val: 0,
                    variable: m.variable,
                })
                .collect();
            Ok(CompiledJoin {
                range,
                slot,
                triggers,
            })
        }
    }
}

fn require_delimiter_and_member(argc: u32) -> Result<(), BuildError> {
    if argc < 2 {
        Err(BuildError::ArgOutOfRange {
            what: "argc (a delimiter plus at least one member is required)",
            value: argc,
            max: u32::MAX,
        })
    } else {
        Ok(())
    }
}
