use thiserror::Error;

/// Errors raised while assembling or compiling a program table. These
/// abort the in-progress DSL call that triggered them; the table itself is
/// left in its last valid state so the caller can decide whether to
/// continue building or discard the instance.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{what} out of range: {value} (max {max})")]
    ArgOutOfRange {
        what: &'static str,
        value: u32,
        max: u32,
    },

    #[error("operation requires a staged expression but the stack is empty")]
    EmptyStack,

    #[error("variable {variable} is already attached to this node")]
    DuplicateVariable { variable: u32 },

    #[error("failed to allocate a symbol id")]
    SymbolAllocationFailed(#[from] pm_events::HandleOverflow),

    #[error("unrecognized option {name:?}")]
    UnknownOption { name: String },

    #[error("event handle identifier {idx} overflowed the 30-bit id space")]
    EventHandleOverflow { idx: u32 },

    #[error("program {program_id} introduces a cyclic reference through its own trigger network")]
    CyclicReference { program_id: u32 },

    #[error("program {program_id} is already finalized and accepts no more triggers")]
    ProgramAlreadyDone { program_id: u32 },

    #[error("no program with id {program_id}")]
    UnknownProgram { program_id: u32 },
}
