use thiserror::Error;

/// Errors raised while feeding tokens into a live [`crate::StateMachine`].
/// These abort the offending `put_input`/`do_transition` call only; the
/// state machine remains usable for subsequent, well-ordered input.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("input ordinal position {got} precedes the current position {current}")]
    OutOfOrderInput { current: u32, got: u32 },

    #[error("original-source coordinate {value} overflowed the 32-bit coordinate space")]
    CoordOverflow { value: u64 },
}
