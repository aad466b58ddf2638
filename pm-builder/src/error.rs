use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuilderError {
    #[error(transparent)]
    Table(#[from] pm_table::BuildError),

    #[error(transparent)]
    HandleOverflow(#[from] pm_events::HandleOverflow),

    #[error("expression references {argc} arguments but only {available} are on the stack")]
    StackUnderflow { argc: usize, available: usize },

    #[error("operation requires a node on the expression stack")]
    EmptyStack,

    #[error("more than one variable assignment to the same expression stack node")]
    VariableAlreadyAttached { variable: u32 },

    #[error("a variable can only be attached to an atomic leaf node, not an already-compiled subexpression")]
    VariableOnCompoundPattern,
}
