use thiserror::Error;

/// Everything that can go wrong building or driving a pattern matcher
/// through this façade. Each variant wraps the lower crate's own error
/// type unchanged; this layer adds no new failure modes of its own beyond
/// the original-source coordinate overflow check `put_input` performs
/// before handing data to the state machine.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Builder(#[from] pm_builder::BuilderError),

    #[error(transparent)]
    Config(#[from] pm_config::ConfigError),

    #[error(transparent)]
    Runtime(#[from] pm_runtime::RuntimeError),

    #[error(transparent)]
    Handle(#[from] pm_events::HandleOverflow),
}
