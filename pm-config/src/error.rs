use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown pattern matching compile option: '{name}'")]
    UnknownOption { name: String },
}
