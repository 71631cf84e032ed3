use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown write mode: {0}")]
    UnknownWriteMode(String),

    #[error("unknown read method: {0}")]
    UnknownReadMethod(String),

    #[error("unknown durability level: {0}")]
    UnknownDurability(String),
}
