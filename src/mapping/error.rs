//! Error definitions for the mapping module

use crate::pointer::PointerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MappingError {
    /// The pointer sink refused a command
    #[error("Pointer error: {0}")]
    PointerError(#[from] PointerError),

    /// The mapper task panicked or was cancelled
    #[error("Mapper task error: {0}")]
    ThreadError(String),
}
