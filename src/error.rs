//! Error types for the kernel registry

use thiserror::Error;

use crate::address::Address;

/// Result type for kernel operations
pub type Result<T> = std::result::Result<T, KernelError>;

/// Kernel registry errors
#[derive(Error, Debug)]
pub enum KernelError {
    #[error("Invalid parent state: parent kernel {parent} is not frozen")]
    InvalidParentState { parent: String },

    #[error("Kernel {name} v{version} is frozen")]
    FrozenRegistry { name: String, version: String },

    #[error("Implementation for '{contract}' already registered as {existing}")]
    DuplicateBinding { contract: String, existing: Address },

    #[error("Parent chain depth {depth} exceeds maximum of {max}")]
    ChainTooDeep { depth: usize, max: usize },

    #[error("Caller {caller} is not the developer {developer}")]
    Unauthorized { caller: Address, developer: Address },

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Zero address is not a valid implementation for '{contract}'")]
    ZeroImplementation { contract: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Kernel instance not found: {address}")]
    NotFound { address: Address },

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
