//! Token persistence contract for forcelink.
//!
//! The session token is persisted as a single opaque string in one named
//! slot. Host applications supply the backing implementation (a keychain
//! entry, a preferences store, a file); this crate ships the contract and an
//! in-memory slot used in tests and short-lived processes.

mod memory;
mod traits;

pub use memory::MemoryTokenSlot;
pub use traits::TokenSlot;

use thiserror::Error;

/// Error type for store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backend-specific storage error
    #[error("Platform storage error: {0}")]
    Platform(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
