//! Storage trait definitions.

use crate::StoreResult;

/// Trait for the single slot holding the serialized session token.
///
/// Implementations must treat the value as opaque. There is one slot per
/// process; no versioning, no multi-account support.
pub trait TokenSlot: Send + Sync {
    /// Read the stored value.
    fn get(&self) -> StoreResult<Option<String>>;

    /// Overwrite the stored value.
    fn set(&self, value: &str) -> StoreResult<()>;

    /// Check if a value is present (a blank value still counts as present).
    fn has(&self) -> StoreResult<bool> {
        Ok(self.get()?.is_some())
    }
}
