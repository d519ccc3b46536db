//! In-memory slot implementation.

use crate::{StoreResult, TokenSlot};
use std::sync::Mutex;

/// Process-local token slot. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryTokenSlot {
    value: Mutex<Option<String>>,
}

impl MemoryTokenSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenSlot for MemoryTokenSlot {
    fn get(&self) -> StoreResult<Option<String>> {
        Ok(self.value.lock().unwrap().clone())
    }

    fn set(&self, value: &str) -> StoreResult<()> {
        *self.value.lock().unwrap() = Some(value.to_string());
        Ok(())
    }
}
