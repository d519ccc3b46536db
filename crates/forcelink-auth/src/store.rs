//! Serde-aware wrapper over the token slot.

use crate::error::AuthResult;
use crate::token::AuthToken;
use forcelink_store::TokenSlot;

/// High-level API for loading and saving the session token.
///
/// The slot holds one opaque JSON blob; a blank value is treated the same as
/// an absent one, and clearing writes the empty string.
pub struct TokenStore {
    slot: Box<dyn TokenSlot>,
}

impl TokenStore {
    /// Create a token store with the given slot backend.
    pub fn new(slot: Box<dyn TokenSlot>) -> Self {
        Self { slot }
    }

    /// Load the persisted token, if any.
    pub fn load(&self) -> AuthResult<Option<AuthToken>> {
        match self.slot.get()? {
            Some(raw) if !raw.trim().is_empty() => Ok(Some(AuthToken::from_json(&raw)?)),
            _ => Ok(None),
        }
    }

    /// Persist the token; `None` clears the slot.
    pub fn save(&self, token: Option<&AuthToken>) -> AuthResult<()> {
        let raw = match token {
            Some(token) => token.to_json()?,
            None => String::new(),
        };
        self.slot.set(&raw)?;
        Ok(())
    }
}
