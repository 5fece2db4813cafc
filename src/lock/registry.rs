//! Process-wide registry of custom lock deserializers.
//!
//! Reserved tags `"none"`, `"owner"`, `"pubkey"` are always handled by the
//! built-in [`Lock`](super::Lock) variants unless a caller explicitly
//! registers an override (overrides take precedence). Tests that exercise
//! the registry should call [`reset`] in a cleanup step or at the start of
//! the test, since the registry is shared process-wide state.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use crate::error::DomainError;

use super::CustomLock;

/// A deserializer for one custom lock tag: turns the `data` fields of an
/// encoded lock (everything but `type`) into a boxed [`CustomLock`].
pub type CustomLockDeserializer =
    fn(&serde_json::Map<String, serde_json::Value>) -> Result<Box<dyn CustomLock>, DomainError>;

fn registry() -> &'static RwLock<HashMap<String, CustomLockDeserializer>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, CustomLockDeserializer>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register a deserializer for `tag`. Replaces any existing registration
/// for the same tag, including a previous override of a reserved tag.
pub fn register(tag: impl Into<String>, deserializer: CustomLockDeserializer) {
    registry()
        .write()
        .expect("lock registry poisoned")
        .insert(tag.into(), deserializer);
}

/// Returns `true` if `tag` has a registered deserializer (built-ins are not
/// included — they are handled separately by [`super::lock_from_value`]).
pub fn has(tag: &str) -> bool {
    registry()
        .read()
        .expect("lock registry poisoned")
        .contains_key(tag)
}

/// Look up the deserializer registered for `tag`, if any.
pub(crate) fn get(tag: &str) -> Option<CustomLockDeserializer> {
    registry().read().expect("lock registry poisoned").get(tag).copied()
}

/// List every registered tag, in no particular order.
pub fn list() -> Vec<String> {
    registry()
        .read()
        .expect("lock registry poisoned")
        .keys()
        .cloned()
        .collect()
}

/// Clear every registration. Intended for test isolation — the registry is
/// process-wide, so tests that register custom locks should reset it
/// before asserting on [`list`]/[`has`].
pub fn reset() {
    registry().write().expect("lock registry poisoned").clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct AlwaysDenies;

    impl CustomLock for AlwaysDenies {
        fn tag(&self) -> &str {
            "always-denies"
        }

        fn validate(
            &self,
            _tx: &crate::transaction::Tx,
            _input_index: usize,
        ) -> Result<(), DomainError> {
            Err(crate::error::AuthorizationError::CustomDenied("nope".into()).into())
        }

        fn data_fields(&self) -> serde_json::Map<String, serde_json::Value> {
            serde_json::Map::new()
        }

        fn clone_box(&self) -> Box<dyn CustomLock> {
            Box::new(self.clone())
        }

        fn eq_box(&self, other: &dyn CustomLock) -> bool {
            other.tag() == self.tag()
        }
    }

    fn deser_always_denies(
        _data: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Box<dyn CustomLock>, DomainError> {
        Ok(Box::new(AlwaysDenies))
    }

    #[test]
    fn register_has_list_reset_roundtrip() {
        reset();
        assert!(!has("always-denies"));
        register("always-denies", deser_always_denies);
        assert!(has("always-denies"));
        assert!(list().contains(&"always-denies".to_string()));
        reset();
        assert!(!has("always-denies"));
    }
}
