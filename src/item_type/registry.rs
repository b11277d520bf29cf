//! Process-wide registry mapping type identifiers to descriptors.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{EngineError, Result};

use super::ItemType;

/// Registry of item-type descriptors.
///
/// Populated at startup, then frozen behind an `Arc`; lookups need no
/// synchronization. Identifiers supplied programmatically by callers are
/// trusted; identifiers read back from storage go through
/// [`TypeRegistry::resolve_stored`], which sanitizes them first.
#[derive(Default)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<dyn ItemType>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor for a type identifier.
    ///
    /// Re-registering an existing identifier is rejected so a behavior
    /// swap can never happen silently.
    pub fn register(&mut self, type_id: impl Into<String>, descriptor: Arc<dyn ItemType>) -> Result<()> {
        let type_id = type_id.into();
        if self.types.contains_key(&type_id) {
            return Err(EngineError::DuplicateType(type_id));
        }
        tracing::debug!(item_type = %type_id, "Registered item type");
        self.types.insert(type_id, descriptor);
        Ok(())
    }

    /// Resolve a trusted (programmatic) type identifier.
    pub fn resolve(&self, type_id: &str) -> Result<Arc<dyn ItemType>> {
        self.types
            .get(type_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownType(type_id.to_string()))
    }

    /// Resolve an identifier that originated from stored data.
    ///
    /// The raw identifier is reduced to the safe character subset before
    /// lookup; the sanitized identifier is returned alongside the
    /// descriptor.
    pub fn resolve_stored(&self, raw: &str) -> Result<(String, Arc<dyn ItemType>)> {
        let type_id = Self::sanitize(raw);
        let descriptor = self.resolve(&type_id)?;
        Ok((type_id, descriptor))
    }

    /// Reduce an untrusted identifier to `[a-z0-9_.]`.
    pub fn sanitize(raw: &str) -> String {
        raw.chars()
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '.')
            .collect()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serde_json::Value;

    use crate::model::Notification;
    use crate::item_type::RecipientMap;

    use super::*;

    struct StubType;

    #[async_trait::async_trait]
    impl ItemType for StubType {
        fn item_id(&self, _data: &Value) -> Result<i64> {
            Ok(1)
        }

        fn resolve_recipients(&self, _data: &Value) -> Result<RecipientMap> {
            Ok(RecipientMap::new())
        }

        fn insert_payload(&self, _data: &Value, _recipient_id: i64) -> Result<Value> {
            Ok(Value::Null)
        }

        fn update_payload(&self, _data: &Value) -> Result<Value> {
            Ok(Value::Null)
        }

        fn recipients_to_render(&self, _notification: &Notification) -> HashSet<i64> {
            HashSet::new()
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = TypeRegistry::new();
        registry.register("reply", Arc::new(StubType)).unwrap();

        assert!(registry.resolve("reply").is_ok());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_type() {
        let registry = TypeRegistry::new();
        match registry.resolve("reply") {
            Err(EngineError::UnknownType(t)) => assert_eq!(t, "reply"),
            other => panic!("expected UnknownType, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = TypeRegistry::new();
        registry.register("reply", Arc::new(StubType)).unwrap();

        match registry.register("reply", Arc::new(StubType)) {
            Err(EngineError::DuplicateType(t)) => assert_eq!(t, "reply"),
            other => panic!("expected DuplicateType, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_stored_identifiers_are_sanitized() {
        let mut registry = TypeRegistry::new();
        registry.register("reply", Arc::new(StubType)).unwrap();

        let (type_id, _) = registry.resolve_stored("re'; DROP--ply").unwrap();
        assert_eq!(type_id, "reply");

        // Trusted lookups do not sanitize.
        assert!(registry.resolve("re'; DROP--ply").is_err());
    }

    #[test]
    fn test_sanitize_keeps_safe_subset() {
        assert_eq!(TypeRegistry::sanitize("forum.post_reply2"), "forum.post_reply2");
        assert_eq!(TypeRegistry::sanitize("Reply!"), "eply");
        assert_eq!(TypeRegistry::sanitize("<script>"), "script");
    }
}
