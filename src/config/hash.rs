//! Hashing for template change tracking and stable identifiers.
//!
//! Role assignments are addressed by a GUID chosen by the caller. Deriving it
//! from the scope, principal and role means a re-run puts the same assignment
//! again instead of creating a duplicate.

use sha2::{Digest, Sha256};
use uuid::{Builder, Uuid};

/// Hasher for templates and assignment identifiers.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of a template document, independent of key order.
    #[must_use]
    pub fn hash_template(&self, template: &serde_json::Value) -> String {
        let mut hasher = Sha256::new();
        hash_value(&mut hasher, template);
        hex::encode(hasher.finalize())
    }

    /// Returns the first 12 hex characters of the template hash.
    #[must_use]
    pub fn short_template_hash(&self, template: &serde_json::Value) -> String {
        let mut hash = self.hash_template(template);
        hash.truncate(12);
        hash
    }

    /// Derives a deterministic role assignment ID.
    #[must_use]
    pub fn assignment_id(&self, scope: &str, principal_id: &str, role_definition_id: &str) -> Uuid {
        let mut hasher = Sha256::new();
        hasher.update(scope.to_ascii_lowercase().as_bytes());
        hasher.update(b"\0");
        hasher.update(principal_id.to_ascii_lowercase().as_bytes());
        hasher.update(b"\0");
        hasher.update(role_definition_id.to_ascii_lowercase().as_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Builder::from_random_bytes(bytes).into_uuid()
    }
}

/// Feeds a JSON value into the hasher with object keys in sorted order.
fn hash_value(hasher: &mut Sha256, value: &serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            hasher.update(b"{");
            for key in keys {
                hasher.update(key.as_bytes());
                hasher.update(b":");
                hash_value(hasher, &map[key.as_str()]);
                hasher.update(b",");
            }
            hasher.update(b"}");
        }
        serde_json::Value::Array(items) => {
            hasher.update(b"[");
            for item in items {
                hash_value(hasher, item);
                hasher.update(b",");
            }
            hasher.update(b"]");
        }
        scalar => hasher.update(scalar.to_string().as_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_hash_deterministic() {
        let hasher = ConfigHasher::new();
        let a = serde_json::json!({"resources": [], "outputs": {"x": 1}});
        let b = serde_json::json!({"outputs": {"x": 1}, "resources": []});

        assert_eq!(hasher.hash_template(&a), hasher.hash_template(&b));
        assert_eq!(hasher.short_template_hash(&a).len(), 12);
    }

    #[test]
    fn test_template_hash_changes() {
        let hasher = ConfigHasher::new();
        let a = serde_json::json!({"resources": []});
        let b = serde_json::json!({"resources": [{"type": "x"}]});

        assert_ne!(hasher.hash_template(&a), hasher.hash_template(&b));
    }

    #[test]
    fn test_assignment_id_stable_and_case_insensitive() {
        let hasher = ConfigHasher::new();
        let scope = "/subscriptions/s/resourceGroups/rg";

        let first = hasher.assignment_id(scope, "AAAA", "role");
        let second = hasher.assignment_id(&scope.to_lowercase(), "aaaa", "ROLE");
        let other = hasher.assignment_id(scope, "bbbb", "role");

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(first.get_version_num(), 4);
    }
}
