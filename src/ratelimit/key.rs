//! Composite admission key generation.

use super::identity::UNKNOWN_IDENTITY;

/// Resource scope used when the caller does not ask for isolation.
pub const GLOBAL_SCOPE: &str = "global";

/// A key that uniquely identifies a quota pool.
///
/// The key is composed of the caller identity and the resource scope, so
/// exhausting one route never affects another route for the same caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdmissionKey {
    /// The resolved caller identity
    pub identity: String,
    /// The resource scope this quota pool belongs to
    pub scope: String,
}

impl AdmissionKey {
    /// Create a new key. Blank inputs fall back to the sentinels.
    pub fn new(identity: &str, scope: &str) -> Self {
        let identity = identity.trim();
        let scope = scope.trim();

        Self {
            identity: if identity.is_empty() {
                UNKNOWN_IDENTITY.to_string()
            } else {
                identity.to_string()
            },
            scope: if scope.is_empty() {
                GLOBAL_SCOPE.to_string()
            } else {
                scope.to_string()
            },
        }
    }

    /// Create a key in the global scope.
    pub fn global(identity: &str) -> Self {
        Self::new(identity, GLOBAL_SCOPE)
    }

    /// The `{identity}:{scope}` form used by the window store.
    pub fn to_string_key(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for AdmissionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.identity, self.scope)
    }
}

/// Shorthand for `AdmissionKey::new(identity, scope).to_string_key()`.
pub fn compose_key(identity: &str, scope: &str) -> String {
    AdmissionKey::new(identity, scope).to_string_key()
}
