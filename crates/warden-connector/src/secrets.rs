//! The secrets seam.
//!
//! Tool auth references name secrets; something outside the core (a vault
//! client, a k8s secret mount, an env shim) implements the lookup. The
//! core never reads the process environment itself.

use std::collections::HashMap;

/// Resolves secret names to secret bytes.
pub trait SecretsProvider: Send + Sync {
    /// Look up a secret by name.
    fn get(&self, name: &str) -> Option<Vec<u8>>;
}

/// Fixed in-memory secrets, for tests and embedded deployments.
#[derive(Debug, Default)]
pub struct StaticSecrets {
    secrets: HashMap<String, Vec<u8>>,
}

impl StaticSecrets {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }
}

impl SecretsProvider for StaticSecrets {
    fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.secrets.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_secrets() {
        let secrets = StaticSecrets::new().with("crm_api_key", "s3cr3t");
        assert_eq!(secrets.get("crm_api_key"), Some(b"s3cr3t".to_vec()));
        assert_eq!(secrets.get("missing"), None);
    }
}
