//! Prelude module - commonly used types for convenient import.
//!
//! Use `use warden_connector::prelude::*;` to import all essential types.

// Errors
pub use crate::{ConnectorError, ConnectorResult, SsrfReason};

// Execution
pub use crate::{Connector, ConnectorLimits, ConnectorResponse, HttpConnector, MockConnector};

// SSRF validation
pub use crate::{ResolvedTarget, SsrfPolicy, is_blocked_ip, validate_target};

// Seams
pub use crate::{DnsResolver, SecretsProvider, StaticResolver, StaticSecrets, SystemResolver};
