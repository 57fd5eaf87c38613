//! Warden Connector - SSRF-hardened execution of allowed actions.
//!
//! Connectors perform the external side effect for an ALLOWed action. The
//! HTTP path is deliberately paranoid:
//!
//! - every target is validated before use: scheme, credentials, allow-list,
//!   and every resolved IP checked against the blocked ranges,
//! - the dial is pinned to the validated IP (the HTTP client's resolver is
//!   overridden for this host), while SNI and the Host header keep the
//!   original hostname,
//! - a re-resolution immediately before dialing must reproduce the
//!   validated address set; anything new is DNS drift and aborts the call,
//! - redirects are not followed,
//! - requests and responses are size-capped; responses stream and are cut
//!   off (with `truncated = true`) at the cap.
//!
//! DNS is an injected seam ([`DnsResolver`]) so tests can simulate
//! rebinding without touching real resolvers.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod connector;
mod error;
mod http;
mod mock;
mod resolver;
mod secrets;
mod ssrf;

pub use connector::{Connector, ConnectorLimits, ConnectorResponse};
pub use error::{ConnectorError, ConnectorResult, SsrfReason};
pub use http::HttpConnector;
pub use mock::MockConnector;
pub use resolver::{DnsResolver, StaticResolver, SystemResolver};
pub use secrets::{SecretsProvider, StaticSecrets};
pub use ssrf::{ResolvedTarget, SsrfPolicy, is_blocked_ip, validate_target};
