//! Warden Audit - Hash-chained, signed interaction records.
//!
//! Every decision the gateway makes (and every execution it performs)
//! becomes an immutable interaction record:
//!
//! - the record's fields are hashed over their canonical JSON form,
//! - each record names the previous record's hash, forming a per-stream
//!   chain whose first link is the zero hash,
//! - the record hash is signed with the gateway's Ed25519 key.
//!
//! Verification needs nothing but the records and a set of public keys:
//! recompute each hash, follow the links, check each signature. Flipping a
//! single byte anywhere breaks the chain at that record.
//!
//! The crate also exports evidence bundles: deterministic tar+gzip archives
//! carrying records, a verification report, the manifest snapshot, the
//! historical public keys, and a signed bundle manifest.
//!
//! # Example
//!
//! ```
//! use warden_audit::{AuditEvent, AuditLog, MemoryAuditStore};
//! use warden_core::{Outcome, StreamId};
//! use warden_crypto::{KeyPair, KeyRing};
//! use std::sync::Arc;
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let key = KeyPair::generate();
//! let ring = KeyRing::single(key.export_public_key());
//! let log = AuditLog::new(Arc::new(MemoryAuditStore::new()), Arc::new(key));
//!
//! let stream = StreamId::default();
//! log.append(&stream, AuditEvent::minimal("org-1", "uapk-1", "agent-1", "read", "echo", Outcome::Allow))
//!     .await
//!     .unwrap();
//!
//! let report = log.verify_chain(&stream, &ring).await.unwrap();
//! assert!(report.ok);
//! # });
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod export;
mod log;
mod record;
mod store;

pub use error::{AuditError, AuditResult};
pub use export::{ExportFilter, export_bundle};
pub use log::{AuditLog, ChainFailure, ChainVerificationReport};
pub use record::{AuditEvent, InteractionRecord};
pub use store::{AuditStore, JsonlAuditStore, MemoryAuditStore};
