//! End-to-end tests for the Warden gateway.
//!
//! This crate has no library code; everything lives under `tests/`.
