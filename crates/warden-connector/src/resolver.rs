//! DNS resolution seam.
//!
//! Resolution is an interface so the validator and the drift check can be
//! exercised deterministically: tests swap in a [`StaticResolver`] and
//! change its answers between validation and dial to simulate rebinding.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::RwLock;

use crate::error::{ConnectorError, ConnectorResult};

/// Resolves hostnames to IP addresses.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// Resolve a hostname. The port only routes the lookup; the returned
    /// addresses are bare IPs.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Network`] if resolution fails or yields
    /// no addresses.
    async fn resolve(&self, host: &str, port: u16) -> ConnectorResult<Vec<IpAddr>>;
}

/// The operating system resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl DnsResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> ConnectorResult<Vec<IpAddr>> {
        let addrs: Vec<IpAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| ConnectorError::Network(format!("dns resolution failed: {e}")))?
            .map(|addr| addr.ip())
            .collect();

        if addrs.is_empty() {
            return Err(ConnectorError::Network(format!(
                "dns resolution for {host} returned no addresses"
            )));
        }
        Ok(addrs)
    }
}

/// Fixed-answer resolver for tests.
///
/// Besides a steady answer per host, answers can be queued: each resolve
/// pops the next queued set first. Queuing different sets simulates DNS
/// changing between validation and dial (rebinding).
#[derive(Debug, Default)]
pub struct StaticResolver {
    answers: RwLock<HashMap<String, Vec<IpAddr>>>,
    queued: RwLock<HashMap<String, VecDeque<Vec<IpAddr>>>>,
}

impl StaticResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) the steady answer for a host.
    pub fn set(&self, host: impl Into<String>, addrs: Vec<IpAddr>) {
        if let Ok(mut answers) = self.answers.write() {
            answers.insert(host.into().to_ascii_lowercase(), addrs);
        }
    }

    /// Queue a one-shot answer for a host, consumed before the steady one.
    pub fn enqueue(&self, host: impl Into<String>, addrs: Vec<IpAddr>) {
        if let Ok(mut queued) = self.queued.write() {
            queued
                .entry(host.into().to_ascii_lowercase())
                .or_default()
                .push_back(addrs);
        }
    }
}

#[async_trait]
impl DnsResolver for StaticResolver {
    async fn resolve(&self, host: &str, _port: u16) -> ConnectorResult<Vec<IpAddr>> {
        let host = host.to_ascii_lowercase();

        if let Ok(mut queued) = self.queued.write() {
            if let Some(queue) = queued.get_mut(&host) {
                if let Some(addrs) = queue.pop_front() {
                    return Ok(addrs);
                }
            }
        }

        let answers = self
            .answers
            .read()
            .map_err(|_| ConnectorError::Network("resolver lock poisoned".to_string()))?;
        answers
            .get(&host)
            .filter(|addrs| !addrs.is_empty())
            .cloned()
            .ok_or_else(|| ConnectorError::Network(format!("no static answer for {host}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_static_resolver_answers() {
        let resolver = StaticResolver::new();
        resolver.set(
            "example.com",
            vec![IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))],
        );

        let addrs = resolver.resolve("EXAMPLE.com", 443).await.unwrap();
        assert_eq!(addrs, vec![IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))]);

        assert!(resolver.resolve("other.com", 443).await.is_err());
    }

    #[tokio::test]
    async fn test_static_resolver_can_change_answers() {
        let resolver = StaticResolver::new();
        resolver.set("example.com", vec![IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4))]);
        resolver.set("example.com", vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))]);

        let addrs = resolver.resolve("example.com", 443).await.unwrap();
        assert_eq!(addrs, vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))]);
    }

    #[tokio::test]
    async fn test_queued_answers_consumed_first() {
        let resolver = StaticResolver::new();
        resolver.set("example.com", vec![IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))]);
        resolver.enqueue("example.com", vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))]);

        // Queued answer first, then the steady one.
        assert_eq!(
            resolver.resolve("example.com", 443).await.unwrap(),
            vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))]
        );
        assert_eq!(
            resolver.resolve("example.com", 443).await.unwrap(),
            vec![IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))]
        );
    }
}
