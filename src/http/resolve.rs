//! Host resolution for HTTP maps
//!
//! A and AAAA lookups are separate requests so the fetch can proceed on
//! whichever family answers first.

use crate::error::{MapError, Result};
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

/// DNS record family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    A,
    Aaaa,
}

impl RecordType {
    fn matches(&self, addr: &IpAddr) -> bool {
        match self {
            RecordType::A => addr.is_ipv4(),
            RecordType::Aaaa => addr.is_ipv6(),
        }
    }
}

/// Boxed resolution future
pub type ResolveFuture = Pin<Box<dyn Future<Output = Result<Vec<IpAddr>>> + Send>>;

/// Asynchronous resolver used by the fetch state machine
pub trait Resolver: Send + Sync + 'static {
    /// Resolve one record family of a host
    fn resolve(&self, host: &str, record: RecordType) -> ResolveFuture;
}

/// Resolver backed by the system's name service
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, host: &str, record: RecordType) -> ResolveFuture {
        let host = host.to_string();
        Box::pin(async move {
            if let Ok(addr) = host.parse::<IpAddr>() {
                return Ok(if record.matches(&addr) { vec![addr] } else { Vec::new() });
            }

            let addrs = tokio::net::lookup_host((host.as_str(), 0))
                .await
                .map_err(|e| MapError::Resolve(format!("{}: {}", host, e)))?;

            Ok(addrs
                .map(|sa| sa.ip())
                .filter(|ip| record.matches(ip))
                .collect())
        })
    }
}

/// Resolver answering from a fixed table, for tests and static setups
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: Vec<(String, IpAddr)>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, host: &str, addr: IpAddr) -> Self {
        self.entries.push((host.to_ascii_lowercase(), addr));
        self
    }
}

impl Resolver for StaticResolver {
    fn resolve(&self, host: &str, record: RecordType) -> ResolveFuture {
        let host = host.to_ascii_lowercase();
        let found: Vec<IpAddr> = self
            .entries
            .iter()
            .filter(|(h, ip)| *h == host && record.matches(ip))
            .map(|(_, ip)| *ip)
            .collect();
        Box::pin(async move { Ok(found) })
    }
}
