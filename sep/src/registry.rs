//! Endpoint registry
//!
//! Owns the state record of every peer, indexed by [`EndpointId`], and maps
//! datagram source addresses and configured host names back to it.

use crate::error::ProtocolError;
use sep_protocol::{EndpointState, FloodConfig};
use std::collections::HashMap;
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Instant;

/// Index of an endpoint within its protocol instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(usize);

impl EndpointId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Table of endpoint state records
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: Vec<EndpointState>,
    by_addr: HashMap<SocketAddr, EndpointId>,
    by_host: HashMap<String, EndpointId>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `host` at `addr` with fresh state
    ///
    /// A host name or address that is already registered resolves to the
    /// existing record.
    pub fn register(
        &mut self,
        host: &str,
        addr: SocketAddr,
        flood: &FloodConfig,
        now: Instant,
    ) -> EndpointId {
        if let Some(&id) = self.by_host.get(host) {
            return id;
        }
        if let Some(&id) = self.by_addr.get(&addr) {
            self.by_host.insert(host.to_string(), id);
            return id;
        }

        let id = EndpointId(self.endpoints.len());
        self.endpoints.push(EndpointState::new(host, addr, flood, now));
        self.by_addr.insert(addr, id);
        self.by_host.insert(host.to_string(), id);
        id
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn get(&self, id: EndpointId) -> Option<&EndpointState> {
        self.endpoints.get(id.0)
    }

    pub fn get_mut(&mut self, id: EndpointId) -> Option<&mut EndpointState> {
        self.endpoints.get_mut(id.0)
    }

    /// Endpoint a datagram from `addr` belongs to
    pub fn lookup_addr(&self, addr: SocketAddr) -> Option<EndpointId> {
        self.by_addr.get(&addr).copied()
    }

    /// Endpoint registered under `host`
    pub fn lookup_host(&self, host: &str) -> Option<EndpointId> {
        self.by_host.get(host).copied()
    }

    /// Endpoint state registered under `host`
    pub fn by_host(&self, host: &str) -> Option<&EndpointState> {
        self.lookup_host(host).and_then(|id| self.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (EndpointId, &EndpointState)> {
        self.endpoints
            .iter()
            .enumerate()
            .map(|(index, state)| (EndpointId(index), state))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EndpointId, &mut EndpointState)> {
        self.endpoints
            .iter_mut()
            .enumerate()
            .map(|(index, state)| (EndpointId(index), state))
    }
}

/// Resolve `host` on `port` to an address of the requested IP family
pub fn resolve(host: &str, port: u16, ipv4: bool) -> Result<SocketAddr, ProtocolError> {
    let candidates = (host, port)
        .to_socket_addrs()
        .map_err(|e| ProtocolError::Resolve {
            host: host.to_string(),
            reason: e.to_string(),
        })?;

    let mut candidates = candidates.peekable();
    if candidates.peek().is_none() {
        return Err(ProtocolError::Resolve {
            host: host.to_string(),
            reason: "no addresses found".to_string(),
        });
    }

    candidates
        .find(|addr| addr.is_ipv4() == ipv4)
        .ok_or_else(|| ProtocolError::Resolve {
            host: host.to_string(),
            reason: format!(
                "no {} address found",
                if ipv4 { "IPv4" } else { "IPv6" }
            ),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = EndpointRegistry::new();
        let now = Instant::now();
        let id = registry.register("peer", addr("127.0.0.1:10222"), &FloodConfig::default(), now);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup_addr(addr("127.0.0.1:10222")), Some(id));
        assert_eq!(registry.lookup_host("peer"), Some(id));
        assert_eq!(registry.by_host("peer").unwrap().host(), "peer");
        assert_eq!(registry.lookup_addr(addr("127.0.0.1:10223")), None);
        assert_eq!(registry.lookup_host("other"), None);
    }

    #[test]
    fn test_duplicate_registration_reuses_record() {
        let mut registry = EndpointRegistry::new();
        let now = Instant::now();
        let flood = FloodConfig::default();

        let first = registry.register("localhost", addr("127.0.0.1:10222"), &flood, now);
        let again = registry.register("localhost", addr("127.0.0.1:10222"), &flood, now);
        let alias = registry.register("127.0.0.1", addr("127.0.0.1:10222"), &flood, now);

        assert_eq!(first, again);
        assert_eq!(first, alias);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup_host("127.0.0.1"), Some(first));
    }

    #[test]
    fn test_records_are_independent() {
        let mut registry = EndpointRegistry::new();
        let now = Instant::now();
        let flood = FloodConfig::default();

        let a = registry.register("a", addr("10.0.0.1:10222"), &flood, now);
        let b = registry.register("b", addr("10.0.0.2:10222"), &flood, now);

        registry.get_mut(a).unwrap().next_header();
        assert_eq!(registry.get(a).unwrap().local_seq().as_raw(), 2);
        assert_eq!(registry.get(b).unwrap().local_seq().as_raw(), 1);
        assert_eq!(registry.iter().count(), 2);
    }

    #[test]
    fn test_resolve_literal_address() {
        let resolved = resolve("127.0.0.1", 10222, true).unwrap();
        assert_eq!(resolved, addr("127.0.0.1:10222"));
    }

    #[test]
    fn test_resolve_wrong_family() {
        assert!(matches!(
            resolve("127.0.0.1", 10222, false),
            Err(ProtocolError::Resolve { .. })
        ));
    }
}
