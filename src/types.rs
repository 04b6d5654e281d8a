use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One raw probe answer for a host in the scanned range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeHit {
    pub ip: Ipv4Addr,
    pub open: bool,
    pub name: Option<String>,
}

/// A host that answered on the SSH port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NodeCandidate {
    pub ip: Ipv4Addr,
    pub name: Option<String>,
}

impl NodeCandidate {
    pub fn new(ip: Ipv4Addr, name: Option<String>) -> Self {
        Self {
            ip,
            name: name.filter(|n| !n.trim().is_empty()),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }
}

impl fmt::Display for NodeCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} ({})", self.ip),
            None => write!(f, "{}", self.ip),
        }
    }
}

/// Discovered nodes in discovery order. Operators pick by 1-based position,
/// so the order is part of the contract.
pub type NodeList = Vec<NodeCandidate>;

/// Which collaborator answers "is the port open" for the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ProbeKind {
    /// In-process asynchronous TCP connect probe.
    #[default]
    Connect,
    /// External `nmap` with grepable output.
    Nmap,
}

/// Settings shared by every discovery cycle.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub port: u16,
    pub probe: ProbeKind,
    pub connect_timeout: Duration,
    pub concurrency: usize,
    pub spinner_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: 22,
            probe: ProbeKind::Connect,
            connect_timeout: Duration::from_millis(400),
            concurrency: 256,
            spinner_interval: Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_names_are_dropped() {
        let node = NodeCandidate::new(Ipv4Addr::new(10, 0, 0, 9), Some("  ".into()));
        assert_eq!(node.name, None);
        assert_eq!(node.display_name(), "unnamed");
    }

    #[test]
    fn display_includes_name_when_known() {
        let node = NodeCandidate::new(Ipv4Addr::new(10, 0, 0, 5), Some("alice-mac".into()));
        assert_eq!(node.to_string(), "alice-mac (10.0.0.5)");
    }
}
