use std::net::Ipv4Addr;
use std::sync::Mutex;

use airplonk::error::ProbeError;
use airplonk::neighbors::{fill_names, NeighborCache};
use airplonk::scanner::{scan, PortProbe};
use airplonk::types::ProbeHit;
use async_trait::async_trait;
use ipnet::Ipv4Net;

struct Probe(Vec<ProbeHit>);

#[async_trait]
impl PortProbe for Probe {
    async fn probe(&self, _range: Ipv4Net, _port: u16) -> Result<Vec<ProbeHit>, ProbeError> {
        Ok(self.0.clone())
    }
}

/// Answers from a fixed table and remembers what was asked.
#[derive(Default)]
struct Neighbors {
    table: Vec<(Ipv4Addr, &'static str)>,
    asked: Mutex<Vec<Ipv4Addr>>,
}

#[async_trait]
impl NeighborCache for Neighbors {
    async fn resolve_name(&self, ip: Ipv4Addr) -> Option<String> {
        self.asked.lock().unwrap().push(ip);
        self.table
            .iter()
            .find(|(known, _)| *known == ip)
            .map(|(_, name)| name.to_string())
    }
}

fn hit(ip: [u8; 4], open: bool, name: &str) -> ProbeHit {
    ProbeHit {
        ip: Ipv4Addr::from(ip),
        open,
        name: Some(name.to_string()),
    }
}

#[tokio::test]
async fn fallback_only_for_unnamed_nodes() {
    let probe = Probe(vec![hit([10, 0, 0, 5], true, "alice-mac"), hit([10, 0, 0, 9], true, "")]);
    let neighbors = Neighbors {
        table: vec![(Ipv4Addr::new(10, 0, 0, 9), "bob-pc")],
        ..Default::default()
    };

    let nodes = scan(&probe, Ipv4Addr::new(10, 0, 0, 2), 22).await.unwrap();
    let nodes = fill_names(nodes, &neighbors).await;

    assert_eq!(*neighbors.asked.lock().unwrap(), vec![Ipv4Addr::new(10, 0, 0, 9)]);
    let got: Vec<(String, Option<String>)> = nodes
        .iter()
        .map(|n| (n.ip.to_string(), n.name.clone()))
        .collect();
    assert_eq!(
        got,
        vec![
            ("10.0.0.5".to_string(), Some("alice-mac".to_string())),
            ("10.0.0.9".to_string(), Some("bob-pc".to_string())),
        ]
    );
}

#[tokio::test]
async fn fallback_miss_leaves_name_unset() {
    let probe = Probe(vec![
        hit([10, 0, 0, 3], false, "closed-box"),
        hit([10, 0, 0, 4], true, ""),
    ]);
    let neighbors = Neighbors::default();

    let scanned = scan(&probe, Ipv4Addr::new(10, 0, 0, 2), 22).await.unwrap();
    let nodes = fill_names(scanned, &neighbors).await;

    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].ip, Ipv4Addr::new(10, 0, 0, 4));
    assert_eq!(nodes[0].name, None);
}
