use std::net::Ipv4Addr;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::types::{NodeCandidate, NodeList};

/// Looks up a name for an address in the local neighbor cache.
///
/// Any failure of the lookup itself means "no name".
#[async_trait]
pub trait NeighborCache: Send + Sync {
    async fn resolve_name(&self, ip: Ipv4Addr) -> Option<String>;

    /// Names for several addresses, in the order given.
    async fn resolve_names(&self, ips: &[Ipv4Addr]) -> Vec<Option<String>> {
        let mut names = Vec::with_capacity(ips.len());
        for &ip in ips {
            names.push(self.resolve_name(ip).await);
        }
        names
    }
}

/// Neighbor cache backed by `arp -a`.
#[derive(Debug, Clone, Default)]
pub struct ArpCache;

impl ArpCache {
    async fn read_table() -> Option<String> {
        let output = match Command::new("arp").arg("-a").output().await {
            Ok(output) => output,
            Err(e) => {
                debug!("arp unavailable: {e}");
                return None;
            }
        };
        if !output.status.success() {
            debug!(status = ?output.status.code(), "arp failed");
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl NeighborCache for ArpCache {
    async fn resolve_name(&self, ip: Ipv4Addr) -> Option<String> {
        let name = parse_arp_table(&Self::read_table().await?, ip);
        debug!(%ip, ?name, "neighbor lookup");
        name
    }

    async fn resolve_names(&self, ips: &[Ipv4Addr]) -> Vec<Option<String>> {
        match Self::read_table().await {
            Some(table) => names_from_table(&table, ips),
            None => vec![None; ips.len()],
        }
    }
}

/// Look up every address in one `arp -a` listing.
pub fn names_from_table(table: &str, ips: &[Ipv4Addr]) -> Vec<Option<String>> {
    ips.iter().map(|&ip| parse_arp_table(table, ip)).collect()
}

/// Find the name of `ip` in `arp -a` output.
///
/// Entries look like `bob-pc.lan (10.0.0.9) at aa:bb:cc:dd:ee:ff on en0 ...`;
/// a `?` in the name column means the cache has no name.
pub fn parse_arp_table(output: &str, ip: Ipv4Addr) -> Option<String> {
    let needle = format!("({ip})");
    output.lines().find_map(|line| {
        let mut tokens = line.split_whitespace();
        let name = tokens.next()?;
        if tokens.next()? != needle {
            return None;
        }
        (name != "?").then(|| name.to_string())
    })
}

/// Fill in missing names from the neighbor cache.
///
/// Only candidates without a name are looked up, all in one cache read;
/// order is preserved.
pub async fn fill_names<N: NeighborCache + ?Sized>(nodes: NodeList, cache: &N) -> NodeList {
    let unnamed: Vec<Ipv4Addr> = nodes
        .iter()
        .filter(|n| n.name.is_none())
        .map(|n| n.ip)
        .collect();
    if unnamed.is_empty() {
        return nodes;
    }
    let mut found = cache.resolve_names(&unnamed).await.into_iter();
    nodes
        .into_iter()
        .map(|node| match node.name {
            Some(_) => node,
            None => NodeCandidate::new(node.ip, found.next().flatten()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MAC_TABLE: &str = "\
bob-pc.lan (10.0.0.9) at aa:bb:cc:dd:ee:ff on en0 ifscope [ethernet]
? (10.0.0.1) at 11:22:33:44:55:66 on en0 ifscope [ethernet]
";

    const LINUX_TABLE: &str = "\
gateway (192.168.1.1) at 11:22:33:44:55:66 [ether] on wlan0
? (192.168.1.23) at <incomplete> on wlan0
";

    #[test]
    fn finds_named_entry() {
        assert_eq!(
            parse_arp_table(MAC_TABLE, Ipv4Addr::new(10, 0, 0, 9)),
            Some("bob-pc.lan".into())
        );
        assert_eq!(
            parse_arp_table(LINUX_TABLE, Ipv4Addr::new(192, 168, 1, 1)),
            Some("gateway".into())
        );
    }

    #[test]
    fn question_mark_is_no_name() {
        assert_eq!(parse_arp_table(MAC_TABLE, Ipv4Addr::new(10, 0, 0, 1)), None);
        assert_eq!(parse_arp_table(LINUX_TABLE, Ipv4Addr::new(192, 168, 1, 23)), None);
    }

    #[test]
    fn one_listing_answers_every_address() {
        let ips = [
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 9),
            Ipv4Addr::new(10, 0, 0, 77),
        ];
        assert_eq!(
            names_from_table(MAC_TABLE, &ips),
            vec![None, Some("bob-pc.lan".into()), None]
        );
    }

    #[test]
    fn prefix_addresses_do_not_match() {
        // 10.0.0.9 must not match an entry for 10.0.0.90
        let table = "far-box (10.0.0.90) at aa:aa:aa:aa:aa:aa on en0\n";
        assert_eq!(parse_arp_table(table, Ipv4Addr::new(10, 0, 0, 9)), None);
    }

    /// Counts whole-table reads; answers from a fixed listing.
    #[derive(Default)]
    struct CountingTable {
        reads: AtomicUsize,
    }

    #[async_trait]
    impl NeighborCache for CountingTable {
        async fn resolve_name(&self, ip: Ipv4Addr) -> Option<String> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            parse_arp_table(MAC_TABLE, ip)
        }

        async fn resolve_names(&self, ips: &[Ipv4Addr]) -> Vec<Option<String>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            names_from_table(MAC_TABLE, ips)
        }
    }

    #[tokio::test]
    async fn table_is_read_once_per_fill() {
        let cache = CountingTable::default();
        let nodes = vec![
            NodeCandidate::new(Ipv4Addr::new(10, 0, 0, 1), None),
            NodeCandidate::new(Ipv4Addr::new(10, 0, 0, 5), Some("alice-mac".into())),
            NodeCandidate::new(Ipv4Addr::new(10, 0, 0, 9), None),
            NodeCandidate::new(Ipv4Addr::new(10, 0, 0, 12), None),
        ];

        let filled = fill_names(nodes, &cache).await;
        assert_eq!(cache.reads.load(Ordering::SeqCst), 1);
        let names: Vec<_> = filled.iter().map(|n| n.name.as_deref()).collect();
        assert_eq!(names, vec![None, Some("alice-mac"), Some("bob-pc.lan"), None]);
    }

    #[tokio::test]
    async fn all_named_skips_the_table() {
        let cache = CountingTable::default();
        let nodes = vec![NodeCandidate::new(Ipv4Addr::new(10, 0, 0, 5), Some("alice-mac".into()))];
        let filled = fill_names(nodes.clone(), &cache).await;
        assert_eq!(filled, nodes);
        assert_eq!(cache.reads.load(Ordering::SeqCst), 0);
    }
}
