use crate::error::ProbeError;
use crate::netdetect::{expand_hosts, ipv4_to_default_cidr};
use crate::types::{NodeCandidate, NodeList, ProbeHit};
use async_trait::async_trait;
use ipnet::Ipv4Net;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;
use tracing::{debug, info};

/// Answers "which hosts of this range have this TCP port open".
///
/// Hits are returned in discovery order. Per-host response timeouts belong to
/// the implementation.
#[async_trait]
pub trait PortProbe: Send + Sync {
    async fn probe(&self, range: Ipv4Net, port: u16) -> Result<Vec<ProbeHit>, ProbeError>;
}

/// Probe the /24 around `host` and keep the hosts reporting the port open, in
/// the order the probe returned them.
///
/// An empty list is a normal outcome.
pub async fn scan<P: PortProbe + ?Sized>(
    probe: &P,
    host: Ipv4Addr,
    port: u16,
) -> Result<NodeList, ProbeError> {
    let range = ipv4_to_default_cidr(host);
    info!(%range, port, "probing range");
    let hits = probe.probe(range, port).await?;
    let nodes: NodeList = hits
        .into_iter()
        .filter(|hit| hit.open)
        .map(|hit| NodeCandidate::new(hit.ip, hit.name))
        .collect();
    debug!(open = nodes.len(), "probe finished");
    Ok(nodes)
}

/// Asynchronous TCP connect probe with a concurrency limit.
///
/// - Limits concurrent socket attempts using a `Semaphore`.
/// - Uses `tokio::time::timeout` to bound connect time per socket.
/// - Never resolves names.
#[derive(Debug, Clone)]
pub struct ConnectProbe {
    pub concurrency: usize,
    pub timeout: Duration,
}

impl ConnectProbe {
    pub fn new(concurrency: usize, timeout: Duration) -> Self {
        Self {
            concurrency,
            timeout,
        }
    }
}

#[async_trait]
impl PortProbe for ConnectProbe {
    async fn probe(&self, range: Ipv4Net, port: u16) -> Result<Vec<ProbeHit>, ProbeError> {
        probe_hosts(&expand_hosts(range), port, self.concurrency, self.timeout).await
    }
}

/// Connect to `port` on every target and report which ones accepted,
/// ordered by address.
pub async fn probe_hosts(
    targets: &[Ipv4Addr],
    port: u16,
    concurrency: usize,
    timeout: Duration,
) -> Result<Vec<ProbeHit>, ProbeError> {
    let sem = Arc::new(Semaphore::new(concurrency.clamp(1, 5_000)));
    let mut set = JoinSet::new();

    for &ip in targets {
        let permit = sem
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ProbeError::Io(std::io::Error::other(e)))?;

        set.spawn(async move {
            let _permit = permit; // keep permit until task completes
            let addr = SocketAddr::from((ip, port));
            let open = matches!(
                time::timeout(timeout, TcpStream::connect(addr)).await,
                Ok(Ok(_))
            );
            ProbeHit {
                ip,
                open,
                name: None,
            }
        });
    }

    let mut hits = Vec::with_capacity(targets.len());
    while let Some(res) = set.join_next().await {
        match res {
            Ok(hit) => hits.push(hit),
            Err(e) => debug!("probe task failed: {e}"),
        }
    }
    // Completion order is arbitrary; discovery order is address order.
    hits.sort_by_key(|hit| u32::from(hit.ip));
    Ok(hits)
}

/// Runs `nmap` and reads its grepable output.
#[derive(Debug, Clone)]
pub struct NmapProbe {
    program: String,
}

impl NmapProbe {
    pub const TOOL: &'static str = "nmap";

    pub fn new() -> Self {
        Self {
            program: Self::TOOL.to_string(),
        }
    }
}

impl Default for NmapProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PortProbe for NmapProbe {
    async fn probe(&self, range: Ipv4Net, port: u16) -> Result<Vec<ProbeHit>, ProbeError> {
        let port_arg = port.to_string();
        let range_arg = range.to_string();
        let args = ["-p", port_arg.as_str(), "--open", "-oG", "-", range_arg.as_str()];
        debug!(program = %self.program, ?args, "starting probe");
        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ProbeError::Unavailable {
                tool: Self::TOOL,
                source,
            })?;
        if !output.status.success() {
            debug!(stderr = %String::from_utf8_lossy(&output.stderr), "nmap failed");
            return Err(ProbeError::Exit {
                tool: Self::TOOL,
                code: output.status.code().unwrap_or(-1),
            });
        }
        Ok(parse_grepable(&String::from_utf8_lossy(&output.stdout), port))
    }
}

/// Parse nmap `-oG` output into one hit per host line that reports `port`.
///
/// Lines look like
/// `Host: 10.0.0.5 (alice-mac.lan)\tPorts: 22/open/tcp//ssh///`.
/// Status-only lines and comments are skipped.
pub fn parse_grepable(output: &str, port: u16) -> Vec<ProbeHit> {
    let mut hits = Vec::new();
    for line in output.lines() {
        let Some(rest) = line.strip_prefix("Host: ") else {
            continue;
        };
        let mut fields = rest.split('\t');
        let Some(host_field) = fields.next() else {
            continue;
        };
        let Some(ports) = fields.find_map(|f| f.trim().strip_prefix("Ports:")) else {
            continue;
        };

        let (ip_str, name) = match host_field.split_once(' ') {
            Some((ip, rest)) => {
                let name = rest
                    .trim()
                    .strip_prefix('(')
                    .and_then(|r| r.strip_suffix(')'))
                    .map(str::to_string)
                    .filter(|n| !n.is_empty());
                (ip, name)
            }
            None => (host_field, None),
        };
        let Ok(ip) = ip_str.trim().parse::<Ipv4Addr>() else {
            continue;
        };

        let state = ports.split(',').find_map(|entry| {
            let mut parts = entry.trim().split('/');
            let p = parts.next()?.parse::<u16>().ok()?;
            let state = parts.next()?;
            (p == port).then_some(state)
        });
        if let Some(state) = state {
            hits.push(ProbeHit {
                ip,
                open: state == "open",
                name,
            });
        }
    }
    hits
}
