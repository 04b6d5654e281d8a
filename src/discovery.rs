use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use ipnet::Ipv4Net;
use tracing::info;

use crate::cleanup::Cleanup;
use crate::error::{DiscoveryError, ResolveError};
use crate::neighbors::{fill_names, NeighborCache};
use crate::netdetect::{self, ipv4_to_default_cidr};
use crate::scanner::{self, PortProbe};
use crate::spinner::{BarTicker, Spinner, Ticker};
use crate::types::{DiscoveryConfig, NodeList};

/// One full discovery cycle: a fresh node list each time it is called.
#[async_trait]
pub trait Discover: Send {
    async fn discover(&mut self) -> Result<NodeList, DiscoveryError>;
}

type HostResolver = Box<dyn Fn() -> Result<Ipv4Addr, ResolveError> + Send>;
type TickerFactory = Box<dyn Fn(Ipv4Net) -> Box<dyn Ticker> + Send>;

/// Discovery of SSH nodes on the /24 this machine sits on.
pub struct LanDiscovery {
    probe: Box<dyn PortProbe>,
    neighbors: Box<dyn NeighborCache>,
    config: DiscoveryConfig,
    cleanup: Arc<Cleanup>,
    resolve_host: HostResolver,
    ticker: TickerFactory,
}

impl LanDiscovery {
    pub fn new(
        probe: Box<dyn PortProbe>,
        neighbors: Box<dyn NeighborCache>,
        config: DiscoveryConfig,
        cleanup: Arc<Cleanup>,
    ) -> Self {
        Self {
            probe,
            neighbors,
            config,
            cleanup,
            resolve_host: Box::new(netdetect::resolve_host_address),
            ticker: Box::new(bar_ticker),
        }
    }

    /// Use `resolve` instead of reading the local interfaces.
    pub fn with_host_resolver(
        mut self,
        resolve: impl Fn() -> Result<Ipv4Addr, ResolveError> + Send + 'static,
    ) -> Self {
        self.resolve_host = Box::new(resolve);
        self
    }

    /// Draw the spinner with tickers made by `make` instead of a terminal bar.
    pub fn with_ticker(
        mut self,
        make: impl Fn(Ipv4Net) -> Box<dyn Ticker> + Send + 'static,
    ) -> Self {
        self.ticker = Box::new(make);
        self
    }
}

fn bar_ticker(net: Ipv4Net) -> Box<dyn Ticker> {
    Box::new(BarTicker::new(format!("Looking for SSH nodes on {net}")))
}

#[async_trait]
impl Discover for LanDiscovery {
    async fn discover(&mut self) -> Result<NodeList, DiscoveryError> {
        // Re-derived every cycle so a network change between scans is seen.
        let host = (self.resolve_host)()?;

        let ticker = (self.ticker)(ipv4_to_default_cidr(host));
        self.cleanup
            .hold_spinner(Spinner::start(ticker, self.config.spinner_interval))
            .await;
        let scanned = scanner::scan(self.probe.as_ref(), host, self.config.port).await;
        // The spinner is gone before anything else reaches the screen, failed scan included.
        self.cleanup.stop_spinner().await;

        let nodes = fill_names(scanned?, self.neighbors.as_ref()).await;
        info!(count = nodes.len(), "discovery cycle finished");
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::types::ProbeHit;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Drawn {
        finished: Arc<AtomicBool>,
    }

    impl Ticker for Drawn {
        fn tick(&mut self) {}

        fn finish(&mut self) {
            self.finished.store(true, Ordering::SeqCst);
        }
    }

    struct SlowScan {
        fail: bool,
    }

    #[async_trait]
    impl PortProbe for SlowScan {
        async fn probe(&self, _range: Ipv4Net, _port: u16) -> Result<Vec<ProbeHit>, ProbeError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                return Err(ProbeError::Exit {
                    tool: "nmap",
                    code: 1,
                });
            }
            Ok(vec![ProbeHit {
                ip: Ipv4Addr::new(10, 0, 0, 9),
                open: true,
                name: None,
            }])
        }
    }

    /// Records whether the spinner had already finished when a name was asked for.
    struct SeesSpinner {
        spinner: Drawn,
        seen: Arc<Mutex<Vec<bool>>>,
    }

    #[async_trait]
    impl NeighborCache for SeesSpinner {
        async fn resolve_name(&self, _ip: Ipv4Addr) -> Option<String> {
            let done = self.spinner.finished.load(Ordering::SeqCst);
            self.seen.lock().unwrap().push(done);
            None
        }
    }

    fn discovery(fail: bool, spinner: &Drawn, seen: &Arc<Mutex<Vec<bool>>>) -> LanDiscovery {
        let config = DiscoveryConfig {
            spinner_interval: Duration::from_millis(1),
            ..DiscoveryConfig::default()
        };
        let neighbors = SeesSpinner {
            spinner: spinner.clone(),
            seen: seen.clone(),
        };
        let drawn = spinner.clone();
        LanDiscovery::new(
            Box::new(SlowScan { fail }),
            Box::new(neighbors),
            config,
            Arc::new(Cleanup::new()),
        )
        .with_host_resolver(|| Ok(Ipv4Addr::new(10, 0, 0, 4)))
        .with_ticker(move |_| Box::new(drawn.clone()) as Box<dyn Ticker>)
    }

    #[tokio::test]
    async fn spinner_finishes_before_names_are_filled() {
        let spinner = Drawn::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut lan = discovery(false, &spinner, &seen);

        let nodes = lan.discover().await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert!(spinner.finished.load(Ordering::SeqCst));
        assert_eq!(*seen.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn spinner_finishes_when_scan_fails() {
        let spinner = Drawn::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut lan = discovery(true, &spinner, &seen);

        let err = lan.discover().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Probe(_)));
        assert!(spinner.finished.load(Ordering::SeqCst));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn resolver_failure_starts_no_spinner() {
        let spinner = Drawn::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut lan = discovery(false, &spinner, &seen)
            .with_host_resolver(|| Err(ResolveError::NoAddressFound));

        let err = lan.discover().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Resolve(ResolveError::NoAddressFound)));
        assert!(!spinner.finished.load(Ordering::SeqCst));
    }
}
