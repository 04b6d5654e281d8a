use std::io;

use thiserror::Error;

/// Failure to find an address for the machine we are running on.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no non-loopback IPv4 address found on any interface")]
    NoAddressFound,
    #[error("failed to enumerate network interfaces")]
    Interfaces(#[source] io::Error),
}

/// Failure of the port probe collaborator.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{tool} could not be started")]
    Unavailable {
        tool: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{tool} exited with status {code}")]
    Exit { tool: &'static str, code: i32 },
    #[error("probe I/O error")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Probe(#[from] ProbeError),
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("the sync transport could not be started")]
    TransportUnavailable(#[source] io::Error),
    #[error("the sync transport exited with status {0}")]
    TransportExit(i32),
    #[error("the sync transport was terminated by a signal")]
    TransportKilled,
    #[error("no username was given")]
    NoUsername,
    #[error("transfer I/O error")]
    Io(#[from] io::Error),
}

/// Environment problems found before any discovery is attempted.
#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("`{tool}` is not installed or not on PATH")]
    Missing { tool: &'static str },
    #[error("`{tool}` {found} is too old, {required} or newer is required")]
    Outdated {
        tool: &'static str,
        found: String,
        required: String,
    },
    #[error("could not read the version reported by `{tool}`")]
    Unparseable { tool: &'static str },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("terminal I/O error")]
    Io(#[from] io::Error),
}
