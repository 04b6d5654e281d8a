use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use airplonk::cleanup::Cleanup;
use airplonk::discovery::{Discover, LanDiscovery};
use airplonk::error::SessionError;
use airplonk::input::StdinInput;
use airplonk::neighbors::ArpCache;
use airplonk::preflight;
use airplonk::render::TerminalSurface;
use airplonk::scanner::{ConnectProbe, NmapProbe, PortProbe};
use airplonk::session::{self, Plan, HELP_HINT};
use airplonk::transfer::Rsync;
use airplonk::types::{DiscoveryConfig, NodeList, ProbeKind};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use time::UtcOffset;
use tracing_subscriber::EnvFilter;

/// airplonk — find SSH machines on your local network and push the current directory to one.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "airplonk",
    version,
    about = "Find SSH machines on your local network and push the current directory to one of them.",
    long_about = None
)]
struct Cli {
    /// Directory to push. Defaults to the current working directory.
    #[arg(long)]
    source: Option<PathBuf>,

    /// TCP port that marks a host as an SSH node.
    #[arg(long, default_value_t = 22)]
    port: u16,

    /// How to probe the local /24.
    #[arg(long, value_enum, default_value_t = ProbeKind::Connect)]
    probe: ProbeKind,

    /// Connect timeout per host in milliseconds (connect probe).
    #[arg(long = "timeout-ms", default_value_t = 400)]
    timeout_ms: u64,

    /// Max concurrent connect attempts (connect probe).
    #[arg(long, default_value_t = 256)]
    concurrency: usize,

    /// Remote username; skips the username prompt.
    #[arg(long)]
    user: Option<String>,

    /// Scan once, print the nodes found and exit without pushing anything.
    #[arg(long, default_value_t = false)]
    list: bool,

    /// With --list, also write the nodes as pretty JSON to this path.
    #[arg(long, requires = "list")]
    output: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

const TROUBLESHOOT_HINT: &str =
    "Check that both machines are on the same network and that rsync 3.1+ is installed on both.";

fn main() -> ExitCode {
    // Must be read before the runtime starts any threads.
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("airplonk: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli, offset)) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("airplonk: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

async fn run(cli: Cli, offset: UtcOffset) -> Result<u8> {
    if !cli.list {
        if let Err(e) = preflight::check(cli.probe).await {
            eprintln!("airplonk: {e}");
            eprintln!("{TROUBLESHOOT_HINT}");
            return Ok(2);
        }
    }

    let cleanup = Arc::new(Cleanup::new());
    let on_interrupt = cleanup.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.run().await;
            eprintln!("\nInterrupted. Nothing more will be plonked.");
            std::process::exit(130);
        }
    });

    let config = DiscoveryConfig {
        port: cli.port,
        probe: cli.probe,
        connect_timeout: Duration::from_millis(cli.timeout_ms),
        concurrency: cli.concurrency,
        ..DiscoveryConfig::default()
    };
    let probe: Box<dyn PortProbe> = match config.probe {
        ProbeKind::Connect => {
            Box::new(ConnectProbe::new(config.concurrency, config.connect_timeout))
        }
        ProbeKind::Nmap => Box::new(NmapProbe::new()),
    };
    let mut discovery = LanDiscovery::new(probe, Box::new(ArpCache), config, cleanup);

    if cli.list {
        let nodes = match discovery.discover().await {
            Ok(nodes) => nodes,
            Err(e) => {
                eprintln!("Could not scan the local network: {e}");
                return Ok(1);
            }
        };
        print_nodes_table(&nodes);
        if let Some(path) = cli.output.as_deref() {
            write_nodes_json(path, &nodes)
                .with_context(|| format!("failed to write JSON to {}", path.display()))?;
            println!("Wrote JSON node list to {}", path.display());
        }
        return Ok(0);
    }

    let source_dir = match cli.source {
        Some(dir) => dir,
        None => std::env::current_dir().context("cannot read the current directory")?,
    };
    let source_dir = source_dir
        .canonicalize()
        .with_context(|| format!("cannot push {}", source_dir.display()))?;
    let plan = Plan {
        source_dir,
        username: cli.user,
        offset,
    };

    let mut input = StdinInput::new();
    let mut surface = TerminalSurface::stdout();
    let transport = Rsync::new();
    let outcome = session::run(&mut discovery, &mut input, &mut surface, &transport, &plan).await;
    match outcome {
        Ok(outcome) => Ok(outcome.exit_code()),
        Err(SessionError::Discovery(e)) => {
            eprintln!("Could not scan the local network: {e}");
            eprintln!("{TROUBLESHOOT_HINT}");
            Ok(1)
        }
        Err(SessionError::Transfer(e)) => {
            eprintln!("Plonk failed: {e}");
            eprintln!("{TROUBLESHOOT_HINT} {HELP_HINT}");
            Ok(1)
        }
        Err(e @ SessionError::Io(_)) => Err(e.into()),
    }
}

fn print_nodes_table(nodes: &NodeList) {
    let name_w = nodes
        .iter()
        .map(|n| n.display_name().len())
        .max()
        .unwrap_or(0)
        .max("name".len());
    let ip_w = "255.255.255.255".len();

    println!("\nSSH nodes: {}", nodes.len());
    println!("{:>3}  {:<name_w$}  {:<ip_w$}", "#", "name", "ip");
    println!("{:->3}  {:-<name_w$}  {:-<ip_w$}", "", "", "");
    for (i, node) in nodes.iter().enumerate() {
        println!(
            "{:>3}  {:<name_w$}  {:<ip_w$}",
            i + 1,
            node.display_name(),
            node.ip
        );
    }
}

fn write_nodes_json(path: &Path, nodes: &NodeList) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, nodes)?;
    Ok(())
}
