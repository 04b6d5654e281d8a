//! Pushing the source directory to the chosen node.

use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use async_trait::async_trait;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::TransferError;
use crate::input::LineInput;
use crate::render::{Instruction, Region, Surface};
use crate::types::NodeCandidate;

/// Remote directory every push lands under.
pub const REMOTE_ROOT: &str = "~/AirPlonks";

/// Everything needed for one push. Built once per attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    pub source_dir: PathBuf,
    pub destination_label: String,
    pub target_ip: String,
    pub username: String,
}

impl TransferJob {
    pub fn new(
        source_dir: impl Into<PathBuf>,
        at: OffsetDateTime,
        node: &NodeCandidate,
        username: impl Into<String>,
    ) -> Self {
        let source_dir = source_dir.into();
        let (date, clock) = label_stamp(at);
        let destination_label = destination_label(&source_basename(&source_dir), &date, &clock);
        Self {
            source_dir,
            destination_label,
            target_ip: node.ip.to_string(),
            username: username.into(),
        }
    }

    /// `~/AirPlonks/<label>` with the label escaped for the remote shell.
    pub fn remote_path(&self) -> String {
        format!("{REMOTE_ROOT}/{}", escape_for_transport(&self.destination_label))
    }

    /// `user@host:path` as the transport expects it.
    pub fn remote_spec(&self) -> String {
        format!("{}@{}:{}", self.username, self.target_ip, self.remote_path())
    }
}

fn source_basename(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "root".to_string())
}

/// `MM-DD-YY` and `HH:MM:SS` for `at`.
pub fn label_stamp(at: OffsetDateTime) -> (String, String) {
    let date = at
        .format(format_description!("[month]-[day]-[year repr:last_two]"))
        .unwrap_or_default();
    let clock = at
        .format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default();
    (date, clock)
}

pub fn destination_label(basename: &str, date: &str, clock: &str) -> String {
    format!("{basename} {date} {clock}")
}

/// Backslash-escape characters the remote shell would otherwise split or expand.
pub fn escape_for_transport(label: &str) -> String {
    let mut out = String::with_capacity(label.len() + 8);
    for c in label.chars() {
        if c.is_whitespace() || "\\'\"`$&;|<>()[]{}*?!#~".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// A running transfer: its progress output, and its exit code once done
/// (`None` when killed by a signal).
pub struct TransportRun {
    pub progress: Pin<Box<dyn AsyncRead + Send>>,
    pub exit: Pin<Box<dyn Future<Output = io::Result<Option<i32>>> + Send>>,
}

/// The external file-sync transport.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn start(&self, job: &TransferJob) -> Result<TransportRun, TransferError>;
}

/// Environment that makes rsync split remote args the pre-3.2.4 way.
pub const OLD_ARGS_ENV: (&str, &str) = ("RSYNC_OLD_ARGS", "1");

/// rsync over ssh.
#[derive(Debug, Clone)]
pub struct Rsync {
    program: String,
}

impl Rsync {
    pub const TOOL: &'static str = "rsync";

    pub fn new() -> Self {
        Self {
            program: Self::TOOL.to_string(),
        }
    }

    /// Argument list for one push. Paths stay as OS strings so a non-UTF-8
    /// source directory reaches rsync byte for byte.
    pub fn args(job: &TransferJob) -> Vec<OsString> {
        let mut source = job.source_dir.as_os_str().to_os_string();
        // Trailing slash: copy the contents, not the directory itself.
        if source.as_encoded_bytes().last() != Some(&b'/') {
            source.push("/");
        }
        vec![
            "-a".into(),
            "--info=progress2".into(),
            "--rsync-path".into(),
            format!("mkdir -p {REMOTE_ROOT} && rsync").into(),
            source,
            job.remote_spec().into(),
        ]
    }

    /// The rsync invocation for `job`, not yet spawned.
    pub fn command(&self, job: &TransferJob) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(Self::args(job))
            // rsync 3.2.4+ quotes remote args itself; the label is already
            // escaped, so ask for the old splitting. Older releases ignore it.
            .env(OLD_ARGS_ENV.0, OLD_ARGS_ENV.1)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for Rsync {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncTransport for Rsync {
    async fn start(&self, job: &TransferJob) -> Result<TransportRun, TransferError> {
        let mut cmd = self.command(job);
        let args: Vec<_> = cmd.as_std().get_args().collect();
        debug!(program = %self.program, ?args, "starting transport");
        let mut child = cmd.spawn().map_err(TransferError::TransportUnavailable)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransferError::Io(io::Error::other("transport stdout not captured")))?;
        Ok(TransportRun {
            progress: Box::pin(stdout),
            exit: Box::pin(async move { child.wait().await.map(|status| status.code()) }),
        })
    }
}

/// Picks the latest `NN%` out of a progress stream fed in arbitrary chunks.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    /// Digits at the end of the previous chunk, which may continue in the next.
    carry: String,
    shown: Option<u8>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> Option<u8> {
        self.shown
    }

    /// Returns the newest percentage in `chunk` if it differs from the last one returned.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<u8> {
        let mut text = std::mem::take(&mut self.carry);
        text.push_str(&String::from_utf8_lossy(chunk));

        let mut latest = None;
        let mut digits = String::new();
        for c in text.chars() {
            if c.is_ascii_digit() {
                digits.push(c);
                continue;
            }
            if c == '%' && !digits.is_empty() {
                latest = Some(percent(&digits));
            }
            digits.clear();
        }
        self.carry = digits;

        match latest {
            Some(p) if self.shown != Some(p) => {
                self.shown = Some(p);
                Some(p)
            }
            _ => None,
        }
    }
}

fn percent(digits: &str) -> u8 {
    // Anything past three digits is over 100 anyway.
    let tail = &digits[digits.len().saturating_sub(4)..];
    tail.parse::<u16>().map(|v| v.min(100) as u8).unwrap_or(100)
}

pub fn progress_line(percent: u8) -> String {
    format!("Plonking: {percent}%")
}

/// Prompts for the remote username and pushes the source directory to the node.
pub struct Orchestrator<'a, I: ?Sized, S: ?Sized, T: ?Sized> {
    input: &'a mut I,
    surface: &'a mut S,
    transport: &'a T,
}

impl<'a, I, S, T> Orchestrator<'a, I, S, T>
where
    I: LineInput + ?Sized,
    S: Surface + ?Sized,
    T: SyncTransport + ?Sized,
{
    pub fn new(input: &'a mut I, surface: &'a mut S, transport: &'a T) -> Self {
        Self {
            input,
            surface,
            transport,
        }
    }

    /// Ask for a username until a non-empty one is given.
    pub async fn ask_username(&mut self, node: &NodeCandidate) -> Result<String, TransferError> {
        let prompt = format!("Username on {node}: ");
        let mut region = Region::new();
        region.prompt(self.surface, &prompt)?;
        loop {
            match self.input.read_line().await? {
                None => return Err(TransferError::NoUsername),
                Some(line) if !line.trim().is_empty() => return Ok(line.trim().to_string()),
                Some(_) => region.nudge(self.surface, &prompt).await?,
            }
        }
    }

    /// Run the transport and keep one progress line up to date until it exits.
    pub async fn transfer(&mut self, job: &TransferJob) -> Result<(), TransferError> {
        info!(target_ip = %job.target_ip, label = %job.destination_label, "starting transfer");
        let TransportRun {
            mut progress,
            exit,
        } = self.transport.start(job).await?;

        self.surface.draw(Instruction::Overwrite(progress_line(0)))?;
        let mut tracker = ProgressTracker::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = progress.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            if let Some(p) = tracker.feed(&buf[..n]) {
                self.surface.draw(Instruction::Overwrite(progress_line(p)))?;
            }
        }
        // close the progress line
        self.surface.draw(Instruction::Line(String::new()))?;

        match exit.await? {
            Some(0) => {
                info!("transfer finished");
                Ok(())
            }
            Some(code) => Err(TransferError::TransportExit(code)),
            None => Err(TransferError::TransportKilled),
        }
    }
}
