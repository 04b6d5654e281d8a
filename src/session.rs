use std::path::PathBuf;

use time::{OffsetDateTime, UtcOffset};
use tracing::info;

use crate::discovery::Discover;
use crate::error::SessionError;
use crate::input::LineInput;
use crate::render::{Instruction, Surface};
use crate::select::{Selection, Selector};
use crate::transfer::{Orchestrator, SyncTransport, TransferJob, REMOTE_ROOT};
use crate::types::NodeCandidate;

pub const HELP_HINT: &str = "Run `airplonk --help` for options.";

/// What to push, and as whom.
#[derive(Debug, Clone)]
pub struct Plan {
    pub source_dir: PathBuf,
    /// Skips the username prompt when set.
    pub username: Option<String>,
    /// Offset used for the timestamp in the destination label.
    pub offset: UtcOffset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Transferred { node: NodeCandidate, job: TransferJob },
    Aborted,
}

impl Outcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Transferred { .. } => 0,
            Self::Aborted => 1,
        }
    }
}

/// Discover, let the operator choose, and push. Runs each stage in turn.
pub async fn run<D, I, S, T>(
    discovery: &mut D,
    input: &mut I,
    surface: &mut S,
    transport: &T,
    plan: &Plan,
) -> Result<Outcome, SessionError>
where
    D: Discover + ?Sized,
    I: LineInput + ?Sized,
    S: Surface + ?Sized,
    T: SyncTransport + ?Sized,
{
    let selection = Selector::new(&mut *discovery, &mut *input, &mut *surface)
        .run()
        .await?;
    let node = match selection {
        Selection::Chosen { index, node } => {
            info!(index, %node, "node chosen");
            node
        }
        Selection::Aborted => {
            surface.draw(Instruction::Line(format!("Nothing plonked. {HELP_HINT}")))?;
            return Ok(Outcome::Aborted);
        }
    };

    let mut orchestrator = Orchestrator::new(&mut *input, &mut *surface, transport);
    let username = match &plan.username {
        Some(name) => name.clone(),
        None => orchestrator.ask_username(&node).await?,
    };
    let at = OffsetDateTime::now_utc().to_offset(plan.offset);
    let job = TransferJob::new(&plan.source_dir, at, &node, username);
    orchestrator.transfer(&job).await?;

    surface.draw(Instruction::Line(format!(
        "Plonked into {REMOTE_ROOT}/{} on {node}",
        job.destination_label
    )))?;
    Ok(Outcome::Transferred { node, job })
}
