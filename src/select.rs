//! Interactive choice of the node to push to.

use tracing::debug;

use crate::discovery::Discover;
use crate::error::SessionError;
use crate::input::LineInput;
use crate::render::{Region, Surface};
use crate::types::{NodeCandidate, NodeList};

pub const EMPTY_HINT: &str = "Make sure Remote Login / sshd is enabled on the other machine and that both are on the same network.";

/// Empty scans in a row after which the hint is shown.
const HINT_AFTER: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    Scanning,
    /// Nothing found; carries the number of re-scans asked for so far.
    Empty(u32),
    Listed,
    /// 1-based position in the node list.
    Chosen(usize),
    ReScanRequested,
    Aborted,
}

impl SelectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Chosen(_) | Self::Aborted)
    }

    /// Where an answer leads from a prompting state. Other states ignore answers.
    pub fn on_answer(self, answer: Answer, listed: usize) -> Self {
        match (self, answer) {
            (Self::Empty(_) | Self::Listed, Answer::Yes) => Self::ReScanRequested,
            (Self::Empty(_) | Self::Listed, Answer::No) => Self::Aborted,
            (Self::Listed, Answer::Index(i)) if (1..=listed).contains(&i) => Self::Chosen(i),
            (state, _) => state,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    Index(usize),
    Invalid,
}

impl Answer {
    /// Parse one answer line. Only the line terminator is dropped; any other
    /// whitespace makes the answer invalid.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim_end_matches(['\r', '\n']);
        match raw {
            "y" | "Y" => Self::Yes,
            "n" | "N" => Self::No,
            _ if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) => raw
                .parse()
                .map(Self::Index)
                .unwrap_or(Self::Invalid),
            _ => Self::Invalid,
        }
    }
}

/// How selection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Chosen { index: usize, node: NodeCandidate },
    Aborted,
}

pub fn empty_prompt() -> &'static str {
    "No SSH nodes found. Scan again? [y/n]: "
}

pub fn listed_prompt(count: usize) -> String {
    format!("Pick a node [1-{count}], y to scan again, n to quit: ")
}

/// Render one node as a numbered listing line.
pub fn listing_line(position: usize, node: &NodeCandidate, name_width: usize) -> String {
    format!(
        "  {position:>2}) {:<name_width$}  {}",
        node.display_name(),
        node.ip
    )
}

/// Drives discovery and operator answers until a node is chosen or the
/// operator gives up.
pub struct Selector<'a, D: ?Sized, I: ?Sized, S: ?Sized> {
    discovery: &'a mut D,
    input: &'a mut I,
    surface: &'a mut S,
    state: SelectionState,
    retries: u32,
    nodes: NodeList,
}

impl<'a, D, I, S> Selector<'a, D, I, S>
where
    D: Discover + ?Sized,
    I: LineInput + ?Sized,
    S: Surface + ?Sized,
{
    pub fn new(discovery: &'a mut D, input: &'a mut I, surface: &'a mut S) -> Self {
        Self {
            discovery,
            input,
            surface,
            state: SelectionState::Scanning,
            retries: 0,
            nodes: Vec::new(),
        }
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    /// Re-scans requested from an empty result so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub async fn run(&mut self) -> Result<Selection, SessionError> {
        while !self.state.is_terminal() {
            let next = match self.state {
                SelectionState::Scanning => self.scan().await?,
                SelectionState::Empty(n) => self.ask_empty(n).await?,
                SelectionState::Listed => self.ask_listed().await?,
                SelectionState::ReScanRequested => SelectionState::Scanning,
                SelectionState::Chosen(_) | SelectionState::Aborted => self.state,
            };
            debug!(from = ?self.state, to = ?next, "selection");
            self.state = next;
        }

        Ok(match self.state {
            SelectionState::Chosen(index) => Selection::Chosen {
                index,
                node: self.nodes[index - 1].clone(),
            },
            _ => Selection::Aborted,
        })
    }

    async fn scan(&mut self) -> Result<SelectionState, SessionError> {
        self.nodes = self.discovery.discover().await?;
        Ok(if self.nodes.is_empty() {
            SelectionState::Empty(self.retries)
        } else {
            SelectionState::Listed
        })
    }

    async fn ask_empty(&mut self, retries: u32) -> Result<SelectionState, SessionError> {
        let mut region = Region::new();
        if retries > HINT_AFTER {
            region.line(self.surface, EMPTY_HINT)?;
        }
        let next = self
            .ask(&mut region, empty_prompt(), SelectionState::Empty(retries), 0)
            .await?;
        if next == SelectionState::ReScanRequested {
            region.clear(self.surface)?;
            self.retries += 1;
        }
        Ok(next)
    }

    async fn ask_listed(&mut self) -> Result<SelectionState, SessionError> {
        let mut region = Region::new();
        let width = self
            .nodes
            .iter()
            .map(|n| n.display_name().len())
            .max()
            .unwrap_or(0);
        region.line(self.surface, format!("Found {} SSH node(s):", self.nodes.len()))?;
        for (i, node) in self.nodes.iter().enumerate() {
            region.line(self.surface, listing_line(i + 1, node, width))?;
        }
        let prompt = listed_prompt(self.nodes.len());
        let count = self.nodes.len();
        let next = self
            .ask(&mut region, &prompt, SelectionState::Listed, count)
            .await?;
        if next == SelectionState::ReScanRequested {
            region.clear(self.surface)?;
        }
        Ok(next)
    }

    /// Prompt until the answer moves the machine out of `state`.
    async fn ask(
        &mut self,
        region: &mut Region,
        prompt: &str,
        state: SelectionState,
        listed: usize,
    ) -> Result<SelectionState, SessionError> {
        region.prompt(self.surface, prompt)?;
        loop {
            let answer = match self.input.read_line().await? {
                Some(line) => Answer::parse(&line),
                // closed input reads as "no"
                None => Answer::No,
            };
            let next = state.on_answer(answer, listed);
            if next != state {
                return Ok(next);
            }
            region.nudge(self.surface, prompt).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_answers() {
        assert_eq!(Answer::parse("y"), Answer::Yes);
        assert_eq!(Answer::parse("N\n"), Answer::No);
        assert_eq!(Answer::parse("2\r\n"), Answer::Index(2));
        assert_eq!(Answer::parse("12"), Answer::Index(12));
        assert_eq!(Answer::parse("0"), Answer::Index(0));
        assert_eq!(Answer::parse("-1"), Answer::Invalid);
        assert_eq!(Answer::parse("1a"), Answer::Invalid);
        assert_eq!(Answer::parse("yes"), Answer::Invalid);
        assert_eq!(Answer::parse(""), Answer::Invalid);
        assert_eq!(Answer::parse("99999999999999999999999"), Answer::Invalid);
    }

    #[test]
    fn padded_answers_are_invalid() {
        assert_eq!(Answer::parse(" 2"), Answer::Invalid);
        assert_eq!(Answer::parse("y "), Answer::Invalid);
        assert_eq!(Answer::parse(" N \n"), Answer::Invalid);
        assert_eq!(Answer::parse(" "), Answer::Invalid);
    }

    #[test]
    fn index_bounds_in_listed() {
        let listed = SelectionState::Listed;
        assert_eq!(listed.on_answer(Answer::Index(0), 3), SelectionState::Listed);
        assert_eq!(listed.on_answer(Answer::Index(1), 3), SelectionState::Chosen(1));
        assert_eq!(listed.on_answer(Answer::Index(3), 3), SelectionState::Chosen(3));
        assert_eq!(listed.on_answer(Answer::Index(4), 3), SelectionState::Listed);
        assert_eq!(listed.on_answer(Answer::Invalid, 3), SelectionState::Listed);
    }

    #[test]
    fn empty_state_ignores_indices() {
        let empty = SelectionState::Empty(2);
        assert_eq!(empty.on_answer(Answer::Index(1), 0), empty);
        assert_eq!(empty.on_answer(Answer::Yes, 0), SelectionState::ReScanRequested);
        assert_eq!(empty.on_answer(Answer::No, 0), SelectionState::Aborted);
    }

    #[test]
    fn listing_is_aligned() {
        let node = NodeCandidate::new("10.0.0.5".parse().unwrap(), Some("alice-mac".into()));
        assert_eq!(listing_line(1, &node, 10), "   1) alice-mac   10.0.0.5");
    }
}
