//! Line-oriented terminal output that can be rewritten in place.
//!
//! Callers describe output as [`Instruction`]s; a [`Surface`] applies them.
//! [`TerminalSurface`] turns them into crossterm commands and [`Recorder`]
//! keeps them for inspection.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossterm::{
    cursor::{MoveToColumn, MoveUp, Show},
    execute, queue,
    style::Print,
    terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Write text and end the line.
    Line(String),
    /// Write text and leave the cursor after it, e.g. a prompt.
    Inline(String),
    /// Replace the contents of the current line.
    Overwrite(String),
    /// Move up `n` lines and clear everything from there down.
    Erase(usize),
    /// Turn echo of typed input on or off.
    Echo(bool),
}

pub trait Surface: Send {
    fn draw(&mut self, instruction: Instruction) -> io::Result<()>;
}

/// Set while input echo is switched off, so an interrupt can switch it back.
static ECHO_OFF: AtomicBool = AtomicBool::new(false);

/// Undo terminal mode changes. Safe to call from any state, any number of times.
pub fn restore_terminal() {
    if ECHO_OFF.swap(false, Ordering::SeqCst) {
        let _ = disable_raw_mode();
    }
    let _ = execute!(io::stdout(), Show);
}

/// Applies instructions to a real terminal.
pub struct TerminalSurface<W: Write + Send> {
    out: W,
}

impl TerminalSurface<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write + Send> TerminalSurface<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> Surface for TerminalSurface<W> {
    fn draw(&mut self, instruction: Instruction) -> io::Result<()> {
        match instruction {
            Instruction::Line(text) => {
                // Raw mode does not translate \n, so always return the carriage.
                queue!(self.out, Print(text), Print("\r\n"))?;
            }
            Instruction::Inline(text) => queue!(self.out, Print(text))?,
            Instruction::Overwrite(text) => {
                queue!(
                    self.out,
                    MoveToColumn(0),
                    Clear(ClearType::CurrentLine),
                    Print(text)
                )?;
            }
            Instruction::Erase(0) => {
                queue!(self.out, MoveToColumn(0), Clear(ClearType::FromCursorDown))?;
            }
            Instruction::Erase(n) => {
                let n = u16::try_from(n).unwrap_or(u16::MAX);
                queue!(
                    self.out,
                    MoveUp(n),
                    MoveToColumn(0),
                    Clear(ClearType::FromCursorDown)
                )?;
            }
            Instruction::Echo(true) => {
                if ECHO_OFF.swap(false, Ordering::SeqCst) {
                    disable_raw_mode()?;
                }
            }
            Instruction::Echo(false) => {
                if !ECHO_OFF.swap(true, Ordering::SeqCst) {
                    enable_raw_mode()?;
                }
            }
        }
        self.out.flush()
    }
}

/// Keeps every instruction it is given.
#[derive(Debug, Default, Clone)]
pub struct Recorder {
    pub instructions: Vec<Instruction>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// All text drawn, one entry per instruction that carries text.
    pub fn texts(&self) -> Vec<&str> {
        self.instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Line(t) | Instruction::Inline(t) | Instruction::Overwrite(t) => {
                    Some(t.as_str())
                }
                _ => None,
            })
            .collect()
    }
}

impl Surface for Recorder {
    fn draw(&mut self, instruction: Instruction) -> io::Result<()> {
        self.instructions.push(instruction);
        Ok(())
    }
}

const NUDGE_OFFSETS: [usize; 5] = [2, 4, 2, 1, 0];
const NUDGE_FRAME: Duration = Duration::from_millis(40);

/// A block of lines on screen that can be cleared as a unit.
///
/// A prompt counts as one line once its answer has been entered, because the
/// terminal echoes the newline.
#[derive(Debug, Default)]
pub struct Region {
    lines: usize,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn line<S: Surface + ?Sized>(
        &mut self,
        surface: &mut S,
        text: impl Into<String>,
    ) -> io::Result<()> {
        surface.draw(Instruction::Line(text.into()))?;
        self.lines += 1;
        Ok(())
    }

    /// Show a prompt whose answer will be typed on the same line.
    pub fn prompt<S: Surface + ?Sized>(&mut self, surface: &mut S, text: &str) -> io::Result<()> {
        surface.draw(Instruction::Inline(text.to_string()))?;
        self.lines += 1;
        Ok(())
    }

    /// Replace the answered prompt with a fresh copy of `text`, shaking it so
    /// the operator notices the answer was not accepted.
    pub async fn nudge<S: Surface + ?Sized>(
        &mut self,
        surface: &mut S,
        text: &str,
    ) -> io::Result<()> {
        surface.draw(Instruction::Echo(false))?;
        let drawn = self.shake(surface, text).await;
        surface.draw(Instruction::Echo(true))?;
        drawn
    }

    async fn shake<S: Surface + ?Sized>(&mut self, surface: &mut S, text: &str) -> io::Result<()> {
        surface.draw(Instruction::Erase(1))?;
        for offset in NUDGE_OFFSETS {
            let shifted = format!("{}{text}", " ".repeat(offset));
            surface.draw(Instruction::Overwrite(shifted))?;
            if offset > 0 {
                tokio::time::sleep(NUDGE_FRAME).await;
            }
        }
        Ok(())
    }

    /// Erase everything this region drew.
    pub fn clear<S: Surface + ?Sized>(&mut self, surface: &mut S) -> io::Result<()> {
        if self.lines > 0 {
            surface.draw(Instruction::Erase(self.lines))?;
            self.lines = 0;
        }
        Ok(())
    }
}
