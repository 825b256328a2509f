//! I/O collaborator used by builtin scenes and the script API.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use crate::runtime::Watchdog;
use crate::{EraError, Result};

/// Text output and line input for the game.
///
/// Every method runs on the script thread. Errors propagate unchanged through
/// the scene manager, so an implementation can end the game by failing here
/// (e.g. [`EraError::InputClosed`] when the player disconnects).
pub trait GameIo {
    /// Print text without a trailing newline.
    fn print(&mut self, text: &str) -> Result<()>;

    /// Print text followed by a newline.
    fn print_line(&mut self, text: &str) -> Result<()> {
        self.print(text)?;
        self.print("\n")
    }

    /// Print a developer-visible warning.
    fn print_caution(&mut self, text: &str) -> Result<()>;

    /// Block until the player enters a line.
    fn input_line(&mut self, prompt: Option<&str>) -> Result<String>;

    /// Block until the player acknowledges.
    fn wait(&mut self) -> Result<()> {
        self.input_line(None).map(|_| ())
    }
}

/// Shared handle to the game's I/O, owned by the script thread.
pub type SharedIo = Rc<RefCell<dyn GameIo>>;

/// Wrap a collaborator into a [`SharedIo`].
pub fn shared<I: GameIo + 'static>(io: I) -> SharedIo {
    Rc::new(RefCell::new(io))
}

/// Pauses the watchdog while the player is being waited on.
///
/// Only the blocking calls are wrapped; printing runs with the countdown live.
pub struct KeepAliveIo<I> {
    inner: I,
    watchdog: Arc<Watchdog>,
}

impl<I: GameIo> KeepAliveIo<I> {
    pub fn new(inner: I, watchdog: Arc<Watchdog>) -> Self {
        Self { inner, watchdog }
    }

    pub fn into_inner(self) -> I {
        self.inner
    }
}

impl<I: GameIo> GameIo for KeepAliveIo<I> {
    fn print(&mut self, text: &str) -> Result<()> {
        self.inner.print(text)
    }

    fn print_line(&mut self, text: &str) -> Result<()> {
        self.inner.print_line(text)
    }

    fn print_caution(&mut self, text: &str) -> Result<()> {
        self.inner.print_caution(text)
    }

    fn input_line(&mut self, prompt: Option<&str>) -> Result<String> {
        let watchdog = Arc::clone(&self.watchdog);
        watchdog.keep_alive(|| self.inner.input_line(prompt))
    }

    fn wait(&mut self) -> Result<()> {
        let watchdog = Arc::clone(&self.watchdog);
        watchdog.keep_alive(|| self.inner.wait())
    }
}

#[derive(Default)]
struct Buffers {
    inputs: VecDeque<String>,
    output: String,
    cautions: Vec<String>,
}

/// In-memory I/O with scripted input.
///
/// Clones share the same buffers, so a test can keep one clone and hand the
/// other to the game. Input runs out with [`EraError::InputClosed`].
#[derive(Clone, Default)]
pub struct BufferIo {
    buffers: Rc<RefCell<Buffers>>,
}

impl BufferIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with queued input lines.
    pub fn with_inputs<S: Into<String>>(inputs: impl IntoIterator<Item = S>) -> Self {
        let io = Self::new();
        for line in inputs {
            io.push_input(line);
        }
        io
    }

    pub fn push_input(&self, line: impl Into<String>) {
        self.buffers.borrow_mut().inputs.push_back(line.into());
    }

    /// Everything printed so far.
    pub fn output(&self) -> String {
        self.buffers.borrow().output.clone()
    }

    pub fn cautions(&self) -> Vec<String> {
        self.buffers.borrow().cautions.clone()
    }

    pub fn remaining_inputs(&self) -> usize {
        self.buffers.borrow().inputs.len()
    }
}

impl GameIo for BufferIo {
    fn print(&mut self, text: &str) -> Result<()> {
        self.buffers.borrow_mut().output.push_str(text);
        Ok(())
    }

    fn print_caution(&mut self, text: &str) -> Result<()> {
        self.buffers.borrow_mut().cautions.push(text.to_string());
        Ok(())
    }

    fn input_line(&mut self, prompt: Option<&str>) -> Result<String> {
        let mut buffers = self.buffers.borrow_mut();
        if let Some(prompt) = prompt {
            buffers.output.push_str(prompt);
        }
        buffers.inputs.pop_front().ok_or(EraError::InputClosed)
    }
}
