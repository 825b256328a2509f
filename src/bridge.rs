//! Channel bridge between the game thread and a frontend thread.
//!
//! The game owns a [`BridgeIo`] as its [`GameIo`]; every print becomes a
//! [`GameEvent`] and every input request blocks until the [`Frontend`]
//! answers it. Dropping either side ends the other: the game sees
//! [`EraError::InputClosed`], the frontend sees [`Poll::Closed`].

use std::sync::mpsc::{self, Receiver, Sender};

use crate::io::GameIo;
use crate::{EraError, Result};

/// What the game asks the frontend to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    Print(String),
    Caution(String),
    /// The game is blocked until [`Frontend::answer`] is called.
    Prompt(Option<String>),
    /// The game loop returned; `Err` carries its error text.
    Finished(std::result::Result<(), String>),
}

/// Result of waiting for the next event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll {
    Event(GameEvent),
    Closed,
}

/// Game side of the bridge.
pub struct BridgeIo {
    events: Sender<GameEvent>,
    replies: Receiver<Option<String>>,
}

impl BridgeIo {
    fn emit(&self, event: GameEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| EraError::Io(std::io::ErrorKind::BrokenPipe.into()))
    }

    /// A sender for the final outcome that outlives the game's I/O.
    pub fn reporter(&self) -> OutcomeReporter {
        OutcomeReporter {
            events: self.events.clone(),
        }
    }
}

impl GameIo for BridgeIo {
    fn print(&mut self, text: &str) -> Result<()> {
        self.emit(GameEvent::Print(text.to_string()))
    }

    fn print_caution(&mut self, text: &str) -> Result<()> {
        self.emit(GameEvent::Caution(text.to_string()))
    }

    /// A `None` answer or a dropped frontend closes the input.
    fn input_line(&mut self, prompt: Option<&str>) -> Result<String> {
        self.emit(GameEvent::Prompt(prompt.map(str::to_string)))
            .map_err(|_| EraError::InputClosed)?;
        self.replies.recv().ok().flatten().ok_or(EraError::InputClosed)
    }
}

/// Reports how the game loop ended.
#[derive(Clone)]
pub struct OutcomeReporter {
    events: Sender<GameEvent>,
}

impl OutcomeReporter {
    pub fn report(&self, result: &Result<()>) {
        let outcome = result.as_ref().map(|_| ()).map_err(ToString::to_string);
        // Nobody to tell if the frontend is gone.
        let _ = self.events.send(GameEvent::Finished(outcome));
    }
}

/// Frontend side of the bridge.
pub struct Frontend {
    events: Receiver<GameEvent>,
    replies: Sender<Option<String>>,
}

impl Frontend {
    /// Block until the next event, or until the game side is gone.
    pub fn next_event(&self) -> Poll {
        match self.events.recv() {
            Ok(event) => Poll::Event(event),
            Err(_) => Poll::Closed,
        }
    }

    /// Answer the pending prompt. `None` closes the game's input.
    ///
    /// Returns `false` once the game side is gone.
    pub fn answer(&self, line: Option<String>) -> bool {
        self.replies.send(line).is_ok()
    }
}

/// Connect a frontend to the I/O a game will own.
pub fn bridge() -> (Frontend, BridgeIo) {
    let (event_tx, event_rx) = mpsc::channel();
    let (reply_tx, reply_rx) = mpsc::channel();
    (
        Frontend {
            events: event_rx,
            replies: reply_tx,
        },
        BridgeIo {
            events: event_tx,
            replies: reply_rx,
        },
    )
}
