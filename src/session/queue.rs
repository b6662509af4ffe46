//! Command queue between the control side and the test thread
//!
//! The test thread is the only consumer and only ever blocks here. Producers
//! are `Session::apply_command` and the file watcher, both going through the
//! run-record lock so the pending-signal guards stay consistent.

use tokio::sync::mpsc;

use crate::common::{Error, Result};

/// Message delivered to a blocked test thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueSignal {
    /// Continue past the pause
    Advance,
    /// Abort the run and start it again
    Reset,
    /// Abort the run and do not restart it
    Exit,
}

/// Create a connected sender/receiver pair
pub fn command_queue() -> (CommandSender, CommandReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CommandSender { tx }, CommandReceiver { rx })
}

/// Producer half, cloned into the session handle
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<QueueSignal>,
}

impl CommandSender {
    pub fn send(&self, signal: QueueSignal) -> Result<()> {
        tracing::trace!(?signal, "Enqueue");
        self.tx.send(signal).map_err(|_| Error::SessionClosed)
    }
}

/// Consumer half, owned by the controller on the test thread
#[derive(Debug)]
pub struct CommandReceiver {
    rx: mpsc::UnboundedReceiver<QueueSignal>,
}

impl CommandReceiver {
    /// Block the calling thread until a signal arrives
    ///
    /// Must not be called from inside an async context.
    pub fn wait(&mut self) -> Result<QueueSignal> {
        self.rx.blocking_recv().ok_or(Error::SessionClosed)
    }

    /// Fail if anything is queued
    ///
    /// A leftover signal at the start of a run means a command was delivered
    /// that no one was waiting for.
    pub fn ensure_empty(&mut self) -> Result<()> {
        match self.rx.try_recv() {
            Ok(signal) => Err(Error::ProtocolViolation(format!(
                "command queue not empty at test setup (found {signal:?})"
            ))),
            Err(mpsc::error::TryRecvError::Empty) => Ok(()),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(Error::SessionClosed),
        }
    }
}
