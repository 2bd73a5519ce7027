//! Per-behaviour inbox.
//!
//! The write half ([`QueueSender`]) lives in the behaviour's shared handle and
//! is only used by the agent's dispatch router. The read half
//! ([`MessageQueue`]) is owned by the running behaviour itself.

use spindle_core::Message;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// Unbounded FIFO inbox, read side.
pub struct MessageQueue {
    rx: mpsc::UnboundedReceiver<Message>,
}

impl MessageQueue {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Message>) -> Self {
        Self { rx }
    }

    /// Take the oldest message without waiting.
    pub fn try_receive(&mut self) -> Option<Message> {
        match self.rx.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for a message.
    ///
    /// `recv` is cancel-safe: when the timer wins nothing is taken off the queue.
    pub async fn receive_timeout(&mut self, timeout: Duration) -> Option<Message> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// `None` or a zero duration never waits; anything else waits at most that long.
    pub async fn receive(&mut self, timeout: Option<Duration>) -> Option<Message> {
        match timeout {
            Some(d) if !d.is_zero() => self.receive_timeout(d).await,
            _ => self.try_receive(),
        }
    }

    /// Whether nothing is waiting right now.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Unbounded FIFO inbox, write side.
#[derive(Clone)]
pub struct QueueSender {
    tx: mpsc::UnboundedSender<Message>,
}

impl QueueSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { tx }
    }

    /// Append a message. Hands it back if the reading side is gone.
    pub fn enqueue(&self, message: Message) -> Result<(), Message> {
        self.tx.send(message).map_err(|e| e.0)
    }

    /// Whether the reading side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
