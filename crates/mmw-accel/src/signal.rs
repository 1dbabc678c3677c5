//! Completion channel
//!
//! Hardware completion callbacks post a [`Completion`] through a
//! [`CompletionSignal`]; the owning engine blocks on the matching
//! [`CompletionQueue`] until the completion for its outstanding token arrives.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::error::{AccelError, AccelResult};
use crate::types::{Completion, CompletionToken};

/// Sending half, held by whatever raises completions.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    tx: Sender<Completion>,
}

impl CompletionSignal {
    /// Post a completion. Fails only if the queue side was dropped.
    pub fn post(&self, completion: Completion) -> AccelResult<()> {
        self.tx.send(completion).map_err(|_| AccelError::Disconnected)
    }
}

/// Receiving half, held by the engine that waits.
#[derive(Debug)]
pub struct CompletionQueue {
    rx: Receiver<Completion>,
    engine: &'static str,
}

impl CompletionQueue {
    /// Block until the completion for `token` arrives or `timeout` expires.
    ///
    /// Completions are strictly ordered per engine, so anything other than
    /// `token` arriving first is a protocol violation.
    pub fn wait_for(&self, token: CompletionToken, timeout: Duration) -> AccelResult<Completion> {
        match self.rx.recv_timeout(timeout) {
            Ok(completion) if completion.token == token => Ok(completion),
            Ok(completion) => Err(AccelError::TokenMismatch {
                expected: token,
                actual: completion.token,
            }),
            Err(RecvTimeoutError::Timeout) => Err(AccelError::Timeout {
                engine: self.engine,
                timeout_ms: timeout.as_millis() as u64,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(AccelError::Disconnected),
        }
    }

    /// Discard any completions already queued.
    pub fn flush(&self) -> usize {
        self.rx.try_iter().count()
    }
}

/// Create a connected signal/queue pair for `engine`.
pub fn completion_channel(engine: &'static str) -> (CompletionSignal, CompletionQueue) {
    let (tx, rx) = mpsc::channel();
    (CompletionSignal { tx }, CompletionQueue { rx, engine })
}
