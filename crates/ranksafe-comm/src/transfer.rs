//! Completable handles for non-blocking point-to-point transfers.

use crate::error::{CommError, CommResult};

/// A pending send or receive.
///
/// A transfer must be driven to completion with [`Transfer::wait`] or repeated
/// [`Transfer::test`] calls before its buffers are reused; there is no cancel.
pub trait Transfer: Send {
    /// Blocks until the transfer completes.
    fn wait(&mut self) -> CommResult<()>;

    /// Returns `Ok(true)` once the transfer has completed, without blocking.
    fn test(&mut self) -> CommResult<bool>;

    /// Takes the received payload of a completed receive.
    ///
    /// Sends and incomplete receives return `None`.
    fn take_payload(&mut self) -> Option<Vec<u8>>;
}

/// A transfer that is complete from the moment it is created.
#[derive(Debug, Default)]
pub struct CompletedTransfer {
    payload: Option<Vec<u8>>,
}

impl CompletedTransfer {
    /// Completed transfer without a payload (an eager send, or a no-op).
    pub fn new() -> Self {
        Self { payload: None }
    }

    /// Completed receive that delivered `payload`.
    pub fn with_payload(payload: Vec<u8>) -> Self {
        Self {
            payload: Some(payload),
        }
    }
}

impl Transfer for CompletedTransfer {
    fn wait(&mut self) -> CommResult<()> {
        Ok(())
    }

    fn test(&mut self) -> CommResult<bool> {
        Ok(true)
    }

    fn take_payload(&mut self) -> Option<Vec<u8>> {
        self.payload.take()
    }
}

/// A transfer that has failed; every probe reports the failure.
#[derive(Debug)]
pub struct FailedTransfer {
    reason: String,
}

impl FailedTransfer {
    /// Creates a failed transfer with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Transfer for FailedTransfer {
    fn wait(&mut self) -> CommResult<()> {
        Err(CommError::TransferFailed {
            reason: self.reason.clone(),
        })
    }

    fn test(&mut self) -> CommResult<bool> {
        Err(CommError::TransferFailed {
            reason: self.reason.clone(),
        })
    }

    fn take_payload(&mut self) -> Option<Vec<u8>> {
        None
    }
}
