//! Completion handles for non-blocking stores.

use ranksafe_comm::{CompletedTransfer, Transfer};
use tracing::debug;

use crate::error::{RecoveryError, RecoveryResult};

/// Pending non-blocking store: an outbound and an inbound transfer.
///
/// Source buffers must not be reused until [`wait`](Request::wait) returns or
/// [`test`](Request::test) reports completion.
pub struct Request {
    send: Box<dyn Transfer>,
    recv: Box<dyn Transfer>,
}

impl Request {
    /// Wraps the two transfers started by a policy.
    pub fn new(send: Box<dyn Transfer>, recv: Box<dyn Transfer>) -> Self {
        Self { send, recv }
    }

    /// A request with nothing in flight.
    pub fn completed() -> Self {
        Self::new(
            Box::new(CompletedTransfer::new()),
            Box::new(CompletedTransfer::new()),
        )
    }

    /// Blocks until both transfers complete.
    ///
    /// Succeeds only when both transfers completed successfully.
    pub fn wait(&mut self) -> RecoveryResult<()> {
        let recv = self.recv.wait();
        let send = self.send.wait();
        match (recv, send) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(e), _) | (_, Err(e)) => {
                debug!(error = %e, "request wait failed");
                Err(RecoveryError::DataWait {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Polls both transfers; `Ok(true)` once both have completed.
    pub fn test(&mut self) -> RecoveryResult<bool> {
        let recv = self.recv.test();
        let send = self.send.test();
        match (recv, send) {
            (Ok(r), Ok(s)) => Ok(r && s),
            (Err(e), _) | (_, Err(e)) => Err(RecoveryError::DataWait {
                reason: e.to_string(),
            }),
        }
    }

    /// Payload delivered by the inbound transfer, once complete.
    pub fn take_received(&mut self) -> Option<Vec<u8>> {
        self.recv.take_payload()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ranksafe_comm::{Communicator, FailedTransfer, Role, SimFabric};

    #[test]
    fn test_completed_request() {
        let mut req = Request::completed();
        assert!(req.test().unwrap());
        assert!(req.wait().is_ok());
    }

    #[test]
    fn test_failed_send_reports_data_wait() {
        let mut req = Request::new(
            Box::new(FailedTransfer::new("nic reset")),
            Box::new(CompletedTransfer::new()),
        );
        let err = req.wait().unwrap_err();
        assert!(matches!(err, RecoveryError::DataWait { .. }));
        assert!(format!("{}", err).contains("nic reset"));
    }

    #[test]
    fn test_failed_recv_reports_data_wait_on_test() {
        let mut req = Request::new(
            Box::new(CompletedTransfer::new()),
            Box::new(FailedTransfer::new("peer lost")),
        );
        assert!(matches!(req.test(), Err(RecoveryError::DataWait { .. })));
    }

    #[test]
    fn test_incomplete_until_both_done() {
        let fabric = SimFabric::new(2);
        let a = fabric.communicator(0, Role::Initial).unwrap();
        let b = fabric.communicator(1, Role::Initial).unwrap();

        let send = b.isend(0, 5, vec![1, 2, 3]).unwrap();
        let recv = a.irecv(1, 6).unwrap();
        let mut req = Request::new(send, recv);
        assert!(!req.test().unwrap());

        b.isend(0, 6, vec![4]).unwrap();
        assert!(req.test().unwrap());
        assert_eq!(req.take_received(), Some(vec![4]));
    }
}
