//! In-process communicator fabric.
//!
//! [`SimFabric`] connects N ranks that live in one process, one thread per
//! rank. Collectives rendezvous on a shared round slot; point-to-point
//! messages go through per-(source, dest, tag) mailboxes. Sends are eager and
//! complete immediately, receives complete once a matching message arrives.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::communicator::{Communicator, Role};
use crate::error::{CommError, CommResult};
use crate::reduce::ReduceOp;
use crate::transfer::{CompletedTransfer, Transfer};

/// Mailbox key: (source rank, destination rank, tag).
type MailKey = (usize, usize, u32);

/// State of the collective currently in flight.
struct Round {
    contributions: Vec<Option<Vec<i64>>>,
    arrived: usize,
    result: Option<CommResult<Vec<i64>>>,
    unread: usize,
}

impl Round {
    fn new(size: usize) -> Self {
        Self {
            contributions: vec![None; size],
            arrived: 0,
            result: None,
            unread: 0,
        }
    }

    fn reduce(&self, op: &dyn ReduceOp) -> CommResult<Vec<i64>> {
        let mut contributions = self.contributions.iter().flatten();
        let mut acc = match contributions.next() {
            Some(first) => first.clone(),
            None => return Ok(Vec::new()),
        };
        for other in contributions {
            if other.len() != acc.len() {
                return Err(CommError::LengthMismatch {
                    expected: acc.len(),
                    got: other.len(),
                });
            }
            op.fold_into(&mut acc, other);
        }
        Ok(acc)
    }
}

struct FabricInner {
    size: usize,
    shut_down: AtomicBool,
    round: Mutex<Round>,
    round_cv: Condvar,
    mail: Mutex<HashMap<MailKey, VecDeque<Vec<u8>>>>,
    mail_cv: Condvar,
}

impl FabricInner {
    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn check_rank(&self, rank: usize) -> CommResult<()> {
        if rank >= self.size {
            return Err(CommError::InvalidRank {
                rank,
                size: self.size,
            });
        }
        Ok(())
    }

    fn all_reduce(&self, rank: usize, local: &[i64], op: &dyn ReduceOp) -> CommResult<Vec<i64>> {
        let mut round = self.round.lock();

        // A previous round is still being read by slower ranks.
        while round.result.is_some() {
            if self.is_shut_down() {
                return Err(CommError::Disconnected);
            }
            self.round_cv.wait(&mut round);
        }

        round.contributions[rank] = Some(local.to_vec());
        round.arrived += 1;
        trace!(rank, arrived = round.arrived, op = op.name(), "all_reduce contribution");

        if round.arrived == self.size {
            let result = round.reduce(op);
            round.result = Some(result);
            round.unread = self.size;
            self.round_cv.notify_all();
        } else {
            while round.result.is_none() {
                if self.is_shut_down() {
                    return Err(CommError::Disconnected);
                }
                self.round_cv.wait(&mut round);
            }
        }

        let result = round.result.clone().unwrap_or(Err(CommError::Disconnected));
        round.unread -= 1;
        if round.unread == 0 {
            *round = Round::new(self.size);
            self.round_cv.notify_all();
        }
        result
    }

    fn deliver(&self, key: MailKey, payload: Vec<u8>) -> CommResult<()> {
        if self.is_shut_down() {
            return Err(CommError::Disconnected);
        }
        let mut mail = self.mail.lock();
        mail.entry(key).or_default().push_back(payload);
        self.mail_cv.notify_all();
        Ok(())
    }

    fn try_take(&self, key: MailKey) -> CommResult<Option<Vec<u8>>> {
        let mut mail = self.mail.lock();
        match mail.get_mut(&key).and_then(|q| q.pop_front()) {
            Some(payload) => Ok(Some(payload)),
            None if self.is_shut_down() => Err(CommError::Disconnected),
            None => Ok(None),
        }
    }

    fn take_blocking(&self, key: MailKey) -> CommResult<Vec<u8>> {
        let mut mail = self.mail.lock();
        loop {
            if let Some(payload) = mail.get_mut(&key).and_then(|q| q.pop_front()) {
                return Ok(payload);
            }
            if self.is_shut_down() {
                return Err(CommError::Disconnected);
            }
            self.mail_cv.wait(&mut mail);
        }
    }
}

/// A set of in-process ranks that can exchange data and run collectives.
#[derive(Clone)]
pub struct SimFabric {
    inner: Arc<FabricInner>,
}

impl SimFabric {
    /// Creates a fabric connecting `size` ranks.
    pub fn new(size: usize) -> Self {
        debug!(size, "creating simulated fabric");
        Self {
            inner: Arc::new(FabricInner {
                size,
                shut_down: AtomicBool::new(false),
                round: Mutex::new(Round::new(size)),
                round_cv: Condvar::new(),
                mail: Mutex::new(HashMap::new()),
                mail_cv: Condvar::new(),
            }),
        }
    }

    /// Number of ranks connected by this fabric.
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Returns the communicator endpoint for `rank` acting in `role`.
    pub fn communicator(&self, rank: usize, role: Role) -> CommResult<SimComm> {
        self.inner.check_rank(rank)?;
        Ok(SimComm {
            inner: Arc::clone(&self.inner),
            rank,
            role,
        })
    }

    /// Fails every pending and future operation with [`CommError::Disconnected`].
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::Release);
        // Take each lock before notifying so no waiter misses the flag.
        drop(self.inner.round.lock());
        self.inner.round_cv.notify_all();
        drop(self.inner.mail.lock());
        self.inner.mail_cv.notify_all();
    }

    /// Number of delivered messages nobody has received yet.
    pub fn pending_messages(&self) -> usize {
        self.inner.mail.lock().values().map(|q| q.len()).sum()
    }
}

/// One rank's endpoint on a [`SimFabric`].
#[derive(Clone)]
pub struct SimComm {
    inner: Arc<FabricInner>,
    rank: usize,
    role: Role,
}

impl SimComm {
    /// A single-rank communicator, the equivalent of a "self" communicator.
    pub fn solo(role: Role) -> Self {
        let fabric = SimFabric::new(1);
        Self {
            inner: fabric.inner,
            rank: 0,
            role,
        }
    }

    /// Same endpoint with a different role, e.g. after a recovery.
    pub fn with_role(&self, role: Role) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            rank: self.rank,
            role,
        }
    }
}

impl Communicator for SimComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.inner.size
    }

    fn role(&self) -> Role {
        self.role
    }

    fn all_reduce(&self, local: &[i64], op: &dyn ReduceOp) -> CommResult<Vec<i64>> {
        self.inner.all_reduce(self.rank, local, op)
    }

    fn isend(&self, dest: usize, tag: u32, payload: Vec<u8>) -> CommResult<Box<dyn Transfer>> {
        self.inner.check_rank(dest)?;
        trace!(source = self.rank, dest, tag, bytes = payload.len(), "isend");
        self.inner.deliver((self.rank, dest, tag), payload)?;
        Ok(Box::new(CompletedTransfer::new()))
    }

    fn irecv(&self, source: usize, tag: u32) -> CommResult<Box<dyn Transfer>> {
        self.inner.check_rank(source)?;
        Ok(Box::new(SimRecv {
            inner: Arc::clone(&self.inner),
            key: (source, self.rank, tag),
            payload: None,
            complete: false,
        }))
    }
}

/// Pending receive on a [`SimFabric`] mailbox.
struct SimRecv {
    inner: Arc<FabricInner>,
    key: MailKey,
    payload: Option<Vec<u8>>,
    complete: bool,
}

impl Transfer for SimRecv {
    fn wait(&mut self) -> CommResult<()> {
        if !self.complete {
            self.payload = Some(self.inner.take_blocking(self.key)?);
            self.complete = true;
        }
        Ok(())
    }

    fn test(&mut self) -> CommResult<bool> {
        if !self.complete {
            if let Some(payload) = self.inner.try_take(self.key)? {
                self.payload = Some(payload);
                self.complete = true;
            }
        }
        Ok(self.complete)
    }

    fn take_payload(&mut self) -> Option<Vec<u8>> {
        self.payload.take()
    }
}
