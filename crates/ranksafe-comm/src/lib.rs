#![warn(missing_docs)]

//! RankSafe communication subsystem: rank communicator contract, reduction operators, in-process fabric
//!
//! The recovery engine never talks to a transport directly. It needs a handful of
//! primitives from the substrate that hosts the parallel job: rank and role queries,
//! an all-reduce parameterized by a reduction operator, and non-blocking tagged
//! point-to-point transfers. This crate defines that contract ([`Communicator`]) and
//! ships [`SimFabric`], an in-process implementation where every rank is a thread.

pub mod communicator;
pub mod error;
pub mod reduce;
pub mod sim;
pub mod transfer;

pub use communicator::{Communicator, Role};
pub use error::{CommError, CommResult};
pub use reduce::{AgreeOp, MinOp, ReduceOp, DISAGREE};
pub use sim::{SimComm, SimFabric};
pub use transfer::{CompletedTransfer, FailedTransfer, Transfer};
