//! Common fixtures for multi-rank integration tests.

#![allow(dead_code)]

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use ranksafe_comm::{Communicator, Role, SimFabric};
use ranksafe_recovery::{
    DataRecovery, Datatype, GroupId, LocalPolicy, MemberBuffer, MemberId, MemberSelector,
    StoreRegion,
};

/// Group used by most scenarios.
pub const GROUP: GroupId = GroupId::new(1);

/// One rank's view of a simulated job.
pub struct Rank {
    pub rank: usize,
    pub size: usize,
    fabric: SimFabric,
}

impl Rank {
    /// A communicator endpoint for this rank acting in `role`.
    pub fn comm(&self, role: Role) -> Arc<dyn Communicator> {
        Arc::new(
            self.fabric
                .communicator(self.rank, role)
                .expect("rank within fabric"),
        )
    }

    /// An engine holding `GROUP` with the given depth, created as an initial rank.
    pub fn engine(&self, depth: i64) -> DataRecovery {
        let mut engine = DataRecovery::default();
        engine
            .group_create(GROUP, self.comm(Role::Initial), 0, depth, LocalPolicy::boxed())
            .expect("group create");
        engine
    }
}

/// Runs `f` once per rank, each on its own blocking thread, and returns the
/// results in rank order. A panicking rank shuts the fabric down so its peers
/// fail instead of waiting forever in a collective.
pub async fn run_ranks<T, F>(size: usize, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(Rank) -> T + Send + Sync + 'static,
{
    let fabric = SimFabric::new(size);
    let f = Arc::new(f);
    let handles: Vec<_> = (0..size)
        .map(|rank| {
            let fabric = fabric.clone();
            let f = Arc::clone(&f);
            tokio::task::spawn_blocking(move || {
                let ctx = Rank {
                    rank,
                    size,
                    fabric: fabric.clone(),
                };
                match panic::catch_unwind(AssertUnwindSafe(|| f(ctx))) {
                    Ok(value) => value,
                    Err(cause) => {
                        fabric.shutdown();
                        panic::resume_unwind(cause)
                    }
                }
            })
        })
        .collect();

    let mut results = Vec::with_capacity(size);
    for handle in handles {
        results.push(handle.await.expect("rank panicked"));
    }
    results
}

/// Registers an `i32` member holding `values`; returns the shared buffer.
pub fn add_i32_member(engine: &mut DataRecovery, id: i32, values: &[i32]) -> MemberBuffer {
    let buffer = MemberBuffer::from_i32s(values);
    engine
        .member_create(GROUP, MemberId::new(id), buffer.clone(), values.len(), Datatype::Int32)
        .expect("member create");
    buffer
}

/// Overwrites every element of an `i32` buffer with `value`.
pub fn fill_i32(buffer: &MemberBuffer, value: i32) {
    for chunk in buffer.write().chunks_exact_mut(4) {
        chunk.copy_from_slice(&value.to_ne_bytes());
    }
}

/// Decodes native-endian `i32`s.
pub fn to_i32s(bytes: &[u8]) -> Vec<i32> {
    bytes
        .chunks_exact(4)
        .map(|c| i32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Stores every member and commits; returns the new timestamp.
pub fn store_and_commit(engine: &mut DataRecovery) -> i64 {
    engine
        .member_store(GROUP, MemberSelector::All, &StoreRegion::Whole)
        .expect("store");
    engine.commit(GROUP).expect("commit")
}
