#![warn(missing_docs)]
//! RankSafe simulator: checkpoint, interruption and rollback over in-process ranks
//!
//! Usage: `ranksafe-sim [ranks] [config.json]`

use std::sync::Arc;

use anyhow::Context;
use ranksafe_comm::{Role, SimFabric};
use ranksafe_recovery::{
    status_of, DataRecovery, Datatype, ErrorCode, GroupId, LocalPolicy, MemberBuffer, MemberId,
    MemberSelector, RecoveryConfig, StoreRegion, LATEST,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_RANKS: usize = 4;
const GROUP: GroupId = GroupId::new(0);
const STATE: MemberId = MemberId::new(0);
const DEPTH: i64 = 2;
const ELEMENTS: usize = 4;
const STEPS: usize = 3;

struct RankOutcome {
    rank: usize,
    agreed: i64,
    restored: Vec<i32>,
    rejoin: ErrorCode,
    dump: Option<String>,
}

fn fill(buffer: &MemberBuffer, rank: usize, step: usize) {
    let value = (rank * 100 + step) as i32;
    for chunk in buffer.write().chunks_exact_mut(4) {
        chunk.copy_from_slice(&value.to_ne_bytes());
    }
}

fn decode(bytes: &[u8]) -> Vec<i32> {
    bytes
        .chunks_exact(4)
        .map(|c| i32::from_ne_bytes(c.try_into().unwrap_or_default()))
        .collect()
}

fn run_rank(fabric: &SimFabric, rank: usize, config: RecoveryConfig) -> anyhow::Result<RankOutcome> {
    let mut engine = DataRecovery::new(config.clone())?;
    let comm = Arc::new(fabric.communicator(rank, Role::Initial)?);
    engine.group_create(GROUP, comm, 0, DEPTH, LocalPolicy::boxed())?;

    let state = MemberBuffer::from_i32s(&[0; ELEMENTS]);
    engine.member_create(GROUP, STATE, state.clone(), ELEMENTS, Datatype::Int32)?;

    for step in 1..=STEPS {
        fill(&state, rank, step);
        engine.member_store(GROUP, MemberSelector::All, &StoreRegion::Whole)?;
        engine.commit_barrier(GROUP)?;
    }

    // Odd ranks get one commit further before the interruption.
    if rank % 2 == 1 {
        fill(&state, rank, STEPS + 1);
        engine.member_store(GROUP, STATE.into(), &StoreRegion::Whole)?;
        engine.commit(GROUP)?;
    }

    let agreed = engine.agree_restore_point(GROUP)?;
    let survivor = Arc::new(fabric.communicator(rank, Role::Survivor)?);
    engine.group_create(GROUP, survivor, 0, DEPTH, LocalPolicy::boxed())?;

    state.write().fill(0);
    let mut bytes = vec![0u8; ELEMENTS * 4];
    engine.member_restore(GROUP, STATE, &mut bytes, ELEMENTS, LATEST)?;
    state.write().copy_from_slice(&bytes);
    let dump = (rank == 0).then(|| engine.dump_json()).transpose()?;

    // The last rank is replaced by a fresh process holding no snapshots.
    let rejoin = if rank + 1 == fabric.size() {
        engine = DataRecovery::new(config)?;
        let comm = Arc::new(fabric.communicator(rank, Role::Recovered)?);
        engine.group_create(GROUP, comm, 0, DEPTH, LocalPolicy::boxed())
    } else {
        let comm = Arc::new(fabric.communicator(rank, Role::Survivor)?);
        engine.group_create(GROUP, comm, 0, DEPTH, LocalPolicy::boxed())
    };

    Ok(RankOutcome {
        rank,
        agreed,
        restored: decode(&bytes),
        rejoin: status_of(&rejoin),
        dump,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let ranks = match args.next() {
        Some(arg) => arg
            .parse::<usize>()
            .with_context(|| format!("invalid rank count {:?}", arg))?,
        None => DEFAULT_RANKS,
    };
    if ranks == 0 {
        anyhow::bail!("need at least one rank");
    }
    let config = match args.next() {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {}", path))?;
            RecoveryConfig::from_json(&text)?
        }
        None => RecoveryConfig::default(),
    };

    info!(ranks, depth = DEPTH, steps = STEPS, "RankSafe simulation starting");

    let fabric = SimFabric::new(ranks);
    let handles: Vec<_> = (0..ranks)
        .map(|rank| {
            let fabric = fabric.clone();
            let config = config.clone();
            tokio::task::spawn_blocking(move || {
                let result = run_rank(&fabric, rank, config);
                if result.is_err() {
                    // Unblock peers waiting in a collective.
                    fabric.shutdown();
                }
                result
            })
        })
        .collect();

    let mut outcomes = Vec::with_capacity(ranks);
    for handle in handles {
        outcomes.push(handle.await??);
    }

    for outcome in &outcomes {
        let expected = vec![(outcome.rank * 100 + STEPS) as i32; ELEMENTS];
        if outcome.restored != expected {
            anyhow::bail!(
                "rank {} restored {:?}, expected {:?}",
                outcome.rank,
                outcome.restored,
                expected
            );
        }
        info!(
            rank = outcome.rank,
            agreed = outcome.agreed,
            rejoin = ?outcome.rejoin,
            "rank rolled back and restored"
        );
    }

    let rejoin = outcomes.first().map(|o| o.rejoin).unwrap_or(ErrorCode::Success);
    if outcomes.iter().any(|o| o.rejoin != rejoin) {
        anyhow::bail!("ranks disagree on the outcome of the rejoin");
    }
    if rejoin == ErrorCode::GroupCreate {
        warn!("replacement rank could not rejoin: the local policy keeps no copies for it");
    }

    if let Some(dump) = outcomes.iter().find_map(|o| o.dump.as_ref()) {
        println!("{}", dump);
    }
    info!("RankSafe simulation finished");
    Ok(())
}
