//! Store, commit and restore lifecycle of members.

mod common;

use common::{add_i32_member, fill_i32, run_ranks, store_and_commit, to_i32s, GROUP};
use ranksafe_comm::Role;
use ranksafe_recovery::{
    AttributeValue, DataRecovery, Datatype, ErrorCode, LocalPolicy, MemberAttribute,
    MemberBuffer, MemberId, MemberSelector, RecoveryError, StoreRegion, SubsetSpecifier, LATEST,
};

fn solo_engine(depth: i64) -> DataRecovery {
    let mut engine = DataRecovery::default();
    engine
        .group_create(
            GROUP,
            std::sync::Arc::new(ranksafe_comm::SimComm::solo(Role::Initial)),
            0,
            depth,
            LocalPolicy::boxed(),
        )
        .unwrap();
    engine
}

#[test]
fn test_depth_bounds_history() {
    for depth in 0..4i64 {
        let mut engine = solo_engine(depth);
        let state = add_i32_member(&mut engine, 1, &[0]);
        let commits = depth + 2;
        for ts in 1..=commits {
            fill_i32(&state, ts as i32);
            assert_eq!(store_and_commit(&mut engine), ts);
        }
        assert!(engine.snapshot_count(GROUP).unwrap() <= (depth + 1) as usize);

        let mut out = vec![0u8; 4];
        let oldest = engine.member_restore(GROUP, MemberId::new(1), &mut out, 1, 1);
        assert!(matches!(oldest, Err(RecoveryError::InvalidTimestamp { timestamp: 1, .. })));
        engine
            .member_restore(GROUP, MemberId::new(1), &mut out, 1, commits)
            .unwrap();
        assert_eq!(to_i32s(&out), vec![commits as i32]);
    }
}

#[test]
fn test_round_trip_across_datatypes() {
    let cases: Vec<(Datatype, Vec<u8>)> = vec![
        (Datatype::Byte, vec![1, 2, 3]),
        (Datatype::Int16, (-3i16..3).flat_map(|v| v.to_ne_bytes()).collect()),
        (Datatype::UInt64, [u64::MAX, 0, 42].iter().flat_map(|v| v.to_ne_bytes()).collect()),
        (Datatype::Float64, [1.5f64, -0.25].iter().flat_map(|v| v.to_ne_bytes()).collect()),
        (Datatype::Float32, [3.25f32].iter().flat_map(|v| v.to_ne_bytes()).collect()),
    ];

    for (id, (datatype, bytes)) in cases.into_iter().enumerate() {
        let mut engine = solo_engine(1);
        let element = datatype.size().unwrap();
        let count = bytes.len() / element;
        let buffer = MemberBuffer::new(bytes.clone());
        let member = MemberId::new(id as i32);
        engine
            .member_create(GROUP, member, buffer.clone(), count, datatype)
            .unwrap();
        engine
            .member_store(GROUP, member.into(), &StoreRegion::Whole)
            .unwrap();
        let ts = engine.commit(GROUP).unwrap();
        buffer.write().fill(0xAA);

        let mut out = vec![0u8; bytes.len()];
        let restored = engine
            .member_restore(GROUP, member, &mut out, count, ts)
            .unwrap();
        assert_eq!(restored, count, "{:?}", datatype);
        assert_eq!(out, bytes, "{:?}", datatype);
    }
}

#[test]
fn test_restore_respects_max_count() {
    let mut engine = solo_engine(1);
    add_i32_member(&mut engine, 1, &[1, 2, 3, 4]);
    store_and_commit(&mut engine);
    let mut out = vec![0u8; 16];
    let restored = engine
        .member_restore(GROUP, MemberId::new(1), &mut out, 2, LATEST)
        .unwrap();
    assert_eq!(restored, 2);
    assert_eq!(to_i32s(&out), vec![1, 2, 0, 0]);
}

#[test]
fn test_delete_then_recreate_reuses_slot() {
    let mut engine = solo_engine(2);
    add_i32_member(&mut engine, 1, &[1]);
    add_i32_member(&mut engine, 2, &[2]);
    store_and_commit(&mut engine);

    engine.member_delete(GROUP, MemberId::new(1)).unwrap();
    assert_eq!(engine.member_count(GROUP).unwrap(), 1);
    assert!(matches!(
        engine.member_delete(GROUP, MemberId::new(1)),
        Err(RecoveryError::InvalidMemberId { .. })
    ));

    add_i32_member(&mut engine, 1, &[9]);
    let dump = engine.dump();
    let recreated = dump.groups[0]
        .members
        .iter()
        .find(|m| m.id == 1)
        .unwrap();
    assert_eq!(recreated.slot, 0);
    assert_eq!(recreated.versions.count, 0);
    assert_eq!(engine.member_count(GROUP).unwrap(), 2);
}

#[test]
fn test_member_count_is_idempotent() {
    let mut engine = solo_engine(1);
    for id in 0..5 {
        add_i32_member(&mut engine, id, &[id]);
    }
    let first = engine.member_count(GROUP).unwrap();
    let second = engine.member_count(GROUP).unwrap();
    assert_eq!(first, 5);
    assert_eq!(first, second);
}

#[test]
fn test_subset_store_merges_with_previous_snapshot() {
    let mut engine = solo_engine(2);
    let buffer = add_i32_member(&mut engine, 1, &[0; 8]);
    fill_i32(&buffer, 1);
    store_and_commit(&mut engine);

    fill_i32(&buffer, 2);
    let spec = SubsetSpecifier::create(2, 0, 2, 4).unwrap();
    engine
        .member_store(GROUP, MemberId::new(1).into(), &StoreRegion::Subset(spec))
        .unwrap();
    let ts = engine.commit(GROUP).unwrap();

    let mut out = vec![0u8; 32];
    engine
        .member_restore(GROUP, MemberId::new(1), &mut out, 8, ts)
        .unwrap();
    assert_eq!(to_i32s(&out), vec![2, 2, 1, 1, 2, 2, 1, 1]);
}

#[test]
fn test_istore_then_wait() {
    let mut engine = solo_engine(1);
    add_i32_member(&mut engine, 1, &[5, 6]);
    let mut request = engine
        .member_istore(GROUP, MemberId::new(1), &StoreRegion::Whole)
        .unwrap();
    assert!(request.test().unwrap());
    request.wait().unwrap();
    let ts = engine.commit(GROUP).unwrap();

    let mut out = vec![0u8; 8];
    engine
        .member_restore(GROUP, MemberId::new(1), &mut out, 2, ts)
        .unwrap();
    assert_eq!(to_i32s(&out), vec![5, 6]);
}

#[test]
fn test_snapshot_delete_invalidates_one_snapshot() {
    let mut engine = solo_engine(3);
    add_i32_member(&mut engine, 1, &[1]);
    for _ in 0..3 {
        store_and_commit(&mut engine);
    }
    engine.snapshot_delete(GROUP, 2).unwrap();
    assert_eq!(engine.snapshot_count(GROUP).unwrap(), 2);

    let mut out = vec![0u8; 4];
    assert!(engine
        .member_restore(GROUP, MemberId::new(1), &mut out, 1, 2)
        .is_err());
    assert!(engine
        .member_restore(GROUP, MemberId::new(1), &mut out, 1, 3)
        .is_ok());
}

#[test]
fn test_operations_on_missing_group() {
    let mut engine = DataRecovery::default();
    let missing = ranksafe_recovery::GroupId::new(42);
    let mut out = vec![0u8; 4];
    let results = [
        engine.commit(missing).map(|_| ()),
        engine.member_store(missing, MemberSelector::All, &StoreRegion::Whole),
        engine
            .member_restore(missing, MemberId::new(1), &mut out, 1, LATEST)
            .map(|_| ()),
        engine.snapshot_delete(missing, 1),
        engine.group_delete(missing),
    ];
    for result in results {
        assert_eq!(result.map_err(|e| e.code()), Err(ErrorCode::InvalidGroupId));
    }
}

#[tokio::test]
async fn test_recovered_rank_rebinds_buffer() {
    let restored = run_ranks(2, |r| {
        let mut engine = r.engine(1);
        let original = add_i32_member(&mut engine, 1, &[r.rank as i32 + 1; 3]);
        store_and_commit(&mut engine);

        engine
            .group_create(GROUP, r.comm(Role::Survivor), 0, 1, LocalPolicy::boxed())
            .unwrap();
        let fresh = MemberBuffer::new(vec![0; 12]);
        engine
            .set_attribute(GROUP, MemberId::new(1), AttributeValue::Buffer(fresh.clone()))
            .unwrap();
        match engine
            .get_attribute(GROUP, MemberId::new(1), MemberAttribute::Buffer)
            .unwrap()
        {
            AttributeValue::Buffer(current) => assert!(current.same_buffer(&fresh)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!original.same_buffer(&fresh));

        let mut out = fresh.to_vec();
        engine
            .member_restore(GROUP, MemberId::new(1), &mut out, 3, LATEST)
            .unwrap();
        to_i32s(&out)
    })
    .await;
    assert_eq!(restored, vec![vec![1; 3], vec![2; 3]]);
}

#[test]
fn test_subset_with_extreme_stride_and_block_count() {
    let mut engine = solo_engine(2);
    let buffer = add_i32_member(&mut engine, 1, &[0; 8]);
    fill_i32(&buffer, 1);
    store_and_commit(&mut engine);

    let regions = [
        (SubsetSpecifier::create(4, 0, 1, i64::MAX).unwrap(), 2, vec![2, 1, 1, 1, 1, 1, 1, 1]),
        (SubsetSpecifier::create(i64::MAX, 0, 1, 2).unwrap(), 3, vec![3, 1, 3, 1, 3, 1, 3, 1]),
    ];
    for (spec, value, expected) in regions {
        fill_i32(&buffer, value);
        engine
            .member_store(GROUP, MemberId::new(1).into(), &StoreRegion::Subset(spec))
            .unwrap();
        let ts = engine.commit(GROUP).unwrap();
        let mut out = vec![0u8; 32];
        engine
            .member_restore(GROUP, MemberId::new(1), &mut out, 8, ts)
            .unwrap();
        assert_eq!(to_i32s(&out), expected);
    }
}

#[test]
fn test_depth_beyond_limit_rejected() {
    let mut engine = DataRecovery::default();
    for depth in [i64::MAX, 1_000_000_000] {
        let result = engine.group_create(
            GROUP,
            std::sync::Arc::new(ranksafe_comm::SimComm::solo(Role::Initial)),
            0,
            depth,
            LocalPolicy::boxed(),
        );
        assert_eq!(result.map_err(|e| e.code()), Err(ErrorCode::InvalidDepth));
    }
    assert_eq!(engine.group_count(), 0);
}

#[test]
fn test_never_stored_member_has_no_snapshot() {
    let mut engine = solo_engine(2);
    add_i32_member(&mut engine, 1, &[7, 7]);
    let ts = engine.commit(GROUP).unwrap();
    assert_eq!(engine.snapshot_count(GROUP).unwrap(), 0);

    let mut out = vec![0xFFu8; 8];
    for timestamp in [ts, LATEST] {
        assert!(matches!(
            engine.member_restore(GROUP, MemberId::new(1), &mut out, 2, timestamp),
            Err(RecoveryError::InvalidTimestamp { .. })
        ));
    }
    assert_eq!(out, vec![0xFF; 8]);
}

#[test]
fn test_commit_after_deleting_latest_snapshot() {
    let mut engine = solo_engine(2);
    add_i32_member(&mut engine, 1, &[1, 2, 3, 4]);
    let first = store_and_commit(&mut engine);
    engine.snapshot_delete(GROUP, first).unwrap();
    let second = engine.commit(GROUP).unwrap();
    assert_eq!(second, 2);
    assert_eq!(engine.snapshot_count(GROUP).unwrap(), 0);

    let mut out = vec![0u8; 16];
    assert!(matches!(
        engine.member_restore(GROUP, MemberId::new(1), &mut out, 4, second),
        Err(RecoveryError::InvalidTimestamp { timestamp: 2, .. })
    ));
    assert_eq!(out, vec![0; 16]);

    // A fresh store makes the next commit restorable again.
    let third = store_and_commit(&mut engine);
    engine
        .member_restore(GROUP, MemberId::new(1), &mut out, 4, third)
        .unwrap();
    assert_eq!(to_i32s(&out), vec![1, 2, 3, 4]);
}

#[test]
fn test_buffer_shorter_than_count() {
    let mut engine = solo_engine(1);
    let short = MemberBuffer::from_i32s(&[1, 2]);
    assert_eq!(
        engine
            .member_create(GROUP, MemberId::new(1), short, 4, Datatype::Int32)
            .map_err(|e| e.code()),
        Err(ErrorCode::InvalidAttributeName)
    );
    assert_eq!(engine.member_count(GROUP).unwrap(), 0);

    let buffer = add_i32_member(&mut engine, 2, &[1, 2, 3]);
    buffer.write().truncate(8);
    assert_eq!(
        engine
            .member_store(GROUP, MemberSelector::All, &StoreRegion::Whole)
            .map_err(|e| e.code()),
        Err(ErrorCode::InvalidAttributeName)
    );
}
