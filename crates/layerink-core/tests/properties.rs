//! Property tests: random operation sequences never break the rank invariants.

use layerink_core::{AllocatorConfig, ObjectId, Rank, RankAllocator};
use proptest::prelude::*;
use std::collections::HashSet;

const MIN_RANK: Rank = 100;
const MAX_RANK: Rank = 3_000;

#[derive(Debug, Clone)]
enum Op {
    Assign(u8),
    Set(u8, Rank),
    Remove(u8),
    MoveUp(u8),
    MoveDown(u8),
    GroupUp(Vec<u8>),
    GroupDown(Vec<u8>),
    BringToFront(u8),
    SendToBack(u8),
    Compact,
    UndoPoint,
    Undo,
    Redo,
}

fn arb_id() -> impl Strategy<Value = u8> {
    0u8..12
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => arb_id().prop_map(Op::Assign),
        2 => (arb_id(), 0i64..4_000).prop_map(|(id, rank)| Op::Set(id, rank)),
        1 => arb_id().prop_map(Op::Remove),
        2 => arb_id().prop_map(Op::MoveUp),
        2 => arb_id().prop_map(Op::MoveDown),
        2 => prop::collection::vec(arb_id(), 1..5).prop_map(Op::GroupUp),
        2 => prop::collection::vec(arb_id(), 1..5).prop_map(Op::GroupDown),
        1 => arb_id().prop_map(Op::BringToFront),
        1 => arb_id().prop_map(Op::SendToBack),
        1 => Just(Op::Compact),
        1 => Just(Op::UndoPoint),
        1 => Just(Op::Undo),
        1 => Just(Op::Redo),
    ]
}

fn name(id: u8) -> ObjectId {
    ObjectId::new(format!("obj-{id}"))
}

fn names(ids: &[u8]) -> Vec<ObjectId> {
    ids.iter().copied().map(name).collect()
}

fn allocator() -> RankAllocator {
    let config = AllocatorConfig::with_range(MIN_RANK, MAX_RANK).low_water_mark(150);
    RankAllocator::new(config).unwrap()
}

fn apply(alloc: &mut RankAllocator, op: &Op) -> Result<(), TestCaseError> {
    match op {
        Op::Assign(id) => {
            alloc.assign(name(*id)).unwrap();
        }
        Op::Set(id, rank) => {
            let actual = alloc.set(name(*id), *rank);
            prop_assert!((MIN_RANK..=MAX_RANK).contains(&actual));
            prop_assert_eq!(alloc.get(name(*id).as_str()), actual);
        }
        Op::Remove(id) => {
            alloc.remove(name(*id).as_str());
        }
        Op::MoveUp(id) | Op::MoveDown(id) => {
            let id = name(*id);
            let result = if matches!(op, Op::MoveUp(_)) {
                alloc.move_up(id.as_str())
            } else {
                alloc.move_down(id.as_str())
            };
            if let Some(swap) = &result.swapped_with {
                prop_assert_eq!(alloc.get(swap.id.as_str()), result.old_rank);
                prop_assert_eq!(swap.new_rank, result.old_rank);
            }
            if result.success {
                prop_assert_eq!(alloc.get(id.as_str()), result.new_rank);
            }
        }
        Op::GroupUp(ids) | Op::GroupDown(ids) => {
            let group = names(ids);
            let before = relative_order(alloc, &group);
            let outsiders_before = outsider_order(alloc, &group);
            let results = if matches!(op, Op::GroupUp(_)) {
                alloc.move_up_group(&group)
            } else {
                alloc.move_down_group(&group)
            };
            prop_assert_eq!(results.len(), group.len());
            for (result, id) in results.iter().zip(&group) {
                prop_assert_eq!(&result.id, id);
            }
            prop_assert_eq!(relative_order(alloc, &group), before);
            prop_assert_eq!(outsider_order(alloc, &group), outsiders_before);
        }
        Op::BringToFront(id) => {
            let id = name(*id);
            if alloc.bring_to_front(id.as_str()).success {
                prop_assert_eq!(alloc.ordered_ids().last(), Some(&id));
            }
        }
        Op::SendToBack(id) => {
            let id = name(*id);
            if alloc.send_to_back(id.as_str()).success {
                prop_assert_eq!(alloc.ordered_ids().next(), Some(&id));
            }
        }
        Op::Compact => {
            let before: Vec<ObjectId> = alloc.ordered_ids().cloned().collect();
            alloc.compact();
            let after: Vec<ObjectId> = alloc.ordered_ids().cloned().collect();
            prop_assert_eq!(before, after);
        }
        Op::UndoPoint => alloc.create_undo_point(),
        Op::Undo => {
            alloc.undo();
        }
        Op::Redo => {
            alloc.redo();
        }
    }
    Ok(())
}

/// Live ids outside the group ordered bottom to top.
fn outsider_order(alloc: &RankAllocator, group: &[ObjectId]) -> Vec<ObjectId> {
    let members: HashSet<&ObjectId> = group.iter().collect();
    alloc
        .ordered_ids()
        .filter(|id| !members.contains(id))
        .cloned()
        .collect()
}

/// Live group members ordered bottom to top.
fn relative_order(alloc: &RankAllocator, group: &[ObjectId]) -> Vec<ObjectId> {
    let members: HashSet<&ObjectId> = group.iter().collect();
    alloc
        .ordered_ids()
        .filter(|id| members.contains(id))
        .cloned()
        .collect()
}

fn check_invariants(alloc: &RankAllocator) -> Result<(), TestCaseError> {
    let mut seen = HashSet::new();
    let mut count = 0;
    for (id, rank) in alloc.ordered() {
        prop_assert!((MIN_RANK..=MAX_RANK).contains(&rank), "{} out of range at {}", id, rank);
        prop_assert!(seen.insert(rank), "duplicate rank {}", rank);
        prop_assert_eq!(alloc.rank_of(id.as_str()), Some(rank));
        prop_assert_eq!(alloc.id_at(rank), Some(id));
        count += 1;
    }
    prop_assert_eq!(count, alloc.len());
    prop_assert!(alloc.is_empty() || alloc.next_available() > alloc.stats().highest_rank.unwrap_or(MIN_RANK));
    Ok(())
}

proptest! {
    #[test]
    fn ranks_stay_unique_and_bounded(ops in prop::collection::vec(arb_op(), 1..80)) {
        let mut alloc = allocator();
        for op in &ops {
            apply(&mut alloc, op)?;
            check_invariants(&alloc)?;
        }
    }

    #[test]
    fn compaction_preserves_order(ranks in prop::collection::vec(MIN_RANK..=MAX_RANK, 1..30)) {
        let mut alloc = allocator();
        alloc.load(ranks.iter().enumerate().map(|(i, &rank)| (format!("n{i}"), rank)));
        let before: Vec<ObjectId> = alloc.ordered_ids().cloned().collect();

        prop_assert!(alloc.compact());
        let after: Vec<ObjectId> = alloc.ordered_ids().cloned().collect();
        prop_assert_eq!(&before, &after);

        let ranks: Vec<Rank> = alloc.ordered().map(|(_, rank)| rank).collect();
        let expected: Vec<Rank> = (0..ranks.len() as Rank).map(|i| MIN_RANK + i * 50).collect();
        prop_assert_eq!(ranks, expected);
        check_invariants(&alloc)?;
    }

    #[test]
    fn unknown_remove_is_noop(ops in prop::collection::vec(arb_op(), 0..30)) {
        let mut alloc = allocator();
        for op in &ops {
            apply(&mut alloc, op)?;
        }
        let layout = alloc.layout();
        let stats = alloc.stats();
        prop_assert!(!alloc.remove("nonexistent"));
        prop_assert_eq!(alloc.layout(), layout);
        prop_assert_eq!(alloc.stats(), stats);
    }
}
