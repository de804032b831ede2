//! Neighbour-relative reordering: single moves, group moves, front/back.

use super::RankAllocator;
use crate::id::{ObjectId, Rank};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Why a move did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveReason {
    /// Nothing is above the object.
    AtTop,
    /// Nothing is below the object.
    AtBottom,
    /// The id has no rank.
    NotFound,
}

/// The other object displaced by a move, with its new rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapInfo {
    pub id: ObjectId,
    pub new_rank: Rank,
}

/// Outcome of a move request.
///
/// A move that could not happen because the object is already at the edge is
/// an expected outcome: `success` is false and `at_boundary` is true. When
/// `swapped_with` is set, the other object's rank changed too and callers that
/// persist or broadcast ranks must include it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveResult {
    pub id: ObjectId,
    pub success: bool,
    pub at_boundary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<MoveReason>,
    pub old_rank: Rank,
    pub new_rank: Rank,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swapped_with: Option<SwapInfo>,
}

impl MoveResult {
    fn moved(id: ObjectId, old_rank: Rank, new_rank: Rank, swapped_with: Option<SwapInfo>) -> Self {
        Self {
            id,
            success: true,
            at_boundary: false,
            reason: None,
            old_rank,
            new_rank,
            swapped_with,
        }
    }

    fn boundary(id: ObjectId, rank: Rank, reason: MoveReason) -> Self {
        Self {
            id,
            success: false,
            at_boundary: true,
            reason: Some(reason),
            old_rank: rank,
            new_rank: rank,
            swapped_with: None,
        }
    }

    fn not_found(id: ObjectId, sentinel: Rank) -> Self {
        Self {
            id,
            success: false,
            at_boundary: false,
            reason: Some(MoveReason::NotFound),
            old_rank: sentinel,
            new_rank: sentinel,
            swapped_with: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

impl Direction {
    fn boundary_reason(self) -> MoveReason {
        match self {
            Direction::Up => MoveReason::AtTop,
            Direction::Down => MoveReason::AtBottom,
        }
    }
}

impl RankAllocator {
    /// Swap `id` with the nearest object above it.
    pub fn move_up(&mut self, id: &str) -> MoveResult {
        self.move_single(id, Direction::Up)
    }

    /// Swap `id` with the nearest object below it.
    pub fn move_down(&mut self, id: &str) -> MoveResult {
        self.move_single(id, Direction::Down)
    }

    fn move_single(&mut self, id: &str, direction: Direction) -> MoveResult {
        let Some(old_rank) = self.state.rank_of(id) else {
            return MoveResult::not_found(ObjectId::from(id), self.config.min_rank);
        };
        let id = ObjectId::from(id);

        let neighbor = match direction {
            Direction::Up => self.state.above(old_rank),
            Direction::Down => self.state.below(old_rank),
        };
        let Some((target, other)) = neighbor.map(|(rank, other)| (rank, other.clone())) else {
            log::debug!("{} already at {:?}", id, direction.boundary_reason());
            return MoveResult::boundary(id, old_rank, direction.boundary_reason());
        };

        // The displaced neighbour goes first so the observer never sees two
        // objects claiming the same rank.
        self.commit(&[(other.clone(), old_rank), (id.clone(), target)]);
        log::debug!("Swapped {} ({} -> {}) with {}", id, old_rank, target, other);

        MoveResult::moved(
            id,
            old_rank,
            target,
            Some(SwapInfo {
                id: other,
                new_rank: old_rank,
            }),
        )
    }

    /// Move a set of objects up past the nearest non-member above them.
    ///
    /// Returns one result per input id, in input order.
    pub fn move_up_group(&mut self, ids: &[ObjectId]) -> Vec<MoveResult> {
        self.move_group(ids, Direction::Up)
    }

    /// Move a set of objects down past the nearest non-member below them.
    ///
    /// Returns one result per input id, in input order.
    pub fn move_down_group(&mut self, ids: &[ObjectId]) -> Vec<MoveResult> {
        self.move_group(ids, Direction::Down)
    }

    fn move_group(&mut self, ids: &[ObjectId], direction: Direction) -> Vec<MoveResult> {
        let mut seen = HashSet::new();
        let mut members: Vec<(Rank, ObjectId)> = Vec::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            if let Some(rank) = self.state.rank_of(id.as_str()) {
                members.push((rank, id.clone()));
            }
        }
        members.sort_by_key(|(rank, _)| *rank);

        let suspended = std::mem::replace(&mut self.compaction_suspended, true);
        let outcomes = self.plan_group(&members, direction);
        self.compaction_suspended = suspended;

        ids.iter()
            .map(|id| match outcomes.get(id) {
                Some(result) => result.clone(),
                None => MoveResult::not_found(id.clone(), self.config.min_rank),
            })
            .collect()
    }

    /// Plan and commit a group move. `members` is sorted by rank.
    fn plan_group(
        &mut self,
        members: &[(Rank, ObjectId)],
        direction: Direction,
    ) -> HashMap<ObjectId, MoveResult> {
        let (Some((low, _)), Some((high, _))) = (members.first(), members.last()) else {
            return HashMap::new();
        };

        let neighbor = match direction {
            Direction::Up => self.state.above(*high),
            Direction::Down => self.state.below(*low),
        };
        let Some((neighbor_rank, neighbor_id)) =
            neighbor.map(|(rank, id)| (rank, id.clone()))
        else {
            log::debug!("Group of {} already at {:?}", members.len(), direction.boundary_reason());
            return members
                .iter()
                .map(|(rank, id)| {
                    (id.clone(), MoveResult::boundary(id.clone(), *rank, direction.boundary_reason()))
                })
                .collect();
        };

        let mut plan: Vec<(ObjectId, Rank)> = Vec::with_capacity(members.len() + 1);
        let mut swap_owner: Option<(ObjectId, Rank)> = None;

        if let Some(start) = self.block_start(neighbor_rank, members.len(), direction) {
            let sub_step = self.config.group_sub_step;
            plan.extend(
                members
                    .iter()
                    .enumerate()
                    .map(|(i, (_, id))| (id.clone(), start + i as Rank * sub_step)),
            );
        } else {
            // No room past the neighbour: rotate it through the run of members
            // next to it, so it never crosses an outsider.
            let run = self.adjacent_run(members, direction);
            let mut slots: Vec<Rank> = run.iter().map(|(rank, _)| *rank).collect();
            slots.push(neighbor_rank);
            slots.sort_unstable();

            let (neighbor_slot, member_slots, displaced_from) = match direction {
                Direction::Up => (slots[0], &slots[1..], run[0].1.clone()),
                Direction::Down => (
                    slots[run.len()],
                    &slots[..run.len()],
                    run[run.len() - 1].1.clone(),
                ),
            };
            plan.push((neighbor_id.clone(), neighbor_slot));
            plan.extend(
                run.iter()
                    .zip(member_slots)
                    .map(|((_, id), &slot)| (id.clone(), slot)),
            );
            swap_owner = Some((displaced_from, neighbor_slot));
        }

        self.commit(&plan);
        log::debug!(
            "Moved group of {} {:?} past {}",
            members.len(),
            direction,
            neighbor_id
        );

        members
            .iter()
            .map(|(old_rank, id)| {
                let new_rank = self.state.rank_of(id.as_str()).unwrap_or(*old_rank);
                let swapped_with = match &swap_owner {
                    Some((owner, neighbor_new)) if owner == id => Some(SwapInfo {
                        id: neighbor_id.clone(),
                        new_rank: *neighbor_new,
                    }),
                    _ => None,
                };
                (id.clone(), MoveResult::moved(id.clone(), *old_rank, new_rank, swapped_with))
            })
            .collect()
    }

    /// Members on the neighbour's side with no outsider between them.
    /// `members` is sorted by rank and non-empty.
    fn adjacent_run<'a>(
        &self,
        members: &'a [(Rank, ObjectId)],
        direction: Direction,
    ) -> &'a [(Rank, ObjectId)] {
        match direction {
            Direction::Up => {
                let mut first = members.len() - 1;
                while first > 0
                    && self.state.below(members[first].0).map(|(r, _)| r) == Some(members[first - 1].0)
                {
                    first -= 1;
                }
                &members[first..]
            }
            Direction::Down => {
                let mut last = 0;
                while last + 1 < members.len()
                    && self.state.above(members[last].0).map(|(r, _)| r) == Some(members[last + 1].0)
                {
                    last += 1;
                }
                &members[..=last]
            }
        }
    }

    /// Lowest rank of a `count`-member block placed in the free span beyond
    /// `neighbor`, or `None` if the span is too small.
    fn block_start(&self, neighbor: Rank, count: usize, direction: Direction) -> Option<Rank> {
        let width = (count as i128 - 1) * self.config.group_sub_step as i128;
        let (min, max) = (self.config.min_rank as i128, self.config.max_rank as i128);
        let step = self.config.step_size as i128;
        let neighbor = neighbor as i128;

        let start = match direction {
            Direction::Up => match self.state.above(neighbor as Rank) {
                Some((beyond, _)) => centered(neighbor, beyond as i128, width),
                None => [neighbor + step, neighbor + 1]
                    .into_iter()
                    .find(|&start| start + width <= max),
            },
            Direction::Down => match self.state.below(neighbor as Rank) {
                Some((beyond, _)) => centered(beyond as i128, neighbor, width),
                None => [neighbor - step, neighbor - 1]
                    .into_iter()
                    .map(|end| end - width)
                    .find(|&start| start >= min),
            },
        }?;
        Rank::try_from(start).ok()
    }

    /// Put `id` above every other object.
    pub fn bring_to_front(&mut self, id: &str) -> MoveResult {
        let Some(old_rank) = self.state.rank_of(id) else {
            return MoveResult::not_found(ObjectId::from(id), self.config.min_rank);
        };
        let id = ObjectId::from(id);
        if self.state.highest() == Some(old_rank) {
            return MoveResult::boundary(id, old_rank, MoveReason::AtTop);
        }

        // Compaction may rewrite the mover's rank; report the pre-move rank.
        if self.ensure_capacity().is_ok() {
            let target = self.state.next_available;
            self.commit(&[(id.clone(), target)]);
            log::debug!("Brought {} to front at {}", id, target);
            return MoveResult::moved(id, old_rank, target, None);
        }

        let mut order: Vec<ObjectId> = self.ordered_ids().filter(|o| **o != id).cloned().collect();
        order.push(id.clone());
        self.relayout(&order);
        let new_rank = self.get(id.as_str());
        MoveResult::moved(id, old_rank, new_rank, None)
    }

    /// Put `id` below every other object.
    pub fn send_to_back(&mut self, id: &str) -> MoveResult {
        let Some(old_rank) = self.state.rank_of(id) else {
            return MoveResult::not_found(ObjectId::from(id), self.config.min_rank);
        };
        let id = ObjectId::from(id);
        let Some(lowest) = self.state.lowest().filter(|&lowest| lowest != old_rank) else {
            return MoveResult::boundary(id, old_rank, MoveReason::AtBottom);
        };

        let min = self.config.min_rank;
        let target = lowest
            .checked_sub(self.config.step_size)
            .filter(|&t| t >= min)
            .or_else(|| {
                let mid = min as i128 + (lowest as i128 - min as i128) / 2;
                Some(mid as Rank).filter(|&t| t < lowest)
            });

        if let Some(target) = target {
            self.commit(&[(id.clone(), target)]);
            log::debug!("Sent {} to back at {}", id, target);
            return MoveResult::moved(id, old_rank, target, None);
        }

        let order: Vec<ObjectId> = std::iter::once(id.clone())
            .chain(self.ordered_ids().filter(|o| **o != id).cloned())
            .collect();
        self.relayout(&order);
        let new_rank = self.get(id.as_str());
        MoveResult::moved(id, old_rank, new_rank, None)
    }
}

/// Start of a `width`-wide block centered in the open interval `(lo, hi)`.
fn centered(lo: i128, hi: i128, width: i128) -> Option<i128> {
    let free = hi - lo - 1;
    (free > width).then(|| lo + 1 + (free - width - 1) / 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllocatorConfig;

    fn allocator() -> RankAllocator {
        RankAllocator::new(AllocatorConfig::with_range(100, 100_000)).unwrap()
    }

    fn ids(names: &[&str]) -> Vec<ObjectId> {
        names.iter().map(|&n| ObjectId::from(n)).collect()
    }

    fn order(alloc: &RankAllocator) -> Vec<String> {
        alloc.ordered_ids().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_move_down_swaps_with_neighbor() {
        let mut alloc = allocator();
        for id in ["a", "b", "c"] {
            alloc.assign(id).unwrap();
        }
        let result = alloc.move_down("c");
        assert!(result.success);
        assert_eq!((result.old_rank, result.new_rank), (200, 150));
        assert_eq!(
            result.swapped_with,
            Some(SwapInfo { id: "b".into(), new_rank: 200 })
        );
        assert_eq!(alloc.get("b"), 200);
    }

    #[test]
    fn test_move_skips_gaps() {
        let mut alloc = allocator();
        alloc.set("a", 100);
        alloc.set("b", 5_000);
        let result = alloc.move_up("a");
        assert_eq!(result.new_rank, 5_000);
        assert_eq!(alloc.get("b"), 100);
    }

    #[test]
    fn test_move_at_boundary() {
        let mut alloc = allocator();
        alloc.assign("a").unwrap();
        alloc.assign("b").unwrap();

        let top = alloc.move_up("b");
        assert!(!top.success);
        assert!(top.at_boundary);
        assert_eq!(top.reason, Some(MoveReason::AtTop));
        assert_eq!(top.new_rank, 150);

        let bottom = alloc.move_down("a");
        assert_eq!(bottom.reason, Some(MoveReason::AtBottom));
    }

    #[test]
    fn test_move_unknown() {
        let mut alloc = allocator();
        let result = alloc.move_up("ghost");
        assert!(!result.success);
        assert!(!result.at_boundary);
        assert_eq!(result.reason, Some(MoveReason::NotFound));
    }

    #[test]
    fn test_group_moves_into_gap_past_neighbor() {
        let mut alloc = allocator();
        for id in ["a", "b", "c", "d"] {
            alloc.assign(id).unwrap();
        }
        // a=100 b=150 c=200 d=250; group {a, b} jumps past c into (200, 250)
        let results = alloc.move_up_group(&ids(&["b", "a"]));
        assert_eq!(results[0].id.as_str(), "b");
        assert!(results.iter().all(|r| r.success && r.swapped_with.is_none()));
        assert_eq!(order(&alloc), vec!["c", "a", "b", "d"]);
        assert_eq!(alloc.get("b") - alloc.get("a"), 1);
        assert!(alloc.get("a") > 200 && alloc.get("b") < 250);
    }

    #[test]
    fn test_group_up_with_nothing_beyond_neighbor() {
        let mut alloc = allocator();
        for id in ["a", "b", "c"] {
            alloc.assign(id).unwrap();
        }
        let results = alloc.move_up_group(&ids(&["a", "b"]));
        assert!(results.iter().all(|r| r.success));
        assert_eq!(alloc.get("a"), 250);
        assert_eq!(alloc.get("b"), 251);
        assert_eq!(order(&alloc), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_group_falls_back_to_swap_when_packed() {
        let mut alloc = allocator();
        alloc.load(vec![("a", 100), ("b", 101), ("c", 102), ("d", 103)]);
        let results = alloc.move_up_group(&ids(&["a", "b"]));
        assert_eq!(order(&alloc), vec!["c", "a", "b", "d"]);
        assert_eq!(alloc.get("c"), 100);
        assert_eq!(
            results[0].swapped_with,
            Some(SwapInfo { id: "c".into(), new_rank: 100 })
        );
        assert!(results[1].swapped_with.is_none());
    }

    #[test]
    fn test_group_down() {
        let mut alloc = allocator();
        for id in ["a", "b", "c", "d"] {
            alloc.assign(id).unwrap();
        }
        alloc.move_down_group(&ids(&["c", "d"]));
        assert_eq!(order(&alloc), vec!["a", "c", "d", "b"]);
        assert!(alloc.get("c") > 100);
    }

    #[test]
    fn test_group_down_packed_at_bottom() {
        let mut alloc = allocator();
        alloc.load(vec![("a", 100), ("b", 101), ("c", 102)]);
        let results = alloc.move_down_group(&ids(&["b", "c"]));
        assert_eq!(order(&alloc), vec!["b", "c", "a"]);
        assert_eq!(alloc.get("a"), 102);
        assert_eq!(
            results[1].swapped_with,
            Some(SwapInfo { id: "a".into(), new_rank: 102 })
        );
    }

    #[test]
    fn test_packed_group_down_never_reorders_outsiders() {
        let mut alloc = allocator();
        alloc.load(vec![("n", 100), ("a", 101), ("x", 102), ("b", 103), ("top", 104)]);
        let results = alloc.move_down_group(&ids(&["a", "b"]));
        assert_eq!(order(&alloc), vec!["a", "n", "x", "b", "top"]);
        assert_eq!(
            results[0].swapped_with,
            Some(SwapInfo { id: "n".into(), new_rank: 101 })
        );
        assert_eq!(alloc.get("b"), 103);
    }

    #[test]
    fn test_packed_group_up_never_reorders_outsiders() {
        let mut alloc = allocator();
        alloc.load(vec![("a", 100), ("x", 101), ("b", 102), ("n", 103), ("top", 104)]);
        let results = alloc.move_up_group(&ids(&["a", "b"]));
        assert_eq!(order(&alloc), vec!["a", "x", "n", "b", "top"]);
        assert_eq!(
            results[1].swapped_with,
            Some(SwapInfo { id: "n".into(), new_rank: 102 })
        );
        assert_eq!(alloc.get("a"), 100);
    }

    #[test]
    fn test_group_at_boundary() {
        let mut alloc = allocator();
        for id in ["a", "b", "c"] {
            alloc.assign(id).unwrap();
        }
        let results = alloc.move_up_group(&ids(&["b", "c"]));
        assert!(results.iter().all(|r| r.at_boundary && r.reason == Some(MoveReason::AtTop)));
        assert_eq!(order(&alloc), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_group_reports_unknown_ids_in_input_order() {
        let mut alloc = allocator();
        for id in ["a", "b"] {
            alloc.assign(id).unwrap();
        }
        let results = alloc.move_down_group(&ids(&["ghost", "b", "b"]));
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].reason, Some(MoveReason::NotFound));
        assert!(results[1].success);
        assert_eq!(results[1], results[2]);
        assert_eq!(order(&alloc), vec!["b", "a"]);
    }

    #[test]
    fn test_group_keeps_interleaved_outsider_order() {
        let mut alloc = allocator();
        for id in ["a", "x", "b", "n", "top"] {
            alloc.assign(id).unwrap();
        }
        alloc.move_up_group(&ids(&["a", "b"]));
        assert_eq!(order(&alloc), vec!["x", "n", "a", "b", "top"]);
    }

    #[test]
    fn test_bring_to_front_and_send_to_back() {
        let mut alloc = allocator();
        for id in ["a", "b", "c"] {
            alloc.assign(id).unwrap();
        }
        let front = alloc.bring_to_front("a");
        assert!(front.success);
        assert_eq!(front.new_rank, 250);
        assert_eq!(order(&alloc), vec!["b", "c", "a"]);

        assert_eq!(alloc.bring_to_front("a").reason, Some(MoveReason::AtTop));

        let back = alloc.send_to_back("c");
        assert!(back.success);
        assert_eq!(back.new_rank, 100);
        assert_eq!(order(&alloc), vec!["c", "b", "a"]);
        assert_eq!(alloc.send_to_back("c").reason, Some(MoveReason::AtBottom));
    }

    #[test]
    fn test_send_to_back_uses_midpoint_near_min() {
        let mut alloc = allocator();
        alloc.load(vec![("a", 120), ("b", 130)]);
        let result = alloc.send_to_back("b");
        assert_eq!(result.new_rank, 110);
        assert_eq!(order(&alloc), vec!["b", "a"]);
    }

    #[test]
    fn test_send_to_back_relays_out_when_bottom_is_full() {
        let mut alloc = allocator();
        alloc.load(vec![("a", 100), ("b", 101), ("c", 102)]);
        let result = alloc.send_to_back("c");
        assert!(result.success);
        assert_eq!(order(&alloc), vec!["c", "a", "b"]);
        assert_eq!(alloc.get("c"), 100);
    }
}
