use std::collections::{BTreeSet, HashMap, VecDeque};

use chrono::NaiveDate;

use crate::model::{CompletionLog, Habit, HabitId, HabitKind};
use crate::progress::{limit_for, period_count};

/// All habit ids transitively linked to `habit`, including itself.
///
/// Links are stored as directed adjacency lists but evaluated symmetrically:
/// an edge in either direction joins two habits into the same cluster. Ids
/// that point at no known habit still become members; they simply have no
/// outgoing edges.
pub fn linked_group(habit: &Habit, all_habits: &[Habit]) -> BTreeSet<HabitId> {
    let mut neighbours: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for other in all_habits {
        for linked in &other.linked_ids {
            neighbours
                .entry(other.id.as_str())
                .or_default()
                .insert(linked.as_str());
            neighbours
                .entry(linked.as_str())
                .or_default()
                .insert(other.id.as_str());
        }
    }

    let mut visited: BTreeSet<&str> = BTreeSet::new();
    let mut queue: VecDeque<&str> = VecDeque::from([habit.id.as_str()]);
    while let Some(current) = queue.pop_front() {
        if !visited.insert(current) {
            continue;
        }
        if let Some(next) = neighbours.get(current) {
            for neighbour in next {
                if !visited.contains(neighbour) {
                    queue.push_back(neighbour);
                }
            }
        }
    }

    visited.into_iter().map(str::to_string).collect()
}

/// True iff any habit in the cluster has reached its own period target.
/// Stale ids without a matching habit are skipped.
pub fn is_group_done(
    group_ids: &BTreeSet<HabitId>,
    all_habits: &[Habit],
    reference: NaiveDate,
    log: &CompletionLog,
) -> bool {
    group_ids
        .iter()
        .filter_map(|id| all_habits.iter().find(|habit| &habit.id == id))
        .any(|habit| period_count(habit, reference, log) >= limit_for(habit))
}

/// Per-habit done predicate used by the presentation layer.
///
/// Bad habits are judged individually: at or under the ceiling counts as
/// done. Good habits are done when any member of their linked cluster is.
pub fn is_habit_done(
    habit: &Habit,
    all_habits: &[Habit],
    reference: NaiveDate,
    log: &CompletionLog,
) -> bool {
    match habit.kind {
        HabitKind::Bad => period_count(habit, reference, log) <= limit_for(habit),
        HabitKind::Good => is_group_done(&linked_group(habit, all_habits), all_habits, reference, log),
    }
}
