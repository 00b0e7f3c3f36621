use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::calendar::{day_key, week_keys};
use crate::model::{CompletionLog, DateKey, Frequency, Habit};

/// Count logged for one habit on one day; absent entries are zero.
pub fn day_count(log: &CompletionLog, habit_id: &str, key: &DateKey) -> u32 {
    log.get(habit_id)
        .and_then(|by_day| by_day.get(key))
        .copied()
        .unwrap_or(0)
}

/// Completions accumulated in the habit's current period as of `reference`.
pub fn period_count(habit: &Habit, reference: NaiveDate, log: &CompletionLog) -> u32 {
    let Some(by_day) = log.get(&habit.id) else {
        return 0;
    };
    match habit.frequency {
        Frequency::Daily | Frequency::PerDay => by_day
            .get(&day_key(reference))
            .copied()
            .unwrap_or(0),
        Frequency::PerWeek => week_keys(reference)
            .iter()
            .map(|key| by_day.get(key).copied().unwrap_or(0))
            .sum(),
        Frequency::PerMonth => prefix_sum(by_day, day_key(reference).month_prefix()),
        Frequency::PerYear => prefix_sum(by_day, day_key(reference).year_prefix()),
    }
}

/// The habit's target for its current period; always at least one. Only the
/// target field matching the active frequency is consulted, and plain
/// `Daily` ignores the per-day field entirely.
pub fn limit_for(habit: &Habit) -> u32 {
    match habit.frequency {
        Frequency::Daily => 1,
        Frequency::PerDay => target_or_one(habit.times_per_day),
        Frequency::PerWeek => target_or_one(habit.times_per_week),
        Frequency::PerMonth => target_or_one(habit.times_per_month),
        Frequency::PerYear => target_or_one(habit.times_per_year),
    }
}

pub(crate) fn prefix_sum(by_day: &BTreeMap<DateKey, u32>, prefix: &str) -> u32 {
    by_day
        .iter()
        .filter(|(key, _)| key.as_str().starts_with(prefix))
        .map(|(_, count)| *count)
        .sum()
}

fn target_or_one(target: Option<u32>) -> u32 {
    target.filter(|value| *value > 0).unwrap_or(1)
}
