use chrono::{Datelike, NaiveDate};

use crate::calendar::{add_days, day_key, monday_of};
use crate::model::{CompletionLog, Frequency, Habit, HabitKind};
use crate::progress::{limit_for, prefix_sum};

const DAILY_LOOKBACK_DAYS: u32 = 365;
const WEEKLY_LOOKBACK_WEEKS: u32 = 104;
const MONTHLY_LOOKBACK_MONTHS: u32 = 60;

/// Signed streak as of `today`.
///
/// Positive: consecutive successful periods ending at (or, for a partially
/// logged today, including) the reference day. Negative: consecutive missed
/// periods since the last success. Zero: nothing qualifying inside the
/// lookback window. Yearly habits carry no streak.
pub fn calculate_streak(habit: &Habit, log: &CompletionLog, today: NaiveDate) -> i32 {
    match habit.frequency {
        Frequency::Daily | Frequency::PerDay => daily_streak(habit, log, today),
        Frequency::PerWeek => weekly_streak(habit, log, today),
        Frequency::PerMonth => monthly_streak(habit, log, today),
        Frequency::PerYear => 0,
    }
}

fn daily_streak(habit: &Habit, log: &CompletionLog, today: NaiveDate) -> i32 {
    let by_day = log.get(&habit.id);
    let limit = limit_for(habit);
    let is_bad = habit.kind == HabitKind::Bad;

    let count = |date: NaiveDate| -> u32 {
        by_day
            .and_then(|m| m.get(&day_key(date)))
            .copied()
            .unwrap_or(0)
    };
    let success = |date: NaiveDate| -> bool {
        if is_bad {
            count(date) < limit
        } else {
            count(date) >= limit
        }
    };

    let yesterday = add_days(today, -1);

    // Today complete: count back from today inclusive.
    if success(today) {
        let mut streak = 0;
        for i in 0..DAILY_LOOKBACK_DAYS {
            if success(add_days(today, -(i as i64))) {
                streak += 1;
            } else {
                break;
            }
        }
        return streak;
    }

    // Today partially logged: the run is still alive and includes today.
    if count(today) > 0 {
        let mut streak = 1;
        let mut date = yesterday;
        for _ in 0..DAILY_LOOKBACK_DAYS {
            if !success(date) {
                break;
            }
            streak += 1;
            date = add_days(date, -1);
        }
        return streak;
    }

    // Nothing today, but yesterday closed a run.
    if success(yesterday) {
        let mut streak = 0;
        for i in 0..DAILY_LOOKBACK_DAYS {
            if success(add_days(yesterday, -(i as i64))) {
                streak += 1;
            } else {
                break;
            }
        }
        return streak;
    }

    // Cold streak: missed days since the last success.
    let mut misses = 0;
    for i in 0..DAILY_LOOKBACK_DAYS {
        if success(add_days(yesterday, -(i as i64))) {
            break;
        }
        misses += 1;
    }
    if misses > 0 {
        -misses
    } else {
        0
    }
}

fn weekly_streak(habit: &Habit, log: &CompletionLog, today: NaiveDate) -> i32 {
    let by_day = log.get(&habit.id);
    let limit = limit_for(habit);
    let is_bad = habit.kind == HabitKind::Bad;

    let week_sum = |monday: NaiveDate| -> u32 {
        let start = day_key(monday);
        let end = day_key(add_days(monday, 7));
        by_day
            .map(|m| m.range(start..end).map(|(_, count)| *count).sum())
            .unwrap_or(0)
    };
    let success = |sum: u32| -> bool {
        if is_bad {
            sum <= 7u32.saturating_sub(limit)
        } else {
            sum >= limit
        }
    };

    // Only fully elapsed weeks count; the current partial week never does.
    let last_full_monday = add_days(monday_of(today), -7);

    let mut run = 0;
    for i in 0..WEEKLY_LOOKBACK_WEEKS {
        let monday = add_days(last_full_monday, -(i as i64) * 7);
        if success(week_sum(monday)) {
            run += 1;
        } else {
            break;
        }
    }
    if run > 0 {
        return run;
    }

    // Distance in weeks back to the most recent successful week.
    for i in 0..WEEKLY_LOOKBACK_WEEKS {
        let monday = add_days(last_full_monday, -(i as i64) * 7);
        if success(week_sum(monday)) {
            return if i >= 1 { -(i as i32) } else { 0 };
        }
    }
    0
}

fn monthly_streak(habit: &Habit, log: &CompletionLog, today: NaiveDate) -> i32 {
    let by_day = log.get(&habit.id);
    let limit = limit_for(habit);
    let is_bad = habit.kind == HabitKind::Bad;

    let month_sum = |anchor: NaiveDate| -> u32 {
        by_day
            .map(|m| prefix_sum(m, day_key(anchor).month_prefix()))
            .unwrap_or(0)
    };
    let success = |sum: u32| -> bool {
        if is_bad {
            sum == 0
        } else {
            sum >= limit
        }
    };

    let Some(last_full) = months_before(today, 1) else {
        return 0;
    };

    let mut run = 0;
    for i in 0..MONTHLY_LOOKBACK_MONTHS {
        let Some(anchor) = months_before(last_full, i) else {
            break;
        };
        if success(month_sum(anchor)) {
            run += 1;
        } else {
            break;
        }
    }
    if run > 0 {
        return run;
    }

    for i in 0..MONTHLY_LOOKBACK_MONTHS {
        let Some(anchor) = months_before(last_full, i) else {
            break;
        };
        if success(month_sum(anchor)) {
            return if i >= 1 { -(i as i32) } else { 0 };
        }
    }
    0
}

/// First day of the month `back` months before the one containing `date`.
fn months_before(date: NaiveDate, back: u32) -> Option<NaiveDate> {
    let total = date.year() * 12 + date.month0() as i32 - back as i32;
    NaiveDate::from_ymd_opt(total.div_euclid(12), (total.rem_euclid(12) + 1) as u32, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DateKey;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn habit(frequency: Frequency) -> Habit {
        Habit {
            id: "h".to_string(),
            name: "h".to_string(),
            frequency,
            ..Habit::default()
        }
    }

    fn log_of(entries: &[(&str, u32)]) -> CompletionLog {
        let mut log = CompletionLog::new();
        let by_day = log.entry("h".to_string()).or_default();
        for (raw, count) in entries {
            by_day.insert(DateKey::parse(raw).unwrap(), *count);
        }
        log
    }

    #[test]
    fn unbroken_daily_run_counts_from_today() {
        let log = log_of(&[("2025-11-20", 1), ("2025-11-19", 1), ("2025-11-18", 1)]);
        let h = habit(Frequency::Daily);
        assert_eq!(calculate_streak(&h, &log, day(2025, 11, 20)), 3);
    }

    #[test]
    fn missed_days_produce_a_negative_run() {
        // Last success three days ago; today and yesterday missed.
        let log = log_of(&[("2025-11-17", 1)]);
        let h = habit(Frequency::Daily);
        assert_eq!(calculate_streak(&h, &log, day(2025, 11, 19)), -1);
        assert_eq!(calculate_streak(&h, &log, day(2025, 11, 20)), -2);
    }

    #[test]
    fn partial_today_keeps_the_run_alive() {
        let mut h = habit(Frequency::PerDay);
        h.times_per_day = Some(2);
        let log = log_of(&[("2025-11-20", 1), ("2025-11-19", 2), ("2025-11-18", 2)]);
        assert_eq!(calculate_streak(&h, &log, day(2025, 11, 20)), 3);
    }

    #[test]
    fn run_ending_yesterday_still_counts() {
        let log = log_of(&[("2025-11-19", 1), ("2025-11-18", 1)]);
        let h = habit(Frequency::Daily);
        assert_eq!(calculate_streak(&h, &log, day(2025, 11, 20)), 2);
    }

    #[test]
    fn bad_daily_habit_with_a_clean_log_caps_at_the_lookback() {
        let mut h = habit(Frequency::PerDay);
        h.kind = HabitKind::Bad;
        h.times_per_day = Some(2);
        // Every day without a slip counts as a success for a bad habit.
        let log = CompletionLog::new();
        assert_eq!(
            calculate_streak(&h, &log, day(2025, 11, 20)),
            DAILY_LOOKBACK_DAYS as i32
        );
    }

    #[test]
    fn bad_daily_habit_run_stops_at_a_slip() {
        let mut h = habit(Frequency::PerDay);
        h.kind = HabitKind::Bad;
        h.times_per_day = Some(1);
        // One slip yesterday; today is clean so the run restarts at one.
        let log = log_of(&[("2025-11-19", 1)]);
        assert_eq!(calculate_streak(&h, &log, day(2025, 11, 20)), 1);
    }

    #[test]
    fn weekly_streak_ignores_the_current_partial_week() {
        let mut h = habit(Frequency::PerWeek);
        h.times_per_week = Some(2);
        // Reference Thursday 2025-11-20: current week is 11-17..11-23.
        // Weeks of 11-10 and 11-03 each meet the target; current week is empty.
        let log = log_of(&[
            ("2025-11-10", 1),
            ("2025-11-14", 1),
            ("2025-11-03", 2),
        ]);
        assert_eq!(calculate_streak(&h, &log, day(2025, 11, 20)), 2);
    }

    #[test]
    fn weekly_streak_reports_distance_to_last_good_week() {
        let mut h = habit(Frequency::PerWeek);
        h.times_per_week = Some(2);
        // The week of 2025-10-27 was the last to meet the target; the two
        // fully elapsed weeks since then were missed.
        let log = log_of(&[("2025-10-28", 2)]);
        assert_eq!(calculate_streak(&h, &log, day(2025, 11, 20)), -2);
    }

    #[test]
    fn weekly_streak_with_no_history_is_zero() {
        let mut h = habit(Frequency::PerWeek);
        h.times_per_week = Some(2);
        assert_eq!(calculate_streak(&h, &CompletionLog::new(), day(2025, 11, 20)), 0);
    }

    #[test]
    fn monthly_streak_counts_fully_elapsed_months() {
        let mut h = habit(Frequency::PerMonth);
        h.times_per_month = Some(3);
        let log = log_of(&[
            ("2025-10-02", 1),
            ("2025-10-15", 2),
            ("2025-09-09", 3),
            ("2025-11-01", 3), // current month never counts
        ]);
        assert_eq!(calculate_streak(&h, &log, day(2025, 11, 15)), 2);
    }

    #[test]
    fn monthly_streak_reports_distance_to_last_good_month() {
        let mut h = habit(Frequency::PerMonth);
        h.times_per_month = Some(2);
        // October and September missed; August met the target.
        let log = log_of(&[("2025-08-05", 2)]);
        assert_eq!(calculate_streak(&h, &log, day(2025, 11, 15)), -2);
    }

    #[test]
    fn monthly_streak_spans_the_year_boundary() {
        let mut h = habit(Frequency::PerMonth);
        h.times_per_month = Some(1);
        let log = log_of(&[("2024-12-20", 1), ("2024-11-11", 1)]);
        assert_eq!(calculate_streak(&h, &log, day(2025, 1, 10)), 2);
    }

    #[test]
    fn yearly_habits_carry_no_streak() {
        let mut h = habit(Frequency::PerYear);
        h.times_per_year = Some(1);
        let log = log_of(&[("2025-03-01", 1)]);
        assert_eq!(calculate_streak(&h, &log, day(2025, 11, 20)), 0);
    }
}
