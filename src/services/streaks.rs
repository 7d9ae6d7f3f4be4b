use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StreakSummary {
    pub current_streak: i32,
    pub longest_streak: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCount {
    pub date: NaiveDate,
    pub count: i32,
}

/// Number of occurrences per day, sorted by date
pub fn daily_counts<I>(days: I) -> Vec<DayCount>
where
    I: IntoIterator<Item = NaiveDate>,
{
    let mut counts: BTreeMap<NaiveDate, i32> = BTreeMap::new();
    for day in days {
        *counts.entry(day).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .map(|(date, count)| DayCount { date, count })
        .collect()
}

/// Calculate current and longest streaks of consecutive days.
///
/// The current streak only counts when the latest logged day is `today` or
/// the day before, so a habit logged yesterday is still "on a streak".
pub fn calculate_streaks<I>(days: I, today: NaiveDate) -> StreakSummary
where
    I: IntoIterator<Item = NaiveDate>,
{
    let unique: HashSet<NaiveDate> = days.into_iter().collect();
    if unique.is_empty() {
        return StreakSummary::default();
    }

    let mut dates: Vec<NaiveDate> = unique.iter().copied().collect();
    dates.sort();

    let mut longest_streak = 0;
    let mut temp_streak = 0;
    let mut last_date: Option<NaiveDate> = None;

    for date in &dates {
        match last_date {
            Some(prev) if prev.succ_opt() == Some(*date) => temp_streak += 1,
            _ => {
                longest_streak = longest_streak.max(temp_streak);
                temp_streak = 1;
            }
        }
        last_date = Some(*date);
    }
    longest_streak = longest_streak.max(temp_streak);

    let mut current_streak = 0;
    if let Some(&latest) = dates.last() {
        if latest == today || Some(latest) == today.pred_opt() {
            current_streak = 1;
            let mut check_date = latest.pred_opt();
            while let Some(day) = check_date.filter(|d| unique.contains(d)) {
                current_streak += 1;
                check_date = day.pred_opt();
            }
        }
    }

    StreakSummary {
        current_streak,
        longest_streak,
    }
}
