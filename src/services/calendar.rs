//! Calendar arithmetic shared by every calendar view.
//!
//! Everything here is pure date math on `chrono` naive types. Ranges are
//! inclusive on both ends and are converted to UTC epoch milliseconds only
//! at the edge, via [`CalendarRange::to_millis`].

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Format used for the denormalized `day` column and query parameters
pub const SQL_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CalendarError {
    #[error("Invalid month {0}, expected 1-12")]
    InvalidMonth(u32),
    #[error("Invalid date {year:04}-{month:02}-{day:02}")]
    InvalidDate { year: i32, month: u32, day: u32 },
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDateString(String),
    #[error("Unknown calendar view '{0}', expected month, week or day")]
    InvalidView(String),
    #[error("Date {0} is outside the supported calendar range")]
    OutOfRange(NaiveDate),
}

/// First day of a calendar week
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    #[default]
    Monday,
    Sunday,
}

impl WeekStart {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "monday" | "mon" | "1" => Some(WeekStart::Monday),
            "sunday" | "sun" | "0" => Some(WeekStart::Sunday),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WeekStart::Monday => "monday",
            WeekStart::Sunday => "sunday",
        }
    }

    pub fn first_weekday(self) -> Weekday {
        match self {
            WeekStart::Monday => Weekday::Mon,
            WeekStart::Sunday => Weekday::Sun,
        }
    }

    pub fn last_weekday(self) -> Weekday {
        self.first_weekday().pred()
    }

    /// Position of `date` within its week, 0 for the first day
    pub fn days_from_start(self, date: NaiveDate) -> i64 {
        days_between(self.first_weekday(), date.weekday())
    }

    /// Days from `date` to the last day of its week, 0 on that day
    pub fn days_to_end(self, date: NaiveDate) -> i64 {
        days_between(date.weekday(), self.last_weekday())
    }

    /// First day of the week containing `date`; fails only at the edge of
    /// the representable calendar
    pub fn start_of_week(self, date: NaiveDate) -> Result<NaiveDate, CalendarError> {
        shift_days(date, -self.days_from_start(date))
    }

    pub fn end_of_week(self, date: NaiveDate) -> Result<NaiveDate, CalendarError> {
        shift_days(date, self.days_to_end(date))
    }
}

/// Forward distance from `from` to `to` within a week, 0..=6
fn days_between(from: Weekday, to: Weekday) -> i64 {
    let from = from.num_days_from_monday() as i64;
    let to = to.num_days_from_monday() as i64;
    (to - from).rem_euclid(7)
}

/// `date` moved by `days`, or `OutOfRange` instead of overflowing
fn shift_days(date: NaiveDate, days: i64) -> Result<NaiveDate, CalendarError> {
    date.checked_add_signed(Duration::days(days))
        .ok_or(CalendarError::OutOfRange(date))
}

/// Inclusive span of calendar time, from 00:00:00.000 of the first day to
/// 23:59:59.999 of the last day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalendarRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl CalendarRange {
    pub fn from_days(first: NaiveDate, last: NaiveDate) -> Self {
        Self {
            start: first.and_time(NaiveTime::MIN),
            end: last.and_time(end_of_day()),
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn last_day(&self) -> NaiveDate {
        self.end.date()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.first_day() && date <= self.last_day()
    }

    pub fn num_days(&self) -> i64 {
        (self.last_day() - self.first_day()).num_days() + 1
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let last = self.last_day();
        self.first_day().iter_days().take_while(move |d| *d <= last)
    }

    /// `[startMillis, endMillis]` as UTC epoch milliseconds
    pub fn to_millis(&self) -> (i64, i64) {
        (
            self.start.and_utc().timestamp_millis(),
            self.end.and_utc().timestamp_millis(),
        )
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_milli_opt(23, 59, 59, 999).expect("23:59:59.999 is a valid time")
}

pub fn first_of_month(year: i32, month: u32) -> Result<NaiveDate, CalendarError> {
    if !(1..=12).contains(&month) {
        return Err(CalendarError::InvalidMonth(month));
    }
    NaiveDate::from_ymd_opt(year, month, 1).ok_or(CalendarError::InvalidDate {
        year,
        month,
        day: 1,
    })
}

pub fn last_of_month(year: i32, month: u32) -> Result<NaiveDate, CalendarError> {
    let first = first_of_month(year, month)?;
    if month == 12 {
        // The year after the last representable one has no January 1st
        return date_from_ymd(year, 12, 31);
    }
    first_of_month(year, month + 1)?
        .pred_opt()
        .ok_or(CalendarError::OutOfRange(first))
}

pub fn date_from_ymd(year: i32, month: u32, day: u32) -> Result<NaiveDate, CalendarError> {
    if !(1..=12).contains(&month) {
        return Err(CalendarError::InvalidMonth(month));
    }
    NaiveDate::from_ymd_opt(year, month, day).ok_or(CalendarError::InvalidDate { year, month, day })
}

/// Exact bounds of a month: the 1st at midnight to the last day at 23:59:59.999
pub fn month_range(year: i32, month: u32) -> Result<CalendarRange, CalendarError> {
    Ok(CalendarRange::from_days(
        first_of_month(year, month)?,
        last_of_month(year, month)?,
    ))
}

/// Bounds of the visible month grid: the month widened to whole weeks.
///
/// No backward expansion happens when the 1st already falls on the week
/// start, and none forward when the last day already ends a week.
pub fn visible_month_range(
    year: i32,
    month: u32,
    week_start: WeekStart,
) -> Result<CalendarRange, CalendarError> {
    let first = first_of_month(year, month)?;
    let last = last_of_month(year, month)?;
    Ok(CalendarRange::from_days(
        week_start.start_of_week(first)?,
        week_start.end_of_week(last)?,
    ))
}

/// Bounds of an explicit set of visible dates, in any order
pub fn range_for_dates(dates: &[NaiveDate]) -> Option<CalendarRange> {
    let first = dates.iter().min()?;
    let last = dates.iter().max()?;
    Some(CalendarRange::from_days(*first, *last))
}

pub fn week_range(
    date: NaiveDate,
    week_start: WeekStart,
) -> Result<CalendarRange, CalendarError> {
    Ok(CalendarRange::from_days(
        week_start.start_of_week(date)?,
        week_start.end_of_week(date)?,
    ))
}

pub fn day_range(date: NaiveDate) -> CalendarRange {
    CalendarRange::from_days(date, date)
}

/// Rows of the visible month grid, one full week per row
pub fn month_grid(
    year: i32,
    month: u32,
    week_start: WeekStart,
) -> Result<Vec<[NaiveDate; 7]>, CalendarError> {
    let range = visible_month_range(year, month, week_start)?;
    let days: Vec<NaiveDate> = range.days().collect();

    Ok(days
        .chunks_exact(7)
        .map(|row| std::array::from_fn(|i| row[i]))
        .collect())
}

/// ISO-8601 week number together with its week-year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IsoWeek {
    pub year: i32,
    pub week: u32,
}

impl IsoWeek {
    /// Monday of this ISO week
    pub fn monday(&self) -> Option<NaiveDate> {
        NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Mon)
    }
}

/// ISO week of `date`.
///
/// ISO weeks are identified by their Thursday: the Thursday decides the
/// week-year, and its distance from January 4th of that year (the day
/// that is always in week 1) decides the week number.
pub fn iso_week(date: NaiveDate) -> Result<IsoWeek, CalendarError> {
    let offset = 3 - date.weekday().num_days_from_monday() as i64;
    let thursday = shift_days(date, offset)?;

    // January 4th has ordinal0 3, and week 1's Thursday lies in 0..=6.
    let days_since_jan4 = thursday.ordinal0() as i64 - 3;
    let week = (days_since_jan4 + 3) / 7 + 1;

    Ok(IsoWeek {
        year: thursday.year(),
        week: week as u32,
    })
}

/// 52 or 53; December 28th always falls in the last ISO week of its year
pub fn weeks_in_iso_year(year: i32) -> u32 {
    NaiveDate::from_ymd_opt(year, 12, 28)
        .and_then(|d| iso_week(d).ok())
        .map_or(52, |w| w.week)
}

pub fn to_sql_date(date: NaiveDate) -> String {
    date.format(SQL_DATE_FORMAT).to_string()
}

pub fn parse_sql_date(value: &str) -> Result<NaiveDate, CalendarError> {
    NaiveDate::parse_from_str(value.trim(), SQL_DATE_FORMAT)
        .map_err(|_| CalendarError::InvalidDateString(value.to_string()))
}

/// Anchor date of a calendar route such as `/calendar/month/2023/4`.
///
/// Missing parts fall back to `today`'s; a fallback day is clamped to the
/// length of the chosen month, an explicit day is not.
pub fn resolve_anchor(
    today: NaiveDate,
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
) -> Result<NaiveDate, CalendarError> {
    let year = year.unwrap_or(today.year());
    let month = month.unwrap_or(today.month());

    match day {
        Some(day) => date_from_ymd(year, month, day),
        None => {
            let last = last_of_month(year, month)?;
            date_from_ymd(year, month, today.day().min(last.day()))
        }
    }
}

/// Calendar period a period note is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarPeriod {
    Day,
    Week,
    Month,
}

/// Canonical date of the period containing `date`: the day itself, the
/// first day of its week, or the 1st of its month.
pub fn normalize_period(
    period: CalendarPeriod,
    date: NaiveDate,
    week_start: WeekStart,
) -> Result<NaiveDate, CalendarError> {
    match period {
        CalendarPeriod::Day => Ok(date),
        CalendarPeriod::Week => week_start.start_of_week(date),
        CalendarPeriod::Month => Ok(date.with_day(1).unwrap_or(date)),
    }
}

pub fn period_range(
    period: CalendarPeriod,
    date: NaiveDate,
    week_start: WeekStart,
) -> Result<CalendarRange, CalendarError> {
    match period {
        CalendarPeriod::Day => Ok(day_range(date)),
        CalendarPeriod::Week => week_range(date, week_start),
        CalendarPeriod::Month => month_range(date.year(), date.month()),
    }
}

/// The three calendar screens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarView {
    Month,
    Week,
    Day,
}

impl CalendarView {
    pub fn parse(value: &str) -> Result<Self, CalendarError> {
        match value {
            "month" => Ok(CalendarView::Month),
            "week" => Ok(CalendarView::Week),
            "day" => Ok(CalendarView::Day),
            other => Err(CalendarError::InvalidView(other.to_string())),
        }
    }

    /// Visible range of this view around `anchor`
    pub fn range(
        self,
        anchor: NaiveDate,
        week_start: WeekStart,
    ) -> Result<CalendarRange, CalendarError> {
        match self {
            CalendarView::Month => visible_month_range(anchor.year(), anchor.month(), week_start),
            CalendarView::Week => week_range(anchor, week_start),
            CalendarView::Day => Ok(day_range(anchor)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_range_matches_fixture() {
        let range = month_range(2022, 1).unwrap();
        assert_eq!(range.to_millis(), (1_640_995_200_000, 1_643_673_599_999));
        assert_eq!(range.first_day(), date(2022, 1, 1));
        assert_eq!(range.last_day(), date(2022, 1, 31));
        assert_eq!(range.end.time(), end_of_day());
    }

    #[test]
    fn test_month_range_handles_leap_february() {
        assert_eq!(month_range(2024, 2).unwrap().last_day(), date(2024, 2, 29));
        assert_eq!(month_range(2023, 2).unwrap().last_day(), date(2023, 2, 28));
        assert_eq!(month_range(2023, 12).unwrap().last_day(), date(2023, 12, 31));
    }

    #[test]
    fn test_invalid_month_is_rejected() {
        assert_eq!(month_range(2022, 0), Err(CalendarError::InvalidMonth(0)));
        assert_eq!(
            visible_month_range(2022, 13, WeekStart::Monday),
            Err(CalendarError::InvalidMonth(13))
        );
    }

    #[test]
    fn test_visible_range_expands_to_whole_weeks() {
        // 2022-01-01 is a Saturday, 2022-01-31 a Monday
        let monday = visible_month_range(2022, 1, WeekStart::Monday).unwrap();
        assert_eq!(monday.first_day(), date(2021, 12, 27));
        assert_eq!(monday.last_day(), date(2022, 2, 6));

        let sunday = visible_month_range(2022, 1, WeekStart::Sunday).unwrap();
        assert_eq!(sunday.first_day(), date(2021, 12, 26));
        assert_eq!(sunday.last_day(), date(2022, 2, 5));
    }

    #[test]
    fn test_visible_range_without_expansion() {
        // August 2022 starts on a Monday, July 2022 ends on a Sunday
        let august = visible_month_range(2022, 8, WeekStart::Monday).unwrap();
        assert_eq!(august.first_day(), date(2022, 8, 1));

        let july = visible_month_range(2022, 7, WeekStart::Monday).unwrap();
        assert_eq!(july.last_day(), date(2022, 7, 31));

        // May 2022 starts on a Sunday
        let may = visible_month_range(2022, 5, WeekStart::Sunday).unwrap();
        assert_eq!(may.first_day(), date(2022, 5, 1));
    }

    #[test]
    fn test_visible_range_properties_hold_for_every_month() {
        for week_start in [WeekStart::Monday, WeekStart::Sunday] {
            for year in 1999..=2031 {
                for month in 1..=12 {
                    let range = visible_month_range(year, month, week_start).unwrap();
                    let first = first_of_month(year, month).unwrap();
                    let last = last_of_month(year, month).unwrap();

                    assert_eq!(range.first_day().weekday(), week_start.first_weekday());
                    assert_eq!(range.last_day().weekday(), week_start.last_weekday());
                    assert!(range.first_day() <= first);
                    assert!(range.last_day() >= last);
                    assert_eq!(range.num_days() % 7, 0);
                    assert!(range.first_day() > first - Duration::days(7));
                    assert!(range.last_day() < last + Duration::days(7));
                }
            }
        }
    }

    #[test]
    fn test_range_generation_is_idempotent() {
        let a = visible_month_range(2023, 10, WeekStart::Sunday).unwrap();
        let b = visible_month_range(2023, 10, WeekStart::Sunday).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_millis(), b.to_millis());
    }

    #[test]
    fn test_range_for_dates() {
        assert_eq!(range_for_dates(&[]), None);

        let dates = [date(2022, 3, 9), date(2022, 2, 28), date(2022, 3, 1)];
        let range = range_for_dates(&dates).unwrap();
        assert_eq!(range.first_day(), date(2022, 2, 28));
        assert_eq!(range.last_day(), date(2022, 3, 9));
        assert_eq!(range.start.time(), NaiveTime::MIN);
    }

    #[test]
    fn test_month_grid_rows_are_whole_weeks() {
        let grid = month_grid(2022, 1, WeekStart::Monday).unwrap();
        assert_eq!(grid.len(), 6);
        assert_eq!(grid[0][0], date(2021, 12, 27));
        assert_eq!(grid[5][6], date(2022, 2, 6));
        for row in &grid {
            assert_eq!(row[0].weekday(), Weekday::Mon);
            assert_eq!((row[6] - row[0]).num_days(), 6);
        }

        // February 2021 fits exactly in four Monday-first rows
        assert_eq!(month_grid(2021, 2, WeekStart::Monday).unwrap().len(), 4);
    }

    #[test]
    fn test_week_and_day_ranges() {
        let wednesday = date(2022, 6, 15);
        let week = week_range(wednesday, WeekStart::Monday).unwrap();
        assert_eq!(week.first_day(), date(2022, 6, 13));
        assert_eq!(week.last_day(), date(2022, 6, 19));

        let week = week_range(wednesday, WeekStart::Sunday).unwrap();
        assert_eq!(week.first_day(), date(2022, 6, 12));
        assert_eq!(week.last_day(), date(2022, 6, 18));

        let day = day_range(wednesday);
        assert_eq!(day.num_days(), 1);
        assert_eq!(day.to_millis().1 - day.to_millis().0, 86_399_999);
    }

    #[test]
    fn test_iso_week_reference_dates() {
        assert_eq!(iso_week(date(2022, 1, 1)).unwrap(), IsoWeek { year: 2021, week: 52 });
        assert_eq!(iso_week(date(2022, 1, 4)).unwrap(), IsoWeek { year: 2022, week: 1 });
        assert_eq!(iso_week(date(2022, 1, 3)).unwrap(), IsoWeek { year: 2022, week: 1 });
        assert_eq!(iso_week(date(2020, 12, 31)).unwrap(), IsoWeek { year: 2020, week: 53 });
        assert_eq!(iso_week(date(2021, 1, 3)).unwrap(), IsoWeek { year: 2020, week: 53 });
        assert_eq!(iso_week(date(2024, 12, 30)).unwrap(), IsoWeek { year: 2025, week: 1 });
    }

    #[test]
    fn test_iso_week_agrees_with_chrono() {
        let mut day = date(2015, 1, 1);
        while day <= date(2030, 12, 31) {
            let expected = day.iso_week();
            let actual = iso_week(day).unwrap();
            assert_eq!(actual.year, expected.year(), "year of {}", day);
            assert_eq!(actual.week, expected.week(), "week of {}", day);
            day = day.succ_opt().unwrap();
        }
    }

    #[test]
    fn test_iso_week_monday() {
        let week = iso_week(date(2022, 1, 1)).unwrap();
        assert_eq!(week.monday(), Some(date(2021, 12, 27)));
    }

    #[test]
    fn test_weeks_in_iso_year() {
        assert_eq!(weeks_in_iso_year(2020), 53);
        assert_eq!(weeks_in_iso_year(2021), 52);
        assert_eq!(weeks_in_iso_year(2026), 53);
    }

    #[test]
    fn test_sql_date_round_trip() {
        for d in [date(2022, 1, 1), date(1999, 12, 31), date(2024, 2, 29)] {
            let text = to_sql_date(d);
            assert_eq!(parse_sql_date(&text).unwrap(), d);
        }
        assert_eq!(to_sql_date(date(2022, 3, 7)), "2022-03-07");
        assert!(parse_sql_date("2022-02-30").is_err());
        assert!(parse_sql_date("07/03/2022").is_err());
    }

    #[test]
    fn test_normalize_period() {
        let d = date(2022, 6, 15);
        assert_eq!(normalize_period(CalendarPeriod::Day, d, WeekStart::Monday), Ok(d));
        assert_eq!(
            normalize_period(CalendarPeriod::Week, d, WeekStart::Monday),
            Ok(date(2022, 6, 13))
        );
        assert_eq!(
            normalize_period(CalendarPeriod::Week, d, WeekStart::Sunday),
            Ok(date(2022, 6, 12))
        );
        assert_eq!(
            normalize_period(CalendarPeriod::Month, d, WeekStart::Monday),
            Ok(date(2022, 6, 1))
        );
    }

    #[test]
    fn test_calendar_view_parse_and_range() {
        assert_eq!(CalendarView::parse("week"), Ok(CalendarView::Week));
        assert!(CalendarView::parse("year").is_err());

        let anchor = date(2022, 1, 15);
        let range = CalendarView::Month.range(anchor, WeekStart::Monday).unwrap();
        assert_eq!(range, visible_month_range(2022, 1, WeekStart::Monday).unwrap());
    }

    #[test]
    fn test_resolve_anchor() {
        let today = date(2022, 1, 31);
        assert_eq!(resolve_anchor(today, None, None, None), Ok(today));
        assert_eq!(resolve_anchor(today, Some(2023), None, None), Ok(date(2023, 1, 31)));
        assert_eq!(resolve_anchor(today, Some(2023), Some(2), None), Ok(date(2023, 2, 28)));
        assert_eq!(resolve_anchor(today, Some(2024), Some(2), Some(29)), Ok(date(2024, 2, 29)));
        assert!(resolve_anchor(today, Some(2023), Some(2), Some(30)).is_err());
        assert_eq!(
            resolve_anchor(today, Some(2023), Some(13), None),
            Err(CalendarError::InvalidMonth(13))
        );
    }

    #[test]
    fn test_week_start_parse() {
        assert_eq!(WeekStart::parse("Sunday"), Some(WeekStart::Sunday));
        assert_eq!(WeekStart::parse("1"), Some(WeekStart::Monday));
        assert_eq!(WeekStart::parse("friday"), None);
        assert_eq!(WeekStart::Sunday.last_weekday(), Weekday::Sat);
    }

    #[test]
    fn test_days_from_start_and_to_end() {
        // 2022-06-15 is a Wednesday
        let wednesday = date(2022, 6, 15);
        assert_eq!(WeekStart::Monday.days_from_start(wednesday), 2);
        assert_eq!(WeekStart::Sunday.days_from_start(wednesday), 3);
        assert_eq!(WeekStart::Monday.days_to_end(wednesday), 4);
        assert_eq!(WeekStart::Sunday.days_to_end(wednesday), 3);
    }

    #[test]
    fn test_calendar_edges_are_errors_not_panics() {
        let first_week_start = WeekStart::Monday.start_of_week(NaiveDate::MIN);
        if NaiveDate::MIN.weekday() != Weekday::Mon {
            assert_eq!(first_week_start, Err(CalendarError::OutOfRange(NaiveDate::MIN)));
        }

        let last = NaiveDate::MAX;
        assert!(week_range(last, WeekStart::Monday).is_err() || last.weekday() == Weekday::Sun);
        assert!(week_range(last, WeekStart::Sunday).is_err() || last.weekday() == Weekday::Sat);

        // Either end of the calendar fails for one of the two week starts
        let min_year = NaiveDate::MIN.year();
        let max_year = NaiveDate::MAX.year();
        let min_fails = [WeekStart::Monday, WeekStart::Sunday]
            .iter()
            .any(|ws| visible_month_range(min_year, 1, *ws).is_err());
        let max_fails = [WeekStart::Monday, WeekStart::Sunday]
            .iter()
            .any(|ws| visible_month_range(max_year, 12, *ws).is_err());
        assert!(min_fails);
        assert!(max_fails);

        let grids = [WeekStart::Monday, WeekStart::Sunday].map(|ws| month_grid(min_year, 1, ws));
        assert!(grids.iter().any(Result::is_err));

        for edge in [NaiveDate::MIN, NaiveDate::MAX] {
            assert!(matches!(iso_week(edge), Ok(_) | Err(CalendarError::OutOfRange(_))));
        }
        let last_weeks = [WeekStart::Monday, WeekStart::Sunday]
            .map(|ws| CalendarView::Week.range(last, ws));
        assert!(last_weeks.iter().any(Result::is_err));

        assert!(last_of_month(i32::MAX, 12).is_err());
        assert!(month_range(max_year, 12).is_ok());
    }
}
