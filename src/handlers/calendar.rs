use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{Datelike, NaiveDate, Utc, Weekday};
use sea_orm::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::handlers::{calendar_error, db_error, load_profile};
use crate::middleware::auth::Claims;
use crate::models::note::{self, PeriodType};
use crate::models::{habit, occurrence};
use crate::services::calendar::{
    iso_week as iso_week_of, month_grid, month_range, parse_sql_date, period_range,
    range_for_dates, resolve_anchor, to_sql_date, visible_month_range, weeks_in_iso_year,
    CalendarError, CalendarRange, CalendarView, IsoWeek, WeekStart,
};

// ============ Request/Response DTOs ============

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
    /// `monday`/`sunday` (also `mon`/`sun`, `1`/`0`)
    pub week_start: Option<String>,
    /// Comma separated `YYYY-MM-DD` list of explicitly visible dates
    pub dates: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct RangeResponse {
    pub start: i64,
    pub end: i64,
    pub start_date: String,
    pub end_date: String,
    pub week_start: Option<WeekStart>,
}

impl RangeResponse {
    fn new(range: CalendarRange, week_start: Option<WeekStart>) -> Self {
        let (start, end) = range.to_millis();
        Self {
            start,
            end,
            start_date: to_sql_date(range.first_day()),
            end_date: to_sql_date(range.last_day()),
            week_start,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct IsoWeekQuery {
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IsoWeekResponse {
    pub date: String,
    pub week: u32,
    pub year: i32,
    pub weeks_in_year: u32,
    pub monday: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WeekLabel {
    pub start_date: String,
    pub iso_week: IsoWeek,
}

#[derive(Debug, Serialize)]
pub struct CalendarOccurrence {
    pub id: String,
    pub habit_id: String,
    pub habit_name: Option<String>,
    pub trait_id: Option<String>,
    pub time: Option<String>,
    pub photo_count: usize,
    pub note_count: usize,
}

#[derive(Debug, Serialize)]
pub struct CalendarDay {
    pub date: String,
    pub in_focus: bool,
    pub occurrences: Vec<CalendarOccurrence>,
}

#[derive(Debug, Serialize)]
pub struct PeriodNote {
    pub id: String,
    pub period_type: PeriodType,
    pub period_date: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct CalendarViewResponse {
    pub view: CalendarView,
    pub anchor: String,
    pub week_start: WeekStart,
    pub range: RangeResponse,
    pub weeks: Vec<WeekLabel>,
    /// Month grid rows, month view only
    pub grid: Option<Vec<[NaiveDate; 7]>>,
    pub days: Vec<CalendarDay>,
    pub period_notes: Vec<PeriodNote>,
}

// ============ Pure helpers ============

/// Range for `/calendar/range`: an explicit date list wins over year/month
pub fn compute_range(
    query: &RangeQuery,
    week_start: WeekStart,
) -> Result<RangeResponse, actix_web::Error> {
    if let Some(dates) = query.dates.as_deref() {
        let parsed = dates
            .split(',')
            .filter(|d| !d.trim().is_empty())
            .map(parse_sql_date)
            .collect::<Result<Vec<NaiveDate>, CalendarError>>()
            .map_err(calendar_error)?;

        let range = range_for_dates(&parsed)
            .ok_or_else(|| actix_web::error::ErrorBadRequest("'dates' must not be empty"))?;
        return Ok(RangeResponse::new(range, None));
    }

    let (Some(year), Some(month)) = (query.year, query.month) else {
        return Err(actix_web::error::ErrorBadRequest(
            "Either 'dates' or both 'year' and 'month' are required",
        ));
    };

    let range = visible_month_range(year, month, week_start).map_err(calendar_error)?;
    Ok(RangeResponse::new(range, Some(week_start)))
}

fn requested_week_start(query: &RangeQuery) -> Result<Option<WeekStart>, actix_web::Error> {
    query
        .week_start
        .as_deref()
        .map(|ws| {
            WeekStart::parse(ws).ok_or_else(|| {
                actix_web::error::ErrorBadRequest(format!("Unknown week start '{}'", ws))
            })
        })
        .transpose()
}

/// `(view, year, month, day)` from `/calendar/{view}[/{year}[/{month}[/{day}]]]`
fn view_params(
    req: &HttpRequest,
) -> Result<(CalendarView, Option<i32>, Option<u32>, Option<u32>), actix_web::Error> {
    let info = req.match_info();

    let view = CalendarView::parse(info.get("view").unwrap_or("month")).map_err(calendar_error)?;

    let year = info
        .get("year")
        .map(|y| y.parse::<i32>())
        .transpose()
        .map_err(|_| actix_web::error::ErrorBadRequest("Invalid year"))?;
    let month = info
        .get("month")
        .map(|m| m.parse::<u32>())
        .transpose()
        .map_err(|_| actix_web::error::ErrorBadRequest("Invalid month"))?;
    let day = info
        .get("day")
        .map(|d| d.parse::<u32>())
        .transpose()
        .map_err(|_| actix_web::error::ErrorBadRequest("Invalid day"))?;

    Ok((view, year, month, day))
}

/// One label per visible week, numbered by the week's Thursday
pub fn week_labels(
    range: &CalendarRange,
    week_start: WeekStart,
) -> Result<Vec<WeekLabel>, CalendarError> {
    let first_row = week_start.start_of_week(range.first_day())?;

    first_row
        .iter_days()
        .step_by(7)
        .take_while(|row_start| *row_start <= range.last_day())
        .map(|row_start| {
            let thursday = row_start
                .iter_days()
                .take(7)
                .find(|d| d.weekday() == Weekday::Thu)
                .unwrap_or(row_start);

            Ok(WeekLabel {
                start_date: to_sql_date(row_start),
                iso_week: iso_week_of(thursday)?,
            })
        })
        .collect()
}

/// Bucket occurrences into every day of the range, empty days included.
///
/// `focus` marks the days that belong to the requested period, e.g. the
/// month itself inside a week-expanded month grid.
pub fn group_by_day(
    range: &CalendarRange,
    focus: &CalendarRange,
    occurrences: Vec<(occurrence::Model, Option<habit::Model>)>,
    note_counts: &HashMap<Uuid, usize>,
) -> Vec<CalendarDay> {
    let mut by_day: BTreeMap<NaiveDate, Vec<CalendarOccurrence>> =
        range.days().map(|d| (d, Vec::new())).collect();

    for (o, h) in occurrences {
        let Some(bucket) = by_day.get_mut(&o.day) else {
            continue;
        };
        bucket.push(CalendarOccurrence {
            id: o.id.to_string(),
            habit_id: o.habit_id.to_string(),
            habit_name: h.as_ref().map(|h| h.name.clone()),
            trait_id: h.and_then(|h| h.trait_id).map(|id| id.to_string()),
            time: o.time.map(|t| t.format("%H:%M").to_string()),
            photo_count: o.photo_paths.len(),
            note_count: note_counts.get(&o.id).copied().unwrap_or(0),
        });
    }

    by_day
        .into_iter()
        .map(|(date, occurrences)| CalendarDay {
            date: to_sql_date(date),
            in_focus: focus.contains(date),
            occurrences,
        })
        .collect()
}

/// Earliest period date that can still overlap `range`.
///
/// A week note is keyed by its week's first day, up to six days before the
/// range, which may fall in the previous month.
fn earliest_period_start(range: &CalendarRange) -> NaiveDate {
    let first = range.first_day();
    let week_back = first
        .checked_sub_signed(chrono::Duration::days(6))
        .unwrap_or(NaiveDate::MIN);
    week_back.with_day(1).unwrap_or(week_back)
}

/// Whether the period stored at `period_date` overlaps `range`
pub fn period_visible(
    period_type: PeriodType,
    period_date: NaiveDate,
    range: &CalendarRange,
) -> bool {
    let period = match period_type {
        // Stored week dates are the first day of the week they were written
        // for, whatever the current week start is
        PeriodType::Week => {
            let last = period_date
                .checked_add_signed(chrono::Duration::days(6))
                .unwrap_or(NaiveDate::MAX);
            Ok(CalendarRange::from_days(period_date, last))
        }
        other => period_range(other.into(), period_date, WeekStart::default()),
    };
    match period {
        Ok(period) => {
            period.first_day() <= range.last_day() && period.last_day() >= range.first_day()
        }
        Err(_) => false,
    }
}

// ============ Calendar Handlers ============

/// GET /calendar/range?year=&month=&week_start=&dates=
/// Falls back to the profile's first day of week when `week_start` is absent
pub async fn get_range(
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
    query: web::Query<RangeQuery>,
) -> Result<impl Responder, actix_web::Error> {
    let week_start = match requested_week_start(&query)? {
        Some(ws) => ws,
        None if query.dates.is_some() => WeekStart::default(),
        None => {
            let user_id = user_claims.user_id()?;
            load_profile(db.as_ref(), user_id).await?.week_start()
        }
    };

    Ok(HttpResponse::Ok().json(compute_range(&query, week_start)?))
}

/// GET /calendar/iso-week?date=YYYY-MM-DD (defaults to today)
pub async fn get_iso_week(
    query: web::Query<IsoWeekQuery>,
) -> Result<impl Responder, actix_web::Error> {
    let date = match query.date.as_deref() {
        Some(d) => parse_sql_date(d).map_err(calendar_error)?,
        None => Utc::now().date_naive(),
    };

    let week = iso_week_of(date).map_err(calendar_error)?;
    Ok(HttpResponse::Ok().json(IsoWeekResponse {
        date: to_sql_date(date),
        week: week.week,
        year: week.year,
        weeks_in_year: weeks_in_iso_year(week.year),
        monday: week.monday().map(to_sql_date),
    }))
}

/// GET /calendar/{view}[/{year}[/{month}[/{day}]]]
/// Visible range of the view with occurrences grouped per day
pub async fn get_view(
    req: HttpRequest,
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let (view, year, month, day) = view_params(&req)?;

    let profile = load_profile(db.as_ref(), user_id).await?;
    let week_start = profile.week_start();

    let today = Utc::now().date_naive();
    let anchor = resolve_anchor(today, year, month, day).map_err(calendar_error)?;
    let range = view.range(anchor, week_start).map_err(calendar_error)?;
    let (focus, grid) = match view {
        CalendarView::Month => {
            let (year, month) = (anchor.year(), anchor.month());
            (
                month_range(year, month).map_err(calendar_error)?,
                Some(month_grid(year, month, week_start).map_err(calendar_error)?),
            )
        }
        _ => (range, None),
    };

    let occurrences = occurrence::Entity::find()
        .filter(occurrence::Column::UserId.eq(user_id))
        .filter(occurrence::Column::Day.gte(range.first_day()))
        .filter(occurrence::Column::Day.lte(range.last_day()))
        .order_by_asc(occurrence::Column::Timestamp)
        .find_also_related(habit::Entity)
        .all(db.as_ref())
        .await
        .map_err(db_error)?;

    let occurrence_ids: Vec<Uuid> = occurrences.iter().map(|(o, _)| o.id).collect();
    let mut note_counts: HashMap<Uuid, usize> = HashMap::new();
    if !occurrence_ids.is_empty() {
        let occurrence_notes = note::Entity::find()
            .filter(note::Column::UserId.eq(user_id))
            .filter(note::Column::OccurrenceId.is_in(occurrence_ids))
            .all(db.as_ref())
            .await
            .map_err(db_error)?;
        for n in occurrence_notes {
            if let Some(id) = n.occurrence_id {
                *note_counts.entry(id).or_insert(0) += 1;
            }
        }
    }

    // Week and month notes are keyed by their period start, which can sit
    // before the first visible day
    let period_notes = note::Entity::find()
        .filter(note::Column::UserId.eq(user_id))
        .filter(note::Column::PeriodType.is_not_null())
        .filter(note::Column::PeriodDate.gte(earliest_period_start(&range)))
        .filter(note::Column::PeriodDate.lte(range.last_day()))
        .order_by_asc(note::Column::PeriodDate)
        .all(db.as_ref())
        .await
        .map_err(db_error)?;

    let period_notes: Vec<PeriodNote> = period_notes
        .into_iter()
        .filter_map(|n| {
            let (period_type, period_date) = (n.period_type?, n.period_date?);
            if !period_visible(period_type, period_date, &range) {
                return None;
            }
            Some(PeriodNote {
                id: n.id.to_string(),
                period_type,
                period_date: to_sql_date(period_date),
                content: n.content,
            })
        })
        .collect();

    log::debug!(
        "Calendar {:?} view for {} spans {} days",
        view,
        to_sql_date(anchor),
        range.num_days()
    );

    Ok(HttpResponse::Ok().json(CalendarViewResponse {
        view,
        anchor: to_sql_date(anchor),
        week_start,
        range: RangeResponse::new(range, Some(week_start)),
        weeks: week_labels(&range, week_start).map_err(calendar_error)?,
        grid,
        days: group_by_day(&range, &focus, occurrences, &note_counts),
        period_notes,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test as actix_test, App};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn range_query(year: Option<i32>, month: Option<u32>, dates: Option<&str>) -> RangeQuery {
        RangeQuery {
            year,
            month,
            week_start: None,
            dates: dates.map(str::to_string),
        }
    }

    #[test]
    fn test_compute_range_expands_month_to_weeks() {
        let response =
            compute_range(&range_query(Some(2022), Some(1), None), WeekStart::Monday).unwrap();
        // Mon 2021-12-27 .. Sun 2022-02-06
        assert_eq!(response.start_date, "2021-12-27");
        assert_eq!(response.end_date, "2022-02-06");
        assert_eq!(response.week_start, Some(WeekStart::Monday));

        let sunday =
            compute_range(&range_query(Some(2022), Some(1), None), WeekStart::Sunday).unwrap();
        assert_eq!(sunday.start_date, "2021-12-26");
        assert_eq!(sunday.end_date, "2022-02-05");
    }

    #[test]
    fn test_compute_range_from_explicit_dates() {
        let response = compute_range(
            &range_query(None, None, Some("2022-01-31,2022-01-01")),
            WeekStart::Monday,
        )
        .unwrap();
        assert_eq!((response.start, response.end), (1_640_995_200_000, 1_643_673_599_999));
        assert_eq!(response.week_start, None);
    }

    #[test]
    fn test_compute_range_rejects_bad_input() {
        let rejects = |query: RangeQuery| compute_range(&query, WeekStart::Monday).is_err();
        assert!(rejects(range_query(None, None, None)));
        assert!(rejects(range_query(Some(2022), Some(13), None)));
        assert!(rejects(range_query(None, None, Some("2022-02-30"))));
        assert!(rejects(range_query(None, None, Some(","))));
    }

    #[test]
    fn test_requested_week_start() {
        let mut query = range_query(Some(2022), Some(1), None);
        assert_eq!(requested_week_start(&query).unwrap(), None);

        query.week_start = Some("sun".to_string());
        assert_eq!(requested_week_start(&query).unwrap(), Some(WeekStart::Sunday));

        query.week_start = Some("friday".to_string());
        assert!(requested_week_start(&query).is_err());
    }

    #[test]
    fn test_week_labels_follow_thursday() {
        let range = visible_month_range(2022, 1, WeekStart::Monday).unwrap();
        let labels = week_labels(&range, WeekStart::Monday).unwrap();
        assert_eq!(labels.len(), 6);
        assert_eq!(labels[0].start_date, "2021-12-27");
        assert_eq!(labels[0].iso_week, IsoWeek { year: 2021, week: 52 });
        assert_eq!(labels[1].iso_week, IsoWeek { year: 2022, week: 1 });

        // Sunday rows are numbered by the Thursday inside them
        let sunday_range = visible_month_range(2022, 1, WeekStart::Sunday).unwrap();
        let sunday_labels = week_labels(&sunday_range, WeekStart::Sunday).unwrap();
        assert_eq!(sunday_labels[0].start_date, "2021-12-26");
        assert_eq!(sunday_labels[0].iso_week, IsoWeek { year: 2021, week: 52 });
    }

    #[test]
    fn test_group_by_day_fills_every_day() {
        let range = visible_month_range(2022, 2, WeekStart::Monday).unwrap();
        let focus = month_range(2022, 2).unwrap();
        let owner = Uuid::new_v4();
        let habit = habit::Model {
            id: Uuid::new_v4(),
            name: "Stretch".to_string(),
            description: None,
            icon_path: None,
            user_id: owner,
            trait_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let logged = occurrence::Model {
            id: Uuid::new_v4(),
            habit_id: habit.id,
            user_id: owner,
            timestamp: occurrence::timestamp_for(date(2022, 2, 14), None),
            day: date(2022, 2, 14),
            time: None,
            photo_paths: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let mut note_counts = HashMap::new();
        note_counts.insert(logged.id, 2);

        let days = group_by_day(&range, &focus, vec![(logged, Some(habit))], &note_counts);
        assert_eq!(days.len() as i64, range.num_days());
        assert!(!days[0].in_focus);

        let valentines = days.iter().find(|d| d.date == "2022-02-14").unwrap();
        assert!(valentines.in_focus);
        assert_eq!(valentines.occurrences.len(), 1);
        assert_eq!(valentines.occurrences[0].habit_name.as_deref(), Some("Stretch"));
        assert_eq!(valentines.occurrences[0].note_count, 2);
    }

    #[test]
    fn test_period_visibility() {
        // Week view Mon 2022-03-07 .. Sun 2022-03-13
        let range =
            crate::services::calendar::week_range(date(2022, 3, 9), WeekStart::Monday).unwrap();

        assert!(period_visible(PeriodType::Day, date(2022, 3, 9), &range));
        assert!(!period_visible(PeriodType::Day, date(2022, 3, 1), &range));
        assert!(period_visible(PeriodType::Week, date(2022, 3, 7), &range));
        assert!(!period_visible(PeriodType::Week, date(2022, 2, 28), &range));
        assert!(period_visible(PeriodType::Month, date(2022, 3, 1), &range));
        assert!(!period_visible(PeriodType::Month, date(2022, 2, 1), &range));
        assert_eq!(earliest_period_start(&range), date(2022, 3, 1));
    }

    #[test]
    fn test_sunday_week_note_shows_in_monday_view() {
        // Note written under Sunday weeks for Sun 2022-03-06 .. Sat 2022-03-12
        let sunday_key = date(2022, 3, 6);
        let monday_view = CalendarView::Week
            .range(date(2022, 3, 9), WeekStart::Monday)
            .unwrap();
        assert!(period_visible(PeriodType::Week, sunday_key, &monday_view));

        // Its Sunday also closes the previous Monday week
        let earlier_view = CalendarView::Week
            .range(date(2022, 2, 28), WeekStart::Monday)
            .unwrap();
        assert!(period_visible(PeriodType::Week, sunday_key, &earlier_view));
        let two_weeks_back = CalendarView::Week
            .range(date(2022, 2, 21), WeekStart::Monday)
            .unwrap();
        assert!(!period_visible(PeriodType::Week, sunday_key, &two_weeks_back));
    }

    #[test]
    fn test_week_note_from_previous_month_is_fetched() {
        // Day view of Wed 2022-03-02; its Monday week started on 2022-02-28
        let range = CalendarView::Day
            .range(date(2022, 3, 2), WeekStart::Monday)
            .unwrap();
        let week_note = date(2022, 2, 28);

        assert!(period_visible(PeriodType::Week, week_note, &range));
        assert!(earliest_period_start(&range) <= week_note);
        assert_eq!(earliest_period_start(&range), date(2022, 2, 1));

        // Sunday weeks reach back to 2022-02-27
        let range = CalendarView::Day
            .range(date(2022, 3, 1), WeekStart::Sunday)
            .unwrap();
        assert!(earliest_period_start(&range) <= date(2022, 2, 27));

        let edge = CalendarRange::from_days(NaiveDate::MIN, NaiveDate::MIN);
        assert_eq!(earliest_period_start(&edge), NaiveDate::MIN);
    }

    #[test]
    fn test_calendar_edges_are_bad_requests() {
        let min_year = NaiveDate::MIN.year();
        let max_year = NaiveDate::MAX.year();
        let rejected = |year: i32, month: u32| {
            [WeekStart::Monday, WeekStart::Sunday]
                .iter()
                .any(|ws| compute_range(&range_query(Some(year), Some(month), None), *ws).is_err())
        };
        assert!(rejected(min_year, 1));
        assert!(rejected(max_year, 12));

        let last_week = CalendarRange::from_days(NaiveDate::MAX, NaiveDate::MAX);
        for ws in [WeekStart::Monday, WeekStart::Sunday] {
            assert!(matches!(
                week_labels(&last_week, ws),
                Ok(_) | Err(CalendarError::OutOfRange(_))
            ));
        }
    }

    #[actix_web::test]
    async fn test_iso_week_endpoint() {
        let app = actix_test::init_service(
            App::new().route("/calendar/iso-week", web::get().to(get_iso_week)),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/calendar/iso-week?date=2022-01-01")
            .to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["week"], 52);
        assert_eq!(body["year"], 2021);
        assert_eq!(body["monday"], "2021-12-27");

        let req = actix_test::TestRequest::get()
            .uri("/calendar/iso-week?date=2022-01-04")
            .to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["week"], 1);
        assert_eq!(body["year"], 2022);
        assert_eq!(body["weeks_in_year"], 52);

        let req = actix_test::TestRequest::get()
            .uri("/calendar/iso-week?date=not-a-date")
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_view_params_from_path() {
        let req = actix_test::TestRequest::get()
            .uri("/calendar/week/2022/3/9")
            .param("view", "week")
            .param("year", "2022")
            .param("month", "3")
            .param("day", "9")
            .to_http_request();
        let (view, year, month, day) = view_params(&req).unwrap();
        assert_eq!(view, CalendarView::Week);
        assert_eq!((year, month, day), (Some(2022), Some(3), Some(9)));

        let bad = actix_test::TestRequest::get()
            .param("view", "year")
            .to_http_request();
        assert!(view_params(&bad).is_err());

        let bad_year = actix_test::TestRequest::get()
            .param("view", "month")
            .param("year", "twenty")
            .to_http_request();
        assert!(view_params(&bad_year).is_err());
    }
}
