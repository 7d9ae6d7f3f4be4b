use actix_web::{web, HttpResponse, Responder};
use chrono::{NaiveDate, Utc};
use sea_orm::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::handlers::{db_error, parse_date_window, DateWindow};
use crate::middleware::auth::Claims;
use crate::models::{habit, habit_trait, occurrence};
use crate::services::calendar::to_sql_date;
use crate::services::habits::find_owned_habit;
use crate::services::streaks::{calculate_streaks, daily_counts, DayCount, StreakSummary};

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HabitStatsResponse {
    pub habit_id: String,
    pub total_occurrences: usize,
    pub first_day: Option<String>,
    pub last_day: Option<String>,
    #[serde(flatten)]
    pub streaks: StreakSummary,
    pub daily: Vec<DayCount>,
}

#[derive(Debug, Serialize)]
pub struct HabitOverview {
    pub habit_id: String,
    pub name: String,
    pub trait_id: Option<String>,
    pub total_occurrences: usize,
    #[serde(flatten)]
    pub streaks: StreakSummary,
}

#[derive(Debug, Serialize)]
pub struct TraitTotal {
    pub trait_id: Option<String>,
    pub name: String,
    pub color: Option<String>,
    pub total_occurrences: usize,
}

#[derive(Debug, Serialize)]
pub struct OverviewResponse {
    pub total_occurrences: usize,
    pub habits: Vec<HabitOverview>,
    pub traits: Vec<TraitTotal>,
}

fn parse_window(query: &StatsQuery) -> Result<DateWindow, actix_web::Error> {
    parse_date_window(query.from.as_deref(), query.to.as_deref())
}

/// Stats for one habit from the days it was logged on
pub fn summarize_habit(
    habit_id: Uuid,
    days: &[NaiveDate],
    today: NaiveDate,
) -> HabitStatsResponse {
    HabitStatsResponse {
        habit_id: habit_id.to_string(),
        total_occurrences: days.len(),
        first_day: days.iter().min().copied().map(to_sql_date),
        last_day: days.iter().max().copied().map(to_sql_date),
        streaks: calculate_streaks(days.iter().copied(), today),
        daily: daily_counts(days.iter().copied()),
    }
}

/// Occurrence totals per trait, habits without a trait grouped last
pub fn trait_totals(
    habits: &[habit::Model],
    traits: &[habit_trait::Model],
    per_habit: &HashMap<Uuid, Vec<NaiveDate>>,
) -> Vec<TraitTotal> {
    let mut totals: HashMap<Option<Uuid>, usize> = HashMap::new();
    for h in habits {
        let count = per_habit.get(&h.id).map(Vec::len).unwrap_or(0);
        *totals.entry(h.trait_id).or_insert(0) += count;
    }

    let mut result: Vec<TraitTotal> = traits
        .iter()
        .filter_map(|t| {
            let total = totals.remove(&Some(t.id))?;
            Some(TraitTotal {
                trait_id: Some(t.id.to_string()),
                name: t.name.clone(),
                color: Some(t.color.clone()),
                total_occurrences: total,
            })
        })
        .collect();
    result.sort_by(|a, b| b.total_occurrences.cmp(&a.total_occurrences));

    if let Some(total) = totals.remove(&None) {
        result.push(TraitTotal {
            trait_id: None,
            name: "Uncategorized".to_string(),
            color: None,
            total_occurrences: total,
        });
    }

    result
}

/// GET /habits/:id/stats?from=&to=
pub async fn habit_stats(
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
    query: web::Query<StatsQuery>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let (from, to) = parse_window(&query)?;

    let habit = find_owned_habit(db.as_ref(), user_id, path.into_inner())
        .await
        .map_err(db_error)?
        .ok_or_else(|| actix_web::error::ErrorNotFound("Habit not found"))?;

    let mut select = occurrence::Entity::find()
        .select_only()
        .column(occurrence::Column::Day)
        .filter(occurrence::Column::HabitId.eq(habit.id));
    if let Some(from) = from {
        select = select.filter(occurrence::Column::Day.gte(from));
    }
    if let Some(to) = to {
        select = select.filter(occurrence::Column::Day.lte(to));
    }

    let days: Vec<NaiveDate> = select
        .into_tuple()
        .all(db.as_ref())
        .await
        .map_err(db_error)?;

    let today = Utc::now().date_naive();
    Ok(HttpResponse::Ok().json(summarize_habit(habit.id, &days, today)))
}

/// GET /stats
/// Streaks for every habit plus occurrence totals per trait
pub async fn overview(
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
    query: web::Query<StatsQuery>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let (from, to) = parse_window(&query)?;

    let habits = habit::Entity::find()
        .filter(habit::Column::UserId.eq(user_id))
        .order_by_asc(habit::Column::Name)
        .all(db.as_ref())
        .await
        .map_err(db_error)?;

    let traits = habit_trait::Entity::find()
        .filter(habit_trait::visible_to(user_id))
        .all(db.as_ref())
        .await
        .map_err(db_error)?;

    let mut select = occurrence::Entity::find()
        .select_only()
        .column(occurrence::Column::HabitId)
        .column(occurrence::Column::Day)
        .filter(occurrence::Column::UserId.eq(user_id));
    if let Some(from) = from {
        select = select.filter(occurrence::Column::Day.gte(from));
    }
    if let Some(to) = to {
        select = select.filter(occurrence::Column::Day.lte(to));
    }

    let rows: Vec<(Uuid, NaiveDate)> = select
        .into_tuple()
        .all(db.as_ref())
        .await
        .map_err(db_error)?;

    let mut per_habit: HashMap<Uuid, Vec<NaiveDate>> = HashMap::new();
    for (habit_id, day) in &rows {
        per_habit.entry(*habit_id).or_default().push(*day);
    }

    let today = Utc::now().date_naive();
    let habit_overviews: Vec<HabitOverview> = habits
        .iter()
        .map(|h| {
            let days = per_habit.get(&h.id).map(Vec::as_slice).unwrap_or(&[]);
            HabitOverview {
                habit_id: h.id.to_string(),
                name: h.name.clone(),
                trait_id: h.trait_id.map(|id| id.to_string()),
                total_occurrences: days.len(),
                streaks: calculate_streaks(days.iter().copied(), today),
            }
        })
        .collect();

    log::debug!(
        "Stats overview for user {}: {} habits, {} occurrences",
        user_id,
        habits.len(),
        rows.len()
    );

    Ok(HttpResponse::Ok().json(OverviewResponse {
        total_occurrences: rows.len(),
        traits: trait_totals(&habits, &traits, &per_habit),
        habits: habit_overviews,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn habit_with_trait(trait_id: Option<Uuid>) -> habit::Model {
        habit::Model {
            id: Uuid::new_v4(),
            name: "habit".to_string(),
            description: None,
            icon_path: None,
            user_id: Uuid::new_v4(),
            trait_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn public_trait(slug: &str, color: &str) -> habit_trait::Model {
        habit_trait::Model {
            id: Uuid::new_v4(),
            name: slug.to_string(),
            slug: slug.to_string(),
            color: color.to_string(),
            description: None,
            user_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_summarize_habit() {
        let days = vec![
            date(2022, 1, 9),
            date(2022, 1, 10),
            date(2022, 1, 10),
            date(2022, 1, 3),
        ];
        let summary = summarize_habit(Uuid::new_v4(), &days, date(2022, 1, 10));

        assert_eq!(summary.total_occurrences, 4);
        assert_eq!(summary.first_day.as_deref(), Some("2022-01-03"));
        assert_eq!(summary.last_day.as_deref(), Some("2022-01-10"));
        assert_eq!(summary.streaks.current_streak, 2);
        assert_eq!(summary.daily.len(), 3);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["current_streak"], 2);
        assert_eq!(json["longest_streak"], 2);
    }

    #[test]
    fn test_stats_window_rejects_inverted_range() {
        let query = |from: &str, to: &str| StatsQuery {
            from: Some(from.to_string()),
            to: Some(to.to_string()),
        };
        assert!(parse_window(&query("2022-02-01", "2022-01-01")).is_err());
        assert_eq!(
            parse_window(&query("2022-01-01", "2022-02-01")).unwrap(),
            (Some(date(2022, 1, 1)), Some(date(2022, 2, 1)))
        );
    }

    #[test]
    fn test_summarize_empty_habit() {
        let summary = summarize_habit(Uuid::new_v4(), &[], date(2022, 1, 10));
        assert_eq!(summary.total_occurrences, 0);
        assert_eq!(summary.first_day, None);
        assert_eq!(summary.streaks, StreakSummary::default());
    }

    #[test]
    fn test_trait_totals() {
        let good = public_trait("good", "#2e7d32");
        let bad = public_trait("bad", "#c62828");
        let reading = habit_with_trait(Some(good.id));
        let walking = habit_with_trait(Some(good.id));
        let snacking = habit_with_trait(Some(bad.id));
        let untagged = habit_with_trait(None);

        let mut per_habit = HashMap::new();
        per_habit.insert(reading.id, vec![date(2022, 1, 1), date(2022, 1, 2)]);
        per_habit.insert(walking.id, vec![date(2022, 1, 1)]);
        per_habit.insert(snacking.id, vec![date(2022, 1, 1)]);
        per_habit.insert(untagged.id, vec![date(2022, 1, 5)]);

        let totals = trait_totals(
            &[reading, walking, snacking, untagged],
            &[good, bad],
            &per_habit,
        );

        assert_eq!(totals.len(), 3);
        assert_eq!(totals[0].name, "good");
        assert_eq!(totals[0].total_occurrences, 3);
        assert_eq!(totals[1].name, "bad");
        assert_eq!(totals[1].total_occurrences, 1);
        assert_eq!(totals[2].trait_id, None);
        assert_eq!(totals[2].total_occurrences, 1);
    }
}
