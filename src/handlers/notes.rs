use actix_web::{web, HttpResponse, Responder};
use chrono::{Duration, NaiveDate, Utc};
use sea_orm::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handlers::{calendar_error, db_error, load_profile, parse_date_window};
use crate::middleware::auth::Claims;
use crate::models::note::{self, NoteTarget, PeriodType};
use crate::services::calendar::{
    normalize_period, parse_sql_date, to_sql_date, CalendarError, WeekStart,
};
use crate::services::habits::find_owned_occurrence;

// ============ Request/Response DTOs ============

#[derive(Debug, Serialize)]
pub struct NoteResponse {
    pub id: String,
    pub content: String,
    pub target: Option<NoteTarget>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<note::Model> for NoteResponse {
    fn from(model: note::Model) -> Self {
        Self {
            id: model.id.to_string(),
            target: model.target(),
            content: model.content,
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListNotesQuery {
    pub occurrence_id: Option<Uuid>,
    pub period_type: Option<PeriodType>,
    pub period_date: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateNoteRequest {
    pub content: String,
    pub target: NoteTarget,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNoteRequest {
    pub content: Option<String>,
    pub target: Option<NoteTarget>,
}

fn validate_content(content: &str) -> Result<String, actix_web::Error> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(actix_web::error::ErrorBadRequest("Note content cannot be empty"));
    }
    Ok(trimmed.to_string())
}

/// Period dates snap to the start of their period
pub fn normalize_target(
    target: NoteTarget,
    week_start: WeekStart,
) -> Result<NoteTarget, CalendarError> {
    match target {
        NoteTarget::Period {
            period_type,
            period_date,
        } => Ok(NoteTarget::Period {
            period_type,
            period_date: normalize_period(period_type.into(), period_date, week_start)?,
        }),
        other => Ok(other),
    }
}

/// Stored period dates whose period contains `date`.
///
/// Week notes keep the week start that was current when they were written,
/// so any week starting in the six days up to `date` covers it.
pub fn period_lookup_window(
    period_type: PeriodType,
    date: NaiveDate,
    week_start: WeekStart,
) -> Result<(NaiveDate, NaiveDate), CalendarError> {
    match period_type {
        PeriodType::Week => {
            let earliest = date
                .checked_sub_signed(Duration::days(6))
                .unwrap_or(NaiveDate::MIN);
            Ok((earliest, date))
        }
        _ => {
            let start = normalize_period(period_type.into(), date, week_start)?;
            Ok((start, start))
        }
    }
}

/// Check ownership of an occurrence target and normalize a period target
async fn resolve_target(
    db: &DatabaseConnection,
    user_id: Uuid,
    target: NoteTarget,
) -> Result<NoteTarget, actix_web::Error> {
    match target {
        NoteTarget::Occurrence { occurrence_id } => {
            find_owned_occurrence(db, user_id, occurrence_id)
                .await
                .map_err(db_error)?
                .ok_or_else(|| actix_web::error::ErrorNotFound("Occurrence not found"))?;
            Ok(target)
        }
        NoteTarget::Period { .. } => {
            let profile = load_profile(db, user_id).await?;
            normalize_target(target, profile.week_start()).map_err(calendar_error)
        }
    }
}

async fn owned_note_or_404(
    db: &DatabaseConnection,
    user_id: Uuid,
    note_id: Uuid,
) -> Result<note::Model, actix_web::Error> {
    note::Entity::find_by_id(note_id)
        .filter(note::Column::UserId.eq(user_id))
        .one(db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| actix_web::error::ErrorNotFound("Note not found"))
}

// ============ Note Handlers ============

/// GET /notes
/// Filter by `occurrence_id`, by `period_type` + `period_date`, or by a
/// `from`/`to` window over period dates
pub async fn list_notes(
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
    query: web::Query<ListNotesQuery>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let query = query.into_inner();

    let mut select = note::Entity::find().filter(note::Column::UserId.eq(user_id));

    if let Some(occurrence_id) = query.occurrence_id {
        select = select.filter(note::Column::OccurrenceId.eq(occurrence_id));
    }

    match (query.period_type, query.period_date.as_deref()) {
        (Some(period_type), Some(period_date)) => {
            let date = parse_sql_date(period_date).map_err(calendar_error)?;
            let profile = load_profile(db.as_ref(), user_id).await?;
            let (earliest, latest) =
                period_lookup_window(period_type, date, profile.week_start())
                    .map_err(calendar_error)?;
            select = select
                .filter(note::Column::PeriodType.eq(period_type))
                .filter(note::Column::PeriodDate.gte(earliest))
                .filter(note::Column::PeriodDate.lte(latest));
        }
        (Some(period_type), None) => {
            select = select.filter(note::Column::PeriodType.eq(period_type));
        }
        (None, Some(_)) => {
            return Err(actix_web::error::ErrorBadRequest(
                "'period_date' requires 'period_type'",
            ));
        }
        (None, None) => {}
    }

    let (from, to) = parse_date_window(query.from.as_deref(), query.to.as_deref())?;
    if let Some(from) = from {
        select = select.filter(note::Column::PeriodDate.gte(from));
    }
    if let Some(to) = to {
        select = select.filter(note::Column::PeriodDate.lte(to));
    }

    let notes = select
        .order_by_asc(note::Column::CreatedAt)
        .all(db.as_ref())
        .await
        .map_err(db_error)?;

    let response: Vec<NoteResponse> = notes.into_iter().map(NoteResponse::from).collect();
    Ok(HttpResponse::Ok().json(response))
}

/// GET /notes/:id
pub async fn get_note(
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let found = owned_note_or_404(db.as_ref(), user_id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(NoteResponse::from(found)))
}

/// POST /notes
pub async fn create_note(
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
    payload: web::Json<CreateNoteRequest>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let payload = payload.into_inner();

    let content = validate_content(&payload.content)?;
    let target = resolve_target(db.as_ref(), user_id, payload.target).await?;
    let (occurrence_id, period_type, period_date) = target.columns();

    let now = Utc::now();
    let new_note = note::ActiveModel {
        id: Set(Uuid::new_v4()),
        content: Set(content),
        user_id: Set(user_id),
        occurrence_id: Set(occurrence_id),
        period_type: Set(period_type),
        period_date: Set(period_date),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let created = new_note.insert(db.as_ref()).await.map_err(db_error)?;

    match period_date {
        Some(date) => log::info!("📝 Period note added for {}", to_sql_date(date)),
        None => log::info!("📝 Occurrence note added for user {}", user_id),
    }

    Ok(HttpResponse::Created().json(NoteResponse::from(created)))
}

/// PUT /notes/:id
pub async fn update_note(
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
    payload: web::Json<UpdateNoteRequest>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let existing = owned_note_or_404(db.as_ref(), user_id, path.into_inner()).await?;
    let payload = payload.into_inner();

    let mut active: note::ActiveModel = existing.into();

    if let Some(content) = &payload.content {
        active.content = Set(validate_content(content)?);
    }
    if let Some(target) = payload.target {
        // All three columns are rewritten so the row never holds two targets
        let target = resolve_target(db.as_ref(), user_id, target).await?;
        let (occurrence_id, period_type, period_date) = target.columns();
        active.occurrence_id = Set(occurrence_id);
        active.period_type = Set(period_type);
        active.period_date = Set(period_date);
    }
    active.updated_at = Set(Utc::now());

    let updated = active.update(db.as_ref()).await.map_err(db_error)?;
    Ok(HttpResponse::Ok().json(NoteResponse::from(updated)))
}

/// DELETE /notes/:id
pub async fn delete_note(
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let existing = owned_note_or_404(db.as_ref(), user_id, path.into_inner()).await?;

    note::Entity::delete_by_id(existing.id)
        .exec(db.as_ref())
        .await
        .map_err(db_error)?;

    Ok(HttpResponse::NoContent().finish())
}
