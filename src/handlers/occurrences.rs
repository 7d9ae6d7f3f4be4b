use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{NaiveDate, NaiveTime, Utc};
use sea_orm::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handlers::{
    content_type, db_error, deserialize_some, file_url, parse_date_window, storage_error,
};
use crate::middleware::auth::Claims;
use crate::models::occurrence::{self, timestamp_for};
use crate::services::calendar::to_sql_date;
use crate::services::habits::{
    delete_occurrence as delete_occurrence_cascade, find_owned_habit, find_owned_occurrence,
    remove_files,
};
use crate::services::storage::{Bucket, FileStore};

// ============ Request/Response DTOs ============

#[derive(Debug, Serialize)]
pub struct PhotoResponse {
    pub path: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct OccurrenceResponse {
    pub id: String,
    pub habit_id: String,
    pub timestamp: String,
    pub day: String,
    pub time: Option<String>,
    pub photos: Vec<PhotoResponse>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<occurrence::Model> for OccurrenceResponse {
    fn from(model: occurrence::Model) -> Self {
        Self {
            id: model.id.to_string(),
            habit_id: model.habit_id.to_string(),
            timestamp: model.timestamp.to_rfc3339(),
            day: to_sql_date(model.day),
            time: model.time.map(|t| t.format("%H:%M:%S").to_string()),
            photos: model
                .photo_paths
                .into_iter()
                .map(|path| PhotoResponse {
                    url: file_url(&path),
                    path,
                })
                .collect(),
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListOccurrencesQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub habit_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOccurrenceRequest {
    pub habit_id: Uuid,
    pub day: NaiveDate,
    pub time: Option<NaiveTime>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOccurrenceRequest {
    pub habit_id: Option<Uuid>,
    pub day: Option<NaiveDate>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub time: Option<Option<NaiveTime>>,
}

#[derive(Debug, Deserialize)]
pub struct PhotoQuery {
    pub path: String,
}

async fn owned_occurrence_or_404(
    db: &DatabaseConnection,
    user_id: Uuid,
    occurrence_id: Uuid,
) -> Result<occurrence::Model, actix_web::Error> {
    find_owned_occurrence(db, user_id, occurrence_id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| actix_web::error::ErrorNotFound("Occurrence not found"))
}

async fn ensure_habit_owned(
    db: &DatabaseConnection,
    user_id: Uuid,
    habit_id: Uuid,
) -> Result<(), actix_web::Error> {
    match find_owned_habit(db, user_id, habit_id).await.map_err(db_error)? {
        Some(_) => Ok(()),
        None => Err(actix_web::error::ErrorNotFound("Habit not found")),
    }
}

// ============ Occurrence Handlers ============

/// GET /occurrences?from=YYYY-MM-DD&to=YYYY-MM-DD&habit_id=
pub async fn list_occurrences(
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
    query: web::Query<ListOccurrencesQuery>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;

    let (from, to) = parse_date_window(query.from.as_deref(), query.to.as_deref())?;

    let mut select = occurrence::Entity::find().filter(occurrence::Column::UserId.eq(user_id));
    if let Some(from) = from {
        select = select.filter(occurrence::Column::Day.gte(from));
    }
    if let Some(to) = to {
        select = select.filter(occurrence::Column::Day.lte(to));
    }
    if let Some(habit_id) = query.habit_id {
        select = select.filter(occurrence::Column::HabitId.eq(habit_id));
    }

    let occurrences = select
        .order_by_asc(occurrence::Column::Timestamp)
        .all(db.as_ref())
        .await
        .map_err(db_error)?;

    let response: Vec<OccurrenceResponse> =
        occurrences.into_iter().map(OccurrenceResponse::from).collect();
    Ok(HttpResponse::Ok().json(response))
}

/// GET /occurrences/:id
pub async fn get_occurrence(
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let found = owned_occurrence_or_404(db.as_ref(), user_id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(OccurrenceResponse::from(found)))
}

/// POST /occurrences
pub async fn create_occurrence(
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
    payload: web::Json<CreateOccurrenceRequest>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let payload = payload.into_inner();

    ensure_habit_owned(db.as_ref(), user_id, payload.habit_id).await?;

    let now = Utc::now();
    let new_occurrence = occurrence::ActiveModel {
        id: Set(Uuid::new_v4()),
        habit_id: Set(payload.habit_id),
        user_id: Set(user_id),
        timestamp: Set(timestamp_for(payload.day, payload.time)),
        day: Set(payload.day),
        time: Set(payload.time),
        photo_paths: Set(Vec::new()),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let created = new_occurrence.insert(db.as_ref()).await.map_err(db_error)?;
    log::info!(
        "✅ Occurrence logged for habit {} on {}",
        created.habit_id,
        created.day
    );

    Ok(HttpResponse::Created().json(OccurrenceResponse::from(created)))
}

/// PUT /occurrences/:id
pub async fn update_occurrence(
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
    payload: web::Json<UpdateOccurrenceRequest>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let existing = owned_occurrence_or_404(db.as_ref(), user_id, path.into_inner()).await?;
    let payload = payload.into_inner();

    if let Some(habit_id) = payload.habit_id {
        ensure_habit_owned(db.as_ref(), user_id, habit_id).await?;
    }

    let day = payload.day.unwrap_or(existing.day);
    let time = payload.time.unwrap_or(existing.time);

    let mut active: occurrence::ActiveModel = existing.into();
    if let Some(habit_id) = payload.habit_id {
        active.habit_id = Set(habit_id);
    }
    // day and timestamp move together
    active.day = Set(day);
    active.time = Set(time);
    active.timestamp = Set(timestamp_for(day, time));
    active.updated_at = Set(Utc::now());

    let updated = active.update(db.as_ref()).await.map_err(db_error)?;
    Ok(HttpResponse::Ok().json(OccurrenceResponse::from(updated)))
}

/// DELETE /occurrences/:id
pub async fn delete_occurrence(
    db: web::Data<DatabaseConnection>,
    store: web::Data<dyn FileStore>,
    user_claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let existing = owned_occurrence_or_404(db.as_ref(), user_id, path.into_inner()).await?;

    delete_occurrence_cascade(db.as_ref(), store.get_ref(), existing)
        .await
        .map_err(db_error)?;

    Ok(HttpResponse::NoContent().finish())
}

/// POST /occurrences/:id/photos
/// Raw image body; the Content-Type header picks the file extension
pub async fn upload_photo(
    req: HttpRequest,
    db: web::Data<DatabaseConnection>,
    store: web::Data<dyn FileStore>,
    user_claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
    body: web::Bytes,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let existing = owned_occurrence_or_404(db.as_ref(), user_id, path.into_inner()).await?;

    let stored = store
        .put(
            Bucket::OccurrencePhotos,
            user_id,
            existing.id,
            &content_type(&req),
            &body,
        )
        .await
        .map_err(storage_error)?;

    log::info!("📷 Photo uploaded for occurrence {} ({} bytes)", existing.id, stored.size);

    if existing.photo_paths.contains(&stored.path) {
        return Ok(HttpResponse::Ok().json(OccurrenceResponse::from(existing)));
    }

    let mut photo_paths = existing.photo_paths.clone();
    photo_paths.push(stored.path);

    let mut active: occurrence::ActiveModel = existing.into();
    active.photo_paths = Set(photo_paths);
    active.updated_at = Set(Utc::now());
    let updated = active.update(db.as_ref()).await.map_err(db_error)?;

    Ok(HttpResponse::Created().json(OccurrenceResponse::from(updated)))
}

/// DELETE /occurrences/:id/photos?path=
pub async fn delete_photo(
    db: web::Data<DatabaseConnection>,
    store: web::Data<dyn FileStore>,
    user_claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
    query: web::Query<PhotoQuery>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let existing = owned_occurrence_or_404(db.as_ref(), user_id, path.into_inner()).await?;

    if !existing.photo_paths.contains(&query.path) {
        return Err(actix_web::error::ErrorNotFound("Photo not found"));
    }

    let photo_paths: Vec<String> = existing
        .photo_paths
        .iter()
        .filter(|p| **p != query.path)
        .cloned()
        .collect();

    let mut active: occurrence::ActiveModel = existing.into();
    active.photo_paths = Set(photo_paths);
    active.updated_at = Set(Utc::now());
    let updated = active.update(db.as_ref()).await.map_err(db_error)?;

    remove_files(store.get_ref(), std::iter::once(&query.path)).await;

    Ok(HttpResponse::Ok().json(OccurrenceResponse::from(updated)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occurrence_response_shape() {
        let owner = Uuid::new_v4();
        let day = NaiveDate::from_ymd_opt(2022, 1, 4).unwrap();
        let time = NaiveTime::from_hms_opt(7, 15, 0);
        let photo = format!("occurrence-photos/{}/beef.jpg", owner);

        let model = occurrence::Model {
            id: Uuid::new_v4(),
            habit_id: Uuid::new_v4(),
            user_id: owner,
            timestamp: timestamp_for(day, time),
            day,
            time,
            photo_paths: vec![photo.clone()],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let response = OccurrenceResponse::from(model);
        assert_eq!(response.day, "2022-01-04");
        assert_eq!(response.time.as_deref(), Some("07:15:00"));
        assert!(response.timestamp.starts_with("2022-01-04T07:15:00"));
        assert_eq!(response.photos.len(), 1);
        assert_eq!(response.photos[0].url, format!("/files/{}", photo));
    }

    #[test]
    fn test_update_request_distinguishes_cleared_time() {
        let cleared: UpdateOccurrenceRequest = serde_json::from_str(r#"{"time": null}"#).unwrap();
        assert_eq!(cleared.time, Some(None));

        let untouched: UpdateOccurrenceRequest =
            serde_json::from_str(r#"{"day": "2022-02-01"}"#).unwrap();
        assert_eq!(untouched.time, None);
        assert_eq!(untouched.day, NaiveDate::from_ymd_opt(2022, 2, 1));
    }
}
