use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use sea_orm::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handlers::{
    content_type, db_error, deserialize_some, file_url, storage_error, validation_error,
};
use crate::middleware::auth::Claims;
use crate::models::{habit, habit_trait};
use crate::services::habits::{delete_habit as delete_habit_cascade, find_owned_habit, remove_files};
use crate::services::storage::{Bucket, FileStore};
use crate::utils::validators::validate_name;

// ============ Request/Response DTOs ============

#[derive(Debug, Serialize)]
pub struct HabitResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub trait_id: Option<String>,
    pub icon_path: Option<String>,
    pub icon_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<habit::Model> for HabitResponse {
    fn from(model: habit::Model) -> Self {
        Self {
            id: model.id.to_string(),
            name: model.name,
            description: model.description,
            trait_id: model.trait_id.map(|id| id.to_string()),
            icon_url: model.icon_path.as_deref().map(file_url),
            icon_path: model.icon_path,
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListHabitsQuery {
    pub trait_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreateHabitRequest {
    pub name: String,
    pub description: Option<String>,
    pub trait_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateHabitRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub trait_id: Option<Option<Uuid>>,
}

async fn owned_habit_or_404(
    db: &DatabaseConnection,
    user_id: Uuid,
    habit_id: Uuid,
) -> Result<habit::Model, actix_web::Error> {
    find_owned_habit(db, user_id, habit_id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| actix_web::error::ErrorNotFound("Habit not found"))
}

/// A habit may only reference a trait the user can see
async fn ensure_trait_visible(
    db: &DatabaseConnection,
    user_id: Uuid,
    trait_id: Uuid,
) -> Result<(), actix_web::Error> {
    let found = habit_trait::Entity::find_by_id(trait_id)
        .filter(habit_trait::visible_to(user_id))
        .one(db)
        .await
        .map_err(db_error)?;

    match found {
        Some(_) => Ok(()),
        None => Err(actix_web::error::ErrorBadRequest("Unknown trait")),
    }
}

fn clean_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

// ============ Habit Handlers ============

/// GET /habits
pub async fn list_habits(
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
    query: web::Query<ListHabitsQuery>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;

    let mut select = habit::Entity::find().filter(habit::Column::UserId.eq(user_id));
    if let Some(trait_id) = query.trait_id {
        select = select.filter(habit::Column::TraitId.eq(trait_id));
    }

    let habits = select
        .order_by_asc(habit::Column::Name)
        .all(db.as_ref())
        .await
        .map_err(db_error)?;

    let response: Vec<HabitResponse> = habits.into_iter().map(HabitResponse::from).collect();
    Ok(HttpResponse::Ok().json(response))
}

/// GET /habits/:id
pub async fn get_habit(
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let habit = owned_habit_or_404(db.as_ref(), user_id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(HabitResponse::from(habit)))
}

/// POST /habits
pub async fn create_habit(
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
    payload: web::Json<CreateHabitRequest>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let payload = payload.into_inner();

    let name = validate_name(&payload.name, "Habit name").map_err(validation_error)?;
    if let Some(trait_id) = payload.trait_id {
        ensure_trait_visible(db.as_ref(), user_id, trait_id).await?;
    }

    let now = Utc::now();
    let new_habit = habit::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        description: Set(clean_description(payload.description)),
        icon_path: Set(None),
        user_id: Set(user_id),
        trait_id: Set(payload.trait_id),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let created = new_habit.insert(db.as_ref()).await.map_err(db_error)?;
    log::info!("✅ Habit '{}' created for user {}", created.name, user_id);

    Ok(HttpResponse::Created().json(HabitResponse::from(created)))
}

/// PUT /habits/:id
pub async fn update_habit(
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
    payload: web::Json<UpdateHabitRequest>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let existing = owned_habit_or_404(db.as_ref(), user_id, path.into_inner()).await?;
    let payload = payload.into_inner();

    let mut active: habit::ActiveModel = existing.into();

    if let Some(name) = payload.name {
        active.name = Set(validate_name(&name, "Habit name").map_err(validation_error)?);
    }
    if let Some(description) = payload.description {
        active.description = Set(clean_description(description));
    }
    if let Some(trait_id) = payload.trait_id {
        if let Some(id) = trait_id {
            ensure_trait_visible(db.as_ref(), user_id, id).await?;
        }
        active.trait_id = Set(trait_id);
    }
    active.updated_at = Set(Utc::now());

    let updated = active.update(db.as_ref()).await.map_err(db_error)?;
    Ok(HttpResponse::Ok().json(HabitResponse::from(updated)))
}

/// DELETE /habits/:id
pub async fn delete_habit(
    db: web::Data<DatabaseConnection>,
    store: web::Data<dyn FileStore>,
    user_claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let habit = owned_habit_or_404(db.as_ref(), user_id, path.into_inner()).await?;

    delete_habit_cascade(db.as_ref(), store.get_ref(), habit)
        .await
        .map_err(db_error)?;

    Ok(HttpResponse::NoContent().finish())
}

/// PUT /habits/:id/icon
/// Raw image body; the Content-Type header picks the file extension
pub async fn upload_icon(
    req: HttpRequest,
    db: web::Data<DatabaseConnection>,
    store: web::Data<dyn FileStore>,
    user_claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
    body: web::Bytes,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let habit = owned_habit_or_404(db.as_ref(), user_id, path.into_inner()).await?;

    let stored = store
        .put(Bucket::HabitIcons, user_id, habit.id, &content_type(&req), &body)
        .await
        .map_err(storage_error)?;

    log::info!("🖼️  Icon uploaded for habit {} ({} bytes)", habit.id, stored.size);

    let previous = habit.icon_path.clone();
    let mut active: habit::ActiveModel = habit.into();
    active.icon_path = Set(Some(stored.path.clone()));
    active.updated_at = Set(Utc::now());
    let updated = active.update(db.as_ref()).await.map_err(db_error)?;

    if let Some(old) = previous.filter(|old| *old != stored.path) {
        remove_files(store.get_ref(), std::iter::once(&old)).await;
    }

    Ok(HttpResponse::Ok().json(HabitResponse::from(updated)))
}

/// DELETE /habits/:id/icon
pub async fn delete_icon(
    db: web::Data<DatabaseConnection>,
    store: web::Data<dyn FileStore>,
    user_claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let habit = owned_habit_or_404(db.as_ref(), user_id, path.into_inner()).await?;

    let Some(icon) = habit.icon_path.clone() else {
        return Ok(HttpResponse::Ok().json(HabitResponse::from(habit)));
    };

    let mut active: habit::ActiveModel = habit.into();
    active.icon_path = Set(None);
    active.updated_at = Set(Utc::now());
    let updated = active.update(db.as_ref()).await.map_err(db_error)?;

    remove_files(store.get_ref(), std::iter::once(&icon)).await;

    Ok(HttpResponse::Ok().json(HabitResponse::from(updated)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_habit_response_builds_icon_url() {
        let owner = Uuid::new_v4();
        let icon = format!("habit-icons/{}/abc123.png", owner);
        let model = habit::Model {
            id: Uuid::new_v4(),
            name: "Read".to_string(),
            description: None,
            icon_path: Some(icon.clone()),
            user_id: owner,
            trait_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let response = HabitResponse::from(model);
        assert_eq!(response.icon_url, Some(format!("/files/{}", icon)));
        assert_eq!(response.trait_id, None);
    }

    #[test]
    fn test_clean_description() {
        assert_eq!(clean_description(Some("  ".to_string())), None);
        assert_eq!(
            clean_description(Some(" daily walk ".to_string())),
            Some("daily walk".to_string())
        );
        assert_eq!(clean_description(None), None);
    }
}
