use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handlers::{db_error, deserialize_some, validation_error};
use crate::middleware::auth::Claims;
use crate::models::{habit, habit_trait};
use crate::utils::validators::{slugify, validate_hex_color, validate_name, validate_slug};

// ============ Request/Response DTOs ============

#[derive(Debug, Serialize)]
pub struct TraitResponse {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub color: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<habit_trait::Model> for TraitResponse {
    fn from(model: habit_trait::Model) -> Self {
        Self {
            id: model.id.to_string(),
            is_public: model.is_public(),
            name: model.name,
            slug: model.slug,
            color: model.color,
            description: model.description,
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTraitRequest {
    pub name: String,
    pub slug: Option<String>,
    pub color: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTraitRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub color: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
}

/// Slugs must be unique among everything the user can see
async fn slug_taken(
    db: &DatabaseConnection,
    user_id: Uuid,
    slug: &str,
    except: Option<Uuid>,
) -> Result<bool, actix_web::Error> {
    let mut query = habit_trait::Entity::find()
        .filter(habit_trait::visible_to(user_id))
        .filter(habit_trait::Column::Slug.eq(slug));

    if let Some(id) = except {
        query = query.filter(habit_trait::Column::Id.ne(id));
    }

    Ok(query.one(db).await.map_err(db_error)?.is_some())
}

/// Trait owned by the user; public traits are read-only
async fn find_owned_trait(
    db: &DatabaseConnection,
    user_id: Uuid,
    trait_id: Uuid,
) -> Result<habit_trait::Model, actix_web::Error> {
    let found = habit_trait::Entity::find_by_id(trait_id)
        .one(db)
        .await
        .map_err(db_error)?;

    match found {
        Some(t) if t.user_id == Some(user_id) => Ok(t),
        Some(t) if t.is_public() => Err(actix_web::error::ErrorForbidden(
            "Public traits cannot be modified",
        )),
        _ => Err(actix_web::error::ErrorNotFound("Trait not found")),
    }
}

// ============ Trait Handlers ============

/// GET /traits
/// Public traits plus the user's own
pub async fn list_traits(
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;

    let traits = habit_trait::Entity::find()
        .filter(habit_trait::visible_to(user_id))
        .order_by_asc(habit_trait::Column::Name)
        .all(db.as_ref())
        .await
        .map_err(db_error)?;

    let response: Vec<TraitResponse> = traits.into_iter().map(TraitResponse::from).collect();
    Ok(HttpResponse::Ok().json(response))
}

/// GET /traits/:id
pub async fn get_trait(
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;

    let found = habit_trait::Entity::find_by_id(path.into_inner())
        .one(db.as_ref())
        .await
        .map_err(db_error)?
        .filter(|t| t.is_visible_to(user_id));

    match found {
        Some(t) => Ok(HttpResponse::Ok().json(TraitResponse::from(t))),
        None => Err(actix_web::error::ErrorNotFound("Trait not found")),
    }
}

/// POST /traits
pub async fn create_trait(
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
    payload: web::Json<CreateTraitRequest>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;

    let name = validate_name(&payload.name, "Trait name").map_err(validation_error)?;
    let color = validate_hex_color(&payload.color).map_err(validation_error)?;
    let slug = payload.slug.clone().unwrap_or_else(|| slugify(&name));
    validate_slug(&slug).map_err(validation_error)?;

    if slug_taken(db.as_ref(), user_id, &slug, None).await? {
        return Err(actix_web::error::ErrorConflict(
            "Trait with this slug already exists",
        ));
    }

    let now = Utc::now();
    let new_trait = habit_trait::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        slug: Set(slug),
        color: Set(color),
        description: Set(payload.description.clone()),
        user_id: Set(Some(user_id)),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let created = new_trait.insert(db.as_ref()).await.map_err(db_error)?;
    log::info!("✅ Trait '{}' created for user {}", created.slug, user_id);

    Ok(HttpResponse::Created().json(TraitResponse::from(created)))
}

/// PUT /traits/:id
pub async fn update_trait(
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
    payload: web::Json<UpdateTraitRequest>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let existing = find_owned_trait(db.as_ref(), user_id, path.into_inner()).await?;
    let trait_id = existing.id;

    let mut active: habit_trait::ActiveModel = existing.into();

    if let Some(name) = &payload.name {
        active.name = Set(validate_name(name, "Trait name").map_err(validation_error)?);
    }
    if let Some(color) = &payload.color {
        active.color = Set(validate_hex_color(color).map_err(validation_error)?);
    }
    if let Some(slug) = &payload.slug {
        validate_slug(slug).map_err(validation_error)?;
        if slug_taken(db.as_ref(), user_id, slug, Some(trait_id)).await? {
            return Err(actix_web::error::ErrorConflict(
                "Trait with this slug already exists",
            ));
        }
        active.slug = Set(slug.clone());
    }
    if let Some(description) = &payload.description {
        active.description = Set(description.clone());
    }
    active.updated_at = Set(Utc::now());

    let updated = active.update(db.as_ref()).await.map_err(db_error)?;
    Ok(HttpResponse::Ok().json(TraitResponse::from(updated)))
}

/// DELETE /traits/:id
/// Habits that used the trait keep existing without one
pub async fn delete_trait(
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let existing = find_owned_trait(db.as_ref(), user_id, path.into_inner()).await?;

    let txn = db.begin().await.map_err(db_error)?;

    let cleared = habit::Entity::update_many()
        .col_expr(habit::Column::TraitId, Expr::value(Option::<Uuid>::None))
        .col_expr(habit::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(habit::Column::TraitId.eq(existing.id))
        .exec(&txn)
        .await
        .map_err(db_error)?;

    habit_trait::Entity::delete_by_id(existing.id)
        .exec(&txn)
        .await
        .map_err(db_error)?;

    txn.commit().await.map_err(db_error)?;

    log::info!(
        "🗑️  Trait '{}' deleted, {} habits unassigned",
        existing.slug,
        cleared.rows_affected
    );

    Ok(HttpResponse::NoContent().finish())
}
