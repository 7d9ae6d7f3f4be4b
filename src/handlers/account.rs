use actix_web::{web, HttpResponse, Responder};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde::{Deserialize, Serialize};

use crate::handlers::{db_error, deserialize_some, load_profile};
use crate::middleware::auth::Claims;
use crate::models::profile;
use crate::services::calendar::WeekStart;

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub first_day_of_week: WeekStart,
    pub created_at: String,
    pub updated_at: String,
}

impl From<profile::Model> for AccountResponse {
    fn from(model: profile::Model) -> Self {
        Self {
            id: model.id.to_string(),
            first_day_of_week: model.week_start(),
            email: model.email,
            name: model.name,
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateAccountRequest {
    #[serde(default, deserialize_with = "deserialize_some")]
    pub name: Option<Option<String>>,
    pub first_day_of_week: Option<WeekStart>,
}

/// GET /account
pub async fn get_account(
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let account = load_profile(db.get_ref(), user_id).await?;

    Ok(HttpResponse::Ok().json(AccountResponse::from(account)))
}

/// PUT /account
/// Update display name and first-day-of-week preference
pub async fn update_account(
    db: web::Data<DatabaseConnection>,
    user_claims: web::ReqData<Claims>,
    payload: web::Json<UpdateAccountRequest>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let account = load_profile(db.get_ref(), user_id).await?;

    let mut account: profile::ActiveModel = account.into();

    if let Some(name) = &payload.name {
        let name = name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        account.name = Set(name);
    }

    if let Some(first_day_of_week) = payload.first_day_of_week {
        log::info!("📅 User {} now starts weeks on {}", user_id, first_day_of_week.as_str());
        account.first_day_of_week = Set(first_day_of_week.into());
    }

    account.updated_at = Set(chrono::Utc::now());

    let updated = account.update(db.get_ref()).await.map_err(db_error)?;

    Ok(HttpResponse::Ok().json(AccountResponse::from(updated)))
}
