use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handlers::{load_profile, ErrorResponse};
use crate::models::profile;
use crate::services::calendar::WeekStart;
use crate::utils::auth::{create_jwt, hash_password, verify_password, Claims};
use crate::utils::config::Config;
use crate::utils::validators::{validate_email, validate_password};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub first_day_of_week: Option<WeekStart>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: String,
    pub email: String,
    pub expires_at: String,
}

fn issue_token(user: &profile::Model, config: &Config) -> HttpResponse {
    match create_jwt(user.id, &config.jwt_secret, config.jwt_expiration_hours) {
        Ok(token) => {
            log::info!("🎫 JWT token generated for '{}'", user.email);
            let expires_at = Utc::now() + chrono::Duration::hours(config.jwt_expiration_hours);
            HttpResponse::Ok().json(AuthResponse {
                token,
                user_id: user.id.to_string(),
                email: user.email.clone(),
                expires_at: expires_at.to_rfc3339(),
            })
        }
        Err(e) => {
            log::error!("❌ Failed to generate token: {}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: format!("Failed to generate token: {}", e),
            })
        }
    }
}

/// POST /auth/register
pub async fn register(
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
    req: web::Json<RegisterRequest>,
) -> impl Responder {
    if !config.allow_registration {
        log::warn!("❌ Registration attempt rejected - registration is disabled");
        return HttpResponse::Forbidden().json(ErrorResponse {
            error: "Registration is currently disabled".to_string(),
        });
    }

    let email = match validate_email(&req.email) {
        Ok(email) => email,
        Err(e) => {
            return HttpResponse::BadRequest().json(ErrorResponse {
                error: e.to_string(),
            })
        }
    };
    if let Err(e) = validate_password(&req.password) {
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: e.to_string(),
        });
    }

    log::info!("📝 Registration attempt for {}", email);

    let existing_user = profile::Entity::find()
        .filter(profile::Column::Email.eq(&email))
        .one(db.get_ref())
        .await;

    match existing_user {
        Ok(Some(_)) => {
            log::warn!("❌ Registration failed - '{}' already exists", email);
            return HttpResponse::Conflict().json(ErrorResponse {
                error: "An account with this email already exists".to_string(),
            });
        }
        Err(e) => {
            log::error!("❌ Database error during registration: {}", e);
            return HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Database error".to_string(),
            });
        }
        Ok(None) => {}
    }

    let password_hash = match hash_password(&req.password) {
        Ok(hash) => hash,
        Err(e) => {
            log::error!("❌ Failed to hash password: {}", e);
            return HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to hash password".to_string(),
            });
        }
    };

    let now = Utc::now();
    let new_user = profile::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email),
        name: Set(req
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)),
        password_hash: Set(password_hash),
        first_day_of_week: Set(req.first_day_of_week.unwrap_or_default().into()),
        created_at: Set(now),
        updated_at: Set(now),
    };

    match new_user.insert(db.get_ref()).await {
        Ok(user) => {
            log::info!("✅ Account '{}' created (ID: {})", user.email, user.id);
            let mut response = issue_token(&user, &config);
            if response.status().is_success() {
                *response.status_mut() = actix_web::http::StatusCode::CREATED;
            }
            response
        }
        Err(e) => {
            log::error!("❌ Failed to create account: {}", e);
            account_insert_failure(e.sql_err())
        }
    }
}

/// A concurrent registration can pass the lookup above and still lose on
/// the unique email index
fn account_insert_failure(sql_err: Option<SqlErr>) -> HttpResponse {
    match sql_err {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            HttpResponse::Conflict().json(ErrorResponse {
                error: "An account with this email already exists".to_string(),
            })
        }
        _ => HttpResponse::InternalServerError().json(ErrorResponse {
            error: "Failed to create account".to_string(),
        }),
    }
}

/// POST /auth/login
pub async fn login(
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
    req: web::Json<LoginRequest>,
) -> impl Responder {
    let email = req.email.trim().to_lowercase();
    log::info!("🔐 Login attempt for {}", email);

    let user = profile::Entity::find()
        .filter(profile::Column::Email.eq(&email))
        .one(db.get_ref())
        .await;

    let invalid_credentials = || {
        HttpResponse::Unauthorized().json(ErrorResponse {
            error: "Invalid credentials".to_string(),
        })
    };

    match user {
        Ok(Some(user)) => match verify_password(&req.password, &user.password_hash) {
            Ok(true) => {
                log::info!("✅ Password verified for '{}'", email);
                issue_token(&user, &config)
            }
            Ok(false) => {
                log::warn!("❌ Invalid password for '{}'", email);
                invalid_credentials()
            }
            Err(e) => {
                log::error!("❌ Failed to verify password: {}", e);
                HttpResponse::InternalServerError().json(ErrorResponse {
                    error: "Failed to verify password".to_string(),
                })
            }
        },
        Ok(None) => {
            log::warn!("❌ Account '{}' not found", email);
            invalid_credentials()
        }
        Err(e) => {
            log::error!("❌ Database error during login: {}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Database error".to_string(),
            })
        }
    }
}

/// POST /auth/refresh
/// Exchange a still-valid token for a fresh one
pub async fn refresh(
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
    user_claims: web::ReqData<Claims>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let user = load_profile(db.get_ref(), user_id).await?;

    log::info!("🔄 Session refresh for '{}'", user.email);
    Ok(issue_token(&user, &config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use sea_orm::DbErr;

    #[test]
    fn test_duplicate_email_on_insert_is_conflict() {
        let duplicate = Some(SqlErr::UniqueConstraintViolation(
            "duplicate key value violates unique constraint \"profiles_email_key\"".to_string(),
        ));
        assert_eq!(account_insert_failure(duplicate).status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_other_insert_failures_are_server_errors() {
        let other = DbErr::Custom("connection reset".to_string());
        assert_eq!(
            account_insert_failure(other.sql_err()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let foreign_key = Some(SqlErr::ForeignKeyConstraintViolation("fk".to_string()));
        assert_eq!(
            account_insert_failure(foreign_key).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
