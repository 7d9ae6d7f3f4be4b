pub mod account;
pub mod auth;
pub mod calendar;
pub mod files;
pub mod habits;
pub mod notes;
pub mod occurrences;
pub mod stats;
pub mod traits;

use actix_web::error::{
    ErrorBadRequest, ErrorInternalServerError, ErrorPayloadTooLarge, ErrorUnsupportedMediaType,
};
use actix_web::HttpRequest;
use chrono::NaiveDate;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::models::profile;
use crate::services::calendar::{parse_sql_date, CalendarError};
use crate::services::storage::StorageError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub(crate) fn db_error(e: DbErr) -> actix_web::Error {
    log::error!("Database error: {}", e);
    ErrorInternalServerError("Database error")
}

pub(crate) fn validation_error(e: anyhow::Error) -> actix_web::Error {
    log::warn!("Validation failed: {}", e);
    ErrorBadRequest(e.to_string())
}

pub(crate) fn calendar_error(e: CalendarError) -> actix_web::Error {
    log::warn!("Invalid calendar input: {}", e);
    ErrorBadRequest(e.to_string())
}

pub(crate) fn storage_error(e: StorageError) -> actix_web::Error {
    match e {
        StorageError::UnsupportedContentType(_) => ErrorUnsupportedMediaType(e.to_string()),
        StorageError::TooLarge { .. } => ErrorPayloadTooLarge(e.to_string()),
        StorageError::Empty | StorageError::InvalidPath(_) => ErrorBadRequest(e.to_string()),
        StorageError::Io(ref io) => {
            log::error!("Storage error: {}", io);
            ErrorInternalServerError("Storage error")
        }
    }
}

/// Optional `from`/`to` bounds of a date filter
pub(crate) type DateWindow = (Option<NaiveDate>, Option<NaiveDate>);

/// Parse `YYYY-MM-DD` bounds; an inverted window is a 400
pub(crate) fn parse_date_window(
    from: Option<&str>,
    to: Option<&str>,
) -> Result<DateWindow, actix_web::Error> {
    let from = from.map(parse_sql_date).transpose().map_err(calendar_error)?;
    let to = to.map(parse_sql_date).transpose().map_err(calendar_error)?;
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(ErrorBadRequest("'from' must not be after 'to'"));
        }
    }
    Ok((from, to))
}

/// Profile of the authenticated user; 401 if the account is gone
pub(crate) async fn load_profile(
    db: &DatabaseConnection,
    user_id: Uuid,
) -> Result<profile::Model, actix_web::Error> {
    profile::Entity::find_by_id(user_id)
        .one(db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| actix_web::error::ErrorUnauthorized("Account no longer exists"))
}

pub(crate) fn content_type(req: &HttpRequest) -> String {
    req.headers()
        .get(actix_web::http::header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("")
        .to_string()
}

/// Public URL of a stored icon or photo
pub(crate) fn file_url(path: &str) -> String {
    format!("/files/{}", path)
}

/// Lets update payloads tell "absent" (`None`) apart from an explicit
/// `null` (`Some(None)`)
pub(crate) fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "deserialize_some")]
        trait_id: Option<Option<Uuid>>,
    }

    #[test]
    fn test_deserialize_some_distinguishes_null_from_missing() {
        let missing: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(missing.trait_id, None);

        let cleared: Patch = serde_json::from_str(r#"{"trait_id": null}"#).unwrap();
        assert_eq!(cleared.trait_id, Some(None));

        let id = Uuid::new_v4();
        let set: Patch = serde_json::from_str(&format!(r#"{{"trait_id": "{}"}}"#, id)).unwrap();
        assert_eq!(set.trait_id, Some(Some(id)));
    }

    #[test]
    fn test_date_window() {
        let day = |d: u32| NaiveDate::from_ymd_opt(2022, 3, d).unwrap();

        assert_eq!(parse_date_window(None, None).unwrap(), (None, None));
        assert_eq!(
            parse_date_window(Some("2022-03-01"), Some("2022-03-31")).unwrap(),
            (Some(day(1)), Some(day(31)))
        );
        assert_eq!(
            parse_date_window(Some("2022-03-05"), Some("2022-03-05")).unwrap(),
            (Some(day(5)), Some(day(5)))
        );
        assert_eq!(
            parse_date_window(None, Some("2022-03-02")).unwrap(),
            (None, Some(day(2)))
        );

        assert!(parse_date_window(Some("2022-03-31"), Some("2022-03-01")).is_err());
        assert!(parse_date_window(Some("2022-13-01"), None).is_err());
    }

    #[test]
    fn test_storage_errors_map_to_statuses() {
        use actix_web::http::StatusCode;

        let status = |e: StorageError| storage_error(e).as_response_error().status_code();
        assert_eq!(
            status(StorageError::UnsupportedContentType("text/plain".into())),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            status(StorageError::TooLarge { size: 2, limit: 1 }),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(status(StorageError::Empty), StatusCode::BAD_REQUEST);
    }
}
