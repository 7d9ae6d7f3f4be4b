use actix_files::NamedFile;
use actix_web::{web, Responder};

use crate::handlers::storage_error;
use crate::middleware::auth::Claims;
use crate::services::storage::{FileStore, StoredPath};

/// GET /files/:bucket/:user_id/:filename
/// Serve a stored icon or photo to its owner
pub async fn serve_file(
    store: web::Data<dyn FileStore>,
    user_claims: web::ReqData<Claims>,
    path: web::Path<(String, String, String)>,
) -> Result<impl Responder, actix_web::Error> {
    let user_id = user_claims.user_id()?;
    let (bucket, owner_id, filename) = path.into_inner();
    let relative = format!("{}/{}/{}", bucket, owner_id, filename);

    let stored = StoredPath::parse(&relative).map_err(storage_error)?;

    // Someone else's file looks exactly like a missing one
    if stored.owner_id != user_id {
        log::warn!("User {} asked for a file owned by {}", user_id, stored.owner_id);
        return Err(actix_web::error::ErrorNotFound("File not found"));
    }

    let file_path = store.resolve(&relative).map_err(storage_error)?;
    if !file_path.exists() {
        return Err(actix_web::error::ErrorNotFound("File not found"));
    }

    let named_file = NamedFile::open_async(&file_path).await.map_err(|e| {
        log::error!("Failed to open file {}: {}", file_path.display(), e);
        actix_web::error::ErrorInternalServerError("Failed to serve file")
    })?;

    Ok(named_file)
}
