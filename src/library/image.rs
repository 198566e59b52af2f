//! Image metadata registration. The files themselves are stored elsewhere.

use crate::auth::IMAGE_MANAGE;
use crate::db::{Database, Image, User};
use crate::error::{AppError, Result};
use crate::library::{non_blank, require_permission};
use crate::validation::has_control_characters;
use serde::Deserialize;

/// Image metadata sent by clients.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterImage {
    /// Storage path or URL.
    pub path: String,
    /// MD5 hex digest.
    #[serde(default)]
    pub md5: Option<String>,
    /// SHA-1 hex digest.
    #[serde(default)]
    pub sha1: Option<String>,
}

fn check_digest(kind: &str, digest: Option<String>, len: usize) -> Result<Option<String>> {
    match non_blank(digest) {
        None => Ok(None),
        Some(d) if d.len() == len && d.chars().all(|c| c.is_ascii_hexdigit()) => {
            Ok(Some(d.to_ascii_lowercase()))
        }
        Some(_) => Err(AppError::Validation(format!(
            "{} must be {} hex characters",
            kind, len
        ))),
    }
}

/// Validate and store image metadata.
pub fn create(db: &Database, req: RegisterImage) -> Result<Image> {
    let path = req.path.trim();
    if path.is_empty() || has_control_characters(path) || path.contains(['\r', '\n']) {
        return Err(AppError::Validation("invalid image path".to_string()));
    }
    let md5 = check_digest("md5", req.md5, 32)?;
    let sha1 = check_digest("sha1", req.sha1, 40)?;

    let image = db.create_image(path, md5.as_deref(), sha1.as_deref())?;

    tracing::info!(image_id = image.id, path = %image.path, "Image registered");
    Ok(image)
}

/// Get image metadata by ID.
pub fn get(db: &Database, id: i64) -> Result<Image> {
    db.get_image(id)?
        .ok_or_else(|| AppError::NotFound("Image not exist".to_string()))
}

/// Register an image on behalf of a caller holding `image.manage`.
pub fn register(db: &Database, caller: &User, req: RegisterImage) -> Result<Image> {
    require_permission(db, caller, IMAGE_MANAGE)?;
    create(db, req)
}
