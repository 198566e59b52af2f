//! Domain operations behind the API.
//!
//! Each submodule validates input, checks the caller's rights and then
//! calls into [`Database`]. Handlers stay thin; everything here is usable
//! without HTTP, which is how the CLI and the tests drive it.

pub mod author;
pub mod chapter;
pub mod group;
pub mod image;
pub mod likes;
pub mod roles;
pub mod user;

use crate::db::{Database, User};
use crate::error::{AppError, Result};

/// Fail with 403 unless the user's role grants `permission`.
pub fn require_permission(db: &Database, user: &User, permission: &str) -> Result<()> {
    if db.user_has_permission(user.id, permission)? {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "Missing permission: {}",
            permission
        )))
    }
}

/// Owners may change their own entity; anyone else needs `permission`.
pub fn ensure_owner_or_permission(
    db: &Database,
    user: &User,
    owner_id: i64,
    permission: &str,
) -> Result<()> {
    if user.id == owner_id {
        return Ok(());
    }
    require_permission(db, user, permission)
}

/// `(limit, offset)` of a 1-based page. Page 0 counts as the first.
pub fn page_window(page: Option<u32>, per_page: u32) -> (i64, i64) {
    let page = page.unwrap_or(1).max(1) as i64;
    let per_page = per_page.max(1) as i64;
    (per_page, (page - 1) * per_page)
}

/// Check that an image reference points at a registered image.
pub fn ensure_image(db: &Database, image_id: i64) -> Result<()> {
    if db.image_exists(image_id)? {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "image {} does not exist",
            image_id
        )))
    }
}

/// Trim and drop empty strings, so blank input reads as "not provided".
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
