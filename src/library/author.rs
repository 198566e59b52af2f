//! Author lifecycle.

use crate::auth::AUTHOR_MANAGE;
use crate::db::{BookAuthor, Database, User};
use crate::error::{AppError, Result};
use crate::library::{ensure_image, non_blank, page_window, require_permission};
use crate::validation::{check_author_description, check_author_name};
use serde::Deserialize;

/// Author fields as sent by clients. On update, empty fields keep the
/// stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorInput {
    /// Unique name.
    #[serde(default)]
    pub name: String,
    /// Short description.
    #[serde(default)]
    pub description: Option<String>,
    /// Avatar image ID; 0 means none.
    #[serde(default)]
    pub avatar_id: Option<i64>,
}

fn find(db: &Database, id: i64) -> Result<BookAuthor> {
    db.get_author(id)?
        .ok_or_else(|| AppError::NotFound("Author not exist".to_string()))
}

/// Create an author.
pub fn create(db: &Database, caller: &User, input: AuthorInput) -> Result<i64> {
    require_permission(db, caller, AUTHOR_MANAGE)?;

    let name = input.name.trim().to_string();
    check_author_name(&name)?;
    let description = non_blank(input.description);
    if let Some(description) = &description {
        check_author_description(description)?;
    }

    if db.author_exists_by_name(&name)? {
        return Err(AppError::Conflict("name was exist".to_string()));
    }

    let avatar_image_id = input.avatar_id.filter(|id| *id > 0);
    if let Some(image_id) = avatar_image_id {
        ensure_image(db, image_id)?;
    }

    let id = db.create_author(&name, description.as_deref(), avatar_image_id)?;

    tracing::info!(author_id = id, name = %name, "Author created");
    Ok(id)
}

/// Get author by ID.
pub fn get(db: &Database, id: i64) -> Result<BookAuthor> {
    find(db, id)
}

/// One page of authors.
pub fn list(db: &Database, page: Option<u32>, per_page: u32) -> Result<Vec<BookAuthor>> {
    let (limit, offset) = page_window(page, per_page);
    db.list_authors(limit, offset)
}

/// Update an author, keeping stored values for empty fields.
pub fn update(db: &Database, caller: &User, id: i64, input: AuthorInput) -> Result<()> {
    require_permission(db, caller, AUTHOR_MANAGE)?;
    let old = find(db, id)?;

    let name = non_blank(Some(input.name)).unwrap_or(old.name);
    check_author_name(&name)?;
    let description = non_blank(input.description).or(old.description);
    if let Some(description) = &description {
        check_author_description(description)?;
    }

    if db.author_name_taken_by_other(&name, id)? {
        return Err(AppError::Conflict("name was exist".to_string()));
    }

    let avatar_image_id = match input.avatar_id.filter(|id| *id > 0) {
        Some(image_id) => {
            ensure_image(db, image_id)?;
            Some(image_id)
        }
        None => old.avatar_image_id,
    };

    db.update_author(id, &name, description.as_deref(), avatar_image_id)?;

    tracing::info!(author_id = id, "Author updated");
    Ok(())
}

/// Delete an author and every book group linked to it.
pub fn delete(db: &Database, caller: &User, id: i64) -> Result<()> {
    require_permission(db, caller, AUTHOR_MANAGE)?;
    find(db, id)?;

    let groups = db.delete_author_cascade(id)?;

    tracing::info!(author_id = id, groups = ?groups, "Author deleted");
    Ok(())
}
