//! Profile, favorites, search and user removal.

use crate::auth::{USER_MANAGE, check_email, check_username};
use crate::db::{Database, User, UserSearchHit};
use crate::error::{AppError, Result};
use crate::library::{non_blank, require_permission};
use crate::validation::has_control_characters;
use serde::{Deserialize, Serialize};

/// Longest accepted profile summary.
const MAX_SUMMARY: usize = 500;

/// Profile update. Omitted or empty fields keep the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserInfo {
    /// New email.
    #[serde(default)]
    pub email: Option<String>,
    /// New username.
    #[serde(default)]
    pub username: Option<String>,
    /// New summary.
    #[serde(default)]
    pub summary: Option<String>,
}

/// Own profile with the permissions of the role.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    /// The user.
    #[serde(flatten)]
    pub user: User,
    /// Granted `module.action` permissions.
    pub permissions: Vec<String>,
}

/// Profile of the caller.
pub fn profile(db: &Database, user: User) -> Result<Profile> {
    let permissions = db.user_permissions(user.id)?;
    Ok(Profile { user, permissions })
}

/// Update email, username and summary of the caller.
pub fn update_info(db: &Database, caller: &User, req: UpdateUserInfo) -> Result<()> {
    let email = non_blank(req.email).unwrap_or_else(|| caller.email.clone());
    let username = non_blank(req.username).unwrap_or_else(|| caller.username.clone());
    let summary = non_blank(req.summary).or_else(|| caller.summary.clone());

    if email != caller.email {
        check_email(&email)?;
        if db.email_exists(&email)? {
            return Err(AppError::Conflict(format!(
                "Email '{}' already exists",
                email
            )));
        }
    }
    if username != caller.username {
        check_username(&username)?;
        if db.username_exists(&username)? {
            return Err(AppError::Conflict(format!(
                "Username '{}' already exists",
                username
            )));
        }
    }
    if summary
        .as_deref()
        .is_some_and(|s| has_control_characters(s) || s.chars().count() > MAX_SUMMARY)
    {
        return Err(AppError::Validation(format!(
            "summary must be at most {} characters without control characters",
            MAX_SUMMARY
        )));
    }

    db.update_user_info(caller.id, &email, &username, summary.as_deref())?;

    tracing::info!(user_id = caller.id, "User info updated");
    Ok(())
}

/// Users whose name contains `query`, at most five.
pub fn search(db: &Database, query: &str) -> Result<Vec<UserSearchHit>> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }
    db.search_users(query)
}

/// Add a group to the caller's favorites and return the new list.
pub fn add_favorite(db: &Database, caller: &User, group_id: i64) -> Result<Vec<i64>> {
    if !db.book_group_exists(group_id)? {
        return Err(AppError::NotFound("Book group not exist".to_string()));
    }

    db.add_favorite(caller.id, group_id)
}

/// Remove a group from the caller's favorites and return the new list.
pub fn remove_favorite(db: &Database, caller: &User, group_id: i64) -> Result<Vec<i64>> {
    db.remove_favorite(caller.id, group_id)
}

/// Delete a user account.
pub fn delete(db: &Database, caller: &User, username: &str) -> Result<()> {
    require_permission(db, caller, USER_MANAGE)?;
    if caller.username == username {
        return Err(AppError::Validation(
            "Cannot delete your own account".to_string(),
        ));
    }

    if !db.delete_user(username)? {
        return Err(AppError::NotFound("User not exist".to_string()));
    }

    tracing::info!(username = %username, deleted_by = caller.id, "User deleted");
    Ok(())
}
