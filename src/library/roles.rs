//! Roles and their permission sets.

use crate::auth::ROLE_MANAGE;
use crate::db::{Database, Role, User};
use crate::error::{AppError, Result};
use crate::library::{non_blank, require_permission};
use serde::Deserialize;

/// Roles seeded at startup; they cannot be removed.
const BUILTIN_ROLES: &[&str] = &["admin", "user"];

/// Body of a role creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRole {
    /// Unique name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Permissions as `module.action`.
    #[serde(default)]
    pub permissions: Vec<String>,
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 32
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Split `module.action`, rejecting anything else.
pub fn parse_permission(permission: &str) -> Result<(String, String)> {
    match permission.trim().split_once('.') {
        Some((module, action)) if is_identifier(module) && is_identifier(action) => {
            Ok((module.to_string(), action.to_string()))
        }
        _ => Err(AppError::Validation(format!(
            "invalid permission '{}', expected module.action",
            permission
        ))),
    }
}

/// All roles with their permissions.
pub fn list(db: &Database) -> Result<Vec<Role>> {
    db.list_roles()
}

/// Create a role.
pub fn create(db: &Database, caller: &User, req: CreateRole) -> Result<i64> {
    require_permission(db, caller, ROLE_MANAGE)?;

    let name = req.name.trim();
    if !is_identifier(name) {
        return Err(AppError::Validation(
            "Role name must be 1-32 letters, numbers, _ or -".to_string(),
        ));
    }
    let permissions = req
        .permissions
        .iter()
        .map(|p| parse_permission(p))
        .collect::<Result<Vec<_>>>()?;
    let description = non_blank(req.description);

    let id = db.create_role(name, description.as_deref(), &permissions)?;

    tracing::info!(role_id = id, name = %name, permissions = permissions.len(), "Role created");
    Ok(id)
}

/// Delete a role nobody holds.
pub fn delete(db: &Database, caller: &User, name: &str) -> Result<()> {
    require_permission(db, caller, ROLE_MANAGE)?;
    if BUILTIN_ROLES.contains(&name) {
        return Err(AppError::Validation(format!(
            "Role '{}' is built in and cannot be deleted",
            name
        )));
    }

    if !db.delete_role(name)? {
        return Err(AppError::NotFound("Role not exist".to_string()));
    }

    tracing::info!(name = %name, "Role deleted");
    Ok(())
}
