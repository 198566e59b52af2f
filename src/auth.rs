//! Authentication module.

use crate::db::{Database, NewUser, Session, User, now_timestamp};
use crate::error::{AppError, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

/// Manage any author.
pub const AUTHOR_MANAGE: &str = "book_author.manage";
/// Create book groups.
pub const GROUP_CREATE: &str = "book_group.create";
/// Edit or delete any book group.
pub const GROUP_MANAGE: &str = "book_group.manage";
/// Upload chapters to owned groups.
pub const CHAPTER_CREATE: &str = "book_chapter.create";
/// Edit or delete any chapter, upload to any group.
pub const CHAPTER_MANAGE: &str = "book_chapter.manage";
/// Delete users.
pub const USER_MANAGE: &str = "user.manage";
/// Create and delete roles.
pub const ROLE_MANAGE: &str = "role.manage";
/// Register images.
pub const IMAGE_MANAGE: &str = "image.manage";

/// Permissions of the seeded `admin` role.
pub const ADMIN_PERMISSIONS: &[&str] = &[
    AUTHOR_MANAGE,
    GROUP_CREATE,
    GROUP_MANAGE,
    CHAPTER_CREATE,
    CHAPTER_MANAGE,
    USER_MANAGE,
    ROLE_MANAGE,
    IMAGE_MANAGE,
];

/// Permissions of the seeded `user` role.
pub const USER_PERMISSIONS: &[&str] = &[GROUP_CREATE, CHAPTER_CREATE];

/// Hash a password using Argon2.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against a hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Generate a secure random token.
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

pub(crate) fn check_username(username: &str) -> Result<()> {
    if username.is_empty() || username.chars().count() > 64 {
        return Err(AppError::Validation(
            "Username must be 1-64 characters".to_string(),
        ));
    }

    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AppError::Validation(
            "Username can only contain letters, numbers, _ and -".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_email(email: &str) -> Result<()> {
    let valid = email.len() <= 254
        && !email.chars().any(char::is_whitespace)
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }
    Ok(())
}

fn check_password(password: &str) -> Result<()> {
    if password.len() < 4 {
        return Err(AppError::Validation(
            "Password must be at least 4 characters".to_string(),
        ));
    }
    Ok(())
}

/// Authentication service.
pub struct AuthService {
    db: Database,
    session_duration_days: u32,
    registration_enabled: bool,
}

impl AuthService {
    /// Create a new auth service.
    pub fn new(db: Database, session_duration_days: u32, registration_enabled: bool) -> Self {
        Self {
            db,
            session_duration_days,
            registration_enabled,
        }
    }

    /// Register a new user with the default role.
    pub fn register(&self, username: &str, email: &str, password: &str) -> Result<User> {
        if !self.registration_enabled {
            return Err(AppError::Forbidden("Registration is disabled".to_string()));
        }

        self.create_user(username, email, password, "user")
    }

    /// Create a new user (admin function).
    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: &str,
    ) -> Result<User> {
        check_username(username)?;
        check_email(email)?;
        check_password(password)?;

        if self.db.username_exists(username)? {
            return Err(AppError::Conflict(format!(
                "Username '{}' already exists",
                username
            )));
        }
        if self.db.email_exists(email)? {
            return Err(AppError::Conflict(format!(
                "Email '{}' already exists",
                email
            )));
        }

        let user = self.db.create_user(&NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: hash_password(password)?,
            role: role.to_string(),
        })?;

        tracing::info!(user_id = user.id, username = %user.username, role = %user.role, "User created");
        Ok(user)
    }

    /// Login by username or email and create a session.
    pub fn login(&self, login: &str, password: &str) -> Result<(User, String)> {
        let user = self
            .db
            .get_user_by_login(login)?
            .ok_or_else(|| AppError::Unauthorized("Invalid username or password".to_string()))?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AppError::Unauthorized(
                "Invalid username or password".to_string(),
            ));
        }

        // Update last login
        self.db.update_user_last_login(user.id)?;

        // Create session
        let token = generate_token();
        let expires_at = now_timestamp() + (self.session_duration_days as i64 * 24 * 60 * 60);

        let session = Session {
            token: token.clone(),
            user_id: user.id,
            expires_at,
        };

        self.db.create_session(&session)?;

        Ok((user, token))
    }

    /// Validate a session token and return the user.
    pub fn validate_token(&self, token: &str) -> Result<Option<User>> {
        let session = match self.db.get_session(token)? {
            Some(s) => s,
            None => return Ok(None),
        };

        // Check expiration
        if session.expires_at < now_timestamp() {
            self.db.delete_session(token)?;
            return Ok(None);
        }

        self.db.get_user_by_id(session.user_id)
    }

    /// Logout (delete session).
    pub fn logout(&self, token: &str) -> Result<()> {
        self.db.delete_session(token)
    }

    /// Change a password after checking the current one.
    pub fn change_own_password(&self, user: &User, current: &str, new_password: &str) -> Result<()> {
        if !verify_password(current, &user.password_hash)? {
            return Err(AppError::Unauthorized(
                "Current password is incorrect".to_string(),
            ));
        }
        self.change_password(&user.username, new_password)?;
        Ok(())
    }

    /// Change user password.
    pub fn change_password(&self, username: &str, new_password: &str) -> Result<bool> {
        check_password(new_password)?;

        let password_hash = hash_password(new_password)?;
        self.db.update_user_password(username, &password_hash)
    }

    /// Delete a user.
    pub fn delete_user(&self, username: &str) -> Result<bool> {
        self.db.delete_user(username)
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.db.list_users()
    }
}
