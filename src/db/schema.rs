use crate::auth::{ADMIN_PERMISSIONS, USER_PERMISSIONS};
use crate::db::*;
use crate::error::{AppError, Result, from_sqlite};
use parking_lot::Mutex;
use rusqlite::Error::FromSqlConversionFailure;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Arc;

/// Columns selected for a [`User`], joined with its role.
const USER_SELECT: &str = "SELECT u.id, u.username, u.email, u.password_hash, u.summary,
        u.avatar_image_id, u.role_id, r.name, u.favorite_list, u.created_at, u.last_login
     FROM users u JOIN roles r ON r.id = u.role_id";

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    pub(super) conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize database schema and seed the default roles.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Roles and their module.action permissions
            CREATE TABLE IF NOT EXISTS roles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL,
                description TEXT
            );

            CREATE TABLE IF NOT EXISTS role_permissions (
                role_id INTEGER NOT NULL,
                module TEXT NOT NULL,
                action TEXT NOT NULL,
                PRIMARY KEY (role_id, module, action),
                FOREIGN KEY (role_id) REFERENCES roles(id)
            );

            -- Image metadata (files live in external storage)
            CREATE TABLE IF NOT EXISTS images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL,
                md5 TEXT,
                sha1 TEXT,
                created_at INTEGER NOT NULL
            );

            -- Users table
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                summary TEXT,
                avatar_image_id INTEGER,
                role_id INTEGER NOT NULL,
                favorite_list TEXT,
                created_at INTEGER NOT NULL,
                last_login INTEGER,
                FOREIGN KEY (avatar_image_id) REFERENCES images(id),
                FOREIGN KEY (role_id) REFERENCES roles(id)
            );

            -- Sessions table
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            );

            -- Authors
            CREATE TABLE IF NOT EXISTS book_authors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL,
                description TEXT,
                avatar_image_id INTEGER,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (avatar_image_id) REFERENCES images(id)
            );

            -- Book groups (series)
            CREATE TABLE IF NOT EXISTS book_groups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT,
                owner_id INTEGER NOT NULL,
                primary_cover_art_id INTEGER,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (owner_id) REFERENCES users(id),
                FOREIGN KEY (primary_cover_art_id) REFERENCES images(id)
            );

            CREATE TABLE IF NOT EXISTS book_group_authors (
                book_group_id INTEGER NOT NULL,
                book_author_id INTEGER NOT NULL,
                PRIMARY KEY (book_group_id, book_author_id),
                FOREIGN KEY (book_group_id) REFERENCES book_groups(id),
                FOREIGN KEY (book_author_id) REFERENCES book_authors(id)
            );

            CREATE TABLE IF NOT EXISTS book_group_arts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                book_group_id INTEGER NOT NULL,
                image_id INTEGER NOT NULL,
                FOREIGN KEY (book_group_id) REFERENCES book_groups(id),
                FOREIGN KEY (image_id) REFERENCES images(id)
            );

            -- Chapters
            CREATE TABLE IF NOT EXISTS book_chapters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                book_group_id INTEGER NOT NULL,
                owner_id INTEGER NOT NULL,
                chapter_number REAL NOT NULL CHECK (chapter_number >= 0),
                name TEXT,
                type TEXT NOT NULL CHECK (type IN ('hypertext', 'images')),
                text_content TEXT,
                created_at INTEGER NOT NULL,
                UNIQUE (book_group_id, chapter_number),
                FOREIGN KEY (book_group_id) REFERENCES book_groups(id),
                FOREIGN KEY (owner_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS book_chapter_images (
                book_chapter_id INTEGER NOT NULL,
                image_id INTEGER NOT NULL,
                rank INTEGER NOT NULL,
                PRIMARY KEY (book_chapter_id, rank),
                FOREIGN KEY (book_chapter_id) REFERENCES book_chapters(id),
                FOREIGN KEY (image_id) REFERENCES images(id)
            );

            CREATE TABLE IF NOT EXISTS book_chapter_views (
                book_chapter_id INTEGER NOT NULL,
                view_date TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (book_chapter_id, view_date),
                FOREIGN KEY (book_chapter_id) REFERENCES book_chapters(id)
            );

            -- Likes: one row per (user, group), point is +1 or -1
            CREATE TABLE IF NOT EXISTS book_group_likes (
                user_id INTEGER NOT NULL,
                book_group_id INTEGER NOT NULL,
                point INTEGER NOT NULL CHECK (point IN (-1, 1)),
                PRIMARY KEY (user_id, book_group_id),
                FOREIGN KEY (user_id) REFERENCES users(id),
                FOREIGN KEY (book_group_id) REFERENCES book_groups(id)
            );

            CREATE TABLE IF NOT EXISTS book_comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                book_group_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                content TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (book_group_id) REFERENCES book_groups(id),
                FOREIGN KEY (user_id) REFERENCES users(id)
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
            CREATE INDEX IF NOT EXISTS idx_groups_owner ON book_groups(owner_id);
            CREATE INDEX IF NOT EXISTS idx_group_authors_author ON book_group_authors(book_author_id);
            CREATE INDEX IF NOT EXISTS idx_chapters_group ON book_chapters(book_group_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_views_date ON book_chapter_views(view_date);
            CREATE INDEX IF NOT EXISTS idx_likes_group ON book_group_likes(book_group_id);
            CREATE INDEX IF NOT EXISTS idx_comments_group ON book_comments(book_group_id);

            INSERT OR IGNORE INTO roles (name, description) VALUES ('admin', 'Full access');
            INSERT OR IGNORE INTO roles (name, description) VALUES ('user', 'Reader and uploader');
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        for (role, permissions) in [("admin", ADMIN_PERMISSIONS), ("user", USER_PERMISSIONS)] {
            for &permission in permissions {
                let (module, action) = permission.split_once('.').unwrap_or((permission, ""));
                conn.execute(
                    "INSERT OR IGNORE INTO role_permissions (role_id, module, action)
                     SELECT id, ?2, ?3 FROM roles WHERE name = ?1",
                    params![role, module, action],
                )
                .map_err(|e| AppError::Internal(format!("Failed to seed permissions: {}", e)))?;
            }
        }

        Ok(())
    }

    /// Helper to convert a row to User.
    fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        let favorites: Option<String> = row.get(8)?;
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            summary: row.get(4)?,
            avatar_image_id: row.get(5)?,
            role_id: row.get(6)?,
            role: row.get(7)?,
            favorite_list: parse_favorites(favorites.as_deref())
                .map_err(|e| FromSqlConversionFailure(8, Type::Text, Box::new(e)))?,
            created_at: row.get(9)?,
            last_login: row.get(10)?,
        })
    }

    // ========== USER OPERATIONS ==========

    /// Create a new user, returning the stored row.
    pub fn create_user(&self, user: &NewUser) -> Result<User> {
        let role_id = self
            .get_role_id(&user.role)?
            .ok_or_else(|| AppError::Validation(format!("Unknown role: {}", user.role)))?;

        let id = {
            let conn = self.conn.lock();
            conn.execute(
                "INSERT INTO users (username, email, password_hash, role_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user.username,
                    user.email,
                    user.password_hash,
                    role_id,
                    now_timestamp(),
                ],
            )
            .map_err(|e| {
                if e.to_string().contains("UNIQUE constraint") {
                    AppError::Conflict(format!(
                        "Username '{}' or email '{}' already exists",
                        user.username, user.email
                    ))
                } else {
                    AppError::Internal(format!("Failed to create user: {}", e))
                }
            })?;
            conn.last_insert_rowid()
        };

        self.get_user_by_id(id)?
            .ok_or_else(|| AppError::Internal("Created user vanished".to_string()))
    }

    /// Get user by username.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("{} WHERE u.username = ?1", USER_SELECT),
            params![username],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// Get user by username or email.
    pub fn get_user_by_login(&self, login: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "{} WHERE u.username = ?1 OR u.email = ?1 ORDER BY u.id LIMIT 1",
                USER_SELECT
            ),
            params![login],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// Get user by ID.
    pub fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("{} WHERE u.id = ?1", USER_SELECT),
            params![id],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!("{} ORDER BY u.username", USER_SELECT))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let users = stmt
            .query_map([], Self::row_to_user)
            .map_err(|e| AppError::Internal(format!("Failed to list users: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect users: {}", e)))?;

        Ok(users)
    }

    /// Check whether a username is taken.
    pub fn username_exists(&self, username: &str) -> Result<bool> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
            params![username],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Internal(format!("Failed to check username: {}", e)))
    }

    /// Check whether an email is taken.
    pub fn email_exists(&self, email: &str) -> Result<bool> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
            params![email],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Internal(format!("Failed to check email: {}", e)))
    }

    /// Search users whose name contains the query (case-insensitive, at most 5).
    pub fn search_users(&self, query: &str) -> Result<Vec<UserSearchHit>> {
        let pattern = format!("%{}%", escape_like(query));
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT u.id, u.username, i.path
                 FROM users u LEFT JOIN images i ON i.id = u.avatar_image_id
                 WHERE u.username LIKE ?1 ESCAPE '\\'
                 ORDER BY u.username
                 LIMIT 5",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let hits = stmt
            .query_map(params![pattern], |row| {
                Ok(UserSearchHit {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    avatar: row.get(2)?,
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to search users: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect users: {}", e)))?;

        Ok(hits)
    }

    /// Update profile fields.
    pub fn update_user_info(
        &self,
        id: i64,
        email: &str,
        username: &str,
        summary: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET email = ?2, username = ?3, summary = ?4 WHERE id = ?1",
            params![id, email, username, summary],
        )
        .map_err(|e| from_sqlite("Failed to update user", e))?;
        Ok(())
    }

    /// Append a group to a user's favorites unless already present.
    pub fn add_favorite(&self, user_id: i64, group_id: i64) -> Result<Vec<i64>> {
        self.update_favorites(user_id, |favorites| {
            if !favorites.contains(&group_id) {
                favorites.push(group_id);
            }
        })
    }

    /// Drop a group from a user's favorites.
    pub fn remove_favorite(&self, user_id: i64, group_id: i64) -> Result<Vec<i64>> {
        self.update_favorites(user_id, |favorites| favorites.retain(|&id| id != group_id))
    }

    fn update_favorites(
        &self,
        user_id: i64,
        edit: impl FnOnce(&mut Vec<i64>),
    ) -> Result<Vec<i64>> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to begin transaction: {}", e)))?;

        let stored: Option<String> = tx
            .query_row(
                "SELECT favorite_list FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Internal(format!("Failed to get favorites: {}", e)))?
            .ok_or_else(|| AppError::NotFound("User not exist".to_string()))?;

        let mut favorites = parse_favorites(stored.as_deref())
            .map_err(|e| AppError::Internal(format!("Failed to decode favorites: {}", e)))?;
        edit(&mut favorites);

        let json = serde_json::to_string(&favorites)
            .map_err(|e| AppError::Internal(format!("Failed to encode favorites: {}", e)))?;
        tx.execute(
            "UPDATE users SET favorite_list = ?2 WHERE id = ?1",
            params![user_id, json],
        )
        .map_err(|e| AppError::Internal(format!("Failed to update favorites: {}", e)))?;
        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to commit favorites: {}", e)))?;

        Ok(favorites)
    }

    /// Update user password.
    pub fn update_user_password(&self, username: &str, password_hash: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET password_hash = ?1 WHERE username = ?2",
                params![password_hash, username],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update password: {}", e)))?;
        Ok(rows > 0)
    }

    /// Update user last login.
    pub fn update_user_last_login(&self, user_id: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![now_timestamp(), user_id],
        )
        .map_err(|e| AppError::Internal(format!("Failed to update last login: {}", e)))?;
        Ok(())
    }

    /// Delete user with their sessions, votes and comments.
    ///
    /// Fails with a conflict while the user still owns groups or chapters.
    pub fn delete_user(&self, username: &str) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to begin transaction: {}", e)))?;

        let id: Option<i64> = tx
            .query_row(
                "SELECT id FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))?;

        let Some(id) = id else {
            return Ok(false);
        };

        for sql in [
            "DELETE FROM sessions WHERE user_id = ?1",
            "DELETE FROM book_group_likes WHERE user_id = ?1",
            "DELETE FROM book_comments WHERE user_id = ?1",
            "DELETE FROM users WHERE id = ?1",
        ] {
            tx.execute(sql, params![id])
                .map_err(|e| from_sqlite("Failed to delete user", e))?;
        }

        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to delete user: {}", e)))?;
        Ok(true)
    }

    // ========== SESSION OPERATIONS ==========

    /// Create session.
    pub fn create_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![session.token, session.user_id, session.expires_at],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create session: {}", e)))?;
        Ok(())
    }

    /// Get session by token.
    pub fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT token, user_id, expires_at FROM sessions WHERE token = ?1",
            params![token],
            |row| {
                Ok(Session {
                    token: row.get(0)?,
                    user_id: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get session: {}", e)))
    }

    /// Delete session.
    pub fn delete_session(&self, token: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .map_err(|e| AppError::Internal(format!("Failed to delete session: {}", e)))?;
        Ok(())
    }

    /// Cleanup expired sessions.
    pub fn cleanup_expired_sessions(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "DELETE FROM sessions WHERE expires_at < ?1",
                params![now_timestamp()],
            )
            .map_err(|e| AppError::Internal(format!("Failed to cleanup sessions: {}", e)))?;
        Ok(rows)
    }

    // ========== ROLE OPERATIONS ==========

    /// Get role ID by name.
    pub fn get_role_id(&self, name: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id FROM roles WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get role: {}", e)))
    }

    /// List roles with their permissions.
    pub fn list_roles(&self) -> Result<Vec<Role>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT r.id, r.name, r.description,
                        GROUP_CONCAT(rp.module || '.' || rp.action, ',')
                 FROM roles r
                 LEFT JOIN role_permissions rp ON rp.role_id = r.id
                 GROUP BY r.id, r.name, r.description
                 ORDER BY r.id",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let roles = stmt
            .query_map([], |row| {
                let permissions: Option<String> = row.get(3)?;
                let mut permissions: Vec<String> = permissions
                    .map(|p| p.split(',').map(str::to_string).collect())
                    .unwrap_or_default();
                permissions.sort();
                Ok(Role {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    permissions,
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to list roles: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect roles: {}", e)))?;

        Ok(roles)
    }

    /// Create a role with `(module, action)` permissions.
    pub fn create_role(
        &self,
        name: &str,
        description: Option<&str>,
        permissions: &[(String, String)],
    ) -> Result<i64> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            "INSERT INTO roles (name, description) VALUES (?1, ?2)",
            params![name, description],
        )
        .map_err(|e| from_sqlite("Failed to create role", e))?;
        let id = tx.last_insert_rowid();

        for (module, action) in permissions {
            tx.execute(
                "INSERT OR IGNORE INTO role_permissions (role_id, module, action) VALUES (?1, ?2, ?3)",
                params![id, module, action],
            )
            .map_err(|e| AppError::Internal(format!("Failed to add permission: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to create role: {}", e)))?;
        Ok(id)
    }

    /// Delete role by name. Fails with a conflict while users hold it.
    pub fn delete_role(&self, name: &str) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            "DELETE FROM role_permissions WHERE role_id = (SELECT id FROM roles WHERE name = ?1)",
            params![name],
        )
        .map_err(|e| AppError::Internal(format!("Failed to delete role permissions: {}", e)))?;
        let rows = tx
            .execute("DELETE FROM roles WHERE name = ?1", params![name])
            .map_err(|e| from_sqlite("Failed to delete role", e))?;

        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to delete role: {}", e)))?;
        Ok(rows > 0)
    }

    /// Check whether the user's role grants `module.action`.
    pub fn user_has_permission(&self, user_id: i64, permission: &str) -> Result<bool> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM users u
                JOIN role_permissions rp ON rp.role_id = u.role_id
                WHERE u.id = ?1 AND rp.module || '.' || rp.action = ?2
             )",
            params![user_id, permission],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Internal(format!("Failed to check permission: {}", e)))
    }

    /// Permissions granted to the user's role.
    pub fn user_permissions(&self, user_id: i64) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT rp.module || '.' || rp.action
                 FROM users u JOIN role_permissions rp ON rp.role_id = u.role_id
                 WHERE u.id = ?1
                 ORDER BY 1",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let permissions = stmt
            .query_map(params![user_id], |row| row.get(0))
            .map_err(|e| AppError::Internal(format!("Failed to get permissions: {}", e)))?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect permissions: {}", e)))?;

        Ok(permissions)
    }

    // ========== IMAGE OPERATIONS ==========

    /// Register image metadata.
    pub fn create_image(&self, path: &str, md5: Option<&str>, sha1: Option<&str>) -> Result<Image> {
        let conn = self.conn.lock();
        let created_at = now_timestamp();
        conn.execute(
            "INSERT INTO images (path, md5, sha1, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![path, md5, sha1, created_at],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create image: {}", e)))?;

        Ok(Image {
            id: conn.last_insert_rowid(),
            path: path.to_string(),
            md5: md5.map(str::to_string),
            sha1: sha1.map(str::to_string),
            created_at,
        })
    }

    /// Get image by ID.
    pub fn get_image(&self, id: i64) -> Result<Option<Image>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, path, md5, sha1, created_at FROM images WHERE id = ?1",
            params![id],
            |row| {
                Ok(Image {
                    id: row.get(0)?,
                    path: row.get(1)?,
                    md5: row.get(2)?,
                    sha1: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get image: {}", e)))
    }

    /// Check image existence.
    pub fn image_exists(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM images WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Internal(format!("Failed to check image: {}", e)))
    }

    // ========== STATS ==========

    /// Count the main entities.
    pub fn stats(&self) -> Result<Stats> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT (SELECT COUNT(*) FROM users),
                    (SELECT COUNT(*) FROM book_authors),
                    (SELECT COUNT(*) FROM book_groups),
                    (SELECT COUNT(*) FROM book_chapters),
                    (SELECT COUNT(*) FROM images)",
            [],
            |row| {
                Ok(Stats {
                    users: row.get(0)?,
                    authors: row.get(1)?,
                    groups: row.get(2)?,
                    chapters: row.get(3)?,
                    images: row.get(4)?,
                })
            },
        )
        .map_err(|e| AppError::Internal(format!("Failed to get stats: {}", e)))
    }
}

/// Decode the stored favorite list. `NULL` means no favorites.
fn parse_favorites(stored: Option<&str>) -> serde_json::Result<Vec<i64>> {
    stored.map_or(Ok(Vec::new()), serde_json::from_str)
}

/// Escape `LIKE` wildcards so user input matches literally.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
