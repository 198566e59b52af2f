use super::groups::delete_group_rows;
use super::schema::Database;
use super::{BookAuthor, now_timestamp};
use crate::error::{AppError, Result, from_sqlite};
use rusqlite::{OptionalExtension, params};

const AUTHOR_SELECT: &str =
    "SELECT id, name, description, avatar_image_id, created_at FROM book_authors";

impl Database {
    pub(super) fn row_to_author(row: &rusqlite::Row<'_>) -> rusqlite::Result<BookAuthor> {
        Ok(BookAuthor {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            avatar_image_id: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    // ========== AUTHOR OPERATIONS ==========

    /// Check whether an author with this exact name exists.
    pub fn author_exists_by_name(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM book_authors WHERE name = ?1)",
            params![name],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Internal(format!("Failed to check author name: {}", e)))
    }

    /// Check whether an author other than `id` holds this name.
    pub fn author_name_taken_by_other(&self, name: &str, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM book_authors WHERE name = ?1 AND id <> ?2)",
            params![name, id],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Internal(format!("Failed to check author name: {}", e)))
    }

    /// Insert an author and return its ID.
    pub fn create_author(
        &self,
        name: &str,
        description: Option<&str>,
        avatar_image_id: Option<i64>,
    ) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO book_authors (name, description, avatar_image_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, description, avatar_image_id, now_timestamp()],
        )
        .map_err(|e| from_sqlite("Failed to create author", e))?;
        Ok(conn.last_insert_rowid())
    }

    /// Get author by ID.
    pub fn get_author(&self, id: i64) -> Result<Option<BookAuthor>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("{} WHERE id = ?1", AUTHOR_SELECT),
            params![id],
            Self::row_to_author,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get author: {}", e)))
    }

    /// List authors by name, one page at a time.
    pub fn list_authors(&self, limit: i64, offset: i64) -> Result<Vec<BookAuthor>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "{} ORDER BY name COLLATE NOCASE LIMIT ?1 OFFSET ?2",
                AUTHOR_SELECT
            ))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let authors = stmt
            .query_map(params![limit, offset], Self::row_to_author)
            .map_err(|e| AppError::Internal(format!("Failed to list authors: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect authors: {}", e)))?;

        Ok(authors)
    }

    /// Overwrite the mutable author fields.
    pub fn update_author(
        &self,
        id: i64,
        name: &str,
        description: Option<&str>,
        avatar_image_id: Option<i64>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE book_authors SET name = ?2, description = ?3, avatar_image_id = ?4
             WHERE id = ?1",
            params![id, name, description, avatar_image_id],
        )
        .map_err(|e| from_sqlite("Failed to update author", e))?;
        Ok(())
    }

    /// Delete an author together with every book group it is linked to.
    ///
    /// Returns the IDs of the removed groups.
    pub fn delete_author_cascade(&self, id: i64) -> Result<Vec<i64>> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to begin transaction: {}", e)))?;

        let group_ids = {
            let mut stmt = tx
                .prepare("SELECT book_group_id FROM book_group_authors WHERE book_author_id = ?1")
                .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;
            let ids = stmt
                .query_map(params![id], |row| row.get::<_, i64>(0))
                .map_err(|e| AppError::Internal(format!("Failed to list author groups: {}", e)))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| AppError::Internal(format!("Failed to list author groups: {}", e)))?;
            ids
        };

        for group_id in &group_ids {
            delete_group_rows(&tx, *group_id)
                .map_err(|e| from_sqlite("Failed to delete book group", e))?;
        }

        tx.execute(
            "DELETE FROM book_group_authors WHERE book_author_id = ?1",
            params![id],
        )
        .map_err(|e| from_sqlite("Failed to delete author links", e))?;
        tx.execute("DELETE FROM book_authors WHERE id = ?1", params![id])
            .map_err(|e| from_sqlite("Failed to delete author", e))?;

        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to delete author: {}", e)))?;
        Ok(group_ids)
    }
}
