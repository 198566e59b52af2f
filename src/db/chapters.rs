use super::*;
use crate::error::{AppError, Result, from_sqlite};
use rusqlite::{OptionalExtension, params};

impl Database {
    fn row_to_chapter(row: &rusqlite::Row<'_>) -> rusqlite::Result<BookChapter> {
        Ok(BookChapter {
            id: row.get(0)?,
            book_group_id: row.get(1)?,
            owner_id: row.get(2)?,
            chapter_number: row.get(3)?,
            name: row.get(4)?,
            chapter_type: row.get(5)?,
            text_content: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    // ========== CHAPTER OPERATIONS ==========

    /// Insert a chapter row and return its ID.
    pub fn create_chapter(&self, chapter: &NewChapter) -> Result<i64> {
        let conn = self.conn.lock();
        insert_chapter(&conn, chapter)?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert an images chapter with its ordered image links.
    ///
    /// All or nothing: an unknown image ID aborts the whole insert.
    pub fn create_images_chapter(&self, chapter: &NewChapter, image_ids: &[i64]) -> Result<i64> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to begin transaction: {}", e)))?;

        insert_chapter(&tx, chapter)?;
        let chapter_id = tx.last_insert_rowid();

        for (index, image_id) in image_ids.iter().enumerate() {
            let exists: bool = tx
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM images WHERE id = ?1)",
                    params![image_id],
                    |row| row.get(0),
                )
                .map_err(|e| AppError::Internal(format!("Failed to check image: {}", e)))?;
            if !exists {
                return Err(AppError::Validation(format!(
                    "image {} does not exist",
                    image_id
                )));
            }

            tx.execute(
                "INSERT INTO book_chapter_images (book_chapter_id, image_id, rank)
                 VALUES (?1, ?2, ?3)",
                params![chapter_id, image_id, index as i64 + 1],
            )
            .map_err(|e| from_sqlite("Failed to attach chapter image", e))?;
        }

        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to create chapter: {}", e)))?;
        Ok(chapter_id)
    }

    /// Get chapter by ID.
    pub fn get_chapter(&self, id: i64) -> Result<Option<BookChapter>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, book_group_id, owner_id, chapter_number, name, type, text_content,
                    created_at
             FROM book_chapters WHERE id = ?1",
            params![id],
            Self::row_to_chapter,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get chapter: {}", e)))
    }

    /// Image paths of a chapter ordered by rank.
    pub fn chapter_image_paths(&self, chapter_id: i64) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT i.path FROM book_chapter_images ci
                 JOIN images i ON i.id = ci.image_id
                 WHERE ci.book_chapter_id = ?1
                 ORDER BY ci.rank",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let paths = stmt
            .query_map(params![chapter_id], |row| row.get(0))
            .map_err(|e| AppError::Internal(format!("Failed to get chapter images: {}", e)))?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect chapter images: {}", e)))?;

        Ok(paths)
    }

    /// Image links of a chapter ordered by rank.
    #[cfg(test)]
    pub(crate) fn chapter_images(&self, chapter_id: i64) -> Result<Vec<BookChapterImage>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT book_chapter_id, image_id, rank FROM book_chapter_images
                 WHERE book_chapter_id = ?1 ORDER BY rank",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let images = stmt
            .query_map(params![chapter_id], |row| {
                Ok(BookChapterImage {
                    book_chapter_id: row.get(0)?,
                    image_id: row.get(1)?,
                    rank: row.get(2)?,
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to get chapter images: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect chapter images: {}", e)))?;

        Ok(images)
    }

    /// Overwrite number, name and text of a chapter.
    pub fn update_chapter(
        &self,
        id: i64,
        chapter_number: f64,
        name: Option<&str>,
        text_content: &str,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE book_chapters SET chapter_number = ?2, name = ?3, text_content = ?4
             WHERE id = ?1",
            params![id, chapter_number, name, text_content],
        )
        .map_err(|e| from_sqlite("Failed to update chapter", e))?;
        Ok(())
    }

    /// Delete a chapter with its image links and view counters.
    pub fn delete_chapter(&self, id: i64) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            "DELETE FROM book_chapter_images WHERE book_chapter_id = ?1",
            params![id],
        )
        .map_err(|e| AppError::Internal(format!("Failed to delete chapter images: {}", e)))?;
        tx.execute(
            "DELETE FROM book_chapter_views WHERE book_chapter_id = ?1",
            params![id],
        )
        .map_err(|e| AppError::Internal(format!("Failed to delete chapter views: {}", e)))?;
        let rows = tx
            .execute("DELETE FROM book_chapters WHERE id = ?1", params![id])
            .map_err(|e| from_sqlite("Failed to delete chapter", e))?;

        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to delete chapter: {}", e)))?;
        Ok(rows > 0)
    }

    /// One page of a group's chapters ordered by number.
    pub fn list_group_chapters(
        &self,
        group_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ChapterListEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT c.id, c.chapter_number, c.name, c.created_at, u.id, u.username
                 FROM book_chapters c JOIN users u ON u.id = c.owner_id
                 WHERE c.book_group_id = ?1
                 ORDER BY c.chapter_number
                 LIMIT ?2 OFFSET ?3",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let chapters = stmt
            .query_map(params![group_id, limit, offset], |row| {
                Ok(ChapterListEntry {
                    id: row.get(0)?,
                    chapter_number: row.get(1)?,
                    name: row.get(2)?,
                    time_posted: row.get(3)?,
                    user_posted: UserRef {
                        id: row.get(4)?,
                        name: row.get(5)?,
                    },
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to list chapters: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect chapters: {}", e)))?;

        Ok(chapters)
    }

    /// Most recently created chapter of a group; ties go to the higher ID.
    pub fn latest_chapter(&self, group_id: i64) -> Result<Option<LatestChapter>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, chapter_number, name, created_at FROM book_chapters
             WHERE book_group_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
            params![group_id],
            |row| {
                Ok(LatestChapter {
                    id: row.get(0)?,
                    chapter_number: row.get(1)?,
                    name: row.get(2)?,
                    date_created: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get latest chapter: {}", e)))
    }

    // ========== VIEW OPERATIONS ==========

    /// Count one view of a chapter on the given day.
    pub fn record_view(&self, chapter_id: i64, day: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO book_chapter_views (book_chapter_id, view_date, count) VALUES (?1, ?2, 1)
             ON CONFLICT (book_chapter_id, view_date) DO UPDATE SET count = count + 1",
            params![chapter_id, day],
        )
        .map_err(|e| AppError::Internal(format!("Failed to record view: {}", e)))?;
        Ok(())
    }

    /// Total views of a chapter.
    #[cfg(test)]
    pub(crate) fn chapter_views(&self, chapter_id: i64) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COALESCE(SUM(count), 0) FROM book_chapter_views WHERE book_chapter_id = ?1",
            params![chapter_id],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Internal(format!("Failed to count views: {}", e)))
    }
}

fn insert_chapter(conn: &rusqlite::Connection, chapter: &NewChapter) -> Result<()> {
    conn.execute(
        "INSERT INTO book_chapters
            (book_group_id, owner_id, chapter_number, name, type, text_content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            chapter.book_group_id,
            chapter.owner_id,
            chapter.chapter_number,
            chapter.name,
            chapter.chapter_type,
            chapter.text_content,
            now_timestamp(),
        ],
    )
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint") {
            AppError::Conflict(format!(
                "chapter {} already exists in this book group",
                chapter.chapter_number
            ))
        } else {
            from_sqlite("Failed to create chapter", e)
        }
    })?;
    Ok(())
}
