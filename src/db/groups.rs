use super::*;
use crate::error::{AppError, Result, from_sqlite};
use rusqlite::{Connection, OptionalExtension, params};

/// Group listing row with its aggregates. `?1` is the first view date counted.
const SUMMARY_SELECT: &str = "SELECT g.id, i.path, g.title,
        (SELECT c.chapter_number FROM book_chapters c
          WHERE c.book_group_id = g.id
          ORDER BY c.created_at DESC, c.id DESC LIMIT 1) AS latest_chapter,
        (SELECT MAX(c.created_at) FROM book_chapters c
          WHERE c.book_group_id = g.id) AS last_updated,
        (SELECT COALESCE(SUM(v.count), 0) FROM book_chapter_views v
          JOIN book_chapters c ON c.id = v.book_chapter_id
          WHERE c.book_group_id = g.id AND v.view_date >= ?1) AS views,
        (SELECT COUNT(*) FROM book_comments m
          WHERE m.book_group_id = g.id) AS comments,
        (SELECT COALESCE(SUM(CASE WHEN l.point > 0 THEN l.point END), 0)
          FROM book_group_likes l WHERE l.book_group_id = g.id) AS likes
     FROM book_groups g
     LEFT JOIN images i ON i.id = g.primary_cover_art_id";

const RECENT_FIRST: &str = "ORDER BY COALESCE(
        (SELECT MAX(c.created_at) FROM book_chapters c WHERE c.book_group_id = g.id),
        g.created_at) DESC, g.id DESC";

/// Remove a book group and everything hanging off it, children first.
pub(super) fn delete_group_rows(conn: &Connection, group_id: i64) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM book_chapter_images WHERE book_chapter_id IN
            (SELECT id FROM book_chapters WHERE book_group_id = ?1)",
        params![group_id],
    )?;
    conn.execute(
        "DELETE FROM book_chapter_views WHERE book_chapter_id IN
            (SELECT id FROM book_chapters WHERE book_group_id = ?1)",
        params![group_id],
    )?;
    for sql in [
        "DELETE FROM book_chapters WHERE book_group_id = ?1",
        "DELETE FROM book_group_likes WHERE book_group_id = ?1",
        "DELETE FROM book_comments WHERE book_group_id = ?1",
        "DELETE FROM book_group_arts WHERE book_group_id = ?1",
        "DELETE FROM book_group_authors WHERE book_group_id = ?1",
        "DELETE FROM book_groups WHERE id = ?1",
    ] {
        conn.execute(sql, params![group_id])?;
    }
    conn.execute(
        "UPDATE users SET favorite_list =
            (SELECT json_group_array(f.value) FROM json_each(users.favorite_list) f
              WHERE f.value <> ?1)
         WHERE EXISTS
            (SELECT 1 FROM json_each(users.favorite_list) f WHERE f.value = ?1)",
        params![group_id],
    )?;
    Ok(())
}

impl Database {
    fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<BookGroup> {
        Ok(BookGroup {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            owner_id: row.get(3)?,
            primary_cover_art_id: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<BookGroupSummary> {
        Ok(BookGroupSummary {
            id: row.get(0)?,
            image: row.get(1)?,
            title: row.get(2)?,
            latest_chapter: row.get(3)?,
            last_updated: row.get(4)?,
            views: row.get(5)?,
            comments: row.get(6)?,
            likes: row.get(7)?,
        })
    }

    fn query_summaries(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<BookGroupSummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let groups = stmt
            .query_map(params, Self::row_to_summary)
            .map_err(|e| AppError::Internal(format!("Failed to list book groups: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect book groups: {}", e)))?;

        Ok(groups)
    }

    // ========== BOOK GROUP OPERATIONS ==========

    /// Insert a group with its author links.
    pub fn create_book_group(&self, group: &NewBookGroup) -> Result<i64> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            "INSERT INTO book_groups (title, description, owner_id, primary_cover_art_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                group.title,
                group.description,
                group.owner_id,
                group.primary_cover_art_id,
                now_timestamp(),
            ],
        )
        .map_err(|e| from_sqlite("Failed to create book group", e))?;
        let id = tx.last_insert_rowid();

        for author_id in &group.author_ids {
            tx.execute(
                "INSERT OR IGNORE INTO book_group_authors (book_group_id, book_author_id)
                 VALUES (?1, ?2)",
                params![id, author_id],
            )
            .map_err(|e| from_sqlite("Failed to link author", e))?;
        }

        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to create book group: {}", e)))?;
        Ok(id)
    }

    /// Get book group by ID.
    pub fn get_book_group(&self, id: i64) -> Result<Option<BookGroup>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, title, description, owner_id, primary_cover_art_id, created_at
             FROM book_groups WHERE id = ?1",
            params![id],
            Self::row_to_group,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get book group: {}", e)))
    }

    /// Check book group existence.
    pub fn book_group_exists(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM book_groups WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Internal(format!("Failed to check book group: {}", e)))
    }

    /// Authors linked to a group.
    pub fn group_authors(&self, group_id: i64) -> Result<Vec<BookAuthor>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT a.id, a.name, a.description, a.avatar_image_id, a.created_at
                 FROM book_authors a
                 JOIN book_group_authors ga ON ga.book_author_id = a.id
                 WHERE ga.book_group_id = ?1
                 ORDER BY a.name",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let authors = stmt
            .query_map(params![group_id], Self::row_to_author)
            .map_err(|e| AppError::Internal(format!("Failed to get group authors: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect authors: {}", e)))?;

        Ok(authors)
    }

    /// Overwrite group fields; `author_ids` replaces the links when given.
    pub fn update_book_group(
        &self,
        id: i64,
        title: &str,
        description: Option<&str>,
        primary_cover_art_id: Option<i64>,
        author_ids: Option<&[i64]>,
    ) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            "UPDATE book_groups SET title = ?2, description = ?3, primary_cover_art_id = ?4
             WHERE id = ?1",
            params![id, title, description, primary_cover_art_id],
        )
        .map_err(|e| from_sqlite("Failed to update book group", e))?;

        if let Some(author_ids) = author_ids {
            tx.execute(
                "DELETE FROM book_group_authors WHERE book_group_id = ?1",
                params![id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to unlink authors: {}", e)))?;
            for author_id in author_ids {
                tx.execute(
                    "INSERT OR IGNORE INTO book_group_authors (book_group_id, book_author_id)
                     VALUES (?1, ?2)",
                    params![id, author_id],
                )
                .map_err(|e| from_sqlite("Failed to link author", e))?;
            }
        }

        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to update book group: {}", e)))?;
        Ok(())
    }

    /// Delete a group and its chapters, votes, comments and arts.
    pub fn delete_book_group(&self, id: i64) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to begin transaction: {}", e)))?;

        delete_group_rows(&tx, id).map_err(|e| from_sqlite("Failed to delete book group", e))?;

        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to delete book group: {}", e)))?;
        Ok(())
    }

    /// One page of groups, most recently updated first.
    pub fn list_group_summaries(&self, limit: i64, offset: i64) -> Result<Vec<BookGroupSummary>> {
        self.query_summaries(
            &format!(
                "{} {} LIMIT ?2 OFFSET ?3",
                SUMMARY_SELECT, RECENT_FIRST
            ),
            params!["", limit, offset],
        )
    }

    /// Groups owned by a user.
    pub fn groups_by_owner(&self, owner_id: i64) -> Result<Vec<BookGroupSummary>> {
        self.query_summaries(
            &format!(
                "{} WHERE g.owner_id = ?2 {}",
                SUMMARY_SELECT, RECENT_FIRST
            ),
            params!["", owner_id],
        )
    }

    /// Top groups by views counted from `since` (a view date, `""` for all time).
    pub fn group_ranking(&self, since: &str, limit: i64) -> Result<Vec<BookGroupSummary>> {
        self.query_summaries(
            &format!("{} ORDER BY views DESC, g.id ASC LIMIT ?2", SUMMARY_SELECT),
            params![since, limit],
        )
    }

    /// Aggregates of a single group.
    pub fn group_summary(&self, id: i64) -> Result<Option<BookGroupSummary>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("{} WHERE g.id = ?2", SUMMARY_SELECT),
            params!["", id],
            Self::row_to_summary,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get book group summary: {}", e)))
    }

    // ========== ART OPERATIONS ==========

    /// Attach an image as cover art, optionally making it the primary cover.
    pub fn add_group_art(
        &self,
        group_id: i64,
        image_id: i64,
        make_primary: bool,
    ) -> Result<BookGroupArt> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            "INSERT INTO book_group_arts (book_group_id, image_id) VALUES (?1, ?2)",
            params![group_id, image_id],
        )
        .map_err(|e| from_sqlite("Failed to add cover art", e))?;
        let id = tx.last_insert_rowid();

        if make_primary {
            tx.execute(
                "UPDATE book_groups SET primary_cover_art_id = ?2 WHERE id = ?1",
                params![group_id, image_id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to set primary cover: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to add cover art: {}", e)))?;

        Ok(BookGroupArt {
            id,
            book_group_id: group_id,
            image_id,
        })
    }

    /// Cover arts of a group in insertion order.
    pub fn list_group_arts(&self, group_id: i64) -> Result<Vec<BookGroupArt>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, book_group_id, image_id FROM book_group_arts
                 WHERE book_group_id = ?1 ORDER BY id",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let arts = stmt
            .query_map(params![group_id], |row| {
                Ok(BookGroupArt {
                    id: row.get(0)?,
                    book_group_id: row.get(1)?,
                    image_id: row.get(2)?,
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to list cover arts: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect cover arts: {}", e)))?;

        Ok(arts)
    }

    // ========== COMMENT OPERATIONS ==========

    /// Insert a comment and return it with its author.
    pub fn add_comment(&self, group_id: i64, user_id: i64, content: &str) -> Result<BookComment> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO book_comments (book_group_id, user_id, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![group_id, user_id, content, now_timestamp()],
        )
        .map_err(|e| from_sqlite("Failed to add comment", e))?;
        let id = conn.last_insert_rowid();

        conn.query_row(
            "SELECT m.id, m.book_group_id, u.id, u.username, m.content, m.created_at
             FROM book_comments m JOIN users u ON u.id = m.user_id
             WHERE m.id = ?1",
            params![id],
            row_to_comment,
        )
        .map_err(|e| AppError::Internal(format!("Failed to get comment: {}", e)))
    }

    /// Comments of a group, newest first.
    pub fn list_comments(&self, group_id: i64) -> Result<Vec<BookComment>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT m.id, m.book_group_id, u.id, u.username, m.content, m.created_at
                 FROM book_comments m JOIN users u ON u.id = m.user_id
                 WHERE m.book_group_id = ?1
                 ORDER BY m.created_at DESC, m.id DESC",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let comments = stmt
            .query_map(params![group_id], row_to_comment)
            .map_err(|e| AppError::Internal(format!("Failed to list comments: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect comments: {}", e)))?;

        Ok(comments)
    }

    // ========== LIKE OPERATIONS ==========

    /// Set the caller's vote on a group, replacing any previous one.
    pub fn set_like(&self, user_id: i64, group_id: i64, point: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO book_group_likes (user_id, book_group_id, point) VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id, book_group_id) DO UPDATE SET point = excluded.point",
            params![user_id, group_id, point],
        )
        .map_err(|e| AppError::Internal(format!("Failed to like book group: {}", e)))?;
        Ok(())
    }

    /// Remove the caller's vote. Returns whether a row existed.
    pub fn remove_like(&self, user_id: i64, group_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "DELETE FROM book_group_likes WHERE user_id = ?1 AND book_group_id = ?2",
                params![user_id, group_id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to unlike book group: {}", e)))?;
        Ok(rows > 0)
    }

    /// Signed sums of positive and negative points.
    pub fn like_totals(&self, group_id: i64) -> Result<LikeTotals> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COALESCE(SUM(CASE WHEN point > 0 THEN point END), 0),
                    COALESCE(SUM(CASE WHEN point < 0 THEN point END), 0)
             FROM book_group_likes WHERE book_group_id = ?1",
            params![group_id],
            |row| {
                Ok(LikeTotals {
                    likes: row.get(0)?,
                    dislikes: row.get(1)?,
                })
            },
        )
        .map_err(|e| AppError::Internal(format!("Failed to count likes: {}", e)))
    }

    /// The caller's current point on a group, if any.
    pub fn user_vote(&self, user_id: i64, group_id: i64) -> Result<Option<i64>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT point FROM book_group_likes WHERE user_id = ?1 AND book_group_id = ?2",
            params![user_id, group_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get vote: {}", e)))
    }

    /// Number of vote rows on a group.
    #[cfg(test)]
    pub(crate) fn like_row_count(&self, group_id: i64) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM book_group_likes WHERE book_group_id = ?1",
            params![group_id],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Internal(format!("Failed to count votes: {}", e)))
    }
}

fn row_to_comment(row: &rusqlite::Row<'_>) -> rusqlite::Result<BookComment> {
    Ok(BookComment {
        id: row.get(0)?,
        book_group_id: row.get(1)?,
        user: UserRef {
            id: row.get(2)?,
            name: row.get(3)?,
        },
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}
