//! Likes and dislikes on book groups.
//!
//! Each user holds at most one vote per group; a new vote replaces the old
//! one.

use crate::db::{Database, User};
use crate::error::{AppError, Result};
use serde::Serialize;

/// Point stored for a like.
pub const LIKE_POINT: i64 = 1;
/// Point stored for a dislike.
pub const DISLIKE_POINT: i64 = -1;

/// Vote totals of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeSummary {
    /// Sum of likes.
    pub likes: i64,
    /// Sum of dislikes, zero or less.
    pub dislikes: i64,
    /// The caller's own vote, when authenticated and voted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_vote: Option<i64>,
}

fn ensure_group(db: &Database, group_id: i64) -> Result<()> {
    if db.book_group_exists(group_id)? {
        Ok(())
    } else {
        Err(AppError::NotFound("Book group not exist".to_string()))
    }
}

fn vote(db: &Database, caller: &User, group_id: i64, point: i64) -> Result<()> {
    ensure_group(db, group_id)?;
    db.set_like(caller.id, group_id, point)?;

    tracing::info!(user_id = caller.id, book_group_id = group_id, point, "Vote recorded");
    Ok(())
}

/// Like a group.
pub fn like(db: &Database, caller: &User, group_id: i64) -> Result<()> {
    vote(db, caller, group_id, LIKE_POINT)
}

/// Dislike a group.
pub fn dislike(db: &Database, caller: &User, group_id: i64) -> Result<()> {
    vote(db, caller, group_id, DISLIKE_POINT)
}

/// Withdraw the caller's vote. Nothing happens when there is none.
pub fn unlike(db: &Database, caller: &User, group_id: i64) -> Result<()> {
    ensure_group(db, group_id)?;
    if db.remove_like(caller.id, group_id)? {
        tracing::info!(user_id = caller.id, book_group_id = group_id, "Vote removed");
    }
    Ok(())
}

/// Totals of a group plus the caller's vote.
pub fn summary(db: &Database, caller: Option<&User>, group_id: i64) -> Result<LikeSummary> {
    ensure_group(db, group_id)?;
    let totals = db.like_totals(group_id)?;
    let user_vote = match caller {
        Some(user) => db.user_vote(user.id, group_id)?,
        None => None,
    };

    Ok(LikeSummary {
        likes: totals.likes,
        dislikes: totals.dislikes,
        user_vote,
    })
}
