//! Book groups, their cover arts and comments.

use crate::auth::{GROUP_CREATE, GROUP_MANAGE};
use crate::db::{
    BookAuthor, BookComment, BookGroup, BookGroupArt, BookGroupSummary, Database,
    LatestChapter, NewBookGroup, User, UserRef, view_date,
};
use crate::error::{AppError, Result};
use crate::library::{
    ensure_image, ensure_owner_or_permission, non_blank, page_window, require_permission,
};
use crate::validation::{check_comment, check_group_description, check_group_title};
use chrono::{TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Body of a group creation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookGroup {
    /// Title.
    pub title: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Linked author IDs.
    #[serde(default)]
    pub authors: Vec<i64>,
    /// Primary cover image ID.
    #[serde(default)]
    pub primary_cover_art_id: Option<i64>,
}

/// Partial group update. Omitted or empty fields keep the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookGroup {
    /// Title.
    #[serde(default)]
    pub title: Option<String>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Replacement author list.
    #[serde(default)]
    pub authors: Option<Vec<i64>>,
    /// Primary cover image ID.
    #[serde(default)]
    pub primary_cover_art_id: Option<i64>,
}

/// Body of a cover art upload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddBookGroupArt {
    /// Registered image.
    pub image_id: i64,
    /// Also make it the primary cover.
    #[serde(default)]
    pub primary: bool,
}

/// Body of a new comment.
#[derive(Debug, Clone, Deserialize)]
pub struct NewComment {
    /// Comment text.
    pub content: String,
}

/// Ranking window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingPeriod {
    /// Views of the last 7 days.
    #[default]
    Week,
    /// All views.
    All,
}

/// Full view of one group.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookGroupDetail {
    /// Group ID.
    pub id: i64,
    /// Title.
    pub title: String,
    /// Description.
    pub description: Option<String>,
    /// Owner.
    pub owner: UserRef,
    /// Linked authors.
    pub authors: Vec<BookAuthor>,
    /// Primary cover image path.
    pub image: Option<String>,
    /// Sum of likes.
    pub likes: i64,
    /// Sum of dislikes, zero or less.
    pub dislikes: i64,
    /// Comment count.
    pub comments: i64,
    /// Total views.
    pub views: i64,
    /// Most recently posted chapter.
    pub latest_chapter: Option<LatestChapter>,
    /// Cover art gallery.
    pub arts: Vec<BookGroupArt>,
    /// Creation timestamp.
    pub created_at: i64,
}

fn find(db: &Database, id: i64) -> Result<BookGroup> {
    db.get_book_group(id)?
        .ok_or_else(|| AppError::NotFound("Book group not exist".to_string()))
}

fn check_authors(db: &Database, author_ids: &[i64]) -> Result<()> {
    for author_id in author_ids {
        if db.get_author(*author_id)?.is_none() {
            return Err(AppError::Validation(format!(
                "author {} does not exist",
                author_id
            )));
        }
    }
    Ok(())
}

/// Create a group owned by the caller.
pub fn create(db: &Database, caller: &User, req: CreateBookGroup) -> Result<i64> {
    require_permission(db, caller, GROUP_CREATE)?;

    let title = req.title.trim().to_string();
    check_group_title(&title)?;
    let description = non_blank(req.description);
    if let Some(description) = &description {
        check_group_description(description)?;
    }
    check_authors(db, &req.authors)?;
    let primary_cover_art_id = req.primary_cover_art_id.filter(|id| *id > 0);
    if let Some(image_id) = primary_cover_art_id {
        ensure_image(db, image_id)?;
    }

    let id = db.create_book_group(&NewBookGroup {
        title,
        description,
        owner_id: caller.id,
        primary_cover_art_id,
        author_ids: req.authors,
    })?;

    tracing::info!(book_group_id = id, owner_id = caller.id, "Book group created");
    Ok(id)
}

/// Group with its owner, authors and aggregates.
pub fn detail(db: &Database, id: i64) -> Result<BookGroupDetail> {
    let group = find(db, id)?;
    let summary = db
        .group_summary(id)?
        .ok_or_else(|| AppError::NotFound("Book group not exist".to_string()))?;
    let owner = db
        .get_user_by_id(group.owner_id)?
        .map(|u| UserRef {
            id: u.id,
            name: u.username,
        })
        .unwrap_or(UserRef {
            id: group.owner_id,
            name: String::new(),
        });
    let totals = db.like_totals(id)?;

    Ok(BookGroupDetail {
        id,
        title: group.title,
        description: group.description,
        owner,
        authors: db.group_authors(id)?,
        image: summary.image,
        likes: totals.likes,
        dislikes: totals.dislikes,
        comments: summary.comments,
        views: summary.views,
        latest_chapter: db.latest_chapter(id)?,
        arts: db.list_group_arts(id)?,
        created_at: group.created_at,
    })
}

/// Update a group, keeping stored values for omitted fields.
pub fn update(db: &Database, caller: &User, id: i64, req: UpdateBookGroup) -> Result<()> {
    let old = find(db, id)?;
    ensure_owner_or_permission(db, caller, old.owner_id, GROUP_MANAGE)?;

    let title = non_blank(req.title).unwrap_or(old.title);
    check_group_title(&title)?;
    let description = non_blank(req.description).or(old.description);
    if let Some(description) = &description {
        check_group_description(description)?;
    }
    if let Some(authors) = &req.authors {
        check_authors(db, authors)?;
    }
    let primary_cover_art_id = match req.primary_cover_art_id.filter(|id| *id > 0) {
        Some(image_id) => {
            ensure_image(db, image_id)?;
            Some(image_id)
        }
        None => old.primary_cover_art_id,
    };

    db.update_book_group(
        id,
        &title,
        description.as_deref(),
        primary_cover_art_id,
        req.authors.as_deref(),
    )?;

    tracing::info!(book_group_id = id, "Book group updated");
    Ok(())
}

/// Delete a group and everything attached to it.
pub fn delete(db: &Database, caller: &User, id: i64) -> Result<()> {
    let group = find(db, id)?;
    ensure_owner_or_permission(db, caller, group.owner_id, GROUP_MANAGE)?;

    db.delete_book_group(id)?;

    tracing::info!(book_group_id = id, "Book group deleted");
    Ok(())
}

/// One page of groups, most recently updated first.
pub fn list(db: &Database, page: Option<u32>, per_page: u32) -> Result<Vec<BookGroupSummary>> {
    let (limit, offset) = page_window(page, per_page);
    db.list_group_summaries(limit, offset)
}

/// Groups owned by a user.
pub fn by_owner(db: &Database, user_id: i64) -> Result<Vec<BookGroupSummary>> {
    if db.get_user_by_id(user_id)?.is_none() {
        return Err(AppError::NotFound("User not exist".to_string()));
    }
    db.groups_by_owner(user_id)
}

/// Most viewed groups in the period.
pub fn ranking(db: &Database, period: RankingPeriod, limit: u32) -> Result<Vec<BookGroupSummary>> {
    let since = match period {
        RankingPeriod::Week => view_date(Utc::now() - TimeDelta::days(6)),
        RankingPeriod::All => String::new(),
    };
    db.group_ranking(&since, limit.max(1) as i64)
}

/// Attach a registered image as cover art.
pub fn add_art(
    db: &Database,
    caller: &User,
    group_id: i64,
    req: AddBookGroupArt,
) -> Result<BookGroupArt> {
    let group = find(db, group_id)?;
    ensure_owner_or_permission(db, caller, group.owner_id, GROUP_MANAGE)?;
    ensure_image(db, req.image_id)?;

    let art = db.add_group_art(group_id, req.image_id, req.primary)?;

    tracing::info!(
        book_group_id = group_id,
        image_id = req.image_id,
        primary = req.primary,
        "Cover art added"
    );
    Ok(art)
}

/// Post a comment on a group.
pub fn add_comment(
    db: &Database,
    caller: &User,
    group_id: i64,
    req: NewComment,
) -> Result<BookComment> {
    find(db, group_id)?;
    let content = req.content.trim();
    check_comment(content)?;

    let comment = db.add_comment(group_id, caller.id, content)?;

    tracing::info!(
        comment_id = comment.id,
        book_group_id = group_id,
        user_id = caller.id,
        "Comment added"
    );
    Ok(comment)
}

/// Comments of a group, newest first.
pub fn comments(db: &Database, group_id: i64) -> Result<Vec<BookComment>> {
    find(db, group_id)?;
    db.list_comments(group_id)
}
