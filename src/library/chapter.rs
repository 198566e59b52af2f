//! Chapter lifecycle: creation, hypertext updates, deletion and reading.

use crate::auth::{CHAPTER_CREATE, CHAPTER_MANAGE};
use crate::db::{
    BookChapter, ChapterListEntry, ChapterType, Database, LatestChapter, NewChapter, User,
    view_date,
};
use crate::error::{AppError, Result};
use crate::library::{ensure_owner_or_permission, non_blank, page_window, require_permission};
use crate::validation::{check_chapter_name, check_text_content, is_blank};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Body of a hypertext chapter upload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateHypertextChapter {
    /// Target book group.
    pub book_group_id: i64,
    /// Chapter number, required.
    #[serde(default)]
    pub chapter_number: Option<f64>,
    /// Optional display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Chapter text.
    #[serde(default)]
    pub text_content: String,
}

/// Body of an images chapter upload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateImagesChapter {
    /// Target book group.
    pub book_group_id: i64,
    /// Chapter number, required.
    #[serde(default)]
    pub chapter_number: Option<f64>,
    /// Optional display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Image IDs in reading order.
    #[serde(default)]
    pub images: Vec<i64>,
}

/// Partial update of a hypertext chapter. Empty or zero fields keep the
/// stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateHypertextChapter {
    /// New number; 0 keeps the current one.
    #[serde(default)]
    pub chapter_number: Option<f64>,
    /// New name.
    #[serde(default)]
    pub name: Option<String>,
    /// New text.
    #[serde(default)]
    pub text_content: Option<String>,
}

/// Chapter content as served to readers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterContent {
    /// Content type.
    #[serde(rename = "type")]
    pub chapter_type: ChapterType,
    /// Owning book group.
    pub book_group_id: i64,
    /// Chapter number.
    pub chapter_number: f64,
    /// Name, empty when unnamed.
    pub name: String,
    /// Type-specific payload.
    #[serde(flatten)]
    pub body: ChapterBody,
}

/// Payload of [`ChapterContent`], shaped by the chapter type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChapterBody {
    /// Hypertext chapter.
    Text {
        /// Chapter text.
        #[serde(rename = "textContent")]
        text_content: String,
    },
    /// Images chapter.
    Images {
        /// Image paths ordered by rank.
        images: Vec<String>,
    },
}

fn check_number(number: Option<f64>) -> Result<f64> {
    let number =
        number.ok_or_else(|| AppError::Validation("missing chapter number".to_string()))?;
    if !number.is_finite() || number < 0.0 {
        return Err(AppError::Validation(
            "chapter number cannot be less than 0".to_string(),
        ));
    }
    Ok(number)
}

/// A provided name is trimmed and must be a valid, non-empty single line.
fn check_new_name(name: Option<String>) -> Result<Option<String>> {
    match name {
        None => Ok(None),
        Some(name) => {
            let name = name.trim().to_string();
            if !check_chapter_name(&name) || is_blank(&name) {
                return Err(AppError::Validation("invalid chapter name".to_string()));
            }
            Ok(Some(name))
        }
    }
}

/// Load the group and check the caller may upload into it.
fn authorize_upload(db: &Database, caller: &User, group_id: i64) -> Result<()> {
    require_permission(db, caller, CHAPTER_CREATE)?;
    let group = db
        .get_book_group(group_id)?
        .ok_or_else(|| AppError::NotFound("Book group not exist".to_string()))?;
    ensure_owner_or_permission(db, caller, group.owner_id, CHAPTER_MANAGE)
}

fn find(db: &Database, id: i64) -> Result<BookChapter> {
    db.get_chapter(id)?
        .ok_or_else(|| AppError::NotFound("Chapter not exist".to_string()))
}

/// Create a hypertext chapter owned by the caller.
pub fn create_hypertext(
    db: &Database,
    caller: &User,
    req: CreateHypertextChapter,
) -> Result<i64> {
    let chapter_number = check_number(req.chapter_number)?;
    let name = check_new_name(req.name)?;
    check_text_content(&req.text_content)?;
    authorize_upload(db, caller, req.book_group_id)?;

    let id = db.create_chapter(&NewChapter {
        book_group_id: req.book_group_id,
        owner_id: caller.id,
        chapter_number,
        name,
        chapter_type: ChapterType::Hypertext,
        text_content: Some(req.text_content),
    })?;

    tracing::info!(
        chapter_id = id,
        book_group_id = req.book_group_id,
        owner_id = caller.id,
        "Hypertext chapter created"
    );
    Ok(id)
}

/// Create an images chapter; images keep the order they were given in.
pub fn create_images(db: &Database, caller: &User, req: CreateImagesChapter) -> Result<i64> {
    let chapter_number = check_number(req.chapter_number)?;
    let name = check_new_name(req.name)?;
    authorize_upload(db, caller, req.book_group_id)?;

    let id = db.create_images_chapter(
        &NewChapter {
            book_group_id: req.book_group_id,
            owner_id: caller.id,
            chapter_number,
            name,
            chapter_type: ChapterType::Images,
            text_content: None,
        },
        &req.images,
    )?;

    tracing::info!(
        chapter_id = id,
        book_group_id = req.book_group_id,
        images = req.images.len(),
        "Images chapter created"
    );
    Ok(id)
}

/// Update a hypertext chapter, keeping stored values for omitted fields.
pub fn update_hypertext(
    db: &Database,
    caller: &User,
    id: i64,
    req: UpdateHypertextChapter,
) -> Result<()> {
    let old = find(db, id)?;
    if old.chapter_type != ChapterType::Hypertext {
        return Err(AppError::Validation(
            "Type of chapter is not hypertext".to_string(),
        ));
    }
    ensure_owner_or_permission(db, caller, old.owner_id, CHAPTER_MANAGE)?;

    let mut chapter_number = req.chapter_number.unwrap_or(0.0);
    if !chapter_number.is_finite() || chapter_number < 0.0 {
        return Err(AppError::Validation(
            "chapter number cannot be less than 0".to_string(),
        ));
    }
    if chapter_number == 0.0 {
        chapter_number = old.chapter_number;
    }

    let name = non_blank(req.name).or(old.name);
    if name.as_deref().is_some_and(|n| !check_chapter_name(n)) {
        return Err(AppError::Validation(
            "Name cannot contain control characters or newline characters".to_string(),
        ));
    }

    let text_content = req
        .text_content
        .filter(|t| !t.is_empty())
        .or(old.text_content)
        .unwrap_or_default();
    check_text_content(&text_content)?;

    db.update_chapter(id, chapter_number, name.as_deref(), &text_content)?;

    tracing::info!(chapter_id = id, "Chapter updated");
    Ok(())
}

/// Delete a chapter with its image links and views.
pub fn delete(db: &Database, caller: &User, id: i64) -> Result<()> {
    let chapter = find(db, id)?;
    ensure_owner_or_permission(db, caller, chapter.owner_id, CHAPTER_MANAGE)?;

    db.delete_chapter(id)?;

    tracing::info!(chapter_id = id, book_group_id = chapter.book_group_id, "Chapter deleted");
    Ok(())
}

/// Read a chapter and count the view.
pub fn content(db: &Database, id: i64) -> Result<ChapterContent> {
    let chapter = find(db, id)?;
    db.record_view(id, &view_date(Utc::now()))?;

    let body = match chapter.chapter_type {
        ChapterType::Images => ChapterBody::Images {
            images: db.chapter_image_paths(id)?,
        },
        ChapterType::Hypertext => ChapterBody::Text {
            text_content: chapter.text_content.unwrap_or_default(),
        },
    };

    Ok(ChapterContent {
        chapter_type: chapter.chapter_type,
        book_group_id: chapter.book_group_id,
        chapter_number: chapter.chapter_number,
        name: chapter.name.unwrap_or_default(),
        body,
    })
}

/// One page of a group's chapters.
pub fn list_by_group(
    db: &Database,
    group_id: i64,
    page: Option<u32>,
    per_page: u32,
) -> Result<Vec<ChapterListEntry>> {
    if !db.book_group_exists(group_id)? {
        return Err(AppError::NotFound("Book group not exist".to_string()));
    }
    let (limit, offset) = page_window(page, per_page);
    db.list_group_chapters(group_id, limit, offset)
}

/// Latest chapter of a group, `None` when it has none yet.
pub fn latest(db: &Database, group_id: i64) -> Result<Option<LatestChapter>> {
    if !db.book_group_exists(group_id)? {
        return Err(AppError::NotFound("Book group not exist".to_string()));
    }
    db.latest_chapter(group_id)
}
