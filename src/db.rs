mod authors;
mod chapters;
mod groups;
mod schema;

pub use schema::Database;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// User account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique user ID.
    pub id: i64,
    /// Username for login.
    pub username: String,
    /// Email, also accepted for login.
    pub email: String,
    /// Argon2 password hash.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    /// Free-form profile summary.
    pub summary: Option<String>,
    /// Avatar image ID.
    pub avatar_image_id: Option<i64>,
    /// Role ID.
    pub role_id: i64,
    /// Role name.
    pub role: String,
    /// Favorite book group IDs.
    pub favorite_list: Vec<i64>,
    /// Account creation timestamp.
    pub created_at: i64,
    /// Last login timestamp.
    pub last_login: Option<i64>,
}

/// Fields needed to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Username.
    pub username: String,
    /// Email.
    pub email: String,
    /// Argon2 password hash.
    pub password_hash: String,
    /// Role name.
    pub role: String,
}

/// Short user reference embedded in other payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    /// User ID.
    pub id: i64,
    /// Username.
    pub name: String,
}

/// User search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSearchHit {
    /// User ID.
    pub id: i64,
    /// Username.
    pub username: String,
    /// Avatar image path.
    pub avatar: Option<String>,
}

/// Authentication session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session token.
    pub token: String,
    /// User ID.
    pub user_id: i64,
    /// Expiration timestamp.
    pub expires_at: i64,
}

/// Role with its permission set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    /// Role ID.
    pub id: i64,
    /// Unique role name.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// Permissions as `module.action` strings.
    pub permissions: Vec<String>,
}

/// Image metadata. The file itself lives in external storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    /// Image ID.
    pub id: i64,
    /// Storage path.
    pub path: String,
    /// MD5 hex digest.
    pub md5: Option<String>,
    /// SHA-1 hex digest.
    pub sha1: Option<String>,
    /// Creation timestamp.
    pub created_at: i64,
}

/// Book author.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookAuthor {
    /// Author ID.
    pub id: i64,
    /// Unique name.
    pub name: String,
    /// Short description.
    pub description: Option<String>,
    /// Avatar image ID.
    pub avatar_image_id: Option<i64>,
    /// Creation timestamp.
    pub created_at: i64,
}

/// Book group (a series containing chapters).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookGroup {
    /// Group ID.
    pub id: i64,
    /// Title.
    pub title: String,
    /// Description.
    pub description: Option<String>,
    /// Owner user ID.
    pub owner_id: i64,
    /// Primary cover art image ID.
    pub primary_cover_art_id: Option<i64>,
    /// Creation timestamp.
    pub created_at: i64,
}

/// Fields needed to insert a book group.
#[derive(Debug, Clone)]
pub struct NewBookGroup {
    /// Title.
    pub title: String,
    /// Description.
    pub description: Option<String>,
    /// Owner user ID.
    pub owner_id: i64,
    /// Primary cover art image ID.
    pub primary_cover_art_id: Option<i64>,
    /// Linked author IDs.
    pub author_ids: Vec<i64>,
}

/// Listing row for a book group with its aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookGroupSummary {
    /// Group ID.
    pub id: i64,
    /// Primary cover image path.
    pub image: Option<String>,
    /// Title.
    pub title: String,
    /// Number of the most recently posted chapter.
    pub latest_chapter: Option<f64>,
    /// Timestamp of the most recently posted chapter.
    pub last_updated: Option<i64>,
    /// Total chapter views.
    pub views: i64,
    /// Comment count.
    pub comments: i64,
    /// Sum of positive like points.
    pub likes: i64,
}

/// Cover art attached to a book group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookGroupArt {
    /// Art ID.
    pub id: i64,
    /// Book group ID.
    pub book_group_id: i64,
    /// Image ID.
    pub image_id: i64,
}

/// Chapter content discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterType {
    /// Text chapter stored inline.
    Hypertext,
    /// Ordered sequence of images.
    Images,
}

impl ChapterType {
    /// Database and wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChapterType::Hypertext => "hypertext",
            ChapterType::Images => "images",
        }
    }

    /// Parse the database name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hypertext" => Some(ChapterType::Hypertext),
            "images" => Some(ChapterType::Images),
            _ => None,
        }
    }
}

impl ToSql for ChapterType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ChapterType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        ChapterType::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown chapter type: {}", s).into()))
    }
}

/// Book chapter row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookChapter {
    /// Chapter ID.
    pub id: i64,
    /// Book group ID.
    pub book_group_id: i64,
    /// Owner user ID.
    pub owner_id: i64,
    /// Ordering key within the group.
    pub chapter_number: f64,
    /// Optional name.
    pub name: Option<String>,
    /// Content type.
    #[serde(rename = "type")]
    pub chapter_type: ChapterType,
    /// Inline text, only for hypertext chapters.
    pub text_content: Option<String>,
    /// Creation timestamp.
    pub created_at: i64,
}

/// Fields needed to insert a chapter.
#[derive(Debug, Clone)]
pub struct NewChapter {
    /// Book group ID.
    pub book_group_id: i64,
    /// Owner user ID.
    pub owner_id: i64,
    /// Chapter number.
    pub chapter_number: f64,
    /// Optional name.
    pub name: Option<String>,
    /// Content type.
    pub chapter_type: ChapterType,
    /// Inline text.
    pub text_content: Option<String>,
}

/// Image position within a chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookChapterImage {
    /// Chapter ID.
    pub book_chapter_id: i64,
    /// Image ID.
    pub image_id: i64,
    /// 1-based position.
    pub rank: i64,
}

/// Chapter list entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterListEntry {
    /// Chapter ID.
    pub id: i64,
    /// Chapter number.
    pub chapter_number: f64,
    /// Optional name.
    pub name: Option<String>,
    /// Creation timestamp.
    pub time_posted: i64,
    /// Uploader.
    pub user_posted: UserRef,
}

/// Most recently posted chapter of a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestChapter {
    /// Chapter ID.
    pub id: i64,
    /// Chapter number.
    pub chapter_number: f64,
    /// Optional name.
    pub name: Option<String>,
    /// Creation timestamp.
    pub date_created: i64,
}

/// Comment on a book group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookComment {
    /// Comment ID.
    pub id: i64,
    /// Book group ID.
    pub book_group_id: i64,
    /// Author of the comment.
    pub user: UserRef,
    /// Body.
    pub content: String,
    /// Creation timestamp.
    pub created_at: i64,
}

/// Like/dislike aggregates of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeTotals {
    /// Sum of positive points.
    pub likes: i64,
    /// Sum of negative points (zero or less).
    pub dislikes: i64,
}

/// Entity counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    /// Registered users.
    pub users: i64,
    /// Authors.
    pub authors: i64,
    /// Book groups.
    pub groups: i64,
    /// Chapters.
    pub chapters: i64,
    /// Registered images.
    pub images: i64,
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert timestamp to DateTime.
pub fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}

/// Calendar day used as the chapter view bucket.
pub fn view_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}
