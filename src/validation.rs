//! Input validation helpers shared by the domain operations.
//!
//! Lengths are counted in Unicode scalar values, not bytes.

use crate::error::{AppError, Result};

/// Maximum chapter name length.
pub const MAX_CHAPTER_NAME: usize = 50;
/// Maximum author name length.
pub const MAX_AUTHOR_NAME: usize = 30;
/// Maximum author description length.
pub const MAX_AUTHOR_DESCRIPTION: usize = 50;
/// Maximum book group title length.
pub const MAX_GROUP_TITLE: usize = 100;
/// Maximum book group description length.
pub const MAX_GROUP_DESCRIPTION: usize = 500;
/// Maximum comment length.
pub const MAX_COMMENT: usize = 1000;

/// Whether the string contains a non-printable control character.
///
/// Line breaks and tabs are ordinary text here, since multi-line fields
/// allow them. Single-line fields use [`is_single_line`].
pub fn has_control_characters(s: &str) -> bool {
    s.chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
}

/// Whether the string is free of every control character, tabs and line
/// breaks included.
pub fn is_single_line(s: &str) -> bool {
    !s.chars().any(char::is_control)
}

/// Whether the string is empty or whitespace-only.
pub fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

fn too_long(s: &str, max: usize) -> bool {
    s.chars().count() > max
}

/// Check a chapter name: no control characters at all (tabs and line breaks
/// included), at most [`MAX_CHAPTER_NAME`] characters.
pub fn check_chapter_name(name: &str) -> bool {
    is_single_line(name) && !too_long(name, MAX_CHAPTER_NAME)
}

/// Validate hypertext chapter content.
pub fn check_text_content(content: &str) -> Result<()> {
    if has_control_characters(content) {
        return Err(AppError::Validation(
            "TextContent cannot contain control characters".to_string(),
        ));
    }
    if is_blank(content) {
        return Err(AppError::Validation("invalid content".to_string()));
    }
    Ok(())
}

/// Validate an author name.
pub fn check_author_name(name: &str) -> Result<()> {
    if too_long(name, MAX_AUTHOR_NAME) {
        return Err(AppError::Validation(format!(
            "name must be less than or equal to {} characters",
            MAX_AUTHOR_NAME
        )));
    }
    if is_blank(name) || !is_single_line(name) {
        return Err(AppError::Validation("invalid author name".to_string()));
    }
    Ok(())
}

/// Validate an author description.
pub fn check_author_description(description: &str) -> Result<()> {
    if too_long(description, MAX_AUTHOR_DESCRIPTION) {
        return Err(AppError::Validation(format!(
            "description must be less than or equal to {} characters",
            MAX_AUTHOR_DESCRIPTION
        )));
    }
    if has_control_characters(description) {
        return Err(AppError::Validation(
            "description cannot contain control characters".to_string(),
        ));
    }
    Ok(())
}

/// Validate a book group title.
pub fn check_group_title(title: &str) -> Result<()> {
    if is_blank(title) || !is_single_line(title) || too_long(title, MAX_GROUP_TITLE) {
        return Err(AppError::Validation(format!(
            "title must be a single line of 1-{} characters",
            MAX_GROUP_TITLE
        )));
    }
    Ok(())
}

/// Validate a book group description.
pub fn check_group_description(description: &str) -> Result<()> {
    if has_control_characters(description) || too_long(description, MAX_GROUP_DESCRIPTION) {
        return Err(AppError::Validation(format!(
            "description must be at most {} characters without control characters",
            MAX_GROUP_DESCRIPTION
        )));
    }
    Ok(())
}

/// Validate a comment body.
pub fn check_comment(content: &str) -> Result<()> {
    if is_blank(content) || has_control_characters(content) || too_long(content, MAX_COMMENT) {
        return Err(AppError::Validation(format!(
            "comment must be 1-{} characters without control characters",
            MAX_COMMENT
        )));
    }
    Ok(())
}
