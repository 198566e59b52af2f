use crate::auth::{ADMIN_PERMISSIONS, CHAPTER_MANAGE, GROUP_CREATE};
use crate::config::Config;
use crate::db::{Database, NewUser, Session, User, now_timestamp};
use crate::error::AppError;
use crate::library::chapter::{
    self, ChapterBody, CreateHypertextChapter, CreateImagesChapter, UpdateHypertextChapter,
};
use crate::library::group::{self, AddBookGroupArt, CreateBookGroup, NewComment, RankingPeriod};
use crate::library::roles::{self, CreateRole};
use crate::library::image::{self, RegisterImage};
use crate::library::{author, likes, user};
use crate::server::{self, AppState};
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

fn test_db() -> Database {
    Database::open_memory().unwrap()
}

/// Users made here skip argon2; they never log in with a password.
fn create_user(db: &Database, username: &str, role: &str) -> User {
    db.create_user(&NewUser {
        username: username.to_string(),
        email: format!("{}@example.com", username),
        password_hash: "unused".to_string(),
        role: role.to_string(),
    })
    .unwrap()
}

fn create_group(db: &Database, owner: &User, title: &str) -> i64 {
    group::create(
        db,
        owner,
        CreateBookGroup {
            title: title.to_string(),
            description: None,
            authors: Vec::new(),
            primary_cover_art_id: None,
        },
    )
    .unwrap()
}

fn hypertext(group_id: i64, number: f64, name: Option<&str>, text: &str) -> CreateHypertextChapter {
    CreateHypertextChapter {
        book_group_id: group_id,
        chapter_number: Some(number),
        name: name.map(str::to_string),
        text_content: text.to_string(),
    }
}

fn create_text_chapter(db: &Database, owner: &User, group_id: i64, number: f64) -> i64 {
    chapter::create_hypertext(db, owner, hypertext(group_id, number, None, "Once upon a time"))
        .unwrap()
}

fn create_image(db: &Database, path: &str) -> i64 {
    db.create_image(path, None, None).unwrap().id
}

fn author_input(name: &str) -> author::AuthorInput {
    author::AuthorInput {
        name: name.to_string(),
        ..Default::default()
    }
}

// ========== DATABASE ==========

#[test]
fn db_seeds_builtin_roles() {
    let db = test_db();
    let roles = db.list_roles().unwrap();

    let admin = roles.iter().find(|r| r.name == "admin").unwrap();
    for permission in ADMIN_PERMISSIONS {
        assert!(admin.permissions.iter().any(|p| p == permission));
    }

    let reader = create_user(&db, "reader", "user");
    assert!(db.user_has_permission(reader.id, GROUP_CREATE).unwrap());
    assert!(!db.user_has_permission(reader.id, CHAPTER_MANAGE).unwrap());
}

#[test]
fn db_create_user_with_unknown_role() {
    let db = test_db();
    let result = db.create_user(&NewUser {
        username: "ghost".to_string(),
        email: "ghost@example.com".to_string(),
        password_hash: "unused".to_string(),
        role: "wizard".to_string(),
    });
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[test]
fn db_get_user_by_login_accepts_email() {
    let db = test_db();
    let alice = create_user(&db, "alice", "user");

    let by_email = db.get_user_by_login("alice@example.com").unwrap().unwrap();
    assert_eq!(by_email.id, alice.id);
    assert!(by_email.favorite_list.is_empty());
    assert!(db.get_user_by_login("nobody").unwrap().is_none());
}

#[test]
fn db_expired_sessions_cleanup() {
    let db = test_db();
    let user = create_user(&db, "testuser", "user");

    let expired = Session {
        token: "expired".to_string(),
        user_id: user.id,
        expires_at: now_timestamp() - 3600,
    };
    let valid = Session {
        token: "valid".to_string(),
        user_id: user.id,
        expires_at: now_timestamp() + 3600,
    };

    db.create_session(&expired).unwrap();
    db.create_session(&valid).unwrap();

    assert_eq!(db.cleanup_expired_sessions().unwrap(), 1);

    assert!(db.get_session("expired").unwrap().is_none());
    assert!(db.get_session("valid").unwrap().is_some());
}

#[test]
fn db_open_creates_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("novo.db");

    {
        let db = Database::open(&path).unwrap();
        create_user(&db, "persisted", "admin");
    }

    let db = Database::open(&path).unwrap();
    assert!(db.username_exists("persisted").unwrap());
    assert_eq!(db.stats().unwrap().users, 1);
}

#[test]
fn db_search_users_escapes_wildcards() {
    let db = test_db();
    create_user(&db, "mango", "user");
    create_user(&db, "tango", "user");
    create_user(&db, "plain", "user");

    let hits = db.search_users("ango").unwrap();
    assert_eq!(hits.len(), 2);

    assert!(db.search_users("%").unwrap().is_empty());
    assert!(user::search(&db, "   ").unwrap().is_empty());
}

// ========== CHAPTERS ==========

#[test]
fn chapter_name_rejects_line_breaks_and_control_characters() {
    let db = test_db();
    let admin = create_user(&db, "admin", "admin");
    let group_id = create_group(&db, &admin, "Night Shift");

    let too_long = "n".repeat(51);
    for name in [
        "line\rbreak",
        "line\nbreak",
        "Part\t1",
        "bell\u{7}",
        too_long.as_str(),
    ] {
        let result = chapter::create_hypertext(&db, &admin, hypertext(group_id, 1.0, Some(name), "text"));
        assert!(matches!(result, Err(AppError::Validation(_))), "{:?}", name);
    }
    assert_eq!(db.stats().unwrap().chapters, 0);
}

#[test]
fn chapter_requires_non_negative_number() {
    let db = test_db();
    let admin = create_user(&db, "admin", "admin");
    let group_id = create_group(&db, &admin, "Night Shift");

    let mut missing = hypertext(group_id, 1.0, None, "text");
    missing.chapter_number = None;
    assert!(matches!(
        chapter::create_hypertext(&db, &admin, missing),
        Err(AppError::Validation(msg)) if msg == "missing chapter number"
    ));

    assert!(matches!(
        chapter::create_hypertext(&db, &admin, hypertext(group_id, -1.0, None, "text")),
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        chapter::create_hypertext(&db, &admin, hypertext(group_id, 1.0, None, "   ")),
        Err(AppError::Validation(_))
    ));
}

#[test]
fn chapter_images_keep_given_order() {
    let db = test_db();
    let admin = create_user(&db, "admin", "admin");
    let group_id = create_group(&db, &admin, "Panels");
    let a = create_image(&db, "/img/a.png");
    let b = create_image(&db, "/img/b.png");
    let c = create_image(&db, "/img/c.png");

    let id = chapter::create_images(
        &db,
        &admin,
        CreateImagesChapter {
            book_group_id: group_id,
            chapter_number: Some(1.0),
            name: Some("Opening".to_string()),
            images: vec![c, a, b],
        },
    )
    .unwrap();

    let images = db.chapter_images(id).unwrap();
    let ranks: Vec<(i64, i64)> = images.iter().map(|i| (i.image_id, i.rank)).collect();
    assert_eq!(ranks, vec![(c, 1), (a, 2), (b, 3)]);

    let content = chapter::content(&db, id).unwrap();
    assert_eq!(content.name, "Opening");
    assert_eq!(
        content.body,
        ChapterBody::Images {
            images: vec![
                "/img/c.png".to_string(),
                "/img/a.png".to_string(),
                "/img/b.png".to_string(),
            ],
        }
    );
}

#[test]
fn chapter_images_without_images_reads_empty() {
    let db = test_db();
    let admin = create_user(&db, "admin", "admin");
    let group_id = create_group(&db, &admin, "Panels");

    let id = chapter::create_images(
        &db,
        &admin,
        CreateImagesChapter {
            book_group_id: group_id,
            chapter_number: Some(0.5),
            name: None,
            images: Vec::new(),
        },
    )
    .unwrap();

    let content = chapter::content(&db, id).unwrap();
    assert_eq!(content.name, "");
    assert_eq!(content.body, ChapterBody::Images { images: Vec::new() });
}

#[test]
fn chapter_with_missing_image_creates_nothing() {
    let db = test_db();
    let admin = create_user(&db, "admin", "admin");
    let group_id = create_group(&db, &admin, "Panels");
    let existing = create_image(&db, "/img/a.png");

    let result = chapter::create_images(
        &db,
        &admin,
        CreateImagesChapter {
            book_group_id: group_id,
            chapter_number: Some(1.0),
            name: None,
            images: vec![existing, 9999],
        },
    );

    assert!(matches!(result, Err(AppError::Validation(msg)) if msg == "image 9999 does not exist"));
    assert_eq!(db.stats().unwrap().chapters, 0);
    assert!(chapter::latest(&db, group_id).unwrap().is_none());
}

#[test]
fn chapter_duplicate_number_conflicts() {
    let db = test_db();
    let admin = create_user(&db, "admin", "admin");
    let group_id = create_group(&db, &admin, "Night Shift");

    create_text_chapter(&db, &admin, group_id, 3.0);
    let result = chapter::create_hypertext(&db, &admin, hypertext(group_id, 3.0, None, "again"));
    assert!(matches!(result, Err(AppError::Conflict(_))));

    let other_group = create_group(&db, &admin, "Day Shift");
    create_text_chapter(&db, &admin, other_group, 3.0);
}

#[test]
fn chapter_update_keeps_stored_values() {
    let db = test_db();
    let admin = create_user(&db, "admin", "admin");
    let group_id = create_group(&db, &admin, "Night Shift");
    let id = chapter::create_hypertext(
        &db,
        &admin,
        hypertext(group_id, 2.0, Some("Arrival"), "Original text"),
    )
    .unwrap();

    chapter::update_hypertext(
        &db,
        &admin,
        id,
        UpdateHypertextChapter {
            chapter_number: Some(0.0),
            name: Some(String::new()),
            text_content: Some(String::new()),
        },
    )
    .unwrap();

    let stored = db.get_chapter(id).unwrap().unwrap();
    assert_eq!(stored.chapter_number, 2.0);
    assert_eq!(stored.name.as_deref(), Some("Arrival"));
    assert_eq!(stored.text_content.as_deref(), Some("Original text"));

    chapter::update_hypertext(
        &db,
        &admin,
        id,
        UpdateHypertextChapter {
            chapter_number: Some(2.5),
            name: Some("Departure".to_string()),
            text_content: Some("Rewritten".to_string()),
        },
    )
    .unwrap();

    let stored = db.get_chapter(id).unwrap().unwrap();
    assert_eq!(stored.chapter_number, 2.5);
    assert_eq!(stored.name.as_deref(), Some("Departure"));
    assert_eq!(stored.text_content.as_deref(), Some("Rewritten"));

    chapter::update_hypertext(
        &db,
        &admin,
        id,
        UpdateHypertextChapter {
            name: Some("   ".to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    let stored = db.get_chapter(id).unwrap().unwrap();
    assert_eq!(stored.name.as_deref(), Some("Departure"));

    let result = chapter::update_hypertext(
        &db,
        &admin,
        id,
        UpdateHypertextChapter {
            name: Some("two\nlines".to_string()),
            ..Default::default()
        },
    );
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[test]
fn chapter_update_rejects_images_chapter() {
    let db = test_db();
    let admin = create_user(&db, "admin", "admin");
    let group_id = create_group(&db, &admin, "Panels");
    let id = chapter::create_images(
        &db,
        &admin,
        CreateImagesChapter {
            book_group_id: group_id,
            chapter_number: Some(1.0),
            name: None,
            images: Vec::new(),
        },
    )
    .unwrap();

    let result = chapter::update_hypertext(&db, &admin, id, UpdateHypertextChapter::default());
    assert!(matches!(
        result,
        Err(AppError::Validation(msg)) if msg == "Type of chapter is not hypertext"
    ));
}

#[test]
fn chapter_delete_missing_is_not_found() {
    let db = test_db();
    let admin = create_user(&db, "admin", "admin");

    assert!(matches!(
        chapter::delete(&db, &admin, 42),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn chapter_ownership_is_enforced() {
    let db = test_db();
    let owner = create_user(&db, "owner", "user");
    let stranger = create_user(&db, "stranger", "user");
    let admin = create_user(&db, "admin", "admin");
    let group_id = create_group(&db, &owner, "Mine");
    let id = create_text_chapter(&db, &owner, group_id, 1.0);

    let upload = chapter::create_hypertext(&db, &stranger, hypertext(group_id, 2.0, None, "text"));
    assert!(matches!(upload, Err(AppError::Forbidden(_))));
    assert!(matches!(
        chapter::delete(&db, &stranger, id),
        Err(AppError::Forbidden(_))
    ));

    chapter::delete(&db, &admin, id).unwrap();
    assert!(db.get_chapter(id).unwrap().is_none());
}

#[test]
fn chapter_upload_to_missing_group() {
    let db = test_db();
    let admin = create_user(&db, "admin", "admin");

    let result = chapter::create_hypertext(&db, &admin, hypertext(77, 1.0, None, "text"));
    assert!(matches!(result, Err(AppError::NotFound(msg)) if msg == "Book group not exist"));
}

#[test]
fn chapter_reading_counts_views() {
    let db = test_db();
    let admin = create_user(&db, "admin", "admin");
    let group_id = create_group(&db, &admin, "Popular");
    let id = create_text_chapter(&db, &admin, group_id, 1.0);

    chapter::content(&db, id).unwrap();
    chapter::content(&db, id).unwrap();

    assert_eq!(db.chapter_views(id).unwrap(), 2);
    assert_eq!(group::detail(&db, group_id).unwrap().views, 2);
}

#[test]
fn chapter_latest_is_most_recently_posted() {
    let db = test_db();
    let admin = create_user(&db, "admin", "admin");
    let group_id = create_group(&db, &admin, "Out Of Order");

    assert!(chapter::latest(&db, group_id).unwrap().is_none());

    create_text_chapter(&db, &admin, group_id, 5.0);
    let newest = create_text_chapter(&db, &admin, group_id, 2.0);

    let latest = chapter::latest(&db, group_id).unwrap().unwrap();
    assert_eq!(latest.id, newest);
    assert_eq!(latest.chapter_number, 2.0);

    let listed = chapter::list_by_group(&db, group_id, None, 50).unwrap();
    let numbers: Vec<f64> = listed.iter().map(|c| c.chapter_number).collect();
    assert_eq!(numbers, vec![2.0, 5.0]);
    assert_eq!(listed[0].user_posted.name, "admin");
}

// ========== LIKES ==========

#[test]
fn likes_new_vote_replaces_old() {
    let db = test_db();
    let admin = create_user(&db, "admin", "admin");
    let reader = create_user(&db, "reader", "user");
    let group_id = create_group(&db, &admin, "Divisive");

    likes::like(&db, &reader, group_id).unwrap();
    likes::dislike(&db, &reader, group_id).unwrap();

    assert_eq!(db.like_row_count(group_id).unwrap(), 1);
    let summary = likes::summary(&db, Some(&reader), group_id).unwrap();
    assert_eq!(summary.likes, 0);
    assert_eq!(summary.dislikes, -1);
    assert_eq!(summary.user_vote, Some(likes::DISLIKE_POINT));

    likes::like(&db, &admin, group_id).unwrap();
    let anonymous = likes::summary(&db, None, group_id).unwrap();
    assert_eq!((anonymous.likes, anonymous.dislikes), (1, -1));
    assert_eq!(anonymous.user_vote, None);
}

#[test]
fn likes_listing_counts_only_positive_points() {
    let db = test_db();
    let admin = create_user(&db, "admin", "admin");
    let reader = create_user(&db, "reader", "user");
    let group_id = create_group(&db, &admin, "Divisive");

    likes::like(&db, &admin, group_id).unwrap();
    likes::dislike(&db, &reader, group_id).unwrap();

    let listed = group::list(&db, None, 10).unwrap();
    let detail = group::detail(&db, group_id).unwrap();
    assert_eq!(listed[0].likes, 1);
    assert_eq!(detail.likes, 1);
    assert_eq!(detail.dislikes, -1);
    assert_eq!(db.group_summary(group_id).unwrap().unwrap().likes, 1);
}

#[test]
fn likes_unlike_without_vote_is_noop() {
    let db = test_db();
    let admin = create_user(&db, "admin", "admin");
    let group_id = create_group(&db, &admin, "Quiet");

    likes::unlike(&db, &admin, group_id).unwrap();

    let summary = likes::summary(&db, Some(&admin), group_id).unwrap();
    assert_eq!((summary.likes, summary.dislikes), (0, 0));
    assert_eq!(db.like_row_count(group_id).unwrap(), 0);

    likes::like(&db, &admin, group_id).unwrap();
    likes::unlike(&db, &admin, group_id).unwrap();
    assert_eq!(db.like_row_count(group_id).unwrap(), 0);
}

#[test]
fn likes_on_missing_group() {
    let db = test_db();
    let reader = create_user(&db, "reader", "user");

    assert!(matches!(
        likes::like(&db, &reader, 5),
        Err(AppError::NotFound(_))
    ));
}

// ========== AUTHORS ==========

#[test]
fn author_create_and_conflicts() {
    let db = test_db();
    let admin = create_user(&db, "admin", "admin");
    let reader = create_user(&db, "reader", "user");

    let id = author::create(&db, &admin, author_input("Kentaro")).unwrap();
    assert_eq!(author::get(&db, id).unwrap().name, "Kentaro");

    assert!(matches!(
        author::create(&db, &admin, author_input("Kentaro")),
        Err(AppError::Conflict(msg)) if msg == "name was exist"
    ));
    assert!(matches!(
        author::create(&db, &reader, author_input("Someone")),
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        author::create(&db, &admin, author_input(&"x".repeat(31))),
        Err(AppError::Validation(_))
    ));
}

#[test]
fn author_update_keeps_empty_fields() {
    let db = test_db();
    let admin = create_user(&db, "admin", "admin");
    let id = author::create(
        &db,
        &admin,
        author::AuthorInput {
            name: "Naoki".to_string(),
            description: Some("Mangaka".to_string()),
            avatar_id: None,
        },
    )
    .unwrap();
    let other = author::create(&db, &admin, author_input("Hiro")).unwrap();

    // Same name on itself is not a conflict.
    author::update(&db, &admin, id, author_input("Naoki")).unwrap();
    author::update(&db, &admin, id, author::AuthorInput::default()).unwrap();

    let stored = author::get(&db, id).unwrap();
    assert_eq!(stored.name, "Naoki");
    assert_eq!(stored.description.as_deref(), Some("Mangaka"));

    assert!(matches!(
        author::update(&db, &admin, other, author_input("Naoki")),
        Err(AppError::Conflict(_))
    ));
}

#[test]
fn author_delete_missing_is_not_found() {
    let db = test_db();
    let admin = create_user(&db, "admin", "admin");

    assert!(matches!(
        author::delete(&db, &admin, 404),
        Err(AppError::NotFound(msg)) if msg == "Author not exist"
    ));
}

#[test]
fn author_delete_cascades_to_groups() {
    let db = test_db();
    let admin = create_user(&db, "admin", "admin");
    let author_id = author::create(&db, &admin, author_input("Prolific")).unwrap();
    let group_id = group::create(
        &db,
        &admin,
        CreateBookGroup {
            title: "Saga".to_string(),
            description: Some("Long running".to_string()),
            authors: vec![author_id],
            primary_cover_art_id: None,
        },
    )
    .unwrap();
    let untouched = create_group(&db, &admin, "Standalone");
    let chapter_id = create_text_chapter(&db, &admin, group_id, 1.0);
    chapter::content(&db, chapter_id).unwrap();
    likes::like(&db, &admin, group_id).unwrap();
    group::add_comment(
        &db,
        &admin,
        group_id,
        NewComment {
            content: "First!".to_string(),
        },
    )
    .unwrap();

    user::add_favorite(&db, &admin, untouched).unwrap();
    user::add_favorite(&db, &admin, group_id).unwrap();

    author::delete(&db, &admin, author_id).unwrap();

    let admin = db.get_user_by_id(admin.id).unwrap().unwrap();
    assert_eq!(admin.favorite_list, vec![untouched]);
    assert!(!db.book_group_exists(group_id).unwrap());
    assert!(db.get_chapter(chapter_id).unwrap().is_none());
    assert!(db.book_group_exists(untouched).unwrap());
    let stats = db.stats().unwrap();
    assert_eq!(stats.authors, 0);
    assert_eq!(stats.groups, 1);
    assert_eq!(stats.chapters, 0);
}

// ========== BOOK GROUPS ==========

#[test]
fn group_detail_and_partial_update() {
    let db = test_db();
    let owner = create_user(&db, "owner", "user");
    let admin = create_user(&db, "admin", "admin");
    let author_id = author::create(&db, &admin, author_input("Writer")).unwrap();
    let cover = create_image(&db, "/covers/one.jpg");
    let group_id = group::create(
        &db,
        &owner,
        CreateBookGroup {
            title: "  Spaced Title  ".to_string(),
            description: Some("About things".to_string()),
            authors: vec![author_id],
            primary_cover_art_id: Some(cover),
        },
    )
    .unwrap();

    let detail = group::detail(&db, group_id).unwrap();
    assert_eq!(detail.title, "Spaced Title");
    assert_eq!(detail.owner.name, "owner");
    assert_eq!(detail.authors.len(), 1);
    assert_eq!(detail.image.as_deref(), Some("/covers/one.jpg"));
    assert!(detail.latest_chapter.is_none());

    group::update(
        &db,
        &owner,
        group_id,
        group::UpdateBookGroup {
            title: Some(String::new()),
            authors: Some(Vec::new()),
            ..Default::default()
        },
    )
    .unwrap();

    let detail = group::detail(&db, group_id).unwrap();
    assert_eq!(detail.title, "Spaced Title");
    assert_eq!(detail.description.as_deref(), Some("About things"));
    assert!(detail.authors.is_empty());
    assert_eq!(detail.image.as_deref(), Some("/covers/one.jpg"));
}

#[test]
fn group_rejects_unknown_references() {
    let db = test_db();
    let owner = create_user(&db, "owner", "user");

    let missing_author = group::create(
        &db,
        &owner,
        CreateBookGroup {
            title: "Ghost Written".to_string(),
            description: None,
            authors: vec![12],
            primary_cover_art_id: None,
        },
    );
    assert!(matches!(missing_author, Err(AppError::Validation(_))));

    let missing_cover = group::create(
        &db,
        &owner,
        CreateBookGroup {
            title: "No Cover".to_string(),
            description: None,
            authors: Vec::new(),
            primary_cover_art_id: Some(3),
        },
    );
    assert!(matches!(missing_cover, Err(AppError::Validation(_))));
    assert_eq!(db.stats().unwrap().groups, 0);
}

#[test]
fn group_update_by_stranger_is_forbidden() {
    let db = test_db();
    let owner = create_user(&db, "owner", "user");
    let stranger = create_user(&db, "stranger", "user");
    let group_id = create_group(&db, &owner, "Private");

    assert!(matches!(
        group::update(&db, &stranger, group_id, group::UpdateBookGroup::default()),
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        group::delete(&db, &stranger, group_id),
        Err(AppError::Forbidden(_))
    ));

    group::delete(&db, &owner, group_id).unwrap();
    assert!(matches!(
        group::detail(&db, group_id),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn group_primary_art_becomes_cover() {
    let db = test_db();
    let owner = create_user(&db, "owner", "user");
    let group_id = create_group(&db, &owner, "Gallery");
    let first = create_image(&db, "/art/1.png");
    let second = create_image(&db, "/art/2.png");

    group::add_art(
        &db,
        &owner,
        group_id,
        AddBookGroupArt {
            image_id: first,
            primary: false,
        },
    )
    .unwrap();
    assert!(group::detail(&db, group_id).unwrap().image.is_none());

    group::add_art(
        &db,
        &owner,
        group_id,
        AddBookGroupArt {
            image_id: second,
            primary: true,
        },
    )
    .unwrap();

    let detail = group::detail(&db, group_id).unwrap();
    assert_eq!(detail.arts.len(), 2);
    assert_eq!(detail.image.as_deref(), Some("/art/2.png"));
}

#[test]
fn group_comments_newest_first() {
    let db = test_db();
    let owner = create_user(&db, "owner", "user");
    let reader = create_user(&db, "reader", "user");
    let group_id = create_group(&db, &owner, "Talkative");

    for content in ["first", "second"] {
        group::add_comment(
            &db,
            &reader,
            group_id,
            NewComment {
                content: content.to_string(),
            },
        )
        .unwrap();
    }

    let blank = group::add_comment(
        &db,
        &reader,
        group_id,
        NewComment {
            content: "   ".to_string(),
        },
    );
    assert!(matches!(blank, Err(AppError::Validation(_))));

    let comments = group::comments(&db, group_id).unwrap();
    let bodies: Vec<&str> = comments.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(bodies, vec!["second", "first"]);
    assert_eq!(comments[0].user.name, "reader");
    assert_eq!(group::detail(&db, group_id).unwrap().comments, 2);
}

#[test]
fn group_ranking_by_period() {
    let db = test_db();
    let owner = create_user(&db, "owner", "user");
    let classic = create_group(&db, &owner, "Classic");
    let trending = create_group(&db, &owner, "Trending");
    let old_chapter = create_text_chapter(&db, &owner, classic, 1.0);
    let new_chapter = create_text_chapter(&db, &owner, trending, 1.0);

    for _ in 0..5 {
        db.record_view(old_chapter, "2001-01-01").unwrap();
    }
    chapter::content(&db, new_chapter).unwrap();

    let week = group::ranking(&db, RankingPeriod::Week, 10).unwrap();
    assert_eq!(week[0].id, trending);
    assert_eq!(week[0].views, 1);

    let all = group::ranking(&db, RankingPeriod::All, 10).unwrap();
    assert_eq!(all[0].id, classic);
    assert_eq!(all[0].views, 5);
}

#[test]
fn group_listing_and_owner_filter() {
    let db = test_db();
    let owner = create_user(&db, "owner", "user");
    let other = create_user(&db, "other", "user");
    create_group(&db, &owner, "One");
    create_group(&db, &owner, "Two");
    create_group(&db, &other, "Three");

    assert_eq!(group::list(&db, Some(1), 2).unwrap().len(), 2);
    assert_eq!(group::list(&db, Some(2), 2).unwrap().len(), 1);
    assert_eq!(group::by_owner(&db, owner.id).unwrap().len(), 2);
    assert!(matches!(
        group::by_owner(&db, 999),
        Err(AppError::NotFound(_))
    ));
}

// ========== USERS AND ROLES ==========

#[test]
fn user_favorites_add_and_remove() {
    let db = test_db();
    let reader = create_user(&db, "reader", "user");
    let group_id = create_group(&db, &reader, "Favorite");

    let favorites = user::add_favorite(&db, &reader, group_id).unwrap();
    assert_eq!(favorites, vec![group_id]);

    let reader = db.get_user_by_id(reader.id).unwrap().unwrap();
    assert_eq!(reader.favorite_list, vec![group_id]);
    assert_eq!(user::add_favorite(&db, &reader, group_id).unwrap().len(), 1);

    assert!(user::remove_favorite(&db, &reader, group_id).unwrap().is_empty());
    assert!(matches!(
        user::add_favorite(&db, &reader, 999),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn user_favorites_ignore_stale_caller() {
    let db = test_db();
    let reader = create_user(&db, "reader", "user");
    let first = create_group(&db, &reader, "First");
    let second = create_group(&db, &reader, "Second");

    // Both calls reuse the user loaded before either write.
    user::add_favorite(&db, &reader, first).unwrap();
    let favorites = user::add_favorite(&db, &reader, second).unwrap();
    assert_eq!(favorites, vec![first, second]);

    let favorites = user::remove_favorite(&db, &reader, first).unwrap();
    assert_eq!(favorites, vec![second]);
    let stored = db.get_user_by_id(reader.id).unwrap().unwrap();
    assert_eq!(stored.favorite_list, vec![second]);
}

#[test]
fn user_favorites_drop_deleted_group() {
    let db = test_db();
    let owner = create_user(&db, "owner", "user");
    let reader = create_user(&db, "reader", "user");
    let kept = create_group(&db, &owner, "Kept");
    let doomed = create_group(&db, &owner, "Doomed");

    user::add_favorite(&db, &reader, doomed).unwrap();
    user::add_favorite(&db, &reader, kept).unwrap();
    user::add_favorite(&db, &owner, doomed).unwrap();

    group::delete(&db, &owner, doomed).unwrap();

    let reader = db.get_user_by_id(reader.id).unwrap().unwrap();
    assert_eq!(reader.favorite_list, vec![kept]);
    let owner = db.get_user_by_id(owner.id).unwrap().unwrap();
    assert!(owner.favorite_list.is_empty());
}

#[test]
fn user_update_info_conflicts() {
    let db = test_db();
    let alice = create_user(&db, "alice", "user");
    create_user(&db, "bob", "user");

    let taken = user::update_info(
        &db,
        &alice,
        user::UpdateUserInfo {
            username: Some("bob".to_string()),
            ..Default::default()
        },
    );
    assert!(matches!(taken, Err(AppError::Conflict(_))));

    user::update_info(
        &db,
        &alice,
        user::UpdateUserInfo {
            summary: Some("Reads everything".to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    let alice = db.get_user_by_id(alice.id).unwrap().unwrap();
    assert_eq!(alice.summary.as_deref(), Some("Reads everything"));
    assert_eq!(alice.username, "alice");
}

#[test]
fn user_delete_rules() {
    let db = test_db();
    let admin = create_user(&db, "admin", "admin");
    let reader = create_user(&db, "reader", "user");

    assert!(matches!(
        user::delete(&db, &reader, "admin"),
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        user::delete(&db, &admin, "admin"),
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        user::delete(&db, &admin, "nobody"),
        Err(AppError::NotFound(_))
    ));

    user::delete(&db, &admin, "reader").unwrap();
    assert!(!db.username_exists("reader").unwrap());
}

#[test]
fn roles_create_and_delete() {
    let db = test_db();
    let admin = create_user(&db, "admin", "admin");
    let reader = create_user(&db, "reader", "user");

    let request = || CreateRole {
        name: "editor".to_string(),
        description: Some("Edits chapters".to_string()),
        permissions: vec![CHAPTER_MANAGE.to_string()],
    };

    assert!(matches!(
        roles::create(&db, &reader, request()),
        Err(AppError::Forbidden(_))
    ));
    roles::create(&db, &admin, request()).unwrap();
    assert!(matches!(
        roles::create(&db, &admin, request()),
        Err(AppError::Conflict(_))
    ));

    let editor = create_user(&db, "editor", "editor");
    assert!(db.user_has_permission(editor.id, CHAPTER_MANAGE).unwrap());

    assert!(matches!(
        roles::delete(&db, &admin, "user"),
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        roles::delete(&db, &admin, "missing"),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn roles_parse_permission() {
    assert_eq!(
        roles::parse_permission("book_group.create").unwrap(),
        ("book_group".to_string(), "create".to_string())
    );
    assert!(roles::parse_permission("nodot").is_err());
    assert!(roles::parse_permission("a.").is_err());
    assert!(roles::parse_permission("bad module.x").is_err());
}

#[test]
fn image_register_validates_digests() {
    let db = test_db();
    let admin = create_user(&db, "admin", "admin");
    let reader = create_user(&db, "reader", "user");
    let request = |md5: &str| RegisterImage {
        path: "/storage/page-001.webp".to_string(),
        md5: Some(md5.to_string()),
        sha1: None,
    };

    assert!(matches!(
        image::register(&db, &reader, request("d41d8cd98f00b204e9800998ecf8427e")),
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        image::register(&db, &admin, request("not-hex")),
        Err(AppError::Validation(_))
    ));

    let stored = image::register(&db, &admin, request("D41D8CD98F00B204E9800998ECF8427E")).unwrap();
    assert_eq!(stored.md5.as_deref(), Some("d41d8cd98f00b204e9800998ecf8427e"));
    assert_eq!(image::get(&db, stored.id).unwrap().path, "/storage/page-001.webp");
    assert!(matches!(image::get(&db, stored.id + 1), Err(AppError::NotFound(_))));
}

// ========== CONFIG ==========

#[test]
fn config_parse_toml() {
    let toml = r#"
[server]
bind = "127.0.0.1:9090"

[database]
path = "/tmp/test.db"

[auth]
registration = "disabled"
session_days = 7

[pagination]
chapters_per_page = 20
"#;
    let config: Config = toml::from_str(toml).unwrap();
    assert_eq!(config.server.bind.port(), 9090);
    assert!(!config.auth.registration_enabled());
    assert_eq!(config.auth.session_days, 7);
    assert_eq!(config.pagination.chapters_per_page, 20);
    assert_eq!(config.pagination.groups_per_page, 24);
}

#[test]
fn config_default_values() {
    let config = Config::default();
    assert_eq!(config.server.bind.port(), 8080);
    assert!(config.auth.registration_enabled());
    assert_eq!(config.pagination.authors_per_page, 50);

    let generated: Config = toml::from_str(&Config::generate_default()).unwrap();
    assert_eq!(generated.server.bind, config.server.bind);
}

// ========== HTTP ==========

fn test_app(db: Database) -> axum::Router {
    server::create_router(AppState::new(Config::default(), db))
}

/// Give `user` a session directly, skipping password hashing.
fn token_for(db: &Database, user: &User) -> String {
    let token = format!("token-{}", user.id);
    db.create_session(&Session {
        token: token.clone(),
        user_id: user.id,
        expires_at: now_timestamp() + 3600,
    })
    .unwrap();
    token
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn http_register_login_and_me() {
    let db = test_db();
    let app = test_app(db);

    let (status, body) = send(
        app.clone(),
        json_request(
            "POST",
            "/api/auth/register",
            None,
            json!({ "username": "newbie", "email": "newbie@example.com", "password": "secret" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "user");

    let (status, body) = send(
        app.clone(),
        json_request(
            "POST",
            "/api/auth/login",
            None,
            json!({ "email": "newbie@example.com", "password": "secret" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let me = Request::builder()
        .uri("/api/auth/me")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app.clone(), me).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "newbie");
    assert!(body.get("passwordHash").is_none());
    assert!(
        body["permissions"]
            .as_array()
            .unwrap()
            .contains(&json!(GROUP_CREATE))
    );

    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/api/auth/login",
            None,
            json!({ "username": "newbie", "password": "wrong" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn http_error_bodies() {
    let db = test_db();
    let app = test_app(db);

    let (status, body) = send(app.clone(), get("/api/chapters/not-a-number")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = send(app.clone(), get("/api/chapters/12")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Chapter not exist" }));

    let (status, _) = send(
        app.clone(),
        json_request("POST", "/api/groups", None, json!({ "title": "Anonymous" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let malformed = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(app, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("error parsing json"));
}

#[tokio::test]
async fn http_chapter_upload_and_read() {
    let db = test_db();
    let uploader = create_user(&db, "uploader", "user");
    let token = token_for(&db, &uploader);
    let app = test_app(db.clone());

    let (status, body) = send(
        app.clone(),
        json_request(
            "POST",
            "/api/groups",
            Some(&token),
            json!({ "title": "Web Novel" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let group_id = body["id"].as_i64().unwrap();

    let (status, body) = send(
        app.clone(),
        json_request(
            "POST",
            "/api/chapters/hypertext",
            Some(&token),
            json!({
                "bookGroupId": group_id,
                "chapterNumber": 1,
                "textContent": "It was a dark and stormy night."
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let chapter_id = body["id"].as_i64().unwrap();

    let (status, body) = send(app.clone(), get(&format!("/api/chapters/{}", chapter_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "type": "hypertext",
            "bookGroupId": group_id,
            "chapterNumber": 1.0,
            "name": "",
            "textContent": "It was a dark and stormy night."
        })
    );

    let (status, body) = send(
        app.clone(),
        get(&format!("/api/groups/{}/latest-chapter", group_id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], chapter_id);

    let (status, body) = send(app, get(&format!("/api/groups/{}", group_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["views"], 1);
    assert_eq!(body["owner"]["name"], "uploader");
}

#[tokio::test]
async fn http_votes_report_own_vote() {
    let db = test_db();
    let owner = create_user(&db, "owner", "user");
    let group_id = create_group(&db, &owner, "Votable");
    let token = token_for(&db, &owner);
    let app = test_app(db);

    let (status, _) = send(
        app.clone(),
        json_request(
            "POST",
            &format!("/api/groups/{}/dislike", group_id),
            Some(&token),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, anonymous) = send(app.clone(), get(&format!("/api/groups/{}/likes", group_id))).await;
    assert_eq!(anonymous, json!({ "likes": 0, "dislikes": -1 }));

    let own = Request::builder()
        .uri(format!("/api/groups/{}/likes", group_id))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let (_, body) = send(app, own).await;
    assert_eq!(body["userVote"], -1);
}
