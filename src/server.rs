//! HTTP server and routes.

mod extract;
mod handlers;
mod state;

pub use state::AppState;

use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/login", post(handlers::auth_login))
        .route("/register", post(handlers::auth_register))
        .route("/logout", post(handlers::auth_logout))
        .route("/me", get(handlers::auth_me));

    let user_routes = Router::new()
        .route("/me", patch(handlers::user_update_info))
        .route("/me/password", put(handlers::user_change_password))
        .route(
            "/me/favorites/{group_id}",
            post(handlers::user_add_favorite).delete(handlers::user_remove_favorite),
        )
        .route("/search", get(handlers::user_search))
        .route("/{user}/groups", get(handlers::user_groups))
        .route("/{user}", delete(handlers::user_delete));

    let role_routes = Router::new()
        .route("/", get(handlers::role_list).post(handlers::role_create))
        .route("/{name}", delete(handlers::role_delete));

    let author_routes = Router::new()
        .route("/", get(handlers::author_list).post(handlers::author_create))
        .route(
            "/{id}",
            get(handlers::author_get)
                .patch(handlers::author_update)
                .delete(handlers::author_delete),
        );

    let group_routes = Router::new()
        .route("/", get(handlers::group_list).post(handlers::group_create))
        .route("/ranking", get(handlers::group_ranking))
        .route(
            "/{id}",
            get(handlers::group_get)
                .patch(handlers::group_update)
                .delete(handlers::group_delete),
        )
        .route("/{id}/chapters", get(handlers::group_chapters))
        .route("/{id}/latest-chapter", get(handlers::group_latest_chapter))
        .route("/{id}/arts", post(handlers::group_add_art))
        .route(
            "/{id}/comments",
            get(handlers::group_comments).post(handlers::group_add_comment),
        )
        // Votes
        .route("/{id}/likes", get(handlers::group_likes))
        .route(
            "/{id}/like",
            post(handlers::group_like).delete(handlers::group_unlike),
        )
        .route("/{id}/dislike", post(handlers::group_dislike));

    let chapter_routes = Router::new()
        .route("/hypertext", post(handlers::chapter_create_hypertext))
        .route("/images", post(handlers::chapter_create_images))
        .route(
            "/{id}",
            get(handlers::chapter_content)
                .patch(handlers::chapter_update)
                .delete(handlers::chapter_delete),
        );

    let api_routes = Router::new()
        .route("/stats", get(handlers::api_stats))
        .route("/images", post(handlers::image_register))
        .route("/images/{id}", get(handlers::image_get));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/users", user_routes)
        .nest("/api/roles", role_routes)
        .nest("/api/authors", author_routes)
        .nest("/api/groups", group_routes)
        .nest("/api/chapters", chapter_routes)
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
