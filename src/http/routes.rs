use axum::{routing::get, routing::patch, routing::post, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn auth() -> Router<AppState> {
    Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/verify-email", post(handlers::verify_email))
        .route("/forgot-password", post(handlers::forgot_password))
}

pub fn threads() -> Router<AppState> {
    Router::new()
        .route(
            "/threads",
            get(handlers::list_threads).post(handlers::create_thread),
        )
        .route(
            "/threads/:id",
            get(handlers::get_thread)
                .patch(handlers::update_thread)
                .delete(handlers::delete_thread),
        )
        .route(
            "/threads/:id/comments",
            get(handlers::list_comments).post(handlers::create_comment),
        )
}

pub fn comments() -> Router<AppState> {
    Router::new().route(
        "/comments/:id",
        axum::routing::put(handlers::update_comment).delete(handlers::delete_comment),
    )
}

pub fn categories() -> Router<AppState> {
    Router::new()
        .route(
            "/categories",
            get(handlers::list_categories).post(handlers::create_category),
        )
        .route(
            "/categories/:id",
            axum::routing::delete(handlers::delete_category),
        )
}

pub fn users() -> Router<AppState> {
    Router::new()
        .route("/users", get(handlers::list_users))
        .route("/users/:id", patch(handlers::update_profile))
        .route("/users/:id/role", patch(handlers::update_role))
        .route(
            "/users/:id/change-password",
            post(handlers::change_password),
        )
}

pub fn reports() -> Router<AppState> {
    Router::new()
        .route(
            "/reports",
            get(handlers::list_reports).post(handlers::create_report),
        )
        .route(
            "/reports/:id",
            get(handlers::get_report)
                .put(handlers::update_report)
                .delete(handlers::delete_report),
        )
}

pub fn admin() -> Router<AppState> {
    Router::new()
        .route("/admin/dashboard", get(handlers::dashboard))
        .route("/logs", get(handlers::list_logs))
}
