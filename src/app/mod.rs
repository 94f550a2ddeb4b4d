pub mod activity;
pub mod auth;
pub mod categories;
pub mod comments;
pub mod dashboard;
pub mod rate_limiter;
pub mod reports;
pub mod threads;
pub mod users;
