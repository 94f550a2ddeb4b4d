pub mod activity;
pub mod category;
pub mod comment;
pub mod report;
pub mod thread;
pub mod user;
