pub mod cache;
pub mod db;
pub mod documents;
pub mod response_cache;
pub mod storage;
