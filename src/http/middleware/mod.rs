pub mod rate_limit;
pub mod static_files;
