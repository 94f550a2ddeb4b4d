pub mod log_flusher;
pub mod seed;
