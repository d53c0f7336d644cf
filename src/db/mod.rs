pub mod memory;
pub mod models;
pub mod queries;
pub mod redis;
pub mod store;
