pub mod app_config;
pub mod app_dirs;
pub mod file_store;
pub mod memory_store;
pub mod redis_repo;
pub mod ticket_api;

pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use redis_repo::RedisStore;
pub use ticket_api::HttpTicketService;
