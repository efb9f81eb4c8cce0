pub mod app_config;
pub mod bidding_client;
pub mod memory;
pub mod redis_repo;
pub mod timed;
pub mod webhook;

pub use bidding_client::HttpBiddingMirror;
pub use memory::InMemoryStore;
pub use redis_repo::RedisStore;
pub use timed::TimedStore;
pub use webhook::WebhookNotifier;
