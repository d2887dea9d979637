pub mod channel;
pub mod redis_connection;
pub mod visit;
pub mod watch;

pub use redis_connection::RedisDatabase;
