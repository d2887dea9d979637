//! relay, channel storage and watch history backend for the FlameIPTV web app

pub mod config;
pub mod database;
pub mod logger;
pub mod server;

pub use config::*;
pub use database::RedisDatabase;
pub use logger::*;
pub use server::EdgeApplicationServer;
