//! rentier - a Telegram group assistant.

pub mod assistant;
pub mod config;
