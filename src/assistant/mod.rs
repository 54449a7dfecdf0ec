//! Group assistant - greets members, keeps per-chat settings and answers
//! keywords.

pub mod commands;
pub mod congrats;
pub mod engine;
pub mod event;
pub mod guard;
pub mod keywords;
pub mod membership;
pub mod store;
pub mod telegram;
pub mod template;

#[cfg(test)]
mod tests;

pub use commands::Command;
pub use engine::{Assistant, AssistantConfig, DeliveryError};
pub use event::{InboundEvent, Outbound};
pub use store::{SettingsStore, StoreError};
pub use telegram::{BotIdentity, TelegramClient};
