//! One-shot congratulations that fire per user once their local clock
//! passes a fixed wall-clock moment (New Year by default).
//!
//! There is no timer: `tick` runs on every group message and is cheap when
//! nobody is ready.

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::assistant::store::{SettingsStore, StoreError};
use crate::assistant::template::{fill_slot, mention};

pub const USERS_KEY: &str = "user_timezones";
pub const MESSAGES_KEY: &str = "congrats_msgs";

/// A user waiting for their congratulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledUser {
    pub id: i64,
    pub name: String,
    /// IANA timezone name, e.g. `Europe/Moscow`.
    pub tz: String,
    #[serde(default, rename = "congrats")]
    pub notified: bool,
}

/// A congratulation text with one `{}` slot for the mentions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CongratsMessage {
    #[serde(rename = "msg")]
    pub template: String,
    #[serde(default)]
    pub sent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// HTML text ready to send.
    pub text: String,
    /// Mentions of every user that became ready in this tick.
    pub mentions: Vec<String>,
}

pub struct CongratsTracker {
    target: NaiveDateTime,
}

impl CongratsTracker {
    /// `target` is compared against each user's local wall clock.
    pub fn new(target: NaiveDateTime) -> Self {
        Self { target }
    }

    /// Replace the tracked users and messages, clearing all flags.
    pub fn seed(
        &self,
        store: &SettingsStore,
        users: &[ScheduledUser],
        messages: &[CongratsMessage],
    ) -> Result<(), StoreError> {
        let users: Vec<ScheduledUser> = users
            .iter()
            .map(|u| ScheduledUser { notified: false, ..u.clone() })
            .collect();
        let messages: Vec<CongratsMessage> = messages
            .iter()
            .map(|m| CongratsMessage { sent: false, ..m.clone() })
            .collect();

        store.atomically(|batch| {
            batch.set(USERS_KEY, &users)?;
            batch.set(MESSAGES_KEY, &messages)
        })?;
        info!("Scheduled {} users with {} messages", users.len(), messages.len());
        Ok(())
    }

    /// Mark newly ready users and consume one message for all of them.
    ///
    /// The whole read-modify-write runs in one store transaction, so two
    /// concurrent ticks can never both claim the same user.
    pub fn tick(
        &self,
        store: &SettingsStore,
        now: DateTime<Utc>,
    ) -> Result<Option<Notification>, StoreError> {
        store.atomically(|batch| {
            let Some(mut users) = batch.get::<Vec<ScheduledUser>>(USERS_KEY)? else {
                return Ok(None);
            };

            let mut ready = Vec::new();
            let mut dropped = 0;
            for user in users.iter_mut().filter(|u| !u.notified) {
                let tz: Tz = match user.tz.parse() {
                    Ok(tz) => tz,
                    Err(e) => {
                        // Never retried.
                        warn!("Dropping {} ({}): bad timezone '{}': {}", user.name, user.id, user.tz, e);
                        user.notified = true;
                        dropped += 1;
                        continue;
                    }
                };
                if now.with_timezone(&tz).naive_local() >= self.target {
                    info!("{} ({}) reached {} in {}", user.name, user.id, self.target, user.tz);
                    user.notified = true;
                    ready.push(mention(user.id, &user.name));
                }
            }

            if ready.is_empty() {
                if dropped > 0 {
                    batch.set(USERS_KEY, &users)?;
                }
                return Ok(None);
            }
            batch.set(USERS_KEY, &users)?;

            let mut messages: Vec<CongratsMessage> = batch.get(MESSAGES_KEY)?.unwrap_or_default();
            let Some(message) = messages.iter_mut().find(|m| !m.sent) else {
                warn!("{} users ready but no congratulation messages left", ready.len());
                return Ok(None);
            };
            message.sent = true;
            let text = fill_slot(&message.template, &ready.join(", "));
            batch.set(MESSAGES_KEY, &messages)?;

            Ok(Some(Notification { text, mentions: ready }))
        })
    }
}
