//! The assistant: routes inbound events to the components and collects what
//! should be sent back.

use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::assistant::commands::{self, Command, GOT_IT};
use crate::assistant::congrats::{CongratsMessage, CongratsTracker, ScheduledUser};
use crate::assistant::event::{CommandInvocation, InboundEvent, Outbound, TextFormat, TextMessage};
use crate::assistant::guard::is_group;
use crate::assistant::keywords::{self, Content, DispatchInput, ReplyMode};
use crate::assistant::membership;
use crate::assistant::store::{SettingsStore, StoreError};

const RELAY_USAGE: &str = "Usage: /relay <alias> <text>";

/// Assistant settings derived from the config file.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Bot username without the leading `@`.
    pub bot_username: String,
    pub owner_ids: Vec<i64>,
    pub relay_chats: HashMap<String, i64>,
    /// Local wall-clock moment that triggers congratulations.
    pub congrats_target: NaiveDateTime,
    pub scheduled_users: Vec<ScheduledUser>,
    pub congrats_messages: Vec<CongratsMessage>,
}

impl AssistantConfig {
    fn is_owner(&self, user_id: i64) -> bool {
        self.owner_ids.contains(&user_id)
    }
}

/// Why the gateway could not deliver a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The bot may no longer post in the chat (kicked, blocked, bad token).
    Unauthorized,
    /// The chat id is not reachable.
    PeerInvalid,
    Other(String),
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::PeerInvalid => write!(f, "peer id invalid"),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for DeliveryError {}

/// One async mutex per chat id, so events of a chat are handled one at a time.
#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    /// Number of chats that have a lock.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub struct Assistant {
    config: AssistantConfig,
    store: Arc<SettingsStore>,
    tracker: CongratsTracker,
    chat_locks: ChatLocks,
}

impl Assistant {
    pub fn new(config: AssistantConfig, store: Arc<SettingsStore>) -> Self {
        let tracker = CongratsTracker::new(config.congrats_target);
        Self {
            config,
            store,
            tracker,
            chat_locks: ChatLocks::default(),
        }
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    pub fn chat_locks(&self) -> &ChatLocks {
        &self.chat_locks
    }

    /// Handle one inbound event and return the messages to send, in order.
    ///
    /// Store failures are logged and turn the event into a no-op.
    pub async fn handle<R>(&self, event: InboundEvent, now: DateTime<Utc>, rng: &mut R) -> Vec<Outbound>
    where
        R: Rng + Send + ?Sized,
    {
        let chat_id = event.chat().id;
        // Direct chats never write chat settings.
        let _chat = if is_group(chat_id) {
            Some(self.chat_locks.lock_chat(chat_id).await)
        } else {
            None
        };

        let result = match &event {
            InboundEvent::MembershipChanged(update) => {
                membership::route(&self.store, update, &self.config.bot_username)
            }
            InboundEvent::TextMessage(message) => self.on_text(message, now, rng),
            InboundEvent::CommandInvoked(invocation) => self.on_command(invocation),
        };

        match result {
            Ok(out) => out,
            Err(e) => {
                error!("Failed to handle event in chat {}: {}", chat_id, e);
                Vec::new()
            }
        }
    }

    fn on_text<R: Rng + ?Sized>(
        &self,
        message: &TextMessage,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<Vec<Outbound>, StoreError> {
        let chat_id = message.chat.id;
        if !is_group(chat_id) {
            return Ok(Vec::new());
        }

        self.store.add_known_chat(chat_id)?;
        debug!("id: {}, name: {}", message.sender.id, message.sender.display_name);

        let mut out = Vec::new();
        if let Some(note) = self.tracker.tick(&self.store, now)? {
            info!("Congratulating {} user(s) in chat {}", note.mentions.len(), chat_id);
            out.push(Outbound::html(chat_id, note.text));
        }

        let bot_name = format!("@{}", self.config.bot_username);
        let input = DispatchInput {
            text: &message.text,
            sender_id: message.sender.id,
            sender_name: &message.sender.display_name,
            bot_name: &bot_name,
            reply_to_bot: message
                .reply_to
                .as_ref()
                .filter(|reply| reply.from_bot)
                .map(|reply| reply.text.as_str()),
            now,
        };

        if let Some(response) = keywords::dispatch(&input, rng) {
            let reply_to = match response.mode {
                ReplyMode::Reply => Some(message.message_id),
                ReplyMode::Plain => None,
            };
            out.push(match response.content {
                Content::Text(text) => Outbound::Text {
                    chat_id,
                    text,
                    format: TextFormat::Html,
                    reply_to,
                },
                Content::Photo { file, caption } => Outbound::Photo { chat_id, file, caption, reply_to },
                Content::Sticker { set, index } => Outbound::Sticker { chat_id, set, index, reply_to },
            });
        }

        Ok(out)
    }

    fn on_command(&self, invocation: &CommandInvocation) -> Result<Vec<Outbound>, StoreError> {
        let chat_id = invocation.chat.id;

        if invocation.command.is_owner_only() && !self.config.is_owner(invocation.sender.id) {
            warn!(
                "Ignoring {:?} from non-owner {} in chat {}",
                invocation.command, invocation.sender.id, chat_id
            );
            return Ok(Vec::new());
        }

        match &invocation.command {
            Command::SetUsers => {
                self.tracker.seed(
                    &self.store,
                    &self.config.scheduled_users,
                    &self.config.congrats_messages,
                )?;
                Ok(vec![Outbound::plain(chat_id, GOT_IT)])
            }
            Command::Relay { alias, text } => {
                match self.config.relay_chats.get(alias) {
                    Some(&target) if !text.is_empty() => {
                        info!("Relaying message to '{}' ({})", alias, target);
                        Ok(vec![Outbound::plain(target, text.clone())])
                    }
                    _ => Ok(vec![Outbound::plain(chat_id, RELAY_USAGE)]),
                }
            }
            _ => commands::configure(&self.store, invocation),
        }
    }

    /// React to a failed send. Lost reachability forgets the chat, anything
    /// else is only logged.
    pub fn on_delivery_error(&self, chat_id: i64, err: &DeliveryError) {
        match err {
            DeliveryError::Unauthorized | DeliveryError::PeerInvalid => {
                match self.store.remove_known_chat(chat_id) {
                    Ok(true) => info!("Removed chat_id {} from chat list ({})", chat_id, err),
                    Ok(false) => debug!("Chat {} unreachable ({}) and not tracked", chat_id, err),
                    Err(e) => error!("Failed to forget chat {}: {}", chat_id, e),
                }
            }
            DeliveryError::Other(msg) => {
                error!("An error occurred sending to chat {}: {}", chat_id, msg);
            }
        }
    }
}
