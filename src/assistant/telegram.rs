//! Telegram gateway: converts teloxide updates into inbound events and sends
//! outbound actions.

use std::path::PathBuf;

use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId, ParseMode, ReplyParameters, User};
use teloxide::{ApiError, RequestError};
use tracing::{info, warn};

use crate::assistant::commands::Command;
use crate::assistant::engine::DeliveryError;
use crate::assistant::event::{
    ChatRef, CommandInvocation, InboundEvent, MembershipChange, MembershipUpdate, Outbound,
    Person, RepliedMessage, TextFormat, TextMessage,
};

/// Who we are on Telegram.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub user_id: i64,
    /// Without the leading `@`.
    pub username: String,
}

fn person(user: &User) -> Person {
    Person {
        id: user.id.0 as i64,
        username: user.username.clone(),
        display_name: user.first_name.clone(),
    }
}

/// Turn a Telegram message into an inbound event. Messages we don't care
/// about (no sender, no text, media only) yield `None`.
pub fn to_event(msg: &Message, me: &BotIdentity) -> Option<InboundEvent> {
    let chat = ChatRef {
        id: msg.chat.id.0,
        title: msg.chat.title().unwrap_or_default().to_string(),
    };
    let sender = person(msg.from.as_ref()?);

    if let Some(members) = msg.new_chat_members() {
        return Some(InboundEvent::MembershipChanged(MembershipUpdate {
            chat,
            actor: sender,
            change: MembershipChange::Joined(members.iter().map(person).collect()),
        }));
    }

    if let Some(member) = msg.left_chat_member() {
        return Some(InboundEvent::MembershipChanged(MembershipUpdate {
            chat,
            actor: sender,
            change: MembershipChange::Left(person(member)),
        }));
    }

    let text = msg.text()?;
    let message_id = msg.id.0 as i64;

    if let Some(command) = Command::parse(text, &me.username) {
        return Some(InboundEvent::CommandInvoked(CommandInvocation {
            chat,
            message_id,
            sender,
            command,
        }));
    }

    let reply_to = msg.reply_to_message().map(|reply| RepliedMessage {
        from_bot: reply.from.as_ref().is_some_and(|u| u.id.0 as i64 == me.user_id),
        text: reply.text().or(reply.caption()).unwrap_or_default().to_string(),
    });

    Some(InboundEvent::TextMessage(TextMessage {
        chat,
        message_id,
        sender,
        text: text.to_string(),
        reply_to,
    }))
}

/// Map a teloxide error onto the delivery taxonomy.
pub fn classify_error(err: &RequestError) -> DeliveryError {
    match err {
        RequestError::Api(
            ApiError::InvalidToken
            | ApiError::BotBlocked
            | ApiError::BotKicked
            | ApiError::BotKickedFromSupergroup,
        ) => DeliveryError::Unauthorized,
        RequestError::Api(ApiError::ChatNotFound) => DeliveryError::PeerInvalid,
        other => {
            let text = other.to_string();
            if text.contains("PEER_ID_INVALID") {
                DeliveryError::PeerInvalid
            } else if text.contains("Unauthorized") || text.contains("Forbidden") {
                DeliveryError::Unauthorized
            } else {
                DeliveryError::Other(text)
            }
        }
    }
}

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
    photo_dir: PathBuf,
}

impl TelegramClient {
    pub fn new(bot: Bot, photo_dir: PathBuf) -> Self {
        Self { bot, photo_dir }
    }

    /// Send one outbound action.
    pub async fn deliver(&self, out: &Outbound) -> Result<(), DeliveryError> {
        match out {
            Outbound::Text { chat_id, text, format, reply_to } => {
                self.send_text(*chat_id, text, *format, *reply_to).await
            }
            Outbound::Photo { chat_id, file, caption, reply_to } => {
                self.send_photo(*chat_id, file, caption, *reply_to).await
            }
            Outbound::Sticker { chat_id, set, index, reply_to } => {
                self.send_sticker(*chat_id, set, *index, *reply_to).await
            }
        }
    }

    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        format: TextFormat,
        reply_to_message_id: Option<i64>,
    ) -> Result<(), DeliveryError> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);

        if format == TextFormat::Html {
            request = request.parse_mode(ParseMode::Html);
        }

        if let Some(msg_id) = reply_to_message_id {
            request = request.reply_parameters(ReplyParameters::new(MessageId(msg_id as i32)));
        }

        request.await.map(|_| ()).map_err(|e| classify_error(&e))
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        file: &str,
        caption: &str,
        reply_to_message_id: Option<i64>,
    ) -> Result<(), DeliveryError> {
        let path = self.photo_dir.join(file);
        info!("📷 Sending {:?} to chat {}", path, chat_id);

        let mut request = self
            .bot
            .send_photo(ChatId(chat_id), InputFile::file(path))
            .caption(caption);

        if let Some(msg_id) = reply_to_message_id {
            request = request.reply_parameters(ReplyParameters::new(MessageId(msg_id as i32)));
        }

        request.await.map(|_| ()).map_err(|e| classify_error(&e))
    }

    async fn send_sticker(
        &self,
        chat_id: i64,
        set: &str,
        index: usize,
        reply_to_message_id: Option<i64>,
    ) -> Result<(), DeliveryError> {
        let sticker_set = self
            .bot
            .get_sticker_set(set)
            .await
            .map_err(|e| classify_error(&e))?;

        let Some(sticker) = sticker_set.stickers.get(index) else {
            warn!("Sticker set '{}' has no sticker #{}", set, index);
            return Err(DeliveryError::Other(format!("sticker {} missing from '{}'", index, set)));
        };

        let mut request = self
            .bot
            .send_sticker(ChatId(chat_id), InputFile::file_id(sticker.file.id.clone()));

        if let Some(msg_id) = reply_to_message_id {
            request = request.reply_parameters(ReplyParameters::new(MessageId(msg_id as i32)));
        }

        request.await.map(|_| ()).map_err(|e| classify_error(&e))
    }
}
