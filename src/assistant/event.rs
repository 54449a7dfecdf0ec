//! Gateway-independent inbound events and outbound actions.

use crate::assistant::commands::Command;

/// The chat an event happened in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRef {
    /// Negative for groups, positive for direct chats.
    pub id: i64,
    pub title: String,
}

/// A Telegram user as seen in an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    pub id: i64,
    pub username: Option<String>,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipChange {
    Joined(Vec<Person>),
    Left(Person),
}

/// Service message announcing joins or departures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipUpdate {
    pub chat: ChatRef,
    /// Who caused the update (the inviter when someone was added).
    pub actor: Person,
    pub change: MembershipChange,
}

/// The message a text message replies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepliedMessage {
    pub from_bot: bool,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub chat: ChatRef,
    pub message_id: i64,
    pub sender: Person,
    pub text: String,
    pub reply_to: Option<RepliedMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub chat: ChatRef,
    pub message_id: i64,
    pub sender: Person,
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    MembershipChanged(MembershipUpdate),
    TextMessage(TextMessage),
    CommandInvoked(CommandInvocation),
}

impl InboundEvent {
    pub fn chat(&self) -> &ChatRef {
        match self {
            InboundEvent::MembershipChanged(update) => &update.chat,
            InboundEvent::TextMessage(msg) => &msg.chat,
            InboundEvent::CommandInvoked(cmd) => &cmd.chat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    Html,
}

/// Something the gateway should send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text {
        chat_id: i64,
        text: String,
        format: TextFormat,
        reply_to: Option<i64>,
    },
    /// `file` is a file name inside the configured photo directory.
    Photo {
        chat_id: i64,
        file: String,
        caption: String,
        reply_to: Option<i64>,
    },
    /// Sticker number `index` of the named sticker set.
    Sticker {
        chat_id: i64,
        set: String,
        index: usize,
        reply_to: Option<i64>,
    },
}

impl Outbound {
    pub fn plain(chat_id: i64, text: impl Into<String>) -> Self {
        Outbound::Text {
            chat_id,
            text: text.into(),
            format: TextFormat::Plain,
            reply_to: None,
        }
    }

    pub fn html(chat_id: i64, text: impl Into<String>) -> Self {
        Outbound::Text {
            chat_id,
            text: text.into(),
            format: TextFormat::Html,
            reply_to: None,
        }
    }

    pub fn chat_id(&self) -> i64 {
        match self {
            Outbound::Text { chat_id, .. }
            | Outbound::Photo { chat_id, .. }
            | Outbound::Sticker { chat_id, .. } => *chat_id,
        }
    }

    /// Text content, for assertions and logging.
    pub fn text(&self) -> Option<&str> {
        match self {
            Outbound::Text { text, .. } => Some(text),
            _ => None,
        }
    }
}
