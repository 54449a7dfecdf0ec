//! Permission checks for configuration commands.

use crate::assistant::store::{SettingsStore, StoreError};

pub const MUST_BE_GROUP_NOTICE: &str = "Please add me to a group first!";
pub const NOT_ADMIN_NOTICE: &str = "Sorry, only the person who invited me can do that.";

/// Why a command was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// Issued outside a group chat.
    MustBeGroup,
    /// Chat is locked and the actor is not its admin. `notify` is false when
    /// the chat is quiet.
    NotAdmin { notify: bool },
}

impl Denial {
    /// Text to send back to the chat, if any.
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            Denial::MustBeGroup => Some(MUST_BE_GROUP_NOTICE),
            Denial::NotAdmin { notify: true } => Some(NOT_ADMIN_NOTICE),
            Denial::NotAdmin { notify: false } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Allowed,
    Denied(Denial),
}

/// Group chats have negative ids.
pub fn is_group(chat_id: i64) -> bool {
    chat_id < 0
}

/// Decide whether `actor` may change settings of `chat_id`.
///
/// `lock_override` replaces the stored lock flag when given; commands that
/// toggle lock or quiet pass `Some(true)` so only the admin can use them.
pub fn authorize(
    store: &SettingsStore,
    chat_id: i64,
    actor: i64,
    lock_override: Option<bool>,
) -> Result<Authorization, StoreError> {
    if !is_group(chat_id) {
        return Ok(Authorization::Denied(Denial::MustBeGroup));
    }

    let config = store.chat_config(chat_id)?;
    let locked = lock_override.unwrap_or(config.locked);

    if locked && config.admin_user_id != Some(actor) {
        return Ok(Authorization::Denied(Denial::NotAdmin { notify: !config.quiet }));
    }

    Ok(Authorization::Allowed)
}
