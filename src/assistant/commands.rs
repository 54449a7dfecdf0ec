//! Slash commands: parsing and the per-chat configuration commands.

use serde_json::Value;
use tracing::{info, warn};

use crate::assistant::event::{CommandInvocation, Outbound};
use crate::assistant::guard::{self, Authorization};
use crate::assistant::store::{ChatField, GoodbyeSetting, SettingsStore, StoreError};

pub const GOT_IT: &str = "Got it!";

pub const HELP_TEXT: &str = "Welcomes everyone that enters a group chat that this bot is a \
part of. By default, only the person who invited the bot into the group is able to change \
settings.\nCommands:\n\n\
/welcome - Set welcome message\n\
/goodbye - Set goodbye message\n\
/disable_goodbye - Disable the goodbye message\n\
/enable_goodbye - Enable the goodbye message again\n\
/lock - Only the person who invited the bot can change messages\n\
/unlock - Everyone can change messages\n\
/quiet - Disable \"Sorry, only the person who...\" &amp; help messages\n\
/unquiet - Enable \"Sorry, only the person who...\" &amp; help messages\n\n\
You can use <i>$username</i> and <i>$title</i> as placeholders when setting messages. \
<a href=\"https://core.telegram.org/bots/api#formatting-options\">HTML formatting</a> \
is also supported.\n";

const WELCOME_USAGE: &str = "You need to send a message, too! For example:\n\
<code>/welcome Hello $username, welcome to $title!</code>";

const GOODBYE_USAGE: &str = "You need to send a message, too! For example:\n\
<code>/goodbye Goodbye, $username!</code>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/help` or `/start`.
    Help,
    Welcome(String),
    Goodbye(String),
    DisableGoodbye,
    EnableGoodbye,
    Lock,
    Unlock,
    Quiet,
    Unquiet,
    /// Owner only: load the congratulation schedule from config.
    SetUsers,
    /// Owner only: post `text` to the chat registered as `alias`.
    Relay { alias: String, text: String },
}

impl Command {
    /// Parse `/name[@bot] args`.
    ///
    /// Returns `None` for plain text, unknown commands and commands addressed
    /// to another bot. Arguments are re-joined with single spaces.
    pub fn parse(text: &str, bot_username: &str) -> Option<Command> {
        let rest = text.strip_prefix('/')?;
        let (head, tail) = match rest.split_once(char::is_whitespace) {
            Some((head, tail)) => (head, tail),
            None => (rest, ""),
        };

        let name = match head.split_once('@') {
            Some((name, target)) if target.eq_ignore_ascii_case(bot_username) => name,
            Some(_) => return None,
            None => head,
        };

        let args: Vec<&str> = tail.split_whitespace().collect();
        let joined = args.join(" ");

        let command = match name.to_lowercase().as_str() {
            "help" | "start" => Command::Help,
            "welcome" => Command::Welcome(joined),
            "goodbye" => Command::Goodbye(joined),
            "disable_goodbye" => Command::DisableGoodbye,
            "enable_goodbye" => Command::EnableGoodbye,
            "lock" => Command::Lock,
            "unlock" => Command::Unlock,
            "quiet" => Command::Quiet,
            "unquiet" => Command::Unquiet,
            "setusers" => Command::SetUsers,
            "relay" => Command::Relay {
                alias: args.first().map(|a| a.to_string()).unwrap_or_default(),
                text: args.get(1..).map(|rest| rest.join(" ")).unwrap_or_default(),
            },
            _ => return None,
        };
        Some(command)
    }

    pub fn is_owner_only(&self) -> bool {
        matches!(self, Command::SetUsers | Command::Relay { .. })
    }
}

/// Run `/help` or a configuration command. Owner commands yield nothing here.
pub fn configure(
    store: &SettingsStore,
    invocation: &CommandInvocation,
) -> Result<Vec<Outbound>, StoreError> {
    let chat_id = invocation.chat.id;
    let actor = invocation.sender.id;

    let (field, value, lock_override) = match &invocation.command {
        Command::Help => return help(store, invocation),
        Command::Welcome(text) => (ChatField::Welcome, Value::String(text.replace("\\n", "\n")), None),
        Command::Goodbye(text) => (ChatField::Goodbye, Value::String(text.clone()), None),
        Command::DisableGoodbye => (ChatField::Goodbye, GoodbyeSetting::Disabled.to_value(), None),
        Command::EnableGoodbye => (ChatField::Goodbye, GoodbyeSetting::Default.to_value(), None),
        Command::Lock => (ChatField::Locked, Value::Bool(true), Some(true)),
        Command::Unlock => (ChatField::Locked, Value::Bool(false), None),
        Command::Quiet => (ChatField::Quiet, Value::Bool(true), Some(true)),
        Command::Unquiet => (ChatField::Quiet, Value::Bool(false), Some(true)),
        Command::SetUsers | Command::Relay { .. } => return Ok(Vec::new()),
    };

    if let Authorization::Denied(denial) = guard::authorize(store, chat_id, actor, lock_override)? {
        warn!(
            "Denied {:?} from {} in chat {}: {:?}",
            invocation.command, actor, chat_id, denial
        );
        return Ok(denial
            .notice()
            .map(|notice| Outbound::plain(chat_id, notice))
            .into_iter()
            .collect());
    }

    if value.as_str() == Some("") {
        let usage = match field {
            ChatField::Welcome => WELCOME_USAGE,
            _ => GOODBYE_USAGE,
        };
        return Ok(vec![Outbound::html(chat_id, usage)]);
    }

    store.set(chat_id, field, value)?;
    info!("{:?} applied by {} in chat {}", invocation.command, actor, chat_id);
    Ok(vec![Outbound::plain(chat_id, GOT_IT)])
}

/// Help is hidden in quiet chats, except for the admin.
fn help(store: &SettingsStore, invocation: &CommandInvocation) -> Result<Vec<Outbound>, StoreError> {
    let config = store.chat_config(invocation.chat.id)?;
    if config.quiet && config.admin_user_id != Some(invocation.sender.id) {
        return Ok(Vec::new());
    }
    Ok(vec![Outbound::html(invocation.chat.id, HELP_TEXT)])
}
