//! Join and leave announcements.

use tracing::info;

use crate::assistant::event::{ChatRef, MembershipChange, MembershipUpdate, Outbound, Person};
use crate::assistant::store::{GoodbyeSetting, SettingsStore, StoreError};
use crate::assistant::template::{escape_html, mention, render};

pub const DEFAULT_WELCOME: &str = "Hello $username! Welcome to $title 😄";
pub const DEFAULT_GOODBYE: &str = "Goodbye, $username!";

/// What a single membership entry means for us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipAction {
    /// We were added; `inviter` becomes the chat admin.
    SelfAdded { inviter: i64 },
    MemberJoined(Person),
    MemberLeft(Person),
    /// We were removed.
    Ignored,
}

fn is_bot(person: &Person, bot_username: &str) -> bool {
    person
        .username
        .as_deref()
        .is_some_and(|name| name.eq_ignore_ascii_case(bot_username))
}

/// Classify every entry of an update, in order.
pub fn classify(update: &MembershipUpdate, bot_username: &str) -> Vec<MembershipAction> {
    match &update.change {
        MembershipChange::Joined(members) => members
            .iter()
            .map(|member| {
                if is_bot(member, bot_username) {
                    MembershipAction::SelfAdded { inviter: update.actor.id }
                } else {
                    MembershipAction::MemberJoined(member.clone())
                }
            })
            .collect(),
        MembershipChange::Left(member) if is_bot(member, bot_username) => {
            vec![MembershipAction::Ignored]
        }
        MembershipChange::Left(member) => vec![MembershipAction::MemberLeft(member.clone())],
    }
}

/// Record the chat and produce the greetings for a membership update.
pub fn route(
    store: &SettingsStore,
    update: &MembershipUpdate,
    bot_username: &str,
) -> Result<Vec<Outbound>, StoreError> {
    let chat = &update.chat;
    store.add_known_chat(chat.id)?;

    let mut out = Vec::new();
    for action in classify(update, bot_username) {
        match action {
            MembershipAction::SelfAdded { inviter } => out.push(introduce(store, chat, inviter)?),
            MembershipAction::MemberJoined(member) => out.push(welcome(store, chat, &member)?),
            MembershipAction::MemberLeft(member) => out.extend(goodbye(store, chat, &member)?),
            MembershipAction::Ignored => info!("Removed from chat {} ({})", chat.id, chat.title),
        }
    }
    Ok(out)
}

fn introduce(store: &SettingsStore, chat: &ChatRef, inviter: i64) -> Result<Outbound, StoreError> {
    info!("Invited by {} to chat {} ({})", inviter, chat.id, chat.title);
    store.introduce(chat.id, inviter)?;

    Ok(Outbound::plain(
        chat.id,
        format!(
            "Hello {}! I will now greet anyone who joins this chat with a nice message 😄 \n\
             Check the /help command for more info!",
            chat.title
        ),
    ))
}

fn welcome(store: &SettingsStore, chat: &ChatRef, member: &Person) -> Result<Outbound, StoreError> {
    info!("{} joined chat {} ({})", member.display_name, chat.id, chat.title);

    let template = store
        .chat_config(chat.id)?
        .welcome_template
        .unwrap_or_else(|| DEFAULT_WELCOME.to_string());
    let text = render(
        &template,
        &mention(member.id, &member.display_name),
        &escape_html(&chat.title),
    );
    Ok(Outbound::html(chat.id, text))
}

fn goodbye(
    store: &SettingsStore,
    chat: &ChatRef,
    member: &Person,
) -> Result<Option<Outbound>, StoreError> {
    info!("{} left chat {} ({})", member.display_name, chat.id, chat.title);

    let template = match store.chat_config(chat.id)?.goodbye {
        GoodbyeSetting::Disabled => return Ok(None),
        GoodbyeSetting::Custom(text) => text,
        GoodbyeSetting::Default => DEFAULT_GOODBYE.to_string(),
    };
    let text = render(
        &template,
        &escape_html(&member.display_name),
        &escape_html(&chat.title),
    );
    Ok(Some(Outbound::html(chat.id, text)))
}
