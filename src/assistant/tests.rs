//! End-to-end scenarios through `Assistant::handle`.
//!
//! Run with: cargo test assistant

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::rngs::mock::StepRng;

use super::commands::{Command, GOT_IT};
use super::congrats::{CongratsMessage, ScheduledUser};
use super::engine::{Assistant, AssistantConfig, DeliveryError};
use super::event::{
    ChatRef, CommandInvocation, InboundEvent, MembershipChange, MembershipUpdate, Outbound,
    Person, RepliedMessage, TextFormat, TextMessage,
};
use super::guard::NOT_ADMIN_NOTICE;
use super::store::SettingsStore;

const BOT: &str = "RentierBot";
const GROUP: i64 = -100;
const OWNER: i64 = 5;
const FAMILY_CHAT: i64 = -1001186177604;

fn config() -> AssistantConfig {
    AssistantConfig {
        bot_username: BOT.to_string(),
        owner_ids: vec![OWNER],
        relay_chats: HashMap::from([("family".to_string(), FAMILY_CHAT)]),
        congrats_target: NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap(),
        scheduled_users: vec![
            ScheduledUser { id: 1, name: "Mila".into(), tz: "Europe/Moscow".into(), notified: false },
            ScheduledUser { id: 2, name: "Jonas".into(), tz: "Europe/Berlin".into(), notified: false },
        ],
        congrats_messages: vec![
            CongratsMessage { template: "Happy New Year, {}!".into(), sent: false },
            CongratsMessage { template: "Cheers, {}!".into(), sent: false },
        ],
    }
}

fn assistant() -> Assistant {
    Assistant::new(config(), Arc::new(SettingsStore::in_memory().unwrap()))
}

fn chat(id: i64) -> ChatRef {
    ChatRef { id, title: "Family".into() }
}

fn person(id: i64, name: &str) -> Person {
    Person { id, username: None, display_name: name.into() }
}

fn bot() -> Person {
    Person { id: 99, username: Some(BOT.into()), display_name: "Rentier".into() }
}

fn joined(chat_id: i64, actor: Person, members: Vec<Person>) -> InboundEvent {
    InboundEvent::MembershipChanged(MembershipUpdate {
        chat: chat(chat_id),
        actor,
        change: MembershipChange::Joined(members),
    })
}

fn command(chat_id: i64, sender: i64, command: Command) -> InboundEvent {
    InboundEvent::CommandInvoked(CommandInvocation {
        chat: chat(chat_id),
        message_id: 10,
        sender: person(sender, "Ann"),
        command,
    })
}

fn text(chat_id: i64, sender: i64, body: &str) -> InboundEvent {
    InboundEvent::TextMessage(TextMessage {
        chat: chat(chat_id),
        message_id: 11,
        sender: person(sender, "Ann"),
        text: body.into(),
        reply_to: None,
    })
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn summer() -> DateTime<Utc> {
    at(2019, 7, 1, 12, 0)
}

/// Always draws the first candidate.
fn first() -> StepRng {
    StepRng::new(0, 0)
}

// =============================================================================
// MEMBERSHIP
// =============================================================================

mod membership {
    use super::*;

    #[tokio::test]
    async fn test_member_gets_default_welcome() {
        let assistant = assistant();
        let out = assistant
            .handle(joined(GROUP, person(7, "Inviter"), vec![person(42, "Ann")]), summer(), &mut first())
            .await;

        assert_eq!(
            out,
            vec![Outbound::html(
                GROUP,
                "Hello <a href=\"tg://user?id=42\">Ann</a>! Welcome to Family 😄"
            )]
        );
        assert_eq!(assistant.store().known_chats().unwrap(), vec![GROUP]);
    }

    #[tokio::test]
    async fn test_custom_welcome_renders_mention() {
        let assistant = assistant();
        assistant
            .handle(joined(GROUP, person(7, "Inviter"), vec![bot()]), summer(), &mut first())
            .await;
        let out = assistant
            .handle(command(GROUP, 7, Command::Welcome("Hi $username".into())), summer(), &mut first())
            .await;
        assert_eq!(out, vec![Outbound::plain(GROUP, GOT_IT)]);

        let out = assistant
            .handle(joined(GROUP, person(7, "Inviter"), vec![person(42, "Ann")]), summer(), &mut first())
            .await;
        let greeting = out[0].text().unwrap();
        assert_eq!(greeting, "Hi <a href=\"tg://user?id=42\">Ann</a>");
        assert!(!greeting.contains("$username"));
    }

    #[tokio::test]
    async fn test_reinvite_resets_admin_and_lock() {
        let assistant = assistant();
        assistant
            .handle(joined(GROUP, person(7, "First"), vec![bot()]), summer(), &mut first())
            .await;
        assistant
            .handle(command(GROUP, 7, Command::Unlock), summer(), &mut first())
            .await;
        assert!(!assistant.store().chat_config(GROUP).unwrap().locked);

        let out = assistant
            .handle(joined(GROUP, person(8, "Second"), vec![bot()]), summer(), &mut first())
            .await;
        assert!(out[0].text().unwrap().starts_with("Hello Family!"));

        let config = assistant.store().chat_config(GROUP).unwrap();
        assert_eq!(config.admin_user_id, Some(8));
        assert!(config.locked);
    }

    #[tokio::test]
    async fn test_disabled_goodbye() {
        let assistant = assistant();
        assistant
            .handle(joined(GROUP, person(7, "Inviter"), vec![bot()]), summer(), &mut first())
            .await;
        assistant
            .handle(command(GROUP, 7, Command::DisableGoodbye), summer(), &mut first())
            .await;

        let left = InboundEvent::MembershipChanged(MembershipUpdate {
            chat: chat(GROUP),
            actor: person(42, "Ann"),
            change: MembershipChange::Left(person(42, "Ann")),
        });
        assert!(assistant.handle(left.clone(), summer(), &mut first()).await.is_empty());

        assistant
            .handle(command(GROUP, 7, Command::EnableGoodbye), summer(), &mut first())
            .await;
        let out = assistant.handle(left, summer(), &mut first()).await;
        assert_eq!(out, vec![Outbound::html(GROUP, "Goodbye, Ann!")]);
    }
}

// =============================================================================
// PERMISSIONS
// =============================================================================

mod permissions {
    use super::*;

    #[tokio::test]
    async fn test_non_admin_cannot_lock_unlocked_chat() {
        let assistant = assistant();
        assistant
            .handle(joined(GROUP, person(7, "Inviter"), vec![bot()]), summer(), &mut first())
            .await;
        assistant
            .handle(command(GROUP, 7, Command::Unlock), summer(), &mut first())
            .await;

        let out = assistant
            .handle(command(GROUP, 8, Command::Lock), summer(), &mut first())
            .await;
        assert_eq!(out, vec![Outbound::plain(GROUP, NOT_ADMIN_NOTICE)]);
        assert!(!assistant.store().chat_config(GROUP).unwrap().locked);
    }

    #[tokio::test]
    async fn test_unlocked_chat_lets_anyone_set_messages() {
        let assistant = assistant();
        assistant
            .handle(joined(GROUP, person(7, "Inviter"), vec![bot()]), summer(), &mut first())
            .await;
        assistant
            .handle(command(GROUP, 7, Command::Unlock), summer(), &mut first())
            .await;

        let out = assistant
            .handle(command(GROUP, 8, Command::Goodbye("Ciao $username".into())), summer(), &mut first())
            .await;
        assert_eq!(out, vec![Outbound::plain(GROUP, GOT_IT)]);
    }

    #[tokio::test]
    async fn test_quiet_chat_swallows_denials() {
        let assistant = assistant();
        assistant
            .handle(joined(GROUP, person(7, "Inviter"), vec![bot()]), summer(), &mut first())
            .await;
        assistant
            .handle(command(GROUP, 7, Command::Quiet), summer(), &mut first())
            .await;

        let out = assistant
            .handle(command(GROUP, 8, Command::Welcome("hi".into())), summer(), &mut first())
            .await;
        assert!(out.is_empty());
        assert!(assistant.handle(command(GROUP, 8, Command::Help), summer(), &mut first()).await.is_empty());
        assert_eq!(
            assistant.handle(command(GROUP, 7, Command::Help), summer(), &mut first()).await.len(),
            1
        );
    }
}

// =============================================================================
// KEYWORDS
// =============================================================================

mod keywords {
    use super::*;

    #[tokio::test]
    async fn test_direct_messages_are_ignored() {
        let assistant = assistant();
        let out = assistant.handle(text(42, 42, "reindeer"), summer(), &mut first()).await;
        assert!(out.is_empty());
        assert!(assistant.store().known_chats().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_keyword_reply_in_group() {
        let assistant = assistant();
        let out = assistant.handle(text(GROUP, 42, "Reindeer"), summer(), &mut first()).await;
        assert_eq!(
            out,
            vec![Outbound::Text {
                chat_id: GROUP,
                text: "<a href=\"tg://user?id=42\">Ann</a>, I changed this password 3 months ago.".into(),
                format: TextFormat::Html,
                reply_to: None,
            }]
        );
        assert_eq!(assistant.store().known_chats().unwrap(), vec![GROUP]);
    }

    #[tokio::test]
    async fn test_reply_mode_quotes_trigger() {
        let assistant = assistant();
        let out = assistant.handle(text(GROUP, 42, "so lonely"), summer(), &mut first()).await;
        assert!(matches!(&out[0], Outbound::Text { reply_to: Some(11), .. }));
    }

    #[tokio::test]
    async fn test_same_seed_same_reply() {
        let a = assistant();
        let b = assistant();
        let mut rng_a = StdRng::seed_from_u64(7);
        let mut rng_b = StdRng::seed_from_u64(7);
        for _ in 0..5 {
            let left = a.handle(text(GROUP, 42, "summer 2020"), summer(), &mut rng_a).await;
            let right = b.handle(text(GROUP, 42, "summer 2020"), summer(), &mut rng_b).await;
            assert_eq!(left, right);
        }
    }

    #[tokio::test]
    async fn test_coffee_dialogue() {
        let assistant = assistant();
        let event = InboundEvent::TextMessage(TextMessage {
            chat: chat(GROUP),
            message_id: 12,
            sender: person(42, "Ann"),
            text: "yes please".into(),
            reply_to: Some(RepliedMessage { from_bot: true, text: "Ann, coffee?".into() }),
        });
        let out = assistant.handle(event, summer(), &mut first()).await;
        assert_eq!(
            out,
            vec![Outbound::Photo {
                chat_id: GROUP,
                file: "rentier_coffee.jpg".into(),
                caption: "Here!".into(),
                reply_to: Some(12),
            }]
        );
    }
}

// =============================================================================
// CONGRATULATIONS
// =============================================================================

mod congrats {
    use super::*;

    #[tokio::test]
    async fn test_setusers_requires_owner() {
        let assistant = assistant();
        assert!(assistant.handle(command(GROUP, 42, Command::SetUsers), summer(), &mut first()).await.is_empty());
        assert_eq!(
            assistant.handle(command(GROUP, OWNER, Command::SetUsers), summer(), &mut first()).await,
            vec![Outbound::plain(GROUP, GOT_IT)]
        );
    }

    #[tokio::test]
    async fn test_moscow_fires_once_before_berlin() {
        let assistant = assistant();
        assistant
            .handle(command(GROUP, OWNER, Command::SetUsers), summer(), &mut first())
            .await;

        // 21:30 UTC: past midnight in Moscow (UTC+3), not yet in Berlin (UTC+1).
        let now = at(2019, 12, 31, 21, 30);
        let out = assistant.handle(text(GROUP, 42, "hello"), now, &mut first()).await;
        assert_eq!(
            out,
            vec![Outbound::html(
                GROUP,
                "Happy New Year, <a href=\"tg://user?id=1\">Mila</a>!"
            )]
        );

        let again = assistant.handle(text(GROUP, 42, "hello"), now, &mut first()).await;
        assert!(again.is_empty());

        let later = at(2019, 12, 31, 23, 5);
        let out = assistant.handle(text(GROUP, 42, "hello"), later, &mut first()).await;
        assert_eq!(out[0].text(), Some("Cheers, <a href=\"tg://user?id=2\">Jonas</a>!"));
    }

    #[tokio::test]
    async fn test_congratulation_precedes_keyword_reply() {
        let assistant = assistant();
        assistant
            .handle(command(GROUP, OWNER, Command::SetUsers), summer(), &mut first())
            .await;

        let out = assistant
            .handle(text(GROUP, 42, "reindeer"), at(2020, 1, 1, 12, 0), &mut first())
            .await;
        assert_eq!(out.len(), 2);
        assert!(out[0].text().unwrap().starts_with("Happy New Year"));
        assert!(out[0].text().unwrap().contains("id=2"));
        assert!(out[1].text().unwrap().contains("password"));
    }
}

// =============================================================================
// OWNER RELAY
// =============================================================================

mod relay {
    use super::*;

    #[tokio::test]
    async fn test_relay_to_alias() {
        let assistant = assistant();
        let relay = Command::Relay { alias: "family".into(), text: "Dinner at 8".into() };
        let out = assistant.handle(command(OWNER, OWNER, relay), summer(), &mut first()).await;
        assert_eq!(out, vec![Outbound::plain(FAMILY_CHAT, "Dinner at 8")]);
    }

    #[tokio::test]
    async fn test_relay_unknown_alias_shows_usage() {
        let assistant = assistant();
        let relay = Command::Relay { alias: "work".into(), text: "hi".into() };
        let out = assistant.handle(command(OWNER, OWNER, relay), summer(), &mut first()).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].chat_id(), OWNER);
    }

    #[tokio::test]
    async fn test_relay_from_stranger_is_ignored() {
        let assistant = assistant();
        let relay = Command::Relay { alias: "family".into(), text: "spam".into() };
        assert!(assistant.handle(command(GROUP, 42, relay), summer(), &mut first()).await.is_empty());
    }
}

// =============================================================================
// KNOWN CHATS
// =============================================================================

mod known_chats {
    use super::*;

    #[tokio::test]
    async fn test_repeated_activity_records_chat_once() {
        let assistant = assistant();
        for _ in 0..3 {
            assistant.handle(text(GROUP, 42, "hi"), summer(), &mut first()).await;
        }
        assistant
            .handle(joined(GROUP, person(7, "Inviter"), vec![person(42, "Ann")]), summer(), &mut first())
            .await;
        assert_eq!(assistant.store().known_chats().unwrap(), vec![GROUP]);
    }

    #[tokio::test]
    async fn test_unreachable_chat_is_forgotten() {
        let assistant = assistant();
        assistant.handle(text(GROUP, 42, "hi"), summer(), &mut first()).await;
        assistant.handle(text(-200, 42, "hi"), summer(), &mut first()).await;

        assistant.on_delivery_error(GROUP, &DeliveryError::Unauthorized);
        assert_eq!(assistant.store().known_chats().unwrap(), vec![-200]);

        assistant.on_delivery_error(-200, &DeliveryError::Other("flood control".into()));
        assert_eq!(assistant.store().known_chats().unwrap(), vec![-200]);

        assistant.on_delivery_error(-200, &DeliveryError::PeerInvalid);
        assert!(assistant.store().known_chats().unwrap().is_empty());
    }
}

// =============================================================================
// CONCURRENCY
// =============================================================================

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_commands_match_a_serial_order() {
        for _ in 0..20 {
            let assistant = Arc::new(assistant());
            assistant
                .handle(joined(GROUP, person(7, "Inviter"), vec![bot()]), summer(), &mut first())
                .await;

            let unlock = {
                let assistant = assistant.clone();
                tokio::spawn(async move {
                    assistant.handle(command(GROUP, 7, Command::Unlock), summer(), &mut first()).await
                })
            };
            let welcome = {
                let assistant = assistant.clone();
                tokio::spawn(async move {
                    assistant
                        .handle(command(GROUP, 8, Command::Welcome("Hi".into())), summer(), &mut first())
                        .await
                })
            };

            assert_eq!(unlock.await.unwrap(), vec![Outbound::plain(GROUP, GOT_IT)]);
            let welcome = welcome.await.unwrap();
            let config = assistant.store().chat_config(GROUP).unwrap();
            assert!(!config.locked);

            // Unlock first: the welcome lands. Welcome first: it is refused.
            if welcome == vec![Outbound::plain(GROUP, GOT_IT)] {
                assert_eq!(config.welcome_template.as_deref(), Some("Hi"));
            } else {
                assert_eq!(welcome, vec![Outbound::plain(GROUP, NOT_ADMIN_NOTICE)]);
                assert_eq!(config.welcome_template, None);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_messages_congratulate_once() {
        let assistant = Arc::new(assistant());
        assistant
            .handle(command(GROUP, OWNER, Command::SetUsers), summer(), &mut first())
            .await;

        let new_year = at(2020, 1, 1, 12, 0);
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let assistant = assistant.clone();
                let chat_id = if i % 2 == 0 { GROUP } else { -200 };
                tokio::spawn(async move {
                    assistant.handle(text(chat_id, 42, "hello"), new_year, &mut first()).await
                })
            })
            .collect();

        let mut notes = Vec::new();
        for task in tasks {
            notes.extend(task.await.unwrap());
        }
        assert_eq!(notes.len(), 1);
        let text = notes[0].text().unwrap();
        assert!(text.contains("id=1") && text.contains("id=2"));
    }

    #[tokio::test]
    async fn test_direct_chats_take_no_lock() {
        let assistant = assistant();
        assistant.handle(text(42, 42, "hi"), summer(), &mut first()).await;
        let relay = Command::Relay { alias: "family".into(), text: "hi".into() };
        assistant.handle(command(OWNER, OWNER, relay), summer(), &mut first()).await;
        assert_eq!(assistant.chat_locks().len().await, 0);

        assistant.handle(text(GROUP, 42, "hi"), summer(), &mut first()).await;
        assert_eq!(assistant.chat_locks().len().await, 1);
    }
}
