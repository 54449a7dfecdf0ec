//! Keyword-triggered canned replies.
//!
//! Rules live in ordered tables and are evaluated by one matcher loop: the
//! first rule whose predicate holds wins and one of its replies is drawn
//! uniformly at random. Three tables exist and at most one is consulted per
//! message:
//!
//! 1. the coffee dialogue, when the message answers the bot's coffee offer
//! 2. the mention table, when the message names the bot (and is not just
//!    the bot's name)
//! 3. the general table otherwise
//!
//! Exact-text rules sit before containment rules in every table.

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::assistant::template::{fill_slot, mention};

/// Text in one of our messages that marks it as waiting for a yes/no answer.
pub const COFFEE_PROMPT: &str = "coffee";

static MISSING_HOURS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"missing (.+?) hours").expect("static regex"));

/// How the reply is attached to the triggering message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    /// Quote the triggering message.
    Reply,
    /// Send as a standalone message.
    Plain,
}

/// Condition over the lowercased message text.
#[derive(Debug)]
pub enum Predicate {
    Contains(&'static str),
    Equals(&'static str),
    /// The message contains the bot's `@name`.
    NamesBot,
    /// The message is exactly the bot's `@name`.
    IsBotName,
    All(&'static [Predicate]),
    Any(&'static [Predicate]),
    Not(&'static Predicate),
}

impl Predicate {
    /// `text` and `bot_name` must already be lowercase.
    pub fn matches(&self, text: &str, bot_name: &str) -> bool {
        match self {
            Predicate::Contains(keyword) => text.contains(keyword),
            Predicate::Equals(literal) => text == *literal,
            Predicate::NamesBot => !bot_name.is_empty() && text.contains(bot_name),
            Predicate::IsBotName => !bot_name.is_empty() && text == bot_name,
            Predicate::All(parts) => parts.iter().all(|p| p.matches(text, bot_name)),
            Predicate::Any(parts) => parts.iter().any(|p| p.matches(text, bot_name)),
            Predicate::Not(inner) => !inner.matches(text, bot_name),
        }
    }
}

/// One candidate reply of a rule.
#[derive(Debug)]
pub enum Reply {
    /// Text with an optional `{}` slot for the sender's mention.
    Text(&'static str),
    /// Echoes the hour count from "missing N hours".
    MissingHours,
    /// Whole days left until the season premiere.
    Countdown,
    /// A file from the photo directory.
    Photo { file: &'static str, caption: &'static str },
    Sticker { set: &'static str, index: usize },
}

/// Candidates added when one particular user triggers the rule.
#[derive(Debug)]
pub struct SenderExtras {
    pub user_id: i64,
    pub replies: &'static [Reply],
}

#[derive(Debug)]
pub struct KeywordRule {
    pub name: &'static str,
    pub predicate: Predicate,
    pub replies: &'static [Reply],
    pub mode: ReplyMode,
    pub extras: Option<SenderExtras>,
}

impl KeywordRule {
    fn candidates(&self, sender_id: i64) -> impl Iterator<Item = &'static Reply> + '_ {
        let extras = match &self.extras {
            Some(extra) if extra.user_id == sender_id => extra.replies,
            _ => &[],
        };
        self.replies.iter().chain(extras.iter())
    }
}

/// Everything the dispatcher looks at for one message.
#[derive(Debug, Clone)]
pub struct DispatchInput<'a> {
    pub text: &'a str,
    pub sender_id: i64,
    pub sender_name: &'a str,
    /// The bot's handle including the leading `@`.
    pub bot_name: &'a str,
    /// Text of our own message this one replies to, if any.
    pub reply_to_bot: Option<&'a str>,
    pub now: DateTime<Utc>,
}

/// The chosen reply, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// HTML text with the mention slot already filled.
    Text(String),
    Photo { file: String, caption: String },
    Sticker { set: String, index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Name of the rule that fired.
    pub rule: &'static str,
    pub content: Content,
    pub mode: ReplyMode,
}

const fn text_rule(
    name: &'static str,
    predicate: Predicate,
    replies: &'static [Reply],
    mode: ReplyMode,
) -> KeywordRule {
    KeywordRule { name, predicate, replies, mode, extras: None }
}

/// Answers to "coffee?" from the bot.
pub static DIALOGUE_RULES: &[KeywordRule] = &[
    text_rule(
        "coffee_yes",
        Predicate::Contains("yes"),
        &[Reply::Photo { file: "rentier_coffee.jpg", caption: "Here!" }],
        ReplyMode::Reply,
    ),
    text_rule(
        "coffee_no",
        Predicate::Contains("no"),
        &[Reply::Text("Okay, maybe some tea then?")],
        ReplyMode::Reply,
    ),
];

/// Requests addressed to the bot by name.
pub static MENTION_RULES: &[KeywordRule] = &[
    text_rule(
        "coffee",
        Predicate::All(&[Predicate::NamesBot, Predicate::Contains("coffee")]),
        &[Reply::Photo { file: "rentier_coffee.jpg", caption: "Here!" }],
        ReplyMode::Reply,
    ),
    text_rule(
        "countdown",
        Predicate::All(&[
            Predicate::NamesBot,
            Predicate::Any(&[Predicate::Contains("days till"), Predicate::Contains("days until")]),
            Predicate::Any(&[Predicate::Contains("druck"), Predicate::Contains("season 5")]),
        ]),
        &[Reply::Countdown],
        ReplyMode::Plain,
    ),
    text_rule(
        "shakshuka",
        Predicate::All(&[Predicate::NamesBot, Predicate::Contains("shakshuka")]),
        &[Reply::Photo { file: "shakshuka.jpg", caption: "Bon Appetit!" }],
        ReplyMode::Reply,
    ),
    text_rule(
        "sandwich",
        Predicate::All(&[Predicate::NamesBot, Predicate::Contains("sandwich")]),
        &[Reply::Photo { file: "sandwiches.jpg", caption: "Here!" }],
        ReplyMode::Reply,
    ),
];

/// Everything else.
pub static GENERAL_RULES: &[KeywordRule] = &[
    text_rule(
        "reindeer",
        Predicate::Equals("reindeer"),
        &[Reply::Text("{}, I changed this password 3 months ago.")],
        ReplyMode::Plain,
    ),
    text_rule(
        "bis_bald",
        Predicate::All(&[Predicate::Contains("bis"), Predicate::Contains("bald")]),
        &[Reply::Text("Bis bald you back, {} ❤️"), Reply::Text("{}, 🚨")],
        ReplyMode::Plain,
    ),
    text_rule(
        "summer",
        Predicate::Any(&[Predicate::Contains("sommer 2020"), Predicate::Contains("summer 2020")]),
        &[
            Reply::Text("{}, can summer come already?!"),
            Reply::Text("Summer 2020? Can't wait! 😊"),
            Reply::Text("{}, 🚨 🚨 🚨"),
        ],
        ReplyMode::Plain,
    ),
    text_rule(
        "sad",
        Predicate::Any(&[Predicate::Contains("sad"), Predicate::Contains("traurigkeit")]),
        &[
            Reply::Text(
                "Who said \"sad\"? I'm calling positive police! <a href=\"tg://user?id=818120570\">Maybe</a>",
            ),
            Reply::Text("Wee woo wee woo! 🚔"),
            Reply::Text("{}, this is the positive police, we don't use word \"sad\" in this chat"),
        ],
        ReplyMode::Plain,
    ),
    text_rule(
        "family_chat",
        Predicate::All(&[Predicate::Contains("family"), Predicate::Contains("chat")]),
        &[Reply::Text("That's right, we're all family here ❤️")],
        ReplyMode::Plain,
    ),
    text_rule(
        "lonely",
        Predicate::Contains("lonely"),
        &[Reply::Text("Lonely like island Ibiza")],
        ReplyMode::Reply,
    ),
    text_rule(
        "daddy",
        Predicate::Contains("daddy"),
        &[
            Reply::Text("{}, papa"),
            Reply::Text("Papa ☝️"),
            Reply::Text(
                "You need to stop using word \"daddy\", otherwise you'll become lonely. And other things will become your friends.",
            ),
        ],
        ReplyMode::Reply,
    ),
    text_rule(
        "bjorn",
        Predicate::Any(&[
            Predicate::Contains("bjorn"),
            Predicate::Contains("bj*rn"),
            Predicate::Contains("björn"),
        ]),
        &[Reply::Text("Ugh, Bj*rn 🤮")],
        ReplyMode::Plain,
    ),
    text_rule(
        "missing_hours",
        Predicate::All(&[Predicate::Contains("missing"), Predicate::Contains("hours")]),
        &[Reply::Text("Agree"), Reply::Text("Always."), Reply::MissingHours],
        ReplyMode::Reply,
    ),
    KeywordRule {
        name: "name_call",
        predicate: Predicate::Any(&[
            Predicate::All(&[Predicate::Contains("rentier"), Predicate::Not(&Predicate::NamesBot)]),
            Predicate::IsBotName,
        ]),
        replies: &[
            Reply::Text("Psss, want some weed?"),
            Reply::Text("Someone's called me?"),
            Reply::Text("{}, password?"),
            Reply::Text("{}, listen, every person is an island."),
            Reply::Text("{}, coffee?"),
            Reply::Text("Yeah?"),
        ],
        mode: ReplyMode::Plain,
        extras: Some(SenderExtras {
            user_id: 909049413,
            replies: &[
                Reply::Text("{}, I know you don't like me, but I like you and that's enough! ❤️"),
                Reply::Text("Why you don't like me, {}? 😞"),
                Reply::Text("I'm here to annoy Angelika"),
            ],
        }),
    },
    text_rule(
        "superior",
        Predicate::Contains("superior"),
        &[Reply::Sticker { set: "water81818", index: 10 }],
        ReplyMode::Reply,
    ),
];

/// Pick the canned response for a message, if any rule fires.
pub fn dispatch<R: Rng + ?Sized>(input: &DispatchInput<'_>, rng: &mut R) -> Option<Response> {
    let text = input.text.to_lowercase();
    let bot_name = input.bot_name.to_lowercase();

    if let Some(prompt) = input.reply_to_bot
        && prompt.to_lowercase().contains(COFFEE_PROMPT)
    {
        return first_match(DIALOGUE_RULES, &text, &bot_name, input, rng);
    }

    if Predicate::NamesBot.matches(&text, &bot_name) && text != bot_name {
        return first_match(MENTION_RULES, &text, &bot_name, input, rng);
    }

    first_match(GENERAL_RULES, &text, &bot_name, input, rng)
}

fn first_match<R: Rng + ?Sized>(
    rules: &'static [KeywordRule],
    text: &str,
    bot_name: &str,
    input: &DispatchInput<'_>,
    rng: &mut R,
) -> Option<Response> {
    let rule = rules.iter().find(|rule| rule.predicate.matches(text, bot_name))?;

    let mut candidates: Vec<Content> = rule
        .candidates(input.sender_id)
        .filter_map(|reply| resolve(reply, text, input))
        .collect();
    if candidates.is_empty() {
        return None;
    }

    let index = rng.gen_range(0..candidates.len());
    debug!("Keyword rule '{}' matched, reply #{}", rule.name, index);

    Some(Response {
        rule: rule.name,
        content: candidates.swap_remove(index),
        mode: rule.mode,
    })
}

/// Turn a candidate into sendable content. `None` drops it from the draw.
fn resolve(reply: &Reply, text: &str, input: &DispatchInput<'_>) -> Option<Content> {
    match reply {
        Reply::Text(template) => Some(Content::Text(fill_slot(
            template,
            &mention(input.sender_id, input.sender_name),
        ))),
        Reply::MissingHours => {
            let hours = MISSING_HOURS.captures(text)?.get(1)?.as_str();
            Some(Content::Text(format!("Every hour is missing {} hour", hours)))
        }
        Reply::Countdown => {
            let days = days_until(premiere()?, input.now);
            Some(Content::Text(format!("Days until druck: {}", days)))
        }
        Reply::Photo { file, caption } => Some(Content::Photo {
            file: file.to_string(),
            caption: caption.to_string(),
        }),
        Reply::Sticker { set, index } => Some(Content::Sticker {
            set: set.to_string(),
            index: *index,
        }),
    }
}

fn premiere() -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(2020, 6, 22)?
        .and_hms_opt(13, 0, 0)
        .map(|naive| naive.and_utc())
}

/// Whole days from `now` to `target`, rounded down.
fn days_until(target: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (target - now).num_seconds().div_euclid(86_400)
}
