use chrono::NaiveDateTime;
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::assistant::congrats::{CongratsMessage, ScheduledUser};
use crate::assistant::engine::AssistantConfig;

/// Format of `schedule.target_local`.
const TARGET_FORMAT: &str = "%Y-%m-%d %H:%M";
const DEFAULT_TARGET: &str = "2020-01-01 00:00";

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    telegram_bot_token: String,
    /// Bot username; fetched from Telegram when missing.
    bot_username: Option<String>,
    /// Users allowed to run /setusers and /relay.
    #[serde(default)]
    owner_ids: Vec<i64>,
    /// Directory for state files (settings database, logs). Defaults to current directory.
    data_dir: Option<String>,
    /// Directory holding the photos sent by keyword replies.
    photo_dir: Option<String>,
    /// Chats reachable through /relay, by alias.
    #[serde(default)]
    relay_chats: HashMap<String, i64>,
    schedule: Option<ScheduleFile>,
}

#[derive(Deserialize)]
struct ScheduleFile {
    target_local: Option<String>,
    #[serde(default)]
    users: Vec<ScheduledUserFile>,
    #[serde(default)]
    messages: Vec<String>,
}

#[derive(Deserialize)]
struct ScheduledUserFile {
    id: i64,
    name: String,
    tz: String,
}

/// Congratulation schedule loaded by /setusers.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub target_local: NaiveDateTime,
    pub users: Vec<ScheduledUser>,
    pub messages: Vec<CongratsMessage>,
}

pub struct Config {
    pub telegram_bot_token: String,
    pub bot_username: Option<String>,
    pub owner_ids: Vec<i64>,
    /// Directory for state files (settings database, logs).
    pub data_dir: PathBuf,
    pub photo_dir: PathBuf,
    pub relay_chats: HashMap<String, i64>,
    pub schedule: Schedule,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path, source: e })?;

        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
            ));
        }

        let bot_username = match file.bot_username {
            Some(name) => {
                let name = name.trim().trim_start_matches('@').to_string();
                if name.is_empty() {
                    return Err(ConfigError::Validation("bot_username must not be empty".into()));
                }
                Some(name)
            }
            None => None,
        };

        let schedule = parse_schedule(file.schedule)?;

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let photo_dir = file
            .photo_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("resources/photos"));

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            bot_username,
            owner_ids: file.owner_ids,
            data_dir,
            photo_dir,
            relay_chats: file.relay_chats,
            schedule,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("settings.db")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Settings for the assistant, once the bot's username is known.
    pub fn assistant_config(&self, bot_username: &str) -> AssistantConfig {
        AssistantConfig {
            bot_username: bot_username.to_string(),
            owner_ids: self.owner_ids.clone(),
            relay_chats: self.relay_chats.clone(),
            congrats_target: self.schedule.target_local,
            scheduled_users: self.schedule.users.clone(),
            congrats_messages: self.schedule.messages.clone(),
        }
    }
}

fn parse_schedule(file: Option<ScheduleFile>) -> Result<Schedule, ConfigError> {
    let file = file.unwrap_or(ScheduleFile {
        target_local: None,
        users: Vec::new(),
        messages: Vec::new(),
    });

    let target = file.target_local.as_deref().unwrap_or(DEFAULT_TARGET);
    let target_local = NaiveDateTime::parse_from_str(target, TARGET_FORMAT).map_err(|e| {
        ConfigError::Validation(format!(
            "schedule.target_local '{}' is invalid ({}); use YYYY-MM-DD HH:MM",
            target, e
        ))
    })?;

    let users = file
        .users
        .into_iter()
        .map(|u| {
            u.tz.parse::<Tz>().map_err(|_| {
                ConfigError::Validation(format!("unknown timezone '{}' for user {}", u.tz, u.id))
            })?;
            Ok(ScheduledUser { id: u.id, name: u.name, tz: u.tz, notified: false })
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    let messages = file
        .messages
        .into_iter()
        .map(|template| CongratsMessage { template, sent: false })
        .collect();

    Ok(Schedule { target_local, users, messages })
}
