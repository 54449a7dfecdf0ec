//! Persistent per-chat settings backed by SQLite.
//!
//! Every value is a JSON document stored under a string key. Chat settings use
//! the `<chat_id>[suffix]` layout, global state lives under fixed keys such as
//! `chats`. SQLite runs in autocommit mode, so a write is durable once the call
//! returns. All access goes through one connection mutex, which makes the
//! store a single writer and keeps read-modify-write sequences linear.

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Key holding the list of chat ids the bot has seen.
pub const KNOWN_CHATS_KEY: &str = "chats";

/// Errors raised by the settings store.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Json(serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(e) => write!(f, "settings database error: {}", e),
            Self::Json(e) => write!(f, "malformed settings value: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sqlite(e) => Some(e),
            Self::Json(e) => Some(e),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// A per-chat setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatField {
    Welcome,
    Goodbye,
    Admin,
    Locked,
    Quiet,
}

impl ChatField {
    fn suffix(self) -> &'static str {
        match self {
            ChatField::Welcome => "",
            ChatField::Goodbye => "_bye",
            ChatField::Admin => "_adm",
            ChatField::Locked => "_lck",
            ChatField::Quiet => "_quiet",
        }
    }
}

/// Storage key for a chat setting, e.g. `-100_lck`.
pub fn chat_key(chat_id: i64, field: ChatField) -> String {
    format!("{}{}", chat_id, field.suffix())
}

/// What to do when a member leaves.
///
/// Stored as `true` (default text), `false` (disabled) or a template string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum GoodbyeSetting {
    #[default]
    Default,
    Custom(String),
    Disabled,
}

impl GoodbyeSetting {
    fn from_value(value: Option<Value>) -> Self {
        match value {
            Some(Value::Bool(false)) => GoodbyeSetting::Disabled,
            Some(Value::String(text)) => GoodbyeSetting::Custom(text),
            _ => GoodbyeSetting::Default,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            GoodbyeSetting::Default => Value::Bool(true),
            GoodbyeSetting::Custom(text) => Value::String(text.clone()),
            GoodbyeSetting::Disabled => Value::Bool(false),
        }
    }
}

/// Snapshot of one chat's settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatConfig {
    pub welcome_template: Option<String>,
    pub goodbye: GoodbyeSetting,
    /// The user who added the bot to the chat.
    pub admin_user_id: Option<i64>,
    pub locked: bool,
    pub quiet: bool,
}

/// Typed access to the store inside one transaction.
pub struct Batch<'a> {
    conn: &'a Connection,
}

impl Batch<'_> {
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match read_value(self.conn, key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        write_value(self.conn, key, &serde_json::to_value(value)?)
    }
}

/// Durable key-value store for chat settings and bot-wide state.
pub struct SettingsStore {
    conn: Mutex<Connection>,
}

impl SettingsStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let store = Self::from_connection(Connection::open(path)?)?;
        info!(
            "Opened settings store at {:?} ({} known chats)",
            path,
            store.known_chats()?.len()
        );
        Ok(store)
    }

    /// Create a throwaway in-memory store.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
        "#,
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Close the underlying database.
    pub fn close(self) -> Result<(), StoreError> {
        let conn = self.conn.into_inner().unwrap_or_else(|e| e.into_inner());
        conn.close().map_err(|(_, e)| StoreError::Sqlite(e))
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panicking holder cannot leave a half-applied write behind: every
        // multi-key update runs inside a transaction.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Raw value of a chat setting. `None` means the field was never set.
    pub fn get(&self, chat_id: i64, field: ChatField) -> Result<Option<Value>, StoreError> {
        read_value(&self.lock(), &chat_key(chat_id, field))
    }

    pub fn set(&self, chat_id: i64, field: ChatField, value: Value) -> Result<(), StoreError> {
        debug!("Setting {:?} for chat {}", field, chat_id);
        write_value(&self.lock(), &chat_key(chat_id, field), &value)
    }

    /// All settings of a chat, with absent fields mapped to their defaults.
    pub fn chat_config(&self, chat_id: i64) -> Result<ChatConfig, StoreError> {
        let conn = self.lock();
        let get = |field| read_value(&conn, &chat_key(chat_id, field));

        Ok(ChatConfig {
            welcome_template: get(ChatField::Welcome)?.and_then(|v| v.as_str().map(str::to_owned)),
            goodbye: GoodbyeSetting::from_value(get(ChatField::Goodbye)?),
            admin_user_id: get(ChatField::Admin)?.and_then(|v| v.as_i64()),
            locked: get(ChatField::Locked)?.is_some_and(|v| is_truthy(&v)),
            quiet: get(ChatField::Quiet)?.is_some_and(|v| is_truthy(&v)),
        })
    }

    /// Record who invited the bot and lock the chat to them.
    pub fn introduce(&self, chat_id: i64, admin_user_id: i64) -> Result<(), StoreError> {
        self.atomically(|batch| {
            batch.set(&chat_key(chat_id, ChatField::Admin), &admin_user_id)?;
            batch.set(&chat_key(chat_id, ChatField::Locked), &true)
        })
    }

    pub fn known_chats(&self) -> Result<Vec<i64>, StoreError> {
        let chats = Batch { conn: &self.lock() }.get::<Vec<i64>>(KNOWN_CHATS_KEY)?;
        Ok(chats.unwrap_or_default())
    }

    /// Add a chat id to the known set. Returns `false` if it was already there.
    pub fn add_known_chat(&self, chat_id: i64) -> Result<bool, StoreError> {
        let total = self.atomically(|batch| {
            let mut chats: Vec<i64> = batch.get(KNOWN_CHATS_KEY)?.unwrap_or_default();
            if chats.contains(&chat_id) {
                return Ok(None);
            }
            chats.push(chat_id);
            batch.set(KNOWN_CHATS_KEY, &chats)?;
            Ok(Some(chats.len()))
        })?;

        match total {
            Some(n) => {
                info!("I have been added to {} chats", n);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove a chat id from the known set. Returns `false` if it was absent.
    pub fn remove_known_chat(&self, chat_id: i64) -> Result<bool, StoreError> {
        self.atomically(|batch| {
            let mut chats: Vec<i64> = batch.get(KNOWN_CHATS_KEY)?.unwrap_or_default();
            let before = chats.len();
            chats.retain(|&id| id != chat_id);
            if chats.len() == before {
                return Ok(false);
            }
            batch.set(KNOWN_CHATS_KEY, &chats)?;
            Ok(true)
        })
    }

    /// Run `f` inside a single transaction. Nothing is written if `f` fails.
    pub fn atomically<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Batch<'_>) -> Result<T, StoreError>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let out = f(&Batch { conn: &tx })?;
        tx.commit()?;
        Ok(out)
    }
}

fn read_value(conn: &Connection, key: &str) -> Result<Option<Value>, StoreError> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?1", params![key], |row| row.get(0))
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

fn write_value(conn: &Connection, key: &str, value: &Value) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value.to_string()],
    )?;
    Ok(())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
