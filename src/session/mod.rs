//! Session module - Session and conversation state management
//!
//! This module provides:
//! - The [`SessionStore`] capability the conversation engine reads and
//!   mutates history through (atomic per call)
//! - [`SessionManager`], an in-memory store with optional JSON-file
//!   persistence implementing it
//!
//! # Example
//!
//! ```
//! use convoclaw::session::{Message, SessionManager, SessionStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = SessionManager::new_memory();
//!
//!     manager
//!         .append_messages(
//!             "telegram:chat123",
//!             vec![Message::user("Hello!"), Message::assistant("Hi there!")],
//!         )
//!         .await
//!         .unwrap();
//!     manager.save("telegram:chat123").await.unwrap();
//!
//!     let history = manager.get_history("telegram:chat123").await.unwrap();
//!     assert_eq!(history.len(), 2);
//! }
//! ```

pub mod types;

pub use types::{Message, Role, Session, ToolCall};

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::agent::tokens::TokenCalibration;
use crate::config::Config;
use crate::error::Result;

/// Per-session storage capability used by the agent loop and the
/// compaction controller.
///
/// Every method is expected to be atomic for its key. Unknown keys read as
/// empty sessions; mutating methods create the session on demand.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Full retained history for `key`, oldest first.
    async fn get_history(&self, key: &str) -> Result<Vec<Message>>;

    /// Append messages to the end of the history.
    async fn append_messages(&self, key: &str, messages: Vec<Message>) -> Result<()>;

    /// Current summary of compacted history, if any.
    async fn get_summary(&self, key: &str) -> Result<Option<String>>;

    /// Replace the summary.
    async fn set_summary(&self, key: &str, summary: &str) -> Result<()>;

    /// Keep only the `keep_last` most recent messages.
    async fn truncate_history(&self, key: &str, keep_last: usize) -> Result<()>;

    /// Bump the compaction counter, returning the new value.
    async fn increment_compaction(&self, key: &str) -> Result<u32>;

    /// Replace the oldest `summarized` messages with `summary` and bump the
    /// compaction counter, returning `(messages kept, compaction count)`.
    ///
    /// Readers must never see the new summary next to the history it
    /// replaced. The default truncates before installing the summary;
    /// stores with a single-write path should override it.
    async fn apply_compaction(
        &self,
        key: &str,
        summary: &str,
        summarized: usize,
    ) -> Result<(usize, u32)> {
        let kept = self.get_history(key).await?.len().saturating_sub(summarized);
        self.truncate_history(key, kept).await?;
        self.set_summary(key, summary).await?;
        let count = self.increment_compaction(key).await?;
        Ok((kept, count))
    }

    /// Persist the session's current state.
    async fn save(&self, key: &str) -> Result<()>;

    /// Provider-reported usage from the last real call, if any.
    async fn get_calibration(&self, key: &str) -> Result<Option<TokenCalibration>>;

    /// Record provider-reported usage for the session.
    async fn set_calibration(&self, key: &str, calibration: TokenCalibration) -> Result<()>;
}

/// Session manager for storing and retrieving conversation sessions.
///
/// Sessions are cached in memory behind an `Arc<RwLock>`, so clones share
/// state. When created with [`SessionManager::new`] or
/// [`SessionManager::with_path`], [`SessionStore::save`] also writes the
/// session to `<dir>/<percent-encoded key>.json`.
pub struct SessionManager {
    /// In-memory cache of sessions
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    /// Optional path for file-based persistence
    storage_path: Option<PathBuf>,
}

impl SessionManager {
    /// Create a session manager persisting to `~/.convoclaw/sessions/`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sessions directory cannot be created.
    pub fn new() -> Result<Self> {
        Self::with_path(Config::dir().join("sessions"))
    }

    /// Create an in-memory session manager without persistence.
    pub fn new_memory() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage_path: None,
        }
    }

    /// Create a session manager with a custom storage path.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn with_path(path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&path)?;
        Ok(Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage_path: Some(path),
        })
    }

    /// Get an existing session or create a new one.
    ///
    /// Checks the in-memory cache first, then disk (if persistence is
    /// enabled), and finally creates an empty session.
    pub async fn get_or_create(&self, key: &str) -> Result<Session> {
        if let Some(session) = self.get(key).await? {
            return Ok(session);
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(key.to_string())
            .or_insert_with(|| Session::new(key));
        Ok(session.clone())
    }

    /// Get a session by key without creating it.
    ///
    /// # Errors
    ///
    /// Returns an error if loading from disk fails.
    pub async fn get(&self, key: &str) -> Result<Option<Session>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(key) {
                return Ok(Some(session.clone()));
            }
        }

        match self.load_from_disk(key).await? {
            Some(session) => {
                let mut sessions = self.sessions.write().await;
                // Another task may have created it while we were reading.
                let cached = sessions.entry(key.to_string()).or_insert(session);
                Ok(Some(cached.clone()))
            }
            None => Ok(None),
        }
    }

    /// Store a whole session in memory and on disk (if persistence is enabled).
    pub async fn save_session(&self, session: &Session) -> Result<()> {
        {
            let mut sessions = self.sessions.write().await;
            sessions.insert(session.key.clone(), session.clone());
        }
        self.write_to_disk(session).await
    }

    /// Delete a session from both memory and disk.
    pub async fn delete(&self, key: &str) -> Result<()> {
        {
            let mut sessions = self.sessions.write().await;
            sessions.remove(key);
        }

        if let Some(file_path) = self.file_path(key) {
            if file_path.exists() {
                tokio::fs::remove_file(&file_path).await?;
            }
        }

        Ok(())
    }

    /// List all session keys from memory and disk, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = {
            let sessions = self.sessions.read().await;
            sessions.keys().cloned().collect()
        };

        // Read each file for the real key rather than decoding the filename
        if let Some(ref storage_path) = self.storage_path {
            let mut dir_entries = tokio::fs::read_dir(storage_path).await?;
            while let Some(entry) = dir_entries.next_entry().await? {
                let path = entry.path();
                if path.extension().map(|e| e == "json").unwrap_or(false) {
                    if let Ok(content) = tokio::fs::read_to_string(&path).await {
                        if let Ok(session) = serde_json::from_str::<Session>(&content) {
                            if !keys.contains(&session.key) {
                                keys.push(session.key);
                            }
                        }
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Clear all sessions from memory (does not affect disk).
    pub async fn clear_cache(&self) {
        let mut sessions = self.sessions.write().await;
        sessions.clear();
    }

    /// Get the number of sessions in memory.
    pub async fn cache_size(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    /// Apply `f` to the cached session for `key`, loading or creating it first.
    async fn update<F, R>(&self, key: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut Session) -> R + Send,
    {
        let loaded = {
            let sessions = self.sessions.read().await;
            if sessions.contains_key(key) {
                None
            } else {
                Some(())
            }
        };
        let from_disk = match loaded {
            Some(()) => self.load_from_disk(key).await?,
            None => None,
        };

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(key.to_string())
            .or_insert_with(|| from_disk.unwrap_or_else(|| Session::new(key)));
        Ok(f(session))
    }

    fn file_path(&self, key: &str) -> Option<PathBuf> {
        self.storage_path
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", Self::sanitize_key(key))))
    }

    async fn load_from_disk(&self, key: &str) -> Result<Option<Session>> {
        let Some(file_path) = self.file_path(key) else {
            return Ok(None);
        };
        if !file_path.exists() {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&file_path).await?;
        let session: Session = serde_json::from_str(&content)?;
        debug!(session = %key, messages = session.messages.len(), "Loaded session from disk");
        Ok(Some(session))
    }

    async fn write_to_disk(&self, session: &Session) -> Result<()> {
        if let Some(file_path) = self.file_path(&session.key) {
            let content = serde_json::to_string_pretty(session)?;
            tokio::fs::write(&file_path, content).await?;
        }
        Ok(())
    }

    /// Sanitize a session key for use as a filename.
    ///
    /// Percent-encodes characters that are unsafe in filenames (and `%`
    /// itself) so distinct keys never map to the same file.
    fn sanitize_key(key: &str) -> String {
        let mut result = String::with_capacity(key.len() * 3);
        for c in key.chars() {
            match c {
                '/' => result.push_str("%2F"),
                '\\' => result.push_str("%5C"),
                ':' => result.push_str("%3A"),
                '*' => result.push_str("%2A"),
                '?' => result.push_str("%3F"),
                '"' => result.push_str("%22"),
                '<' => result.push_str("%3C"),
                '>' => result.push_str("%3E"),
                '|' => result.push_str("%7C"),
                '%' => result.push_str("%25"),
                c => result.push(c),
            }
        }
        result
    }
}

#[async_trait]
impl SessionStore for SessionManager {
    async fn get_history(&self, key: &str) -> Result<Vec<Message>> {
        Ok(self
            .get(key)
            .await?
            .map(|session| session.messages)
            .unwrap_or_default())
    }

    async fn append_messages(&self, key: &str, messages: Vec<Message>) -> Result<()> {
        self.update(key, move |session| {
            for message in messages {
                session.add_message(message);
            }
        })
        .await
    }

    async fn get_summary(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key).await?.and_then(|session| session.summary))
    }

    async fn set_summary(&self, key: &str, summary: &str) -> Result<()> {
        self.update(key, |session| session.set_summary(summary))
            .await
    }

    async fn truncate_history(&self, key: &str, keep_last: usize) -> Result<()> {
        self.update(key, |session| session.truncate_to_last(keep_last))
            .await
    }

    async fn increment_compaction(&self, key: &str) -> Result<u32> {
        self.update(key, |session| {
            session.compaction_count += 1;
            session.compaction_count
        })
        .await
    }

    async fn apply_compaction(
        &self,
        key: &str,
        summary: &str,
        summarized: usize,
    ) -> Result<(usize, u32)> {
        self.update(key, |session| {
            let count = session.apply_compaction(summary, summarized);
            (session.messages.len(), count)
        })
        .await
    }

    async fn save(&self, key: &str) -> Result<()> {
        let snapshot = {
            let sessions = self.sessions.read().await;
            sessions.get(key).cloned()
        };
        match snapshot {
            Some(session) => self.write_to_disk(&session).await,
            None => Ok(()),
        }
    }

    async fn get_calibration(&self, key: &str) -> Result<Option<TokenCalibration>> {
        Ok(self.get(key).await?.and_then(|session| session.calibration))
    }

    async fn set_calibration(&self, key: &str, calibration: TokenCalibration) -> Result<()> {
        self.update(key, move |session| session.calibration = Some(calibration))
            .await
    }
}

impl Clone for SessionManager {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            storage_path: self.storage_path.clone(),
        }
    }
}

impl Default for SessionManager {
    /// Creates an in-memory session manager.
    fn default() -> Self {
        Self::new_memory()
    }
}
