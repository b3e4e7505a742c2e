//! Session types for ConvoClaw
//!
//! This module defines the core types for session and conversation management,
//! including messages, roles, and tool calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::tokens::TokenCalibration;

/// A conversation session containing messages and compaction state.
///
/// Sessions are identified by a unique key and store the retained
/// conversation history, the rolling summary of everything older, and the
/// provider-reported token calibration for the last real call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier for this session (e.g., "telegram:chat123")
    pub key: String,
    /// Ordered list of messages in this conversation
    pub messages: Vec<Message>,
    /// Summary of history older than `messages`
    pub summary: Option<String>,
    /// Number of compactions applied to this session
    #[serde(default)]
    pub compaction_count: u32,
    /// Last provider-reported prompt size for this session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibration: Option<TokenCalibration>,
    /// When this session was created
    pub created_at: DateTime<Utc>,
    /// When this session was last modified
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new empty session with the given key.
    ///
    /// # Example
    /// ```
    /// use convoclaw::session::Session;
    ///
    /// let session = Session::new("telegram:chat123");
    /// assert!(session.messages.is_empty());
    /// assert_eq!(session.compaction_count, 0);
    /// ```
    pub fn new(key: &str) -> Self {
        let now = Utc::now();
        Self {
            key: key.to_string(),
            messages: Vec::new(),
            summary: None,
            compaction_count: 0,
            calibration: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a message to this session.
    ///
    /// Also updates the `updated_at` timestamp.
    ///
    /// # Example
    /// ```
    /// use convoclaw::session::{Session, Message};
    ///
    /// let mut session = Session::new("test");
    /// session.add_message(Message::user("Hello!"));
    /// assert_eq!(session.messages.len(), 1);
    /// ```
    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// Clear all messages, the summary and calibration from this session.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.summary = None;
        self.calibration = None;
        self.updated_at = Utc::now();
    }

    /// Replace the summary for this session.
    pub fn set_summary(&mut self, summary: &str) {
        self.summary = Some(summary.to_string());
        self.updated_at = Utc::now();
    }

    /// Keep only the `keep_last` most recent messages.
    ///
    /// # Example
    /// ```
    /// use convoclaw::session::{Session, Message};
    ///
    /// let mut session = Session::new("test");
    /// for i in 0..5 {
    ///     session.add_message(Message::user(&format!("m{}", i)));
    /// }
    /// session.truncate_to_last(2);
    /// assert_eq!(session.messages[0].content, "m3");
    /// ```
    pub fn truncate_to_last(&mut self, keep_last: usize) {
        let skip = self.messages.len().saturating_sub(keep_last);
        if skip > 0 {
            self.messages.drain(..skip);
            self.updated_at = Utc::now();
        }
    }

    /// Replace the oldest `summarized` messages with `summary` and bump the
    /// compaction counter, returning the new count.
    ///
    /// Messages after the summarized prefix are untouched, including any
    /// appended since the summary was requested.
    pub fn apply_compaction(&mut self, summary: &str, summarized: usize) -> u32 {
        let drop = summarized.min(self.messages.len());
        self.messages.drain(..drop);
        self.summary = Some(summary.to_string());
        self.compaction_count += 1;
        self.updated_at = Utc::now();
        self.compaction_count
    }

    /// Get the number of messages in this session.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Check if this session is empty (no messages).
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// A single message in a conversation.
///
/// Messages can be from users, assistants, system prompts, or tool results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender
    pub role: Role,
    /// The text content of the message
    pub content: String,
    /// Tool calls made by the assistant (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// ID of the tool call this message is responding to (for tool results)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn plain(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a new user message.
    ///
    /// # Example
    /// ```
    /// use convoclaw::session::{Message, Role};
    ///
    /// let msg = Message::user("Hello, assistant!");
    /// assert_eq!(msg.role, Role::User);
    /// ```
    pub fn user(content: &str) -> Self {
        Self::plain(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: &str) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: &str) -> Self {
        Self::plain(Role::System, content)
    }

    /// Create a new tool result message answering `tool_call_id`.
    ///
    /// # Example
    /// ```
    /// use convoclaw::session::{Message, Role};
    ///
    /// let msg = Message::tool_result("call_123", "Tool executed successfully");
    /// assert_eq!(msg.role, Role::Tool);
    /// assert_eq!(msg.tool_call_id, Some("call_123".to_string()));
    /// ```
    pub fn tool_result(tool_call_id: &str, content: &str) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.to_string()),
            ..Self::plain(Role::Tool, content)
        }
    }

    /// Create an assistant message with tool calls.
    ///
    /// # Example
    /// ```
    /// use convoclaw::session::{Message, ToolCall};
    ///
    /// let tool_call = ToolCall::new("call_1", "search", r#"{"query": "rust"}"#);
    /// let msg = Message::assistant_with_tools("Let me search for that.", vec![tool_call]);
    /// assert!(msg.has_tool_calls());
    /// ```
    pub fn assistant_with_tools(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::plain(Role::Assistant, content)
        }
    }

    /// Check if this message has a non-empty list of tool calls.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls
            .as_ref()
            .map(|tc| !tc.is_empty())
            .unwrap_or(false)
    }

    /// Check if this is a tool result message.
    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompts and instructions
    System,
    /// Messages from the user
    User,
    /// Messages from the AI assistant
    Assistant,
    /// Results from tool executions
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A tool call made by the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call
    pub id: String,
    /// Name of the tool to call
    pub name: String,
    /// JSON-encoded arguments for the tool
    pub arguments: String,
}

impl ToolCall {
    /// Create a new tool call.
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }
}
