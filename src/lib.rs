//! ConvoClaw - Conversation state and compaction engine for chat agents

pub mod agent;
pub mod bus;
pub mod config;
pub mod error;
pub mod providers;
pub mod session;
pub mod utils;

pub use agent::{AgentLoop, CompactionController, ContextBuilder, TurnReply};
pub use bus::{InboundMessage, MessageBus, OutboundMessage};
pub use config::Config;
pub use error::{ConvoError, ProviderError, Result};
pub use providers::{ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDefinition, Usage};
pub use session::{Message, Role, Session, SessionManager, SessionStore, ToolCall};
pub use utils::sanitize::{is_silent_reply, sanitize_response};
