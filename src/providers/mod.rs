//! Providers module - the language-model capability
//!
//! This module defines the `LLMProvider` trait and the request/response
//! types around it. Concrete HTTP clients live outside this crate; anything
//! implementing the trait can drive the agent loop and compaction.
//!
//! # Example
//!
//! ```
//! use async_trait::async_trait;
//! use convoclaw::error::Result;
//! use convoclaw::providers::{ChatOptions, LLMProvider, LLMResponse, ToolDefinition};
//! use convoclaw::session::Message;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl LLMProvider for Echo {
//!     async fn chat(
//!         &self,
//!         messages: Vec<Message>,
//!         _tools: Vec<ToolDefinition>,
//!         _model: Option<&str>,
//!         _options: ChatOptions,
//!     ) -> Result<LLMResponse> {
//!         let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
//!         Ok(LLMResponse::text(last))
//!     }
//!     fn default_model(&self) -> &str { "echo-1" }
//!     fn name(&self) -> &str { "echo" }
//! }
//! ```

mod types;

pub use types::{ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDefinition, Usage};
