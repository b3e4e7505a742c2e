//! Agent module - Conversation state and compaction
//!
//! This module turns stored conversation history into provider requests and
//! keeps that history inside the model's context window:
//!
//! - [`context`]: assembles the request for one turn
//! - [`turns`], [`pruner`], [`repair`]: request-scoped views of history
//!   (turn limit, token budget, tool-call pairing)
//! - [`tokens`]: heuristic token estimation with provider calibration
//! - [`compaction`]: background summarization of long sessions
//! - [`guard`]: per-session mutual exclusion
//! - [`AgentLoop`]: runs turns for messages from the bus
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  MessageBus │────>│  AgentLoop  │────>│ LLMProvider │
//! │  (inbound)  │     │             │     │             │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                        │       │               ▲
//!                        ▼       ▼               │
//!               ┌─────────────┐ ┌────────────────────┐
//!               │SessionStore │<│CompactionController│
//!               └─────────────┘ └────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use convoclaw::agent::{AssemblyConfig, ContextBuilder};
//! use convoclaw::session::Message;
//!
//! let history = vec![Message::user("Hi"), Message::assistant("Hello!")];
//! let request = ContextBuilder::new().build_messages(
//!     &history,
//!     None,
//!     "What did I just say?",
//!     &AssemblyConfig::default(),
//! );
//! assert_eq!(request.len(), 4);
//! ```

pub mod compaction;
pub mod context;
pub mod guard;
mod r#loop;
pub mod pruner;
pub mod repair;
pub mod tokens;
pub mod turns;

pub use compaction::{CompactionController, CompactionOutcome, CompactionTrigger};
pub use context::{AssemblyConfig, ContextBuilder};
pub use guard::ConcurrencyGuard;
pub use pruner::{prune_history, PruneConfig};
pub use r#loop::{AgentLoop, TurnReply};
pub use repair::{repair_history, sanitize_history, HistoryRepair};
pub use tokens::{TokenCalibration, TokenEstimator};
pub use turns::limit_history_turns;
