//! Agent loop implementation
//!
//! This module provides the loop that turns inbound messages into provider
//! calls and replies: it assembles the request from the session, sends it,
//! cleans the reply, records the turn and hands the session to the
//! compaction controller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::bus::{InboundMessage, MessageBus, OutboundMessage};
use crate::config::Config;
use crate::error::{ConvoError, ProviderError, Result};
use crate::providers::{ChatOptions, LLMProvider};
use crate::session::{Message, SessionStore};
use crate::utils::sanitize::{is_silent_reply, sanitize_response, SILENT_REPLY_TOKEN};

use super::compaction::{CompactionController, CompactionTrigger};
use super::context::{AssemblyConfig, ContextBuilder};
use super::guard::ConcurrencyGuard;
use super::tokens::TokenCalibration;

/// What a processed turn produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnReply {
    /// Cleaned reply text to deliver.
    Text(String),
    /// The model chose not to answer.
    Silent,
    /// Nothing was left after sanitization.
    Empty,
}

impl TurnReply {
    /// The reply text, if there is something to deliver.
    pub fn text(&self) -> Option<&str> {
        match self {
            TurnReply::Text(text) => Some(text),
            TurnReply::Silent | TurnReply::Empty => None,
        }
    }
}

/// The agent loop: consumes the bus, runs one turn per message and publishes
/// replies.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use convoclaw::agent::AgentLoop;
/// use convoclaw::bus::MessageBus;
/// use convoclaw::config::Config;
/// use convoclaw::session::SessionManager;
///
/// let bus = Arc::new(MessageBus::new());
/// let agent = AgentLoop::new(
///     Config::default(),
///     Arc::new(SessionManager::new_memory()),
///     Arc::new(my_provider),
///     bus,
/// );
/// agent.start().await?;
/// ```
pub struct AgentLoop {
    /// Agent configuration
    config: Config,
    /// Conversation state
    store: Arc<dyn SessionStore>,
    /// Message bus for input/output
    bus: Arc<MessageBus>,
    /// The LLM provider to use
    provider: Arc<dyn LLMProvider>,
    /// Context builder for constructing requests
    context_builder: ContextBuilder,
    /// Summarizes sessions that outgrow the context window
    compactor: Arc<CompactionController>,
    /// Serializes turns of the same session
    turn_locks: ConcurrencyGuard,
    /// Whether the loop is currently running
    running: AtomicBool,
    /// Shutdown signal sender
    shutdown_tx: watch::Sender<bool>,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        config: Config,
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn LLMProvider>,
        bus: Arc<MessageBus>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let compactor = CompactionController::new(
            Arc::clone(&store),
            Arc::clone(&provider),
            config.compaction.clone(),
            config.agents.defaults.context_window,
        )
        .with_model(&config.agents.defaults.model);
        Self {
            context_builder: ContextBuilder::from_config(&config),
            config,
            store,
            bus,
            provider,
            compactor: Arc::new(compactor),
            turn_locks: ConcurrencyGuard::new(),
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Replace the context builder.
    pub fn with_context_builder(mut self, context_builder: ContextBuilder) -> Self {
        self.context_builder = context_builder;
        self
    }

    /// Check if the agent loop is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run one turn for `msg`.
    ///
    /// Turns of the same session run one at a time. The reply is sanitized
    /// before it is stored or returned; a silent reply is stored as the
    /// silent token so the model sees its own choice on the next turn.
    ///
    /// # Errors
    ///
    /// Store failures, provider failures and the per-turn timeout. A failed
    /// turn records nothing.
    pub async fn process_message(&self, msg: &InboundMessage) -> Result<TurnReply> {
        let key = msg.session_key.as_str();
        let defaults = &self.config.agents.defaults;
        let turn = self.turn_locks.acquire(key).await;

        let history = self.store.get_history(key).await?;
        let summary = self.store.get_summary(key).await?;
        let calibration = self.store.get_calibration(key).await?;
        let assembly = AssemblyConfig::from_config(&self.config).with_calibration(calibration);
        let request =
            self.context_builder
                .build_messages(&history, summary.as_deref(), &msg.content, &assembly);
        debug!(
            history = history.len(),
            request = request.len(),
            has_summary = summary.is_some(),
            "Assembled request"
        );

        let options = ChatOptions::new()
            .with_max_tokens(defaults.max_tokens)
            .with_temperature(defaults.temperature);
        let call = self
            .provider
            .chat(request.clone(), vec![], Some(defaults.model.as_str()), options);
        let response =
            match tokio::time::timeout(Duration::from_secs(defaults.agent_timeout_secs), call)
                .await
            {
                Ok(response) => response?,
                Err(_) => {
                    return Err(ProviderError::Timeout(format!(
                        "agent turn exceeded {}s",
                        defaults.agent_timeout_secs
                    ))
                    .into())
                }
            };

        if let Some(usage) = response.usage {
            self.store
                .set_calibration(
                    key,
                    TokenCalibration::from_request(u64::from(usage.prompt_tokens), &request),
                )
                .await?;
        }
        if response.has_tool_calls() {
            warn!(tools = ?response.tool_names(), "Ignoring tool calls in response");
        }

        let cleaned = sanitize_response(&response.content);
        let reply = if is_silent_reply(response.content.trim()) || is_silent_reply(&cleaned) {
            TurnReply::Silent
        } else if cleaned.is_empty() {
            warn!(
                raw_len = response.content.len(),
                "Response empty after sanitization"
            );
            TurnReply::Empty
        } else {
            TurnReply::Text(cleaned)
        };

        let mut turn_messages = Vec::with_capacity(2);
        if !msg.content.is_empty() {
            turn_messages.push(Message::user(&msg.content));
        }
        match &reply {
            TurnReply::Text(text) => turn_messages.push(Message::assistant(text)),
            TurnReply::Silent => turn_messages.push(Message::assistant(SILENT_REPLY_TOKEN)),
            TurnReply::Empty => {}
        }
        self.store.append_messages(key, turn_messages).await?;
        self.store.save(key).await?;
        drop(turn);

        match self.compactor.maybe_compact(key).await {
            Ok(CompactionTrigger::Scheduled) => debug!("Compaction scheduled"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "Compaction check failed"),
        }

        Ok(reply)
    }

    /// Start the agent loop.
    ///
    /// Consumes inbound messages until [`stop`](Self::stop) is called or the
    /// inbound channel closes.
    ///
    /// # Errors
    /// Returns an error if the loop is already running.
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ConvoError::Config("Agent loop already running".into()));
        }
        info!("Starting agent loop");

        // Subscribe fresh and consume any stale stop signal from a previous run.
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let _ = *shutdown_rx.borrow_and_update();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Received shutdown signal");
                        break;
                    }
                }
                msg = self.bus.consume_inbound() => {
                    let Some(msg) = msg else {
                        info!("Inbound channel closed");
                        break;
                    };
                    let request_span = info_span!(
                        "request",
                        request_id = %uuid::Uuid::new_v4(),
                        session_id = %msg.session_key,
                        channel = %msg.channel,
                        sender = %msg.sender_id,
                    );
                    self.handle(&msg).instrument(request_span).await;
                }
            }

            if !self.running.load(Ordering::SeqCst) {
                break;
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Agent loop stopped");
        Ok(())
    }

    async fn handle(&self, msg: &InboundMessage) {
        info!("Processing message");
        let start = std::time::Instant::now();

        match self.process_message(msg).await {
            Ok(TurnReply::Text(text)) => {
                info!(
                    latency_ms = start.elapsed().as_millis() as u64,
                    response_len = text.len(),
                    "Request completed"
                );
                let outbound = OutboundMessage::reply_to(msg, &text);
                if let Err(e) = self.bus.publish_outbound(outbound).await {
                    error!("Failed to publish outbound message: {}", e);
                }
            }
            Ok(TurnReply::Silent) => debug!("Silent reply, nothing sent"),
            Ok(TurnReply::Empty) => warn!("Reply discarded, nothing sent"),
            Err(e) => {
                error!(
                    latency_ms = start.elapsed().as_millis() as u64,
                    error = %e,
                    "Request failed"
                );
                let error_msg = OutboundMessage::reply_to(msg, &format!("Error: {}", e));
                self.bus.publish_outbound(error_msg).await.ok();
            }
        }
    }

    /// Stop the agent loop after the message in progress, if any.
    pub fn stop(&self) {
        info!("Stopping agent loop");
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for background compactions to finish.
    pub async fn shutdown(&self) {
        self.stop();
        self.compactor.shutdown().await;
    }

    /// The session store.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// The compaction controller.
    pub fn compactor(&self) -> &Arc<CompactionController> {
        &self.compactor
    }

    /// Get a reference to the message bus.
    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &Config {
        &self.config
    }
}
