//! End-to-end tests for ConvoClaw
//!
//! These tests drive the agent loop and the compaction controller together
//! with mock providers, the way a deployment would: turns arrive, history
//! grows, compaction summarizes it in the background and later requests
//! carry the summary.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use convoclaw::agent::compaction::SUMMARY_SYSTEM_PROMPT;
use convoclaw::agent::{
    AgentLoop, CompactionController, CompactionOutcome, CompactionTrigger, TurnReply,
};
use convoclaw::bus::{InboundMessage, MessageBus};
use convoclaw::config::{CompactionConfig, Config};
use convoclaw::error::{ConvoError, ProviderError};
use convoclaw::providers::{ChatOptions, LLMProvider, LLMResponse, ToolDefinition, Usage};
use convoclaw::session::{Message, Role, SessionManager, SessionStore};

// ============================================================================
// Mock Providers for E2E Tests
// ============================================================================

/// Answers chat turns and summarization requests differently, optionally
/// after a delay, and records every request it sees.
struct MockProvider {
    summary: String,
    delay: Duration,
    chat_calls: AtomicUsize,
    summary_calls: AtomicUsize,
    requests: std::sync::Mutex<Vec<Vec<Message>>>,
}

impl MockProvider {
    fn new(summary: &str) -> Self {
        Self::with_delay(summary, Duration::ZERO)
    }

    fn with_delay(summary: &str, delay: Duration) -> Self {
        Self {
            summary: summary.to_string(),
            delay,
            chat_calls: AtomicUsize::new(0),
            summary_calls: AtomicUsize::new(0),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn last_chat_request(&self) -> Vec<Message> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r[0].content != SUMMARY_SYSTEM_PROMPT)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl LLMProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn chat(
        &self,
        messages: Vec<Message>,
        _tools: Vec<ToolDefinition>,
        _model: Option<&str>,
        _options: ChatOptions,
    ) -> convoclaw::error::Result<LLMResponse> {
        let is_summary = messages[0].content == SUMMARY_SYSTEM_PROMPT;
        self.requests.lock().unwrap().push(messages);
        tokio::time::sleep(self.delay).await;

        if is_summary {
            self.summary_calls.fetch_add(1, Ordering::SeqCst);
            Ok(LLMResponse::text(&self.summary))
        } else {
            let n = self.chat_calls.fetch_add(1, Ordering::SeqCst);
            Ok(LLMResponse::text(&format!("Reply number {}.", n)).with_usage(Usage::new(900, 5)))
        }
    }
}

/// Fails every request with a server error.
struct DownProvider;

#[async_trait]
impl LLMProvider for DownProvider {
    fn name(&self) -> &str {
        "down"
    }

    fn default_model(&self) -> &str {
        "down-model"
    }

    async fn chat(
        &self,
        _messages: Vec<Message>,
        _tools: Vec<ToolDefinition>,
        _model: Option<&str>,
        _options: ChatOptions,
    ) -> convoclaw::error::Result<LLMResponse> {
        Err(ProviderError::ServerError("upstream unavailable".into()).into())
    }
}

fn compaction_config() -> CompactionConfig {
    CompactionConfig {
        history_share: 0.75,
        min_messages: 50,
        keep_last_messages: 4,
        ..Default::default()
    }
}

async fn seed_pairs(store: &SessionManager, key: &str, pairs: usize) {
    let mut msgs = Vec::with_capacity(pairs * 2);
    for i in 0..pairs {
        msgs.push(Message::user(&format!(
            "User message number {} with a bit of padding text",
            i
        )));
        msgs.push(Message::assistant(&format!(
            "Assistant reply number {} with a bit of padding",
            i
        )));
    }
    store.append_messages(key, msgs).await.unwrap();
}

// ============================================================================
// Compaction
// ============================================================================

#[tokio::test]
async fn test_sixty_pairs_compact_to_four_messages() {
    let store = Arc::new(SessionManager::new_memory());
    seed_pairs(&store, "telegram:1", 60).await;
    let provider = Arc::new(MockProvider::new("The user sent sixty numbered messages."));
    let controller = Arc::new(CompactionController::new(
        store.clone(),
        provider.clone(),
        compaction_config(),
        1000,
    ));

    let trigger = controller.maybe_compact("telegram:1").await.unwrap();
    assert_eq!(trigger, CompactionTrigger::Scheduled);
    controller.shutdown().await;

    let history = store.get_history("telegram:1").await.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].content, "User message number 58 with a bit of padding text");
    let summary = store.get_summary("telegram:1").await.unwrap().unwrap();
    assert!(!summary.is_empty());
    assert_eq!(provider.summary_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_compactions_are_exclusive() {
    let store = Arc::new(SessionManager::new_memory());
    seed_pairs(&store, "discord:7", 60).await;
    let provider = Arc::new(MockProvider::with_delay(
        "A summary.",
        Duration::from_millis(100),
    ));
    let controller = Arc::new(CompactionController::new(
        store.clone(),
        provider.clone(),
        compaction_config(),
        1000,
    ));

    let (a, b) = tokio::join!(
        controller.maybe_compact("discord:7"),
        controller.maybe_compact("discord:7")
    );
    let mut triggers = vec![a.unwrap(), b.unwrap()];
    triggers.sort_by_key(|t| *t == CompactionTrigger::AlreadyRunning);
    assert_eq!(
        triggers,
        vec![CompactionTrigger::Scheduled, CompactionTrigger::AlreadyRunning]
    );
    controller.shutdown().await;

    assert_eq!(provider.summary_calls.load(Ordering::SeqCst), 1);
    let session = store.get("discord:7").await.unwrap().unwrap();
    assert_eq!(session.compaction_count, 1);
    assert_eq!(session.messages.len(), 4);
}

#[tokio::test]
async fn test_waiting_compactions_do_not_repeat_work() {
    let store = Arc::new(SessionManager::new_memory());
    seed_pairs(&store, "lark:3", 60).await;
    let provider = Arc::new(MockProvider::with_delay(
        "A summary.",
        Duration::from_millis(50),
    ));
    let controller = CompactionController::new(
        store.clone(),
        provider.clone(),
        compaction_config(),
        1000,
    );

    let (a, b) = tokio::join!(
        controller.compact_now("lark:3"),
        controller.compact_now("lark:3")
    );
    let outcomes = [a.unwrap(), b.unwrap()];
    assert!(outcomes.contains(&CompactionOutcome::NothingToCompact));
    assert_eq!(provider.summary_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.get("lark:3").await.unwrap().unwrap().compaction_count, 1);
}

#[tokio::test]
async fn test_failed_compaction_leaves_session_and_can_retry() {
    let store = Arc::new(SessionManager::new_memory());
    seed_pairs(&store, "zalo:9", 60).await;
    let down = Arc::new(CompactionController::new(
        store.clone(),
        Arc::new(DownProvider),
        compaction_config(),
        1000,
    ));

    assert_eq!(
        down.maybe_compact("zalo:9").await.unwrap(),
        CompactionTrigger::Scheduled
    );
    down.shutdown().await;
    assert_eq!(store.get_history("zalo:9").await.unwrap().len(), 120);
    assert!(store.get_summary("zalo:9").await.unwrap().is_none());

    let err = down.compact_now("zalo:9").await.unwrap_err();
    assert!(matches!(err, ConvoError::ProviderTyped(ref e) if e.is_retryable()));

    let healthy = CompactionController::new(
        store.clone(),
        Arc::new(MockProvider::new("Recovered summary.")),
        compaction_config(),
        1000,
    );
    assert!(matches!(
        healthy.compact_now("zalo:9").await.unwrap(),
        CompactionOutcome::Compacted { kept: 4, .. }
    ));
}

#[tokio::test]
async fn test_summary_is_seeded_with_previous_one() {
    let store = Arc::new(SessionManager::new_memory());
    seed_pairs(&store, "telegram:2", 60).await;
    store
        .set_summary("telegram:2", "Earlier: the user introduced themselves as Minh.")
        .await
        .unwrap();
    let provider = Arc::new(MockProvider::new("Minh sent many messages."));
    let controller = CompactionController::new(
        store.clone(),
        provider.clone(),
        compaction_config(),
        1000,
    );
    controller.compact_now("telegram:2").await.unwrap();

    let requests = provider.requests.lock().unwrap().clone();
    assert!(requests[0][1].content.contains("introduced themselves as Minh"));
    assert_eq!(
        store.get_summary("telegram:2").await.unwrap().as_deref(),
        Some("Minh sent many messages.")
    );
}

// ============================================================================
// Agent Loop
// ============================================================================

fn loop_config() -> Config {
    let mut config = Config::default();
    config.agents.defaults.context_window = 1000;
    config.compaction = compaction_config();
    config
}

#[tokio::test]
async fn test_long_conversation_compacts_and_carries_summary() {
    let store = Arc::new(SessionManager::new_memory());
    let provider = Arc::new(MockProvider::new("They counted upwards together."));
    let agent = AgentLoop::new(
        loop_config(),
        store.clone(),
        provider.clone(),
        Arc::new(MessageBus::new()),
    );

    for i in 0..40 {
        let msg = InboundMessage::new(
            "telegram",
            "u1",
            "c1",
            &format!("Message {} carrying enough words to fill up the context window", i),
        );
        let reply = agent.process_message(&msg).await.unwrap();
        assert!(matches!(reply, TurnReply::Text(_)));
        // Let background compactions make progress between turns
        tokio::task::yield_now().await;
    }
    agent.shutdown().await;

    let session = store.get("telegram:c1").await.unwrap().unwrap();
    assert!(session.compaction_count >= 1);
    assert_eq!(session.summary.as_deref(), Some("They counted upwards together."));
    assert!(session.messages.len() < 80);
    assert_eq!(session.messages[0].role, Role::User);

    // The next turn sees the summary framed after the system prompt
    agent
        .process_message(&InboundMessage::new("telegram", "u1", "c1", "What did we do?"))
        .await
        .unwrap();
    let request = provider.last_chat_request();
    assert_eq!(request[0].role, Role::System);
    assert!(request[1]
        .content
        .starts_with("[Previous conversation summary]\nThey counted upwards together."));
    assert_eq!(request[2].role, Role::Assistant);
    assert_eq!(request.last().unwrap().content, "What did we do?");
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let store = Arc::new(SessionManager::new_memory());
    let provider = Arc::new(MockProvider::new("unused"));
    let agent = Arc::new(AgentLoop::new(
        Config::default(),
        store.clone(),
        provider.clone(),
        Arc::new(MessageBus::new()),
    ));

    let mut handles = Vec::new();
    for chat in 0..5 {
        let agent = Arc::clone(&agent);
        handles.push(tokio::spawn(async move {
            for turn in 0..3 {
                let msg = InboundMessage::new(
                    "discord",
                    "u",
                    &format!("chat{}", chat),
                    &format!("turn {}", turn),
                );
                agent.process_message(&msg).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for chat in 0..5 {
        let history = store
            .get_history(&format!("discord:chat{}", chat))
            .await
            .unwrap();
        assert_eq!(history.len(), 6);
        assert_eq!(history[4].content, "turn 2");
    }
    assert_eq!(provider.chat_calls.load(Ordering::SeqCst), 15);
}

#[tokio::test]
async fn test_bus_driven_turns() {
    let store = Arc::new(SessionManager::new_memory());
    let bus = Arc::new(MessageBus::new());
    let agent = Arc::new(AgentLoop::new(
        Config::default(),
        store.clone(),
        Arc::new(MockProvider::new("unused")),
        bus.clone(),
    ));

    let runner = Arc::clone(&agent);
    let handle = tokio::spawn(async move { runner.start().await });

    for i in 0..3 {
        bus.publish_inbound(InboundMessage::new("telegram", "u", "c", &format!("q{}", i)))
            .await
            .unwrap();
    }
    for i in 0..3 {
        let out = tokio::time::timeout(Duration::from_secs(1), bus.consume_outbound())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.content, format!("Reply number {}.", i));
    }

    agent.shutdown().await;
    tokio::time::timeout(Duration::from_millis(200), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(store.get_history("telegram:c").await.unwrap().len(), 6);
}

#[tokio::test]
async fn test_provider_failure_reported_on_bus() {
    let bus = Arc::new(MessageBus::new());
    let store = Arc::new(SessionManager::new_memory());
    let agent = Arc::new(AgentLoop::new(
        Config::default(),
        store.clone(),
        Arc::new(DownProvider),
        bus.clone(),
    ));
    let runner = Arc::clone(&agent);
    let handle = tokio::spawn(async move { runner.start().await });

    bus.publish_inbound(InboundMessage::new("telegram", "u", "c", "hello"))
        .await
        .unwrap();
    let out = tokio::time::timeout(Duration::from_secs(1), bus.consume_outbound())
        .await
        .unwrap()
        .unwrap();
    assert!(out.content.starts_with("Error:"));
    assert!(store.get_history("telegram:c").await.unwrap().is_empty());

    agent.stop();
    let _ = tokio::time::timeout(Duration::from_millis(200), handle).await;
}
