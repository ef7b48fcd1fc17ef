//! Testing utilities for game sessions.
//!
//! This module provides tools for integration testing:
//! - `ScriptedProvider` for deterministic "live" narration without API calls
//! - `FailingProvider` for exercising the simulated fallback
//! - `TestHarness` for scripted game scenarios over an in-memory store
//! - Assertion helpers for verifying session state

use crate::character::Setting;
use crate::config::{Credential, GameConfig};
use crate::conversation::Role;
use crate::provider::{Mode, NarrativeProvider, NarrativeRequest, ProviderError};
use crate::session::{GameSession, Narration, Screen};
use crate::store::{MemoryBackend, SessionStore};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Credential used by harness sessions that need live mode.
pub const TEST_CREDENTIAL: &str = "sk-test";

/// Call counters shared between a provider and the test that owns it.
#[derive(Debug, Default)]
pub struct ProviderLog {
    calls: AtomicUsize,
    last_len: AtomicUsize,
    last_role: Mutex<Option<Role>>,
}

impl ProviderLog {
    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Conversation length seen by the most recent call.
    pub fn last_conversation_len(&self) -> usize {
        self.last_len.load(Ordering::SeqCst)
    }

    /// Role of the final message in the most recent call.
    pub fn last_role(&self) -> Option<Role> {
        *self
            .last_role
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, request: &NarrativeRequest<'_>) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_len
            .store(request.conversation.len(), Ordering::SeqCst);
        *self
            .last_role
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) =
            request.conversation.last().map(|m| m.role);
    }
}

/// A provider that returns scripted responses in order.
///
/// Once the script runs out it answers with a fixed line.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<String>>,
    log: Arc<ProviderLog>,
}

impl ScriptedProvider {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            log: Arc::new(ProviderLog::default()),
        }
    }

    /// Handle for inspecting calls after the provider is boxed.
    pub fn log(&self) -> Arc<ProviderLog> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl NarrativeProvider for ScriptedProvider {
    async fn generate(&self, request: NarrativeRequest<'_>) -> Result<String, ProviderError> {
        self.log.record(&request);
        let next = self
            .responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        Ok(next.unwrap_or_else(|| "The DM has no more scripted responses.".to_string()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// A provider that always fails, optionally after a delay.
pub struct FailingProvider {
    reason: String,
    delay: Duration,
    log: Arc<ProviderLog>,
}

impl FailingProvider {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            delay: Duration::ZERO,
            log: Arc::new(ProviderLog::default()),
        }
    }

    /// Stall this long before failing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn log(&self) -> Arc<ProviderLog> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl NarrativeProvider for FailingProvider {
    async fn generate(&self, request: NarrativeRequest<'_>) -> Result<String, ProviderError> {
        self.log.record(&request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Err(ProviderError::new(self.reason.clone()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Configuration with no artificial delays.
pub fn fast_config() -> GameConfig {
    GameConfig::default().with_simulated_latency(Duration::ZERO)
}

/// Test harness for running session scenarios.
pub struct TestHarness {
    /// The session under test.
    pub session: GameSession,
    /// Backend behind the session's store.
    pub backend: Arc<MemoryBackend>,
}

impl TestHarness {
    /// A demo-mode session over a fresh in-memory store.
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: GameConfig) -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let session = GameSession::new(config, SessionStore::new(backend.clone()));
        Self { session, backend }
    }

    /// A live-mode session whose live provider is `provider`.
    pub fn live(provider: impl NarrativeProvider + 'static) -> Self {
        Self::live_with_config(fast_config(), provider)
    }

    pub fn live_with_config(config: GameConfig, provider: impl NarrativeProvider + 'static) -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let credential = Credential::parse(TEST_CREDENTIAL).expect("test credential is valid");
        let session = GameSession::new(config, SessionStore::new(backend.clone()))
            .with_credential(credential)
            .with_live_provider(Box::new(provider));
        Self { session, backend }
    }

    /// A fresh session over the same backend, as after a page reload.
    pub fn reopen(&self) -> GameSession {
        let store = SessionStore::new(self.backend.clone());
        GameSession::new(self.session.config().clone(), store)
    }

    /// Select race, class and setting.
    pub fn choose(&mut self, race: &str, class: &str, setting: Setting) -> &mut Self {
        self.session.select_race(race);
        self.session.select_class(class);
        self.session.select_setting(setting);
        self
    }

    /// Create Kira the Elf Mage in the dark setting and narrate the opening.
    pub async fn start_kira(&mut self) -> Narration {
        self.choose("Elf", "Mage", Setting::Dark);
        self.session
            .start_adventure("Kira", "")
            .await
            .expect("complete selections start an adventure")
    }

    /// Play one non-blank action.
    pub async fn act(&mut self, action: &str) -> Narration {
        self.session
            .submit_action(action)
            .await
            .expect("session is in game")
            .expect("action is not blank")
    }

    /// Text of the most recent assistant message.
    pub fn last_narration(&self) -> Option<&str> {
        self.session
            .conversation()
            .last()
            .map(|m| m.content.as_str())
    }

    pub fn conversation_len(&self) -> usize {
        self.session.conversation().len()
    }

    /// Wait for queued saves to reach the backend.
    pub async fn settle(&self) {
        self.session.wait_for_saves().await;
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the session is playing at the given turn.
#[track_caller]
pub fn assert_turn(harness: &TestHarness, turn: u32) {
    assert_eq!(harness.session.screen(), Screen::InGame, "Expected to be in game");
    assert_eq!(
        harness.session.turn_count(),
        turn,
        "Expected turn {turn}, got {}",
        harness.session.turn_count()
    );
}

/// Assert where a narration came from.
#[track_caller]
pub fn assert_origin(narration: &Narration, origin: Mode, fell_back: bool) {
    assert_eq!(
        (narration.origin, narration.fell_back),
        (origin, fell_back),
        "Expected {origin} narration (fell_back = {fell_back}), got {} (fell_back = {})",
        narration.origin,
        narration.fell_back
    );
}
