//! GameSession - the primary public API for playing an adventure.
//!
//! The session owns all mutable game state. Providers and the store only
//! ever see read-only views or clones of it.

use crate::character::{
    CharacterProfile, SelectedOptions, Setting, SettingChoice, ValidationError,
};
use crate::config::{ConfigError, Credential, GameConfig};
use crate::conversation::{ConversationLog, Message};
use crate::prompts::{action_prompt, opening_prompt, DM_SYSTEM_PROMPT};
use crate::provider::{LiveProvider, Mode, NarrativeProvider, NarrativeRequest, SimulatedProvider};
use crate::store::{SaveQueue, SessionStore};
use crate::story::{StoryEvent, StoryLog};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors from GameSession operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No adventure in progress")]
    NotInGame,

    #[error("An adventure is already in progress")]
    AlreadyInGame,
}

/// Which screen the session is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    CharacterCreation,
    InGame,
}

/// Everything that is saved and restored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub character: CharacterProfile,
    pub conversation: ConversationLog,
    pub turn_count: u32,
    pub mode: Mode,
    /// What happened so far, for the player only.
    #[serde(default)]
    pub story: StoryLog,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// One piece of Dungeon Master narration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Narration {
    pub text: String,
    /// Provider that actually produced the text.
    pub origin: Mode,
    /// The live provider failed and the simulated one stood in.
    pub fell_back: bool,
}

/// Character sheet summary for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterStatus {
    pub name: String,
    pub race: String,
    pub class: String,
    pub level: u32,
    pub health: u8,
    pub mana: u8,
    pub turn: u32,
    pub location: String,
    pub backstory: String,
}

impl fmt::Display for CharacterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Name: {}", self.name)?;
        writeln!(f, "Race: {}", self.race)?;
        writeln!(f, "Class: {}", self.class)?;
        writeln!(f, "Level: {}", self.level)?;
        writeln!(f, "Health: {}/100", self.health)?;
        writeln!(f, "Mana: {}/100", self.mana)?;
        writeln!(f, "Turn: {}", self.turn)?;
        writeln!(f, "Location: {}", self.location)?;
        write!(f, "\n{}", self.backstory)
    }
}

/// An interactive-fiction session.
///
/// Turn methods take `&mut self`, so only one turn can be in flight at a
/// time. Saves go through a [`SaveQueue`] and never delay a turn.
pub struct GameSession {
    config: GameConfig,
    store: SessionStore,
    writer: SaveQueue,
    screen: Screen,
    state: SessionState,
    selections: SelectedOptions,
    credential: Option<Credential>,
    live: Option<Box<dyn NarrativeProvider>>,
    simulated: SimulatedProvider,
}

impl GameSession {
    /// Create a session in demo mode with no credential.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: GameConfig, store: SessionStore) -> Self {
        let simulated = SimulatedProvider::new().with_latency(config.simulated_latency());
        let writer = SaveQueue::spawn(store.clone());
        Self {
            config,
            store,
            writer,
            screen: Screen::CharacterCreation,
            state: SessionState::default(),
            selections: SelectedOptions::default(),
            credential: None,
            live: None,
            simulated,
        }
    }

    /// Create a session from whatever the store remembers.
    ///
    /// A stored API key wins over OPENAI_API_KEY; with either one the
    /// session starts in live mode. Pending selections are restored too.
    pub async fn open(config: GameConfig, store: SessionStore) -> Self {
        let credential = match store.load_credential().await {
            Some(credential) => Some(credential),
            None => Credential::from_env(),
        };
        let selections = store.load_selections().await.unwrap_or_default();

        let mut session = Self::new(config, store);
        session.selections = selections;
        if let Some(credential) = credential {
            session = session.with_credential(credential);
        }
        log::info!("Session opened in {} mode", session.state.mode);
        session
    }

    /// Use this credential for the live provider and switch to live mode.
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.live = Some(Box::new(LiveProvider::new(&credential, &self.config)));
        self.credential = Some(credential);
        self.state.mode = Mode::Live;
        self
    }

    /// Replace the live provider (the credential requirement still applies).
    pub fn with_live_provider(mut self, provider: Box<dyn NarrativeProvider>) -> Self {
        self.live = Some(provider);
        self
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn character(&self) -> &CharacterProfile {
        &self.state.character
    }

    pub fn conversation(&self) -> &ConversationLog {
        &self.state.conversation
    }

    pub fn turn_count(&self) -> u32 {
        self.state.turn_count
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    pub fn story(&self) -> &StoryLog {
        &self.state.story
    }

    pub fn location(&self) -> Option<&str> {
        self.state.location.as_deref()
    }

    pub fn selections(&self) -> &SelectedOptions {
        &self.selections
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    // ------------------------------------------------------------------
    // Character creation
    // ------------------------------------------------------------------

    pub fn select_race(&mut self, race: impl Into<String>) {
        self.selections.race = Some(race.into());
        self.persist_selections();
    }

    pub fn select_class(&mut self, class: impl Into<String>) {
        self.selections.class = Some(class.into());
        self.persist_selections();
    }

    pub fn select_setting(&mut self, setting: Setting) {
        self.selections.setting = Some(setting.into());
        self.persist_selections();
    }

    pub fn select_custom_setting(&mut self, description: impl Into<String>) {
        self.selections.setting = Some(SettingChoice::custom(description));
        self.persist_selections();
    }

    fn persist_selections(&self) {
        self.writer.save_selections(self.selections.clone());
    }

    /// Create the character and narrate the opening scene.
    ///
    /// Nothing changes if validation fails.
    pub async fn start_adventure(
        &mut self,
        name: &str,
        backstory: &str,
    ) -> Result<Narration, SessionError> {
        if self.screen == Screen::InGame {
            return Err(SessionError::AlreadyInGame);
        }
        let character = CharacterProfile::create(name, backstory, &self.selections)?;

        let mut conversation = ConversationLog::new();
        conversation.append(Message::system(DM_SYSTEM_PROMPT));
        conversation.append(Message::user(opening_prompt(&character)));

        let mode = self.state.mode;
        let narration = self
            .narrate(
                mode,
                NarrativeRequest::opening(&character, conversation.messages()),
            )
            .await;
        conversation.append(Message::assistant(&narration.text, narration.origin));

        log::info!(
            "Adventure started for {} ({} mode)",
            character.headline(),
            mode
        );

        self.state = SessionState {
            character,
            conversation,
            turn_count: 0,
            mode,
            story: StoryLog::new(),
            location: None,
        };
        self.screen = Screen::InGame;
        self.selections = SelectedOptions::default();
        self.persist_selections();

        Ok(narration)
    }

    // ------------------------------------------------------------------
    // Play
    // ------------------------------------------------------------------

    /// Play one turn.
    ///
    /// Blank input is ignored and returns `Ok(None)`. Otherwise the action is
    /// logged, the turn counter advances, the reply is appended, and a save
    /// is started in the background.
    ///
    /// State is only committed once the reply is in. Dropping the future
    /// mid-turn leaves the session exactly as it was.
    pub async fn submit_action(&mut self, text: &str) -> Result<Option<Narration>, SessionError> {
        if self.screen != Screen::InGame {
            return Err(SessionError::NotInGame);
        }
        let action = text.trim();
        if action.is_empty() {
            return Ok(None);
        }

        let turn = self.state.turn_count + 1;
        let mut pending = self.state.conversation.clone();
        pending.append(Message::user(action_prompt(
            &self.state.character,
            turn,
            action,
        )));

        let window = pending.windowed(self.config.window);
        let narration = self
            .narrate(
                self.state.mode,
                NarrativeRequest::continuation(&self.state.character, &window, action),
            )
            .await;

        pending.append(Message::assistant(&narration.text, narration.origin));
        self.state.conversation = pending;
        self.state.turn_count = turn;
        self.state
            .story
            .record(StoryEvent::new(turn, action, &narration.text));
        self.save();

        Ok(Some(narration))
    }

    /// The single place where the mode picks a provider.
    ///
    /// Live failures and timeouts fall back to the simulated provider.
    async fn narrate(&self, mode: Mode, request: NarrativeRequest<'_>) -> Narration {
        let live = match mode {
            Mode::Live => self.live.as_deref(),
            Mode::Simulated => None,
        };

        if let Some(live) = live {
            let timeout = self.config.turn_timeout();
            match tokio::time::timeout(timeout, live.generate(request)).await {
                Ok(Ok(text)) => {
                    return Narration {
                        text,
                        origin: Mode::Live,
                        fell_back: false,
                    }
                }
                Ok(Err(e)) => {
                    log::warn!("{} provider failed, using simulated reply: {e}", live.name())
                }
                Err(_) => log::warn!(
                    "{} provider timed out after {timeout:?}, using simulated reply",
                    live.name()
                ),
            }
        } else if mode == Mode::Live {
            log::warn!("Live mode without a live provider, using simulated reply");
        }

        let text = match self.simulated.generate(request).await {
            Ok(text) => text,
            Err(_) => self.simulated.narrate(&request),
        };
        Narration {
            text,
            origin: Mode::Simulated,
            fell_back: mode == Mode::Live,
        }
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    /// Switch between live and demo narration.
    pub fn set_mode(&mut self, mode: Mode) -> Result<(), ConfigError> {
        if mode == Mode::Live && (self.credential.is_none() || self.live.is_none()) {
            return Err(ConfigError::MissingCredential);
        }
        if self.state.mode != mode {
            log::info!("Switching to {mode} mode");
            self.state.mode = mode;
            if self.screen == Screen::InGame {
                self.save();
            }
        }
        Ok(())
    }

    /// Set or clear the API key.
    ///
    /// A new key is validated and persisted and rebuilds the live provider.
    /// Clearing it forgets the key and leaves live mode.
    pub async fn set_credential(&mut self, raw: Option<&str>) -> Result<(), ConfigError> {
        match raw {
            Some(raw) => {
                let credential = Credential::parse(raw)?;
                self.store.save_credential(&credential).await;
                self.live = Some(Box::new(LiveProvider::new(&credential, &self.config)));
                self.credential = Some(credential);
                log::info!("API key updated");
            }
            None => {
                self.store.clear_credential().await;
                self.credential = None;
                self.live = None;
                log::info!("API key cleared");
                if self.state.mode == Mode::Live {
                    self.state.mode = Mode::Simulated;
                    if self.screen == Screen::InGame {
                        self.save();
                    }
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Queue a snapshot of the current state.
    pub fn save(&self) {
        self.writer.save(self.state.clone());
    }

    /// Periodic save: only once the adventure has made progress.
    /// Returns whether a save was queued.
    pub fn autosave(&self) -> bool {
        let due = self.screen == Screen::InGame && self.state.turn_count > 0;
        if due {
            self.save();
        }
        due
    }

    /// Wait for every queued write to land.
    pub async fn wait_for_saves(&self) {
        self.writer.flush().await;
    }

    /// Save and wait for it, e.g. before the process exits.
    pub async fn flush(&self) {
        self.autosave();
        self.wait_for_saves().await;
    }

    /// A saved adventure that could be resumed. In-memory state is untouched.
    pub async fn saved_session(&self) -> Option<SessionState> {
        self.store.load().await
    }

    /// Replace the current state with a restored one.
    ///
    /// Call only after the player confirmed. A live-mode snapshot resumes in
    /// demo mode when no API key is available.
    pub fn resume(&mut self, mut state: SessionState) {
        if state.mode == Mode::Live && self.live.is_none() {
            log::warn!("Restored session was live but no API key is set, using demo mode");
            state.mode = Mode::Simulated;
        }
        log::info!(
            "Resumed adventure of {} at turn {}",
            state.character.name,
            state.turn_count
        );
        self.state = state;
        self.selections = SelectedOptions::default();
        self.screen = Screen::InGame;
    }

    /// Abandon the adventure and go back to character creation.
    ///
    /// Call only after the player confirmed. The saved snapshot is removed so
    /// it is not offered for restore later.
    pub fn new_game(&mut self) {
        let mode = self.state.mode;
        self.state = SessionState {
            mode,
            ..SessionState::default()
        };
        self.selections = SelectedOptions::default();
        self.screen = Screen::CharacterCreation;
        log::info!("Started a new game");
        self.writer.clear();
    }

    /// Record where the character is now.
    pub fn set_location(&mut self, name: &str) -> Result<(), SessionError> {
        if self.screen != Screen::InGame {
            return Err(SessionError::NotInGame);
        }
        let name = name.trim();
        self.state.location = (!name.is_empty()).then(|| name.to_string());
        self.save();
        Ok(())
    }

    pub fn status(&self) -> CharacterStatus {
        let c = &self.state.character;
        CharacterStatus {
            name: c.name.clone(),
            race: c.race.clone(),
            class: c.class.clone(),
            level: c.level,
            health: c.health,
            mana: c.mana,
            turn: self.state.turn_count,
            location: self.location().unwrap_or("Unknown").to_string(),
            backstory: c.backstory.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;

    fn session() -> GameSession {
        let config = GameConfig::default().with_simulated_latency(std::time::Duration::ZERO);
        GameSession::new(config, SessionStore::in_memory())
    }

    fn select_kira(session: &mut GameSession) {
        session.select_race("Elf");
        session.select_class("Mage");
        session.select_setting(Setting::Dark);
    }

    #[tokio::test]
    async fn test_start_requires_fields() {
        let mut session = session();
        let err = session.start_adventure("Kira", "").await.unwrap_err();
        match err {
            SessionError::Validation(v) => assert_eq!(v.missing.len(), 3),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(session.screen(), Screen::CharacterCreation);
        assert!(session.conversation().is_empty());
    }

    #[tokio::test]
    async fn test_opening_builds_scaffolding() {
        let mut session = session();
        select_kira(&mut session);
        let narration = session.start_adventure("Kira", "").await.unwrap();

        assert_eq!(narration.origin, Mode::Simulated);
        assert!(!narration.fell_back);
        let roles: Vec<_> = session.conversation().messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(session.turn_count(), 0);
        assert!(session.selections().is_empty());
    }

    #[tokio::test]
    async fn test_cannot_start_twice() {
        let mut session = session();
        select_kira(&mut session);
        session.start_adventure("Kira", "").await.unwrap();
        select_kira(&mut session);
        assert!(matches!(
            session.start_adventure("Kira", "").await,
            Err(SessionError::AlreadyInGame)
        ));
    }

    #[tokio::test]
    async fn test_submit_before_start() {
        let mut session = session();
        assert!(matches!(
            session.submit_action("look").await,
            Err(SessionError::NotInGame)
        ));
    }

    #[tokio::test]
    async fn test_live_mode_needs_credential() {
        let mut session = session();
        assert!(matches!(
            session.set_mode(Mode::Live),
            Err(ConfigError::MissingCredential)
        ));
        assert_eq!(session.mode(), Mode::Simulated);

        assert!(matches!(
            session.set_credential(Some("bogus")).await,
            Err(ConfigError::InvalidCredential)
        ));
        session.set_credential(Some("sk-test")).await.unwrap();
        session.set_mode(Mode::Live).unwrap();
        assert_eq!(session.mode(), Mode::Live);

        session.set_credential(None).await.unwrap();
        assert_eq!(session.mode(), Mode::Simulated);
        assert!(!session.has_credential());
    }

    #[tokio::test]
    async fn test_selections_persist_in_order() {
        let mut session = session();
        select_kira(&mut session);
        session.select_custom_setting("A floating city");
        session.wait_for_saves().await;

        let stored = session.store().load_selections().await.unwrap();
        assert_eq!(stored.race.as_deref(), Some("Elf"));
        assert_eq!(stored.setting, Some(SettingChoice::custom("A floating city")));
    }

    #[tokio::test]
    async fn test_new_game_discards_save() {
        let mut session = session();
        select_kira(&mut session);
        session.start_adventure("Kira", "").await.unwrap();
        session.submit_action("look around").await.unwrap();
        session.new_game();
        session.wait_for_saves().await;

        assert_eq!(session.screen(), Screen::CharacterCreation);
        assert_eq!(session.turn_count(), 0);
        assert!(session.saved_session().await.is_none());
    }

    #[tokio::test]
    async fn test_status() {
        let mut session = session();
        select_kira(&mut session);
        session.start_adventure("Kira", "Raised by wolves").await.unwrap();
        let status = session.status();
        assert_eq!(status.name, "Kira");
        assert_eq!(status.health, 100);
        let text = status.to_string();
        assert!(text.contains("Health: 100/100"));
        assert!(text.contains("Location: Unknown"));
        assert!(text.ends_with("Raised by wolves"));

        session.set_location("The Sunken Crypt").unwrap();
        assert!(session.status().to_string().contains("Location: The Sunken Crypt"));
        session.set_location("  ").unwrap();
        assert_eq!(session.status().location, "Unknown");
    }

    #[tokio::test]
    async fn test_set_location_needs_adventure() {
        let mut session = session();
        assert!(matches!(
            session.set_location("Town"),
            Err(SessionError::NotInGame)
        ));
    }

    #[tokio::test]
    async fn test_turns_are_recorded_in_story() {
        let mut session = session();
        select_kira(&mut session);
        session.start_adventure("Kira", "").await.unwrap();
        assert!(session.story().is_empty());

        let reply = session.submit_action("  open the door ").await.unwrap().unwrap();
        session.submit_action("   ").await.unwrap();
        assert_eq!(session.story().len(), 1);
        let event = session.story().last().unwrap();
        assert_eq!(event.turn, 1);
        assert_eq!(event.action, "open the door");
        assert!(reply.text.starts_with(event.result.trim_end_matches("...")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_turn_changes_nothing() {
        let config = GameConfig::default()
            .with_simulated_latency(std::time::Duration::ZERO)
            .with_turn_timeout(std::time::Duration::from_secs(600));
        let mut session = GameSession::new(config, SessionStore::in_memory())
            .with_credential(Credential::parse("sk-test").unwrap())
            .with_live_provider(Box::new(
                crate::testing::FailingProvider::new("slow")
                    .with_delay(std::time::Duration::from_secs(300)),
            ));
        select_kira(&mut session);
        session.start_adventure("Kira", "").await.unwrap();
        let before = session.state().clone();

        let cancelled = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            session.submit_action("cross the bridge"),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(session.state(), &before);
        assert_eq!(session.turn_count(), 0);
        assert_eq!(session.conversation().len(), 3);
        assert!(session.story().is_empty());
    }
}
