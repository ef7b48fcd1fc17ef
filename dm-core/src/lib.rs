//! Text adventure engine with an AI Dungeon Master.
//!
//! This crate provides:
//! - Character creation from race, class and setting selections
//! - A conversation log with windowing for bounded prompts
//! - Live narration through a chat-completion API, with a simulated
//!   fallback that never fails
//! - A bounded story log of past turns
//! - Versioned session persistence
//!
//! # Quick Start
//!
//! ```ignore
//! use dm_core::{GameConfig, GameSession, SessionStore, Setting};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GameConfig::load("dm.toml")?;
//!     let store = SessionStore::file(&config.save_dir);
//!     let mut session = GameSession::open(config, store).await;
//!
//!     session.select_race("Elf");
//!     session.select_class("Mage");
//!     session.select_setting(Setting::Dark);
//!     let opening = session.start_adventure("Kira", "").await?;
//!     println!("{}", opening.text);
//!
//!     if let Some(reply) = session.submit_action("I examine the altar").await? {
//!         println!("{}", reply.text);
//!     }
//!
//!     session.flush().await;
//!     Ok(())
//! }
//! ```

pub mod character;
pub mod config;
pub mod conversation;
pub mod prompts;
pub mod provider;
pub mod session;
pub mod store;
pub mod story;
pub mod testing;

// Primary public API
pub use character::{CharacterProfile, SelectedOptions, Setting, SettingChoice, ValidationError};
pub use config::{ConfigError, Credential, GameConfig};
pub use conversation::{ConversationLog, Message, Role};
pub use provider::{LiveProvider, Mode, NarrativeProvider, ProviderError, SimulatedProvider};
pub use session::{CharacterStatus, GameSession, Narration, Screen, SessionError, SessionState};
pub use store::{SessionStore, StorageError};
pub use story::{StoryEvent, StoryLog};
pub use testing::{FailingProvider, ScriptedProvider, TestHarness};
