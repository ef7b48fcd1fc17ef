//! Narrative response providers.
//!
//! A provider turns a conversation (and, after the opening, the player's
//! latest action) into the Dungeon Master's next piece of narration. Two
//! implementations exist: [`LiveProvider`] calls the hosted chat API, and
//! [`SimulatedProvider`] answers from canned templates without any network.

mod live;
mod simulated;

pub use live::LiveProvider;
pub use simulated::{classify_action, ActionKind, SimulatedProvider, ACTION_RULES};

use crate::character::CharacterProfile;
use crate::conversation::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Where narration comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The hosted chat-completion API.
    Live,
    /// Offline canned templates ("demo mode").
    #[default]
    Simulated,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Live => f.write_str("live"),
            Mode::Simulated => f.write_str("demo"),
        }
    }
}

/// A provider could not produce narration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("provider failed: {reason}")]
pub struct ProviderError {
    pub reason: String,
}

impl ProviderError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<openai::Error> for ProviderError {
    fn from(err: openai::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// What kind of narration is being asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind<'a> {
    /// The first scene of the adventure.
    Opening,
    /// A reply to the player's latest action.
    Continuation { action: &'a str },
}

/// Read-only view of everything a provider may look at.
#[derive(Debug, Clone, Copy)]
pub struct NarrativeRequest<'a> {
    pub character: &'a CharacterProfile,
    /// Messages to submit, already windowed and ending with the latest
    /// user message.
    pub conversation: &'a [Message],
    pub kind: RequestKind<'a>,
}

impl<'a> NarrativeRequest<'a> {
    pub fn opening(character: &'a CharacterProfile, conversation: &'a [Message]) -> Self {
        Self {
            character,
            conversation,
            kind: RequestKind::Opening,
        }
    }

    pub fn continuation(
        character: &'a CharacterProfile,
        conversation: &'a [Message],
        action: &'a str,
    ) -> Self {
        Self {
            character,
            conversation,
            kind: RequestKind::Continuation { action },
        }
    }
}

/// Core trait for narration sources.
#[async_trait]
pub trait NarrativeProvider: Send + Sync {
    /// Produce the next piece of narration.
    async fn generate(&self, request: NarrativeRequest<'_>) -> Result<String, ProviderError>;

    /// Provider name for logs.
    fn name(&self) -> &str;
}
