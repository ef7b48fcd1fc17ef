//! Story memory: a short, bounded record of what happened each turn.
//!
//! The story log is for the player (`#story`, the status screen). It is
//! persisted with the session but never sent to a provider.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Events kept in the log. Older events are dropped first.
pub const STORY_CAPACITY: usize = 20;

/// Events shown by [`StoryLog::so_far`].
pub const STORY_RECENT: usize = 10;

const ACTION_CHARS: usize = 100;
const RESULT_CHARS: usize = 300;

/// One turn's action and its outcome, both truncated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryEvent {
    pub turn: u32,
    pub action: String,
    pub result: String,
}

impl StoryEvent {
    pub fn new(turn: u32, action: &str, result: &str) -> Self {
        Self {
            turn,
            action: truncate(action.trim(), ACTION_CHARS),
            result: truncate(result.trim(), RESULT_CHARS),
        }
    }
}

impl fmt::Display for StoryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Turn {}: Player chose '{}'. Result: {}",
            self.turn, self.action, self.result
        )
    }
}

/// Bounded story memory, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoryLog {
    events: VecDeque<StoryEvent>,
}

impl StoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a turn, evicting the oldest event when full.
    pub fn record(&mut self, event: StoryEvent) {
        self.events.push_back(event);
        while self.events.len() > STORY_CAPACITY {
            self.events.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last(&self) -> Option<&StoryEvent> {
        self.events.back()
    }

    /// The most recent `n` events, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &StoryEvent> {
        self.events.iter().skip(self.events.len().saturating_sub(n))
    }

    /// A readable summary of the last few turns.
    pub fn so_far(&self) -> String {
        if self.events.is_empty() {
            return "The adventure has just begun...".to_string();
        }
        self.recent(STORY_RECENT)
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Cut `text` to at most `max` characters, marking the cut with "...".
fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
