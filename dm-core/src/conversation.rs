//! Conversation log and context windowing.
//!
//! The log is the prompt history sent to the model. It is append-only; the
//! only way older turns leave a prompt is through [`ConversationLog::windowed`],
//! which never modifies the stored log itself.

use crate::provider::Mode;
use serde::{Deserialize, Serialize};

/// Largest log that is sent to the model unwindowed.
pub const DEFAULT_WINDOW: usize = 20;

/// Number of leading messages (system prompt + opening request) that are
/// prompt scaffolding rather than story.
const SCAFFOLD_LEN: usize = 2;

/// The role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Which provider produced an assistant message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Mode>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            origin: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            origin: None,
        }
    }

    pub fn assistant(content: impl Into<String>, origin: Mode) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            origin: Some(origin),
        }
    }
}

impl From<&Message> for openai::Message {
    fn from(message: &Message) -> Self {
        match message.role {
            Role::System => openai::Message::system(&message.content),
            Role::User => openai::Message::user(&message.content),
            Role::Assistant => openai::Message::assistant(&message.content),
        }
    }
}

/// Ordered, role-tagged prompt history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationLog {
    messages: Vec<Message>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to the end of the log.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn first(&self) -> Option<&Message> {
        self.messages.first()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The prompt view of the log.
    ///
    /// Logs of at most `max_messages` entries (or fewer than two) are returned
    /// whole. Longer logs keep the first message (the system prompt) followed
    /// by the most recent `max_messages - 2` messages, and never fewer than
    /// one, so the latest player action always survives.
    pub fn windowed(&self, max_messages: usize) -> Vec<Message> {
        let len = self.messages.len();
        if len < 2 || len <= max_messages {
            return self.messages.clone();
        }

        let keep = max_messages.saturating_sub(2).max(1);
        let mut window = Vec::with_capacity(keep + 1);
        window.push(self.messages[0].clone());
        window.extend_from_slice(&self.messages[len - keep..]);

        log::debug!(
            "Windowed conversation from {len} to {} messages",
            window.len()
        );
        window
    }

    /// Story messages for display, skipping the prompt scaffolding.
    pub fn transcript(&self) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .skip(SCAFFOLD_LEN)
            .filter(|m| m.role != Role::System)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl FromIterator<Message> for ConversationLog {
    fn from_iter<I: IntoIterator<Item = Message>>(iter: I) -> Self {
        Self {
            messages: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_of(len: usize) -> ConversationLog {
        (0..len)
            .map(|i| match i {
                0 => Message::system("You are a Dungeon Master"),
                i if i % 2 == 1 => Message::user(format!("action {i}")),
                i => Message::assistant(format!("reply {i}"), Mode::Simulated),
            })
            .collect()
    }

    #[test]
    fn test_append_preserves_order() {
        let mut log = ConversationLog::new();
        log.append(Message::system("sys"));
        log.append(Message::user("hello"));
        assert_eq!(log.len(), 2);
        assert_eq!(log.first().unwrap().role, Role::System);
        assert_eq!(log.last().unwrap().content, "hello");
    }

    #[test]
    fn test_short_logs_are_not_windowed() {
        for len in [0, 1, 2, 19, 20] {
            let log = log_of(len);
            assert_eq!(log.windowed(DEFAULT_WINDOW), log.messages(), "len {len}");
        }
    }

    #[test]
    fn test_long_logs_keep_system_prompt_and_tail() {
        for len in [21, 22, 35, 100] {
            let log = log_of(len);
            let window = log.windowed(DEFAULT_WINDOW);
            assert!(window.len() <= 19, "len {len}");
            assert_eq!(window.len(), 19);
            assert_eq!(&window[0], log.first().unwrap());
            assert_eq!(window.last(), log.last());
            assert_eq!(&window[1..], &log.messages()[len - 18..]);
        }
    }

    #[test]
    fn test_opening_request_is_dropped_once_windowed() {
        let log = log_of(21);
        let window = log.windowed(DEFAULT_WINDOW);
        assert!(!window.contains(&log.messages()[1]));
    }

    #[test]
    fn test_tiny_window_keeps_latest_message() {
        let log = log_of(6);
        for max in [0, 1, 2] {
            let window = log.windowed(max);
            assert_eq!(
                window,
                vec![log.messages()[0].clone(), log.messages()[5].clone()],
                "max {max}"
            );
            assert_eq!(window.last().unwrap().role, Role::User);
        }
        assert_eq!(log.windowed(3).len(), 2);
    }

    #[test]
    fn test_transcript_skips_scaffolding() {
        let log = log_of(5);
        let contents: Vec<_> = log.transcript().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["reply 2", "action 3", "reply 4"]);
    }

    #[test]
    fn test_origin_not_serialized_for_user_messages() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);

        let json = serde_json::to_string(&Message::assistant("ok", Mode::Live)).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"ok","origin":"live"}"#);
    }
}
