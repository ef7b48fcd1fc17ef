//! Session persistence.
//!
//! State lives in named slots of a [`StorageBackend`]. Each slot holds one
//! JSON document that is overwritten wholesale on save and read wholesale on
//! load. Failures here are never surfaced to the player: they are logged and
//! treated as "nothing saved".

use crate::character::SelectedOptions;
use crate::config::Credential;
use crate::session::SessionState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::fs;
use tokio::sync::{mpsc, oneshot};

/// Slot holding the session snapshot.
pub const SESSION_SLOT: &str = "game_state";
/// Slot holding the pre-game selections.
pub const SELECTIONS_SLOT: &str = "selected_options";
/// Slot holding the API key.
pub const CREDENTIAL_SLOT: &str = "openai_api_key";

/// Current snapshot format version.
const SAVE_VERSION: u32 = 1;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// A key-value store of whole documents.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read a slot; `Ok(None)` when it was never written.
    async fn read(&self, slot: &str) -> Result<Option<String>, StorageError>;

    /// Replace a slot's contents.
    async fn write(&self, slot: &str, contents: &str) -> Result<(), StorageError>;

    /// Delete a slot. Removing an empty slot is not an error.
    async fn remove(&self, slot: &str) -> Result<(), StorageError>;
}

/// One `<slot>.json` file per slot inside a directory.
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
    tmp_counter: AtomicU64,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, slot: &str) -> PathBuf {
        let sanitized: String = slot
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{sanitized}.json"))
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn read(&self, slot: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.slot_path(slot)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, slot: &str, contents: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).await?;

        // Write beside the target and rename, so a reader never sees half a document.
        let path = self.slot_path(slot);
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("json.{n}.tmp"));
        fs::write(&tmp, contents).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove(&self, slot: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.slot_path(slot)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process backend for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    slots: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Raw contents of a slot.
    pub fn get(&self, slot: &str) -> Option<String> {
        self.lock().get(slot).cloned()
    }

    /// Overwrite a slot directly, bypassing serialization.
    pub fn put(&self, slot: &str, contents: impl Into<String>) {
        self.lock().insert(slot.to_string(), contents.into());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("memory backend set to fail".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn read(&self, slot: &str) -> Result<Option<String>, StorageError> {
        self.check()?;
        Ok(self.get(slot))
    }

    async fn write(&self, slot: &str, contents: &str) -> Result<(), StorageError> {
        self.check()?;
        self.put(slot, contents);
        Ok(())
    }

    async fn remove(&self, slot: &str) -> Result<(), StorageError> {
        self.check()?;
        self.lock().remove(slot);
        Ok(())
    }
}

#[derive(Serialize)]
struct SnapshotOut<'a> {
    version: u32,
    saved_at: DateTime<Utc>,
    state: &'a SessionState,
}

/// A versioned session snapshot as stored in [`SESSION_SLOT`].
#[derive(Debug, Clone, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub state: SessionState,
}

/// Reads and writes game state through a backend.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn StorageBackend>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Store slots as files in `dir`.
    pub fn file(dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileBackend::new(dir)))
    }

    /// Store slots in memory only.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Save a snapshot, logging any failure.
    pub async fn save(&self, state: &SessionState) {
        match self.try_save(state).await {
            Ok(()) => log::debug!("Saved session at turn {}", state.turn_count),
            Err(e) => log::error!("Failed to save game state: {e}"),
        }
    }

    /// Save a snapshot, reporting failure to the caller.
    pub async fn try_save(&self, state: &SessionState) -> Result<(), StorageError> {
        let snapshot = SnapshotOut {
            version: SAVE_VERSION,
            saved_at: Utc::now(),
            state,
        };
        let contents = serde_json::to_string_pretty(&snapshot)?;
        self.backend.write(SESSION_SLOT, &contents).await
    }

    /// Load a snapshot worth resuming.
    ///
    /// Returns `None` when nothing was saved, the stored document is invalid
    /// or from another format version, or the session never got past its
    /// opening scene.
    pub async fn load(&self) -> Option<SessionState> {
        match self.try_load().await {
            Ok(Some(snapshot)) if snapshot.state.turn_count > 0 => Some(snapshot.state),
            Ok(Some(_)) => {
                log::debug!("Saved session has no progress, not offering restore");
                None
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("Failed to load game state: {e}");
                None
            }
        }
    }

    /// Load the raw snapshot, whatever its progress.
    pub async fn try_load(&self) -> Result<Option<Snapshot>, StorageError> {
        let Some(contents) = self.backend.read(SESSION_SLOT).await? else {
            return Ok(None);
        };

        #[derive(Deserialize)]
        struct Header {
            version: u32,
        }

        let header: Header = serde_json::from_str(&contents)?;
        if header.version != SAVE_VERSION {
            return Err(StorageError::VersionMismatch {
                expected: SAVE_VERSION,
                found: header.version,
            });
        }

        Ok(Some(serde_json::from_str(&contents)?))
    }

    pub async fn save_selections(&self, options: &SelectedOptions) {
        let result = match serde_json::to_string(options) {
            Ok(contents) => self.backend.write(SELECTIONS_SLOT, &contents).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            log::error!("Failed to save selected options: {e}");
        }
    }

    pub async fn load_selections(&self) -> Option<SelectedOptions> {
        self.read_json(SELECTIONS_SLOT).await
    }

    pub async fn save_credential(&self, credential: &Credential) {
        let result = match serde_json::to_string(credential.as_str()) {
            Ok(contents) => self.backend.write(CREDENTIAL_SLOT, &contents).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            log::error!("Failed to save API key: {e}");
        }
    }

    /// The stored API key, if present and well-formed.
    pub async fn load_credential(&self) -> Option<Credential> {
        let raw: String = self.read_json(CREDENTIAL_SLOT).await?;
        match Credential::parse(&raw) {
            Ok(credential) => Some(credential),
            Err(e) => {
                log::warn!("Ignoring stored API key: {e}");
                None
            }
        }
    }

    pub async fn clear_credential(&self) {
        if let Err(e) = self.backend.remove(CREDENTIAL_SLOT).await {
            log::error!("Failed to clear API key: {e}");
        }
    }

    /// Forget the saved session and selections. The API key is kept.
    pub async fn clear(&self) {
        for slot in [SESSION_SLOT, SELECTIONS_SLOT] {
            if let Err(e) = self.backend.remove(slot).await {
                log::error!("Failed to clear {slot}: {e}");
            }
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, slot: &str) -> Option<T> {
        let contents = match self.backend.read(slot).await {
            Ok(contents) => contents?,
            Err(e) => {
                log::warn!("Failed to read {slot}: {e}");
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("Discarding malformed {slot}: {e}");
                None
            }
        }
    }
}

enum WriteOp {
    Session(Box<SessionState>),
    Selections(SelectedOptions),
    Clear,
    Barrier(oneshot::Sender<()>),
}

/// Fire-and-forget writer.
///
/// Writes are queued to a single background task and applied in the order
/// they were queued, so an older snapshot can never land after a newer one
/// or after a clear. Queueing never blocks.
#[derive(Clone)]
pub struct SaveQueue {
    tx: mpsc::UnboundedSender<WriteOp>,
}

impl SaveQueue {
    /// Spawn the writer task. Must be called from within a tokio runtime.
    pub fn spawn(store: SessionStore) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                match op {
                    WriteOp::Session(state) => store.save(&state).await,
                    WriteOp::Selections(options) => store.save_selections(&options).await,
                    WriteOp::Clear => store.clear().await,
                    WriteOp::Barrier(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });
        Self { tx }
    }

    pub fn save(&self, state: SessionState) {
        self.send(WriteOp::Session(Box::new(state)));
    }

    pub fn save_selections(&self, options: SelectedOptions) {
        self.send(WriteOp::Selections(options));
    }

    pub fn clear(&self) {
        self.send(WriteOp::Clear);
    }

    /// Wait until everything queued so far has been written.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        self.send(WriteOp::Barrier(done));
        let _ = wait.await;
    }

    fn send(&self, op: WriteOp) {
        if self.tx.send(op).is_err() {
            log::error!("Save queue is closed, dropping write");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{CharacterProfile, Setting};
    use crate::conversation::{ConversationLog, Message};
    use crate::provider::Mode;
    use crate::story::StoryEvent;

    fn state(turn_count: u32) -> SessionState {
        let mut conversation = ConversationLog::new();
        conversation.append(Message::system("sys"));
        conversation.append(Message::user("begin"));
        conversation.append(Message::assistant("A dark night.", Mode::Simulated));
        SessionState {
            character: CharacterProfile {
                name: "Kira".to_string(),
                race: "Elf".to_string(),
                class: "Mage".to_string(),
                ..CharacterProfile::default()
            },
            conversation,
            turn_count,
            mode: Mode::Simulated,
            ..SessionState::default()
        }
    }

    fn memory_store() -> (SessionStore, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (SessionStore::new(backend.clone()), backend)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (store, _) = memory_store();
        let saved = state(3);
        store.save(&saved).await;
        assert_eq!(store.load().await, Some(saved));
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let (store, _) = memory_store();
        store.save(&state(1)).await;
        store.save(&state(2)).await;
        store.save(&state(2)).await;
        assert_eq!(store.load().await.unwrap().turn_count, 2);
    }

    #[tokio::test]
    async fn test_no_progress_is_not_restorable() {
        let (store, _) = memory_store();
        store.save(&state(0)).await;
        assert_eq!(store.load().await, None);
        assert!(store.try_load().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_fields_yield_none() {
        let (store, backend) = memory_store();
        backend.put(
            SESSION_SLOT,
            r#"{"version":1,"saved_at":"2024-01-01T00:00:00Z","state":{"turn_count":4,"mode":"live"}}"#,
        );
        assert_eq!(store.load().await, None);
    }

    #[tokio::test]
    async fn test_story_and_location_round_trip() {
        let (store, backend) = memory_store();
        let mut saved = state(2);
        saved.story.record(StoryEvent::new(1, "look", "Dust."));
        saved.story.record(StoryEvent::new(2, "wait", "Rain."));
        saved.location = Some("Harbor".to_string());
        store.save(&saved).await;
        assert_eq!(store.load().await, Some(saved));

        // Snapshots written before the story log existed still load.
        let mut value: serde_json::Value =
            serde_json::from_str(&backend.get(SESSION_SLOT).unwrap()).unwrap();
        let fields = value["state"].as_object_mut().unwrap();
        fields.remove("story");
        fields.remove("location");
        backend.put(SESSION_SLOT, value.to_string());
        let loaded = store.load().await.unwrap();
        assert!(loaded.story.is_empty());
        assert_eq!(loaded.location, None);
        assert_eq!(loaded.turn_count, 2);
    }

    #[tokio::test]
    async fn test_garbage_and_version_mismatch_yield_none() {
        let (store, backend) = memory_store();
        backend.put(SESSION_SLOT, "not json");
        assert_eq!(store.load().await, None);

        let mut value = serde_json::json!({
            "version": 99,
            "saved_at": "2024-01-01T00:00:00Z",
            "state": serde_json::to_value(state(2)).unwrap(),
        });
        backend.put(SESSION_SLOT, value.to_string());
        assert!(matches!(
            store.try_load().await,
            Err(StorageError::VersionMismatch { found: 99, .. })
        ));
        value["version"] = 1.into();
        backend.put(SESSION_SLOT, value.to_string());
        assert_eq!(store.load().await.unwrap().turn_count, 2);
    }

    #[tokio::test]
    async fn test_failing_backend_does_not_raise() {
        let (store, backend) = memory_store();
        backend.set_failing(true);
        store.save(&state(2)).await;
        store.save_selections(&SelectedOptions::default()).await;
        assert_eq!(store.load().await, None);
        backend.set_failing(false);
        assert_eq!(backend.get(SESSION_SLOT), None);
    }

    #[tokio::test]
    async fn test_queue_applies_writes_in_order() {
        let (store, backend) = memory_store();
        let queue = SaveQueue::spawn(store.clone());
        for turn in 1..=20 {
            queue.save(state(turn));
        }
        queue.flush().await;
        assert_eq!(store.load().await.unwrap().turn_count, 20);

        queue.save(state(21));
        queue.clear();
        queue.flush().await;
        assert!(backend.get(SESSION_SLOT).is_none());
    }

    #[tokio::test]
    async fn test_selections_and_credential_slots() {
        let (store, backend) = memory_store();
        let options = SelectedOptions {
            race: Some("Dwarf".to_string()),
            class: None,
            setting: Some(Setting::Pirate.into()),
        };
        store.save_selections(&options).await;
        assert_eq!(store.load_selections().await, Some(options));

        store
            .save_credential(&Credential::parse("sk-abc").unwrap())
            .await;
        assert_eq!(backend.get(CREDENTIAL_SLOT).as_deref(), Some("\"sk-abc\""));
        assert_eq!(store.load_credential().await.unwrap().as_str(), "sk-abc");

        backend.put(CREDENTIAL_SLOT, "\"not-a-key\"");
        assert!(store.load_credential().await.is_none());

        store.clear_credential().await;
        assert!(backend.get(CREDENTIAL_SLOT).is_none());
    }

    #[tokio::test]
    async fn test_clear_keeps_credential() {
        let (store, backend) = memory_store();
        store.save(&state(2)).await;
        store.save_selections(&SelectedOptions::default()).await;
        store
            .save_credential(&Credential::parse("sk-abc").unwrap())
            .await;

        store.clear().await;
        assert!(backend.get(SESSION_SLOT).is_none());
        assert!(backend.get(SELECTIONS_SLOT).is_none());
        assert!(backend.get(CREDENTIAL_SLOT).is_some());
    }

    #[tokio::test]
    async fn test_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("saves"));
        assert_eq!(backend.read("game_state").await.unwrap(), None);

        backend.write("game_state", "{}").await.unwrap();
        backend.write("game_state", "{\"a\":1}").await.unwrap();
        assert_eq!(
            backend.read("game_state").await.unwrap().as_deref(),
            Some("{\"a\":1}")
        );
        assert!(dir.path().join("saves/game_state.json").exists());

        backend.remove("game_state").await.unwrap();
        backend.remove("game_state").await.unwrap();
        assert_eq!(backend.read("game_state").await.unwrap(), None);
    }
}
