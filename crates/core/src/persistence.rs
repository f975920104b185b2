//! Mirrors the conversation store into a [`Storage`].
//!
//! Two keys are used: the conversation collection as a JSON array and the
//! active conversation id as a plain string (empty in the home state).
//! Persistence is best-effort. Failures are logged and never reach the
//! caller.

mod storage;

use std::sync::Arc;

pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};

use crate::conversation::{Conversation, ConversationId};
use crate::store::ConversationStore;

/// Storage key of the conversation collection.
pub const CONVERSATIONS_KEY: &str = "bhaiya.conversations";
/// Storage key of the active conversation id.
pub const ACTIVE_CONVERSATION_KEY: &str = "bhaiya.current-conversation";

#[derive(Debug, thiserror::Error)]
enum PersistenceError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("malformed conversations: {0}")]
    Json(#[from] serde_json::Error),
}

/// Loads and saves the conversation store.
#[derive(Clone)]
pub struct Persistence {
    storage: Arc<dyn Storage>,
}

impl Persistence {
    /// Creates an adapter over `storage`.
    #[inline]
    pub fn new<S: Storage + 'static>(storage: S) -> Self {
        Self {
            storage: Arc::new(storage),
        }
    }

    /// Creates an adapter over a shared storage.
    #[inline]
    pub fn with_shared_storage(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Reads the persisted store.
    ///
    /// Returns `None` if nothing was saved yet or the saved data is
    /// unreadable.
    pub fn load(&self) -> Option<ConversationStore> {
        match self.try_load() {
            Ok(Some(store)) => {
                info!(
                    conversations = store.conversations().len(),
                    "loaded saved conversations"
                );
                Some(store)
            }
            Ok(None) => {
                debug!("no saved conversations");
                None
            }
            Err(err) => {
                warn!("failed to load saved conversations: {err}");
                None
            }
        }
    }

    /// Writes the store. Skipped while the store has no conversations.
    pub fn save(&self, store: &ConversationStore) {
        if store.is_empty() {
            trace!("store is empty, skip saving");
            return;
        }
        if let Err(err) = self.try_save(store.conversations(), store.active_id())
        {
            warn!("failed to save conversations: {err}");
        }
    }

    /// Removes everything this adapter wrote.
    pub fn clear(&self) {
        for key in [CONVERSATIONS_KEY, ACTIVE_CONVERSATION_KEY] {
            if let Err(err) = self.storage.remove(key) {
                warn!("failed to remove {key}: {err}");
            }
        }
    }

    fn try_load(&self) -> Result<Option<ConversationStore>, PersistenceError> {
        let Some(raw) = self.storage.get(CONVERSATIONS_KEY)? else {
            return Ok(None);
        };
        let conversations: Vec<Conversation> = serde_json::from_str(&raw)?;
        let active_id = self
            .storage
            .get(ACTIVE_CONVERSATION_KEY)?
            .filter(|id| !id.is_empty())
            .map(ConversationId::new);
        Ok(Some(ConversationStore::from_parts(conversations, active_id)))
    }

    fn try_save(
        &self,
        conversations: &[Conversation],
        active_id: Option<&ConversationId>,
    ) -> Result<(), PersistenceError> {
        // Placeholders serialize as the sentinel text.
        let raw = serde_json::to_string(conversations)?;
        self.storage.set(CONVERSATIONS_KEY, &raw)?;
        self.storage.set(
            ACTIVE_CONVERSATION_KEY,
            active_id.map(ConversationId::as_str).unwrap_or_default(),
        )?;
        trace!(len = raw.len(), "saved conversations");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{MessageContent, PENDING_SENTINEL};

    struct BrokenStorage;

    impl Storage for BrokenStorage {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(std::io::Error::other("disk on fire").into())
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(std::io::Error::other("disk on fire").into())
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(std::io::Error::other("disk on fire").into())
        }
    }

    fn shared_memory() -> (Arc<MemoryStorage>, Persistence) {
        let storage = Arc::new(MemoryStorage::default());
        let persistence = Persistence::with_shared_storage(storage.clone());
        (storage, persistence)
    }

    #[test]
    fn test_round_trip_replaces_placeholders() {
        let (_, persistence) = shared_memory();
        let mut store = ConversationStore::default();
        let done = store.append_user_turn(None, "Hello").unwrap();
        store
            .resolve_turn(&done.conversation_id, "Hi!", Some("Hello".into()))
            .unwrap();
        store.append_user_turn(None, "Still there?").unwrap();

        persistence.save(&store);
        let loaded = persistence.load().unwrap();

        assert_eq!(loaded.active_id(), store.active_id());
        assert_eq!(loaded.conversations().len(), 1);
        let before = &store.conversations()[0];
        let after = &loaded.conversations()[0];
        assert_eq!(after.id, before.id);
        assert_eq!(after.title, before.title);
        assert_eq!(after.timestamp, before.timestamp);
        assert_eq!(after.messages.len(), before.messages.len());
        for (b, a) in before.messages.iter().zip(&after.messages) {
            assert_eq!(a.sender, b.sender);
            assert_eq!(a.timestamp, b.timestamp);
            let expected = b.content.as_text().unwrap_or(PENDING_SENTINEL);
            assert_eq!(a.content, MessageContent::Text(expected.to_owned()));
        }
        assert!(!after.has_pending_reply());
    }

    #[test]
    fn test_home_state_round_trip() {
        let (storage, persistence) = shared_memory();
        let mut store = ConversationStore::seeded();
        store.new_conversation();
        persistence.save(&store);

        assert_eq!(
            storage.get(ACTIVE_CONVERSATION_KEY).unwrap().as_deref(),
            Some("")
        );
        let loaded = persistence.load().unwrap();
        assert_eq!(loaded.active_id(), None);
        assert_eq!(loaded.conversations().len(), 1);
    }

    #[test]
    fn test_empty_store_is_not_saved() {
        let (storage, persistence) = shared_memory();
        persistence.save(&ConversationStore::seeded());
        let saved = storage.get(CONVERSATIONS_KEY).unwrap();
        assert!(saved.is_some());

        persistence.save(&ConversationStore::default());
        assert_eq!(storage.get(CONVERSATIONS_KEY).unwrap(), saved);

        persistence.clear();
        assert_eq!(storage.get(CONVERSATIONS_KEY).unwrap(), None);
        assert!(persistence.load().is_none());
    }

    #[test]
    fn test_malformed_data_loads_nothing() {
        let (storage, persistence) = shared_memory();
        storage.set(CONVERSATIONS_KEY, "[{\"id\": 1}").unwrap();
        assert!(persistence.load().is_none());

        storage
            .set(
                CONVERSATIONS_KEY,
                r#"[{"id":"1","title":"t","messages":[],"timestamp":"yesterday"}]"#,
            )
            .unwrap();
        assert!(persistence.load().is_none());
    }

    #[test]
    fn test_failures_are_swallowed() {
        let persistence = Persistence::new(BrokenStorage);
        assert!(persistence.load().is_none());
        persistence.save(&ConversationStore::seeded());
        persistence.clear();
    }

    #[test]
    fn test_file_backed_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConversationStore::default();
        let turn = store.append_user_turn(None, "Persist me").unwrap();
        store.resolve_turn(&turn.conversation_id, "Done", None).unwrap();
        Persistence::new(FileStorage::new(dir.path())).save(&store);

        let loaded = Persistence::new(FileStorage::new(dir.path()))
            .load()
            .unwrap();
        assert_eq!(loaded.conversations(), store.conversations());
        assert_eq!(loaded.active_id(), Some(&turn.conversation_id));
    }
}
