//! The in-memory conversation collection.

use chrono::{DateTime, Utc};

use crate::conversation::{Conversation, ConversationId, Message, Sender};

/// The error type for store mutations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No conversation has the given id.
    #[error("unknown conversation: {0}")]
    UnknownConversation(ConversationId),
    /// The message has no visible text.
    #[error("message is empty")]
    EmptyMessage,
    /// The conversation has no reply waiting to be resolved.
    #[error("conversation {0} has no pending reply")]
    NoPendingReply(ConversationId),
}

/// Everything a completion request needs to know about a turn that was
/// just added.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnContext {
    /// The conversation the turn was added to.
    pub conversation_id: ConversationId,
    /// Finalized messages that precede this turn.
    pub history: Vec<Message>,
    /// The user text of this turn.
    pub prompt: String,
    /// Whether this is the first user turn of the conversation.
    pub is_first_turn: bool,
}

/// The conversation collection plus the active conversation pointer.
///
/// All mutations are plain `&mut self` methods and must be serialized by
/// the owner.
#[derive(Clone, Debug, Default)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    active_id: Option<ConversationId>,
    last_issued_id: i64,
}

impl ConversationStore {
    /// Creates a store with one empty conversation, which is active.
    pub fn seeded() -> Self {
        let mut store = Self::default();
        let id = store.create_conversation(Utc::now());
        store.active_id = Some(id);
        store
    }

    /// Creates a store from loaded data. An active id naming no
    /// conversation is dropped.
    pub fn from_parts(
        conversations: Vec<Conversation>,
        active_id: Option<ConversationId>,
    ) -> Self {
        let last_issued_id = conversations
            .iter()
            .filter_map(|c| c.id.as_millis())
            .max()
            .unwrap_or_default();
        let active_id =
            active_id.filter(|id| conversations.iter().any(|c| &c.id == id));
        Self {
            conversations,
            active_id,
            last_issued_id,
        }
    }

    /// Returns all conversations in insertion order.
    #[inline]
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Returns the conversations, most recent first.
    pub fn sorted_by_recency(&self) -> Vec<&Conversation> {
        let mut sorted: Vec<_> = self.conversations.iter().collect();
        sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        sorted
    }

    /// Returns the active conversation id, `None` in the home state.
    #[inline]
    pub fn active_id(&self) -> Option<&ConversationId> {
        self.active_id.as_ref()
    }

    /// Returns the active conversation.
    #[inline]
    pub fn active(&self) -> Option<&Conversation> {
        self.get(self.active_id.as_ref()?)
    }

    /// Looks up a conversation.
    #[inline]
    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.id == id)
    }

    /// Returns `true` if there are no conversations at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Appends a user message and a reply placeholder.
    ///
    /// `conversation_id` of `None` targets the active conversation, and a
    /// new conversation is created first when nothing is active.
    pub fn append_user_turn(
        &mut self,
        conversation_id: Option<&ConversationId>,
        text: &str,
    ) -> Result<TurnContext, StoreError> {
        if text.trim().is_empty() {
            return Err(StoreError::EmptyMessage);
        }

        let now = Utc::now();
        let conversation_id = match conversation_id.or(self.active_id.as_ref())
        {
            Some(id) => {
                if self.get(id).is_none() {
                    return Err(StoreError::UnknownConversation(id.clone()));
                }
                id.clone()
            }
            None => {
                let id = self.create_conversation(now);
                self.active_id = Some(id.clone());
                id
            }
        };

        let conversation = self.get_mut(&conversation_id)?;
        let history: Vec<Message> = conversation
            .messages
            .iter()
            .filter(|m| !m.content.is_pending())
            .cloned()
            .collect();
        let is_first_turn = !history.iter().any(|m| m.sender == Sender::User);

        conversation.messages.push(Message::user(text, now));
        conversation.messages.push(Message::pending(now));
        debug!(%conversation_id, "appended a user turn");

        Ok(TurnContext {
            conversation_id,
            history,
            prompt: text.to_owned(),
            is_first_turn,
        })
    }

    /// Replaces the reply placeholder with the final text.
    ///
    /// `new_title` only takes effect while the conversation still has the
    /// default title.
    pub fn resolve_turn(
        &mut self,
        conversation_id: &ConversationId,
        text: &str,
        new_title: Option<String>,
    ) -> Result<(), StoreError> {
        let conversation = self.get_mut(conversation_id)?;
        let Some(idx) = conversation
            .messages
            .iter()
            .rposition(|m| m.content.is_pending())
        else {
            return Err(StoreError::NoPendingReply(conversation_id.clone()));
        };
        conversation.messages.remove(idx);
        conversation.messages.push(Message::bot(text, Utc::now()));

        if let Some(title) = new_title {
            if conversation.has_default_title() {
                conversation.title = title;
            }
        }
        debug!(%conversation_id, "resolved a turn");
        Ok(())
    }

    /// Goes back to the home state. The next message creates a new
    /// conversation.
    #[inline]
    pub fn new_conversation(&mut self) {
        self.active_id = None;
    }

    /// Makes a conversation active.
    pub fn select_conversation(
        &mut self,
        id: &ConversationId,
    ) -> Result<(), StoreError> {
        if self.get(id).is_none() {
            return Err(StoreError::UnknownConversation(id.clone()));
        }
        self.active_id = Some(id.clone());
        Ok(())
    }

    /// Removes a conversation. If it was active, the most recent remaining
    /// conversation becomes active, or the home state if none remain.
    pub fn delete_conversation(
        &mut self,
        id: &ConversationId,
    ) -> Result<Conversation, StoreError> {
        let Some(idx) = self.conversations.iter().position(|c| &c.id == id)
        else {
            return Err(StoreError::UnknownConversation(id.clone()));
        };
        let removed = self.conversations.remove(idx);

        if self.active_id.as_ref() == Some(id) {
            self.active_id = self
                .conversations
                .iter()
                .max_by_key(|c| c.timestamp)
                .map(|c| c.id.clone());
        }
        debug!(%id, "deleted a conversation");
        Ok(removed)
    }

    fn get_mut(
        &mut self,
        id: &ConversationId,
    ) -> Result<&mut Conversation, StoreError> {
        self.conversations
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| StoreError::UnknownConversation(id.clone()))
    }

    fn create_conversation(&mut self, now: DateTime<Utc>) -> ConversationId {
        let id = self.issue_id(now);
        self.conversations.push(Conversation::new(id.clone(), now));
        id
    }

    // Time-based, but strictly increasing so an id is never handed out
    // twice, even after deletion.
    fn issue_id(&mut self, now: DateTime<Utc>) -> ConversationId {
        let mut millis = now
            .timestamp_millis()
            .max(self.last_issued_id.saturating_add(1));
        while self.get(&ConversationId::new(millis.to_string())).is_some() {
            millis = millis.saturating_add(1);
        }
        self.last_issued_id = millis;
        ConversationId::new(millis.to_string())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::conversation::MessageContent;

    fn conversation(id: &str, minutes_ago: i64) -> Conversation {
        let timestamp = Utc::now() - TimeDelta::minutes(minutes_ago);
        Conversation::new(ConversationId::new(id), timestamp)
    }

    fn contents(conversation: &Conversation) -> Vec<(Sender, MessageContent)> {
        conversation
            .messages
            .iter()
            .map(|m| (m.sender, m.content.clone()))
            .collect()
    }

    fn text(s: &str) -> MessageContent {
        MessageContent::Text(s.to_owned())
    }

    #[test]
    fn test_first_send_creates_conversation() {
        let mut store = ConversationStore::default();
        assert!(store.is_empty());

        let turn = store.append_user_turn(None, "Hello").unwrap();
        assert_eq!(store.active_id(), Some(&turn.conversation_id));
        assert!(turn.history.is_empty());
        assert!(turn.is_first_turn);
        assert_eq!(turn.prompt, "Hello");

        let conv = store.active().unwrap();
        assert_eq!(
            contents(conv),
            vec![
                (Sender::User, text("Hello")),
                (Sender::Bot, MessageContent::Pending),
            ]
        );

        store
            .resolve_turn(
                &turn.conversation_id,
                "Hi there!",
                Some("Friendly Greeting".to_owned()),
            )
            .unwrap();
        let conv = store.active().unwrap();
        assert_eq!(conv.title, "Friendly Greeting");
        assert_eq!(
            contents(conv),
            vec![
                (Sender::User, text("Hello")),
                (Sender::Bot, text("Hi there!")),
            ]
        );
    }

    #[test]
    fn test_history_and_title_once() {
        let mut store = ConversationStore::seeded();
        let first = store.append_user_turn(None, "One").unwrap();
        store
            .resolve_turn(&first.conversation_id, "1", Some("Counting".into()))
            .unwrap();

        let second = store.append_user_turn(None, "Two").unwrap();
        assert_eq!(second.conversation_id, first.conversation_id);
        assert!(!second.is_first_turn);
        assert_eq!(second.history.len(), 2);
        assert_eq!(second.history[1].content, text("1"));

        store
            .resolve_turn(&second.conversation_id, "2", Some("Other".into()))
            .unwrap();
        let conv = store.active().unwrap();
        assert_eq!(conv.title, "Counting");
        assert_eq!(conv.messages.len(), 4);
    }

    #[test]
    fn test_messages_only_grow() {
        let mut store = ConversationStore::default();
        let mut previous = Vec::new();
        for i in 0..5 {
            let question = format!("q{i}");
            let answer = format!("a{i}");
            let turn = store.append_user_turn(None, &question).unwrap();

            let pending = contents(store.active().unwrap());
            assert_eq!(pending[..previous.len()], previous[..]);
            assert_eq!(
                pending[previous.len()..],
                [
                    (Sender::User, text(&question)),
                    (Sender::Bot, MessageContent::Pending),
                ]
            );

            store
                .resolve_turn(&turn.conversation_id, &answer, None)
                .unwrap();
            let resolved = contents(store.active().unwrap());
            assert_eq!(resolved[..previous.len()], previous[..]);
            assert_eq!(
                resolved[previous.len()..],
                [(Sender::User, text(&question)), (Sender::Bot, text(&answer))]
            );
            previous = resolved;
        }
    }

    #[test]
    fn test_rejects_bad_input() {
        let mut store = ConversationStore::default();
        assert_eq!(
            store.append_user_turn(None, "   ").unwrap_err(),
            StoreError::EmptyMessage
        );
        assert!(store.is_empty());

        let missing = ConversationId::new("missing");
        assert_eq!(
            store.append_user_turn(Some(&missing), "Hi").unwrap_err(),
            StoreError::UnknownConversation(missing.clone())
        );
        assert_eq!(
            store.resolve_turn(&missing, "Hi", None).unwrap_err(),
            StoreError::UnknownConversation(missing)
        );

        let turn = store.append_user_turn(None, "Hi").unwrap();
        store.resolve_turn(&turn.conversation_id, "Hello", None).unwrap();
        assert_eq!(
            store
                .resolve_turn(&turn.conversation_id, "again", None)
                .unwrap_err(),
            StoreError::NoPendingReply(turn.conversation_id)
        );
    }

    #[test]
    fn test_new_conversation_is_lazy() {
        let mut store = ConversationStore::seeded();
        assert_eq!(store.conversations().len(), 1);

        store.new_conversation();
        assert_eq!(store.active_id(), None);
        assert_eq!(store.conversations().len(), 1);

        let turn = store.append_user_turn(None, "Hi").unwrap();
        assert_eq!(store.conversations().len(), 2);
        assert_eq!(store.active_id(), Some(&turn.conversation_id));
    }

    #[test]
    fn test_delete_active_selects_most_recent() {
        let mut store = ConversationStore::from_parts(
            vec![
                conversation("1", 30),
                conversation("2", 10),
                conversation("3", 20),
            ],
            Some(ConversationId::new("2")),
        );
        store.delete_conversation(&ConversationId::new("2")).unwrap();
        assert_eq!(store.active_id(), Some(&ConversationId::new("3")));

        // Deleting an inactive one leaves the pointer alone.
        store.delete_conversation(&ConversationId::new("1")).unwrap();
        assert_eq!(store.active_id(), Some(&ConversationId::new("3")));
    }

    #[test]
    fn test_delete_with_one_other() {
        let mut store = ConversationStore::from_parts(
            vec![conversation("x", 0), conversation("y", 5)],
            Some(ConversationId::new("x")),
        );
        store.delete_conversation(&ConversationId::new("x")).unwrap();
        assert_eq!(store.active_id(), Some(&ConversationId::new("y")));
    }

    #[test]
    fn test_delete_last_goes_home() {
        let mut store = ConversationStore::seeded();
        let id = store.active_id().cloned().unwrap();
        store.delete_conversation(&id).unwrap();
        assert_eq!(store.active_id(), None);
        assert!(store.is_empty());
        assert_eq!(
            store.select_conversation(&id).unwrap_err(),
            StoreError::UnknownConversation(id)
        );
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut store = ConversationStore::default();
        let mut seen = Vec::new();
        for _ in 0..5 {
            store.new_conversation();
            let turn = store.append_user_turn(None, "Hi").unwrap();
            store.delete_conversation(&turn.conversation_id).unwrap();
            assert!(!seen.contains(&turn.conversation_id));
            seen.push(turn.conversation_id);
        }
    }

    #[test]
    fn test_ids_after_huge_loaded_id() {
        let mut store = ConversationStore::from_parts(
            vec![
                conversation(&i64::MAX.to_string(), 1),
                conversation("not-a-number", 2),
            ],
            None,
        );
        let first = store.append_user_turn(None, "Hi").unwrap();
        store.new_conversation();
        let second = store.append_user_turn(None, "Hello").unwrap();

        let first = first.conversation_id.as_millis().unwrap();
        let second = second.conversation_id.as_millis().unwrap();
        assert!(first > 0);
        assert!(second > first);
        assert_eq!(store.conversations().len(), 4);
    }

    #[test]
    fn test_from_parts_drops_dangling_active_id() {
        let store = ConversationStore::from_parts(
            vec![conversation("1", 0)],
            Some(ConversationId::new("gone")),
        );
        assert_eq!(store.active_id(), None);
    }

    #[test]
    fn test_sorted_by_recency() {
        let store = ConversationStore::from_parts(
            vec![
                conversation("old", 60),
                conversation("new", 1),
                conversation("mid", 30),
            ],
            None,
        );
        let ids: Vec<_> = store
            .sorted_by_recency()
            .into_iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, ["new", "mid", "old"]);
    }
}
