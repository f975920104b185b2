//! Conversation-related types.

use std::fmt::{self, Display};

use bhaiya_model::ModelMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The title every conversation starts with.
pub const DEFAULT_TITLE: &str = "New Chat";

/// What a placeholder turns into when it gets written to storage.
pub const PENDING_SENTINEL: &str = "Loading...";

/// Who wrote a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The person typing.
    User,
    /// The model.
    Bot,
}

/// The body of a message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageContent {
    /// Finalized text.
    Text(String),
    /// A reply that is still being generated.
    Pending,
}

impl MessageContent {
    /// Returns the text, or `None` for a placeholder.
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            MessageContent::Pending => None,
        }
    }

    /// Returns `true` for a placeholder.
    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, MessageContent::Pending)
    }
}

// Storage only knows about strings. A placeholder is written as the
// sentinel text and comes back as ordinary text.
impl Serialize for MessageContent {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_text().unwrap_or(PENDING_SENTINEL))
    }
}

impl<'de> Deserialize<'de> for MessageContent {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(MessageContent::Text)
    }
}

/// One conversational turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The body of the message.
    pub content: MessageContent,
    /// Who wrote it.
    pub sender: Sender,
    /// When it was created.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a user message.
    #[inline]
    pub fn user<S: Into<String>>(text: S, timestamp: DateTime<Utc>) -> Self {
        Self {
            content: MessageContent::Text(text.into()),
            sender: Sender::User,
            timestamp,
        }
    }

    /// Creates a finalized bot message.
    #[inline]
    pub fn bot<S: Into<String>>(text: S, timestamp: DateTime<Utc>) -> Self {
        Self {
            content: MessageContent::Text(text.into()),
            sender: Sender::Bot,
            timestamp,
        }
    }

    /// Creates a bot placeholder.
    #[inline]
    pub fn pending(timestamp: DateTime<Utc>) -> Self {
        Self {
            content: MessageContent::Pending,
            sender: Sender::Bot,
            timestamp,
        }
    }

    /// Converts this message into a model turn. Placeholders have no
    /// counterpart.
    pub fn to_model_message(&self) -> Option<ModelMessage> {
        let text = self.content.as_text()?.to_owned();
        Some(match self.sender {
            Sender::User => ModelMessage::User(text),
            Sender::Bot => ModelMessage::Model(text),
        })
    }
}

/// Identifier of a conversation.
///
/// Ids are opaque. The store issues time-based ones, but loaded data may
/// carry anything.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Wraps a raw id.
    #[inline]
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// Returns the raw id.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The numeric value of a time-based id. Values past the year 9999
    /// are not timestamps and yield `None`.
    #[inline]
    pub(crate) fn as_millis(&self) -> Option<i64> {
        self.0
            .parse()
            .ok()
            .filter(|millis| (0..=MAX_TIMESTAMP_MILLIS).contains(millis))
    }
}

// 9999-12-31T23:59:59.999Z
const MAX_TIMESTAMP_MILLIS: i64 = 253_402_300_799_999;

impl Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One chat thread.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Stable identifier.
    pub id: ConversationId,
    /// Human-readable label, shown in the conversation list.
    pub title: String,
    /// Messages, oldest first.
    pub messages: Vec<Message>,
    /// Creation time, used for ordering.
    pub timestamp: DateTime<Utc>,
}

impl Conversation {
    /// Creates an empty conversation with the default title.
    #[inline]
    pub fn new(id: ConversationId, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            title: DEFAULT_TITLE.to_owned(),
            messages: Vec::new(),
            timestamp,
        }
    }

    /// Returns `true` while the title has not been replaced yet.
    #[inline]
    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_TITLE
    }

    /// Returns `true` if a reply is being generated for this conversation.
    #[inline]
    pub fn has_pending_reply(&self) -> bool {
        self.messages.iter().any(|m| m.content.is_pending())
    }
}
