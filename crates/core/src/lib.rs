//! Core logic of Bhaiya AI: conversations, persistence, completions,
//! suggestions and the chat controller tying them together.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod chat;
pub mod completion;
pub mod conversation;
mod model_client;
pub mod persistence;
pub mod prompts;
pub mod store;
pub mod suggestions;

pub use chat::{
    APOLOGY_MESSAGE, CANCELLED_MESSAGE, Chat, ChatBuilder, ChatClosedError,
    ChatEvent, StoreSnapshot,
};
pub use completion::{CompletionClient, CompletionError};
pub use conversation::{Conversation, ConversationId, Message, MessageContent};
pub use persistence::{FileStorage, MemoryStorage, Persistence, Storage};
pub use suggestions::SuggestionGenerator;
