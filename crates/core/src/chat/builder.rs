use std::sync::Arc;

use tokio::sync::mpsc;

use super::state::ChatState;
use super::{Chat, ChatEvent, EventFn};
use crate::completion::CompletionClient;
use crate::persistence::Persistence;
use crate::store::ConversationStore;

/// [`Chat`] builder.
pub struct ChatBuilder {
    persistence: Persistence,
    completion: CompletionClient,
    on_event: Option<EventFn>,
}

impl ChatBuilder {
    /// Creates a new builder that keeps its state in `persistence`.
    ///
    /// Without a completion client, every reply is the apology text.
    #[inline]
    pub fn with_persistence(persistence: Persistence) -> Self {
        Self {
            persistence,
            completion: CompletionClient::uninitialized(),
            on_event: None,
        }
    }

    /// Sets the completion client.
    #[inline]
    pub fn with_completion_client(
        mut self,
        completion: CompletionClient,
    ) -> Self {
        self.completion = completion;
        self
    }

    /// Attaches a callback to be invoked for every [`ChatEvent`].
    ///
    /// The callback is called from the chat task and from completion tasks,
    /// so it should return quickly.
    #[inline]
    pub fn on_event(
        mut self,
        on_event: impl Fn(ChatEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_event = Some(Arc::new(on_event));
        self
    }

    /// Loads the saved state and starts the chat. A first run starts with
    /// one empty conversation. Suggestions are requested right away.
    ///
    /// Must be called within a tokio runtime.
    pub fn build(self) -> Chat {
        let Self {
            persistence,
            completion,
            on_event,
        } = self;

        let store = persistence.load().unwrap_or_else(|| {
            let store = ConversationStore::seeded();
            persistence.save(&store);
            store
        });

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let mut state = ChatState::new(
            store,
            persistence,
            completion,
            cmd_tx.downgrade(),
            on_event.unwrap_or_else(|| Arc::new(|_| {})),
        );
        state.refresh_suggestions();
        Chat::spawn(state, cmd_tx, cmd_rx)
    }
}
