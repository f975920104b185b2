mod builder;
mod state;

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use tokio::select;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::Instrument;

pub use builder::ChatBuilder;
use state::{ChatState, Command};

use crate::conversation::{Conversation, ConversationId};

/// Replaces the reply placeholder when a completion fails.
pub const APOLOGY_MESSAGE: &str = "I apologize, but I encountered an error \
processing your request. Please try again.";

/// Replaces the reply placeholder when a turn is cancelled.
pub const CANCELLED_MESSAGE: &str = "The response was cancelled.";

pub(crate) type EventFn = Arc<dyn Fn(ChatEvent) + Send + Sync>;

/// Notifications for the front end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    /// Something in the conversation collection changed. Take a new
    /// [`snapshot`](Chat::snapshot) to see what.
    Changed,
    /// A piece of a reply that is still streaming.
    Delta {
        /// The conversation the reply belongs to.
        conversation_id: ConversationId,
        /// The new text.
        text: String,
    },
    /// A placeholder got its final text.
    TurnResolved {
        /// The conversation the reply belongs to.
        conversation_id: ConversationId,
        /// The final text: the model's reply, the apology or the cancel
        /// notice.
        reply: String,
    },
    /// New suggestions are available.
    Suggestions(Vec<String>),
}

/// A consistent copy of the chat state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    /// All conversations, most recent first.
    pub conversations: Vec<Conversation>,
    /// The active conversation, `None` in the home state.
    pub active_id: Option<ConversationId>,
    /// The current suggestions.
    pub suggestions: Vec<String>,
}

impl StoreSnapshot {
    /// Returns the active conversation.
    pub fn active(&self) -> Option<&Conversation> {
        let active_id = self.active_id.as_ref()?;
        self.conversations.iter().find(|c| &c.id == active_id)
    }
}

/// Returned when the chat task is gone.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ChatClosedError;

impl fmt::Debug for ChatClosedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClosedError").finish()
    }
}

impl fmt::Display for ChatClosedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        "the chat task has stopped".fmt(f)
    }
}

impl Error for ChatClosedError {}

/// Handle to a running chat.
///
/// The chat task owns the conversation store and applies commands in the
/// order they were sent. Completions run on their own tasks, so commands
/// are handled right away even while a reply is streaming. A message sent
/// to a conversation that is still waiting for a reply is queued until that
/// reply resolves.
///
/// The task stops when the last handle is dropped or [`Chat::shutdown`]
/// is called, aborting any reply in flight.
#[derive(Clone)]
pub struct Chat {
    cmd_tx: mpsc::UnboundedSender<Command>,
    kill_tx: Arc<watch::Sender<bool>>,
}

impl Chat {
    /// Sends a message to the active conversation, creating one first in
    /// the home state.
    #[inline]
    pub fn send_message<S: Into<String>>(
        &self,
        text: S,
    ) -> Result<(), ChatClosedError> {
        self.send(Command::SendMessage(text.into()))
    }

    /// Goes back to the home state.
    #[inline]
    pub fn new_conversation(&self) -> Result<(), ChatClosedError> {
        self.send(Command::NewConversation)
    }

    /// Makes a conversation active.
    #[inline]
    pub fn select_conversation(
        &self,
        id: ConversationId,
    ) -> Result<(), ChatClosedError> {
        self.send(Command::SelectConversation(id))
    }

    /// Deletes a conversation, abandoning its reply in flight.
    #[inline]
    pub fn delete_conversation(
        &self,
        id: ConversationId,
    ) -> Result<(), ChatClosedError> {
        self.send(Command::DeleteConversation(id))
    }

    /// Cancels the reply in flight for a conversation and drops its queued
    /// messages.
    #[inline]
    pub fn cancel_turn(
        &self,
        id: ConversationId,
    ) -> Result<(), ChatClosedError> {
        self.send(Command::CancelTurn(id))
    }

    /// Asks for a new set of suggestions.
    #[inline]
    pub fn refresh_suggestions(&self) -> Result<(), ChatClosedError> {
        self.send(Command::RefreshSuggestions)
    }

    /// Returns a copy of the current state.
    pub async fn snapshot(&self) -> Result<StoreSnapshot, ChatClosedError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await.map_err(|_| ChatClosedError)
    }

    /// Stops the chat task. Commands sent afterwards fail.
    #[inline]
    pub fn shutdown(&self) {
        self.kill_tx.send(true).ok();
    }

    #[inline]
    fn send(&self, cmd: Command) -> Result<(), ChatClosedError> {
        self.cmd_tx.send(cmd).map_err(|_| ChatClosedError)
    }

    fn spawn(
        state: ChatState,
        cmd_tx: mpsc::UnboundedSender<Command>,
        cmd_rx: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let (kill_tx, kill_rx) = watch::channel(false);
        tokio::spawn(
            run_chat(state, cmd_rx, kill_rx).instrument(trace_span!("chat")),
        );
        Self {
            cmd_tx,
            kill_tx: Arc::new(kill_tx),
        }
    }
}

async fn run_chat(
    mut state: ChatState,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    mut kill_rx: watch::Receiver<bool>,
) {
    debug!("started");
    loop {
        let cmd = select! {
            biased;

            _ = kill_rx.changed() => {
                break;
            }
            cmd = cmd_rx.recv() => {
                // Only handles hold strong senders.
                let Some(cmd) = cmd else {
                    break;
                };
                cmd
            }
        };
        trace!("received command: {cmd:?}");

        let proc_span = trace_span!("proc cmd");
        proc_span.in_scope(|| {
            state.handle_command(cmd);
            trace!("finished");
        });
    }
    state.abort_all();
    debug!("will terminate");
}
