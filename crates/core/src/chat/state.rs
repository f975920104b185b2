use std::collections::{HashMap, VecDeque};
use std::fmt::{self, Debug};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{
    APOLOGY_MESSAGE, CANCELLED_MESSAGE, ChatEvent, EventFn, StoreSnapshot,
};
use crate::completion::CompletionClient;
use crate::conversation::ConversationId;
use crate::persistence::Persistence;
use crate::store::{ConversationStore, TurnContext};
use crate::suggestions::SuggestionGenerator;

pub enum Command {
    SendMessage(String),
    NewConversation,
    SelectConversation(ConversationId),
    DeleteConversation(ConversationId),
    CancelTurn(ConversationId),
    RefreshSuggestions,
    Snapshot(oneshot::Sender<StoreSnapshot>),
    TurnFinished {
        conversation_id: ConversationId,
        task_id: u64,
        outcome: TurnOutcome,
    },
    SuggestionsReady {
        task_id: u64,
        suggestions: Vec<String>,
    },
}

impl Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SendMessage(text) => {
                f.debug_tuple("SendMessage").field(&text.len()).finish()
            }
            Command::NewConversation => f.write_str("NewConversation"),
            Command::SelectConversation(id) => {
                f.debug_tuple("SelectConversation").field(id).finish()
            }
            Command::DeleteConversation(id) => {
                f.debug_tuple("DeleteConversation").field(id).finish()
            }
            Command::CancelTurn(id) => {
                f.debug_tuple("CancelTurn").field(id).finish()
            }
            Command::RefreshSuggestions => f.write_str("RefreshSuggestions"),
            Command::Snapshot(_) => f.write_str("Snapshot"),
            Command::TurnFinished {
                conversation_id,
                task_id,
                outcome,
            } => f
                .debug_struct("TurnFinished")
                .field("conversation_id", conversation_id)
                .field("task_id", task_id)
                .field("outcome", outcome)
                .finish(),
            Command::SuggestionsReady { task_id, .. } => f
                .debug_struct("SuggestionsReady")
                .field("task_id", task_id)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug)]
pub struct TurnOutcome {
    reply: String,
    title: Option<String>,
}

struct RunningTask {
    task_id: u64,
    handle: JoinHandle<()>,
}

pub struct ChatState {
    store: ConversationStore,
    persistence: Persistence,
    completion: CompletionClient,
    suggestion_generator: SuggestionGenerator,
    suggestions: Vec<String>,
    cmd_tx: mpsc::WeakUnboundedSender<Command>,
    on_event: EventFn,
    running_turns: HashMap<ConversationId, RunningTask>,
    pending_sends: HashMap<ConversationId, VecDeque<String>>,
    suggestion_task: Option<RunningTask>,
    next_task_id: u64,
}

impl ChatState {
    pub fn new(
        store: ConversationStore,
        persistence: Persistence,
        completion: CompletionClient,
        cmd_tx: mpsc::WeakUnboundedSender<Command>,
        on_event: EventFn,
    ) -> Self {
        Self {
            store,
            persistence,
            suggestion_generator: SuggestionGenerator::new(completion.clone()),
            completion,
            suggestions: Vec::new(),
            cmd_tx,
            on_event,
            running_turns: HashMap::new(),
            pending_sends: HashMap::new(),
            suggestion_task: None,
            next_task_id: 1,
        }
    }

    pub fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::SendMessage(text) => self.send_message(text),
            Command::NewConversation => {
                self.store.new_conversation();
                self.persist_and_notify();
            }
            Command::SelectConversation(id) => {
                match self.store.select_conversation(&id) {
                    Ok(()) => self.persist_and_notify(),
                    Err(err) => warn!("cannot select: {err}"),
                }
            }
            Command::DeleteConversation(id) => self.delete_conversation(&id),
            Command::CancelTurn(id) => self.cancel_turn(&id),
            Command::RefreshSuggestions => self.refresh_suggestions(),
            Command::Snapshot(tx) => {
                tx.send(self.snapshot()).ok();
            }
            Command::TurnFinished {
                conversation_id,
                task_id,
                outcome,
            } => self.finish_turn(conversation_id, task_id, outcome),
            Command::SuggestionsReady {
                task_id,
                suggestions,
            } => {
                if self.suggestion_task.as_ref().map(|t| t.task_id)
                    != Some(task_id)
                {
                    debug!(task_id, "discard stale suggestions");
                    return;
                }
                self.suggestion_task = None;
                self.suggestions = suggestions.clone();
                self.emit(ChatEvent::Suggestions(suggestions));
            }
        }
    }

    /// Aborts every task in flight.
    pub fn abort_all(&mut self) {
        for (_, task) in self.running_turns.drain() {
            task.handle.abort();
        }
        if let Some(task) = self.suggestion_task.take() {
            task.handle.abort();
        }
        self.pending_sends.clear();
    }

    pub fn refresh_suggestions(&mut self) {
        if let Some(task) = self.suggestion_task.take() {
            task.handle.abort();
        }
        let task_id = self.issue_task_id();
        let generator = self.suggestion_generator.clone();
        let cmd_tx = self.cmd_tx.clone();
        let handle = tokio::spawn(async move {
            let suggestions = generator.generate().await;
            if let Some(cmd_tx) = cmd_tx.upgrade() {
                cmd_tx
                    .send(Command::SuggestionsReady {
                        task_id,
                        suggestions,
                    })
                    .ok();
            }
        });
        self.suggestion_task = Some(RunningTask { task_id, handle });
    }

    fn send_message(&mut self, text: String) {
        if let Some(id) = self.store.active_id() {
            if self.running_turns.contains_key(id) {
                debug!(%id, "conversation is busy, queue the message");
                self.pending_sends
                    .entry(id.clone())
                    .or_default()
                    .push_back(text);
                return;
            }
        }
        let active_id = self.store.active_id().cloned();
        self.start_turn(active_id.as_ref(), &text);
    }

    fn start_turn(
        &mut self,
        conversation_id: Option<&ConversationId>,
        text: &str,
    ) {
        let ctx = match self.store.append_user_turn(conversation_id, text) {
            Ok(ctx) => ctx,
            Err(err) => {
                warn!("cannot send the message: {err}");
                return;
            }
        };
        self.persist_and_notify();

        let task_id = self.issue_task_id();
        let conversation_id = ctx.conversation_id.clone();
        let handle = tokio::spawn(run_turn(
            self.completion.clone(),
            ctx,
            task_id,
            self.cmd_tx.clone(),
            Arc::clone(&self.on_event),
        ));
        self.running_turns
            .insert(conversation_id, RunningTask { task_id, handle });
    }

    fn finish_turn(
        &mut self,
        conversation_id: ConversationId,
        task_id: u64,
        outcome: TurnOutcome,
    ) {
        let is_current = self
            .running_turns
            .get(&conversation_id)
            .is_some_and(|task| task.task_id == task_id);
        if !is_current {
            debug!(%conversation_id, task_id, "discard a stale reply");
            return;
        }
        self.running_turns.remove(&conversation_id);

        self.resolve(&conversation_id, outcome.reply, outcome.title);
        self.process_next_send(&conversation_id);
    }

    fn process_next_send(&mut self, conversation_id: &ConversationId) {
        let Some(queue) = self.pending_sends.get_mut(conversation_id) else {
            return;
        };
        let next = queue.pop_front();
        if queue.is_empty() {
            self.pending_sends.remove(conversation_id);
        }
        if let Some(text) = next {
            self.start_turn(Some(conversation_id), &text);
        }
    }

    fn cancel_turn(&mut self, conversation_id: &ConversationId) {
        if let Some(queue) = self.pending_sends.remove(conversation_id) {
            debug!(%conversation_id, count = queue.len(), "drop queued messages");
        }
        let Some(task) = self.running_turns.remove(conversation_id) else {
            debug!(%conversation_id, "nothing to cancel");
            return;
        };
        task.handle.abort();
        info!(%conversation_id, "cancelled a turn");
        self.resolve(conversation_id, CANCELLED_MESSAGE.to_owned(), None);
    }

    fn delete_conversation(&mut self, conversation_id: &ConversationId) {
        if let Some(task) = self.running_turns.remove(conversation_id) {
            task.handle.abort();
        }
        self.pending_sends.remove(conversation_id);

        if let Err(err) = self.store.delete_conversation(conversation_id) {
            warn!("cannot delete: {err}");
            return;
        }
        if self.store.is_empty() {
            self.persistence.clear();
            self.emit(ChatEvent::Changed);
        } else {
            self.persist_and_notify();
        }
    }

    fn resolve(
        &mut self,
        conversation_id: &ConversationId,
        reply: String,
        title: Option<String>,
    ) {
        if let Err(err) = self.store.resolve_turn(conversation_id, &reply, title)
        {
            warn!("cannot resolve the turn: {err}");
            return;
        }
        self.persistence.save(&self.store);
        self.emit(ChatEvent::TurnResolved {
            conversation_id: conversation_id.clone(),
            reply,
        });
        self.emit(ChatEvent::Changed);
    }

    fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            conversations: self
                .store
                .sorted_by_recency()
                .into_iter()
                .cloned()
                .collect(),
            active_id: self.store.active_id().cloned(),
            suggestions: self.suggestions.clone(),
        }
    }

    #[inline]
    fn persist_and_notify(&self) {
        self.persistence.save(&self.store);
        self.emit(ChatEvent::Changed);
    }

    #[inline]
    fn emit(&self, event: ChatEvent) {
        (self.on_event)(event);
    }

    #[inline]
    fn issue_task_id(&mut self) -> u64 {
        let task_id = self.next_task_id;
        self.next_task_id += 1;
        task_id
    }
}

async fn run_turn(
    completion: CompletionClient,
    ctx: TurnContext,
    task_id: u64,
    cmd_tx: mpsc::WeakUnboundedSender<Command>,
    on_event: EventFn,
) {
    let TurnContext {
        conversation_id,
        history,
        prompt,
        is_first_turn,
    } = ctx;

    let on_delta = {
        let conversation_id = conversation_id.clone();
        move |delta: &str| {
            on_event(ChatEvent::Delta {
                conversation_id: conversation_id.clone(),
                text: delta.to_owned(),
            });
        }
    };
    let outcome = match completion.complete(&history, &prompt, on_delta).await
    {
        Ok(reply) => {
            let title = if is_first_turn {
                Some(completion.generate_title(&prompt).await)
            } else {
                None
            };
            TurnOutcome { reply, title }
        }
        Err(err) => {
            error!(%conversation_id, "completion failed: {err}");
            TurnOutcome {
                reply: APOLOGY_MESSAGE.to_owned(),
                title: None,
            }
        }
    };

    if let Some(cmd_tx) = cmd_tx.upgrade() {
        cmd_tx
            .send(Command::TurnFinished {
                conversation_id,
                task_id,
                outcome,
            })
            .ok();
    }
}
