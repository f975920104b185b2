//! Bhaiya AI in the terminal.

#[macro_use]
extern crate tracing;

mod commands;
mod config;

use std::io::Write as _;
use std::time::Duration;

use bhaiya_core::conversation::Sender;
use bhaiya_core::{
    CANCELLED_MESSAGE, Chat, ChatBuilder, ChatClosedError, ChatEvent,
    CompletionClient, Conversation, ConversationId, FileStorage,
    MessageContent, Persistence, StoreSnapshot,
};
use bhaiya_gemini_model::{GeminiConfigBuilder, GeminiProvider};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::sleep;

use commands::{Command, HELP};
use config::AppConfig;

const BAR_CHAR: &str = "▎";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env();
    let completion = match &config.api_key {
        Some(api_key) => {
            let mut builder = GeminiConfigBuilder::with_api_key(api_key);
            if let Some(model) = &config.model {
                builder = builder.with_model(model);
            }
            if let Some(base_url) = &config.base_url {
                builder = builder.with_base_url(base_url);
            }
            let provider = GeminiProvider::new(builder.build());
            CompletionClient::with_model_provider(provider)
                .with_profile(config.profile)
        }
        None => {
            error!("GEMINI_API_KEY is not set, completions are disabled");
            eprintln!(
                "{}",
                "GEMINI_API_KEY is not set, replies will not work.".yellow()
            );
            CompletionClient::uninitialized()
        }
    };
    debug!(data_dir = %config.data_dir.display(), "using data directory");
    let persistence = Persistence::new(FileStorage::new(&config.data_dir));

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let chat = ChatBuilder::with_persistence(persistence)
        .with_completion_client(completion)
        .on_event(move |event| {
            event_tx.send(event).ok();
        })
        .build();

    let mut repl = Repl {
        chat,
        event_rx,
        progress_style: ProgressStyle::with_template("{spinner} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        suggestions: Vec::new(),
    };
    if let Err(err) = repl.run().await {
        error!("{err}");
    }
    repl.chat.shutdown();
}

struct Repl {
    chat: Chat,
    event_rx: mpsc::UnboundedReceiver<ChatEvent>,
    progress_style: ProgressStyle,
    suggestions: Vec<String>,
}

impl Repl {
    async fn run(&mut self) -> Result<(), ChatClosedError> {
        // Suggestions are requested as soon as the chat starts.
        self.wait_for_suggestions().await;
        let snapshot = self.chat.snapshot().await?;
        match snapshot.active() {
            Some(conversation) => print_conversation(conversation),
            None => self.print_home(),
        }

        loop {
            print!("> ");
            std::io::stdout().flush().ok();

            let line = select! {
                line = read_line() => line,
                _ = signal::ctrl_c() => None,
            };
            let Some(line) = line else {
                break;
            };

            match Command::parse(&line) {
                Command::Empty => {}
                Command::Quit => break,
                Command::Help => println!("{HELP}"),
                Command::Invalid(message) => {
                    println!("{}", message.bright_red());
                }
                Command::New => {
                    self.chat.new_conversation()?;
                    self.print_home();
                }
                Command::List => {
                    let snapshot = self.chat.snapshot().await?;
                    print_list(&snapshot);
                }
                Command::Open(n) => {
                    let snapshot = self.chat.snapshot().await?;
                    let Some(conversation) = nth_conversation(&snapshot, n)
                    else {
                        continue;
                    };
                    self.chat.select_conversation(conversation.id.clone())?;
                    print_conversation(conversation);
                }
                Command::Delete(n) => {
                    let snapshot = self.chat.snapshot().await?;
                    let Some(conversation) = nth_conversation(&snapshot, n)
                    else {
                        continue;
                    };
                    if self.confirm_delete(conversation).await {
                        self.chat
                            .delete_conversation(conversation.id.clone())?;
                        println!("Deleted.");
                    }
                }
                Command::Suggest => {
                    self.chat.refresh_suggestions()?;
                    self.wait_for_suggestions().await;
                    self.print_suggestions();
                }
                Command::Use(n) => {
                    let Some(text) = self.suggestions.get(n - 1).cloned()
                    else {
                        println!("{}", "No such suggestion.".bright_red());
                        continue;
                    };
                    println!("{} {}", BAR_CHAR.bright_green(), text);
                    self.send_and_wait(text).await?;
                }
                Command::Send(text) => self.send_and_wait(text).await?,
            }
        }
        Ok(())
    }

    async fn send_and_wait(
        &mut self,
        text: String,
    ) -> Result<(), ChatClosedError> {
        self.chat.send_message(text)?;
        let snapshot = self.chat.snapshot().await?;
        let Some(conversation_id) = snapshot.active_id else {
            return Ok(());
        };
        self.wait_for_reply(&conversation_id).await
    }

    async fn wait_for_reply(
        &mut self,
        conversation_id: &ConversationId,
    ) -> Result<(), ChatClosedError> {
        let mut progress_bar = Some(self.new_spinner("🤔 Thinking..."));
        let mut streamed = false;

        loop {
            if let Some(progress_bar) = &progress_bar {
                progress_bar.inc(1);
            }

            let sleep = sleep(Duration::from_millis(100));
            let event = select! {
                event = self.event_rx.recv() => {
                    let Some(event) = event else {
                        return Err(ChatClosedError);
                    };
                    event
                },
                _ = signal::ctrl_c() => {
                    self.chat.cancel_turn(conversation_id.clone())?;
                    continue;
                },
                _ = sleep => {
                    continue;
                }
            };

            match event {
                ChatEvent::Delta {
                    conversation_id: id,
                    text,
                } if &id == conversation_id => {
                    // Finish the spinner before printing anything else.
                    if let Some(progress_bar) = progress_bar.take() {
                        progress_bar.finish_and_clear();
                        print!("{}🤖 ", BAR_CHAR.bright_cyan());
                    }
                    print!("{}", text.bright_white());
                    std::io::stdout().flush().ok();
                    streamed = true;
                }
                ChatEvent::TurnResolved {
                    conversation_id: id,
                    reply,
                } if &id == conversation_id => {
                    if let Some(progress_bar) = progress_bar.take() {
                        progress_bar.finish_and_clear();
                    }
                    if streamed {
                        println!();
                        if reply == CANCELLED_MESSAGE {
                            println!("{}", reply.dimmed());
                        }
                    } else {
                        println!(
                            "{}🤖 {}",
                            BAR_CHAR.bright_cyan(),
                            reply.bright_white()
                        );
                    }
                    println!();
                    return Ok(());
                }
                ChatEvent::Suggestions(suggestions) => {
                    self.suggestions = suggestions;
                }
                _ => {}
            }
        }
    }

    async fn wait_for_suggestions(&mut self) {
        let progress_bar = self.new_spinner("💡 Looking for ideas...");
        loop {
            progress_bar.inc(1);
            let sleep = sleep(Duration::from_millis(100));
            select! {
                event = self.event_rx.recv() => match event {
                    Some(ChatEvent::Suggestions(suggestions)) => {
                        self.suggestions = suggestions;
                        break;
                    }
                    Some(_) => {}
                    None => break,
                },
                _ = signal::ctrl_c() => break,
                _ = sleep => {}
            }
        }
        progress_bar.finish_and_clear();
    }

    async fn confirm_delete(&self, conversation: &Conversation) -> bool {
        let bar = BAR_CHAR.bright_yellow();
        println!("{bar}⚠️  Delete \"{}\"?", conversation.title.bold());
        println!("{bar}This cannot be undone.");
        print!("Proceed? [y/N]: ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line().await else {
            return false;
        };
        line.trim().eq_ignore_ascii_case("y")
    }

    fn new_spinner(&self, message: &'static str) -> ProgressBar {
        let progress_bar = ProgressBar::new_spinner();
        progress_bar.set_style(self.progress_style.clone());
        progress_bar.set_message(message);
        progress_bar
    }

    fn print_home(&self) {
        println!("\n{}", "How can I help you today?".bold());
        self.print_suggestions();
    }

    fn print_suggestions(&self) {
        if self.suggestions.is_empty() {
            println!();
            return;
        }
        for (idx, suggestion) in self.suggestions.iter().enumerate() {
            println!("  {} {suggestion}", format!("[{}]", idx + 1).dimmed());
        }
        println!("{}\n", "Type /use N to ask one of these.".dimmed());
    }
}

fn nth_conversation(
    snapshot: &StoreSnapshot,
    n: usize,
) -> Option<&Conversation> {
    let conversation = snapshot.conversations.get(n - 1);
    if conversation.is_none() {
        println!("{}", "No such conversation, see /list.".bright_red());
    }
    conversation
}

fn print_list(snapshot: &StoreSnapshot) {
    if snapshot.conversations.is_empty() {
        println!("No conversations yet.");
        return;
    }
    for (idx, conversation) in snapshot.conversations.iter().enumerate() {
        let is_active = snapshot.active_id.as_ref() == Some(&conversation.id);
        let marker = if is_active { "*" } else { " " };
        println!(
            "{} {:>3}  {}  {}",
            marker.bright_cyan(),
            idx + 1,
            conversation.title,
            conversation
                .timestamp
                .format("%Y-%m-%d %H:%M")
                .to_string()
                .dimmed()
        );
    }
}

fn print_conversation(conversation: &Conversation) {
    println!("\n{}", conversation.title.bold());
    for message in &conversation.messages {
        let text = match &message.content {
            MessageContent::Text(text) => text.as_str(),
            MessageContent::Pending => "…",
        };
        match message.sender {
            Sender::User => println!("{} {text}", BAR_CHAR.bright_green()),
            Sender::Bot => {
                println!("{}🤖 {}", BAR_CHAR.bright_cyan(), text.bright_white())
            }
        }
    }
    println!();
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
