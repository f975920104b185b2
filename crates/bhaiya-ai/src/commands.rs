/// A line typed at the prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Go back to the home state.
    New,
    /// Show the conversation list.
    List,
    /// Open the N-th conversation of the list (1-based).
    Open(usize),
    /// Delete the N-th conversation of the list (1-based).
    Delete(usize),
    /// Ask for new suggestions.
    Suggest,
    /// Send the N-th suggestion (1-based).
    Use(usize),
    Help,
    Quit,
    /// Send the text to the active conversation.
    Send(String),
    /// Nothing typed.
    Empty,
    /// A malformed command, with the problem.
    Invalid(String),
}

pub const HELP: &str = "\
/new          start a new conversation
/list         show all conversations
/open N       open conversation N
/delete N     delete conversation N
/suggest      get new suggestions
/use N        send suggestion N
/help         show this help
/quit         exit

Anything else is sent as a message. Press Ctrl-C to stop a reply.";

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Send(line.to_owned());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, Some(arg.trim())),
            None => (rest, None),
        };
        match name.to_ascii_lowercase().as_str() {
            "new" => Command::New,
            "list" | "ls" => Command::List,
            "open" => with_index(name, arg, Command::Open),
            "delete" | "rm" => with_index(name, arg, Command::Delete),
            "suggest" => Command::Suggest,
            "use" => with_index(name, arg, Command::Use),
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            _ => Command::Invalid(format!("unknown command /{name}")),
        }
    }
}

fn with_index(
    name: &str,
    arg: Option<&str>,
    make: impl FnOnce(usize) -> Command,
) -> Command {
    match arg.map(str::parse::<usize>) {
        Some(Ok(n)) if n > 0 => make(n),
        _ => Command::Invalid(format!("usage: /{name} N (N starts at 1)")),
    }
}
