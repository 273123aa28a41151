// REPL command parsing.

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Draft a listing from a photo on disk, with optional seller notes.
    Photo { path: String, notes: String },
    Show,
    History,
    Publish,
    Cancel,
    Reset,
    Help,
    Quit,
    /// Anything that is not a command is a chat message.
    Chat(String),
    Empty,
}

pub const HELP: &str = "\
Commands:
  /photo <path> [notes]  draft a listing from a product photo
  /show                  show the current listing
  /history               show the conversation so far
  /publish               submit the listing to the backend
  /cancel                abort the request in flight
  /reset                 start a new session
  /help                  show this help
  /quit                  exit
Anything else is sent to the assistant as a chat message.
Ctrl+C cancels a running request, or exits when idle.";

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Command::Empty);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Command::Chat(line.to_string()));
        };

        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };
        match name.to_lowercase().as_str() {
            "photo" | "p" => {
                let (path, notes) = match args.split_once(char::is_whitespace) {
                    Some((path, notes)) => (path, notes.trim()),
                    None => (args, ""),
                };
                if path.is_empty() {
                    return Err("usage: /photo <path> [notes]".to_string());
                }
                Ok(Command::Photo {
                    path: path.to_string(),
                    notes: notes.to_string(),
                })
            }
            "show" => Ok(Command::Show),
            "history" => Ok(Command::History),
            "publish" => Ok(Command::Publish),
            "cancel" => Ok(Command::Cancel),
            "reset" => Ok(Command::Reset),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(format!("unknown command /{other}, try /help")),
        }
    }
}
