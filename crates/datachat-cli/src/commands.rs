/// Result of processing a slash command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// Display a message to the user.
    Message(String),
    /// Quit the application.
    Quit,
    /// Empty the active session, keeping its id.
    Clear,
    /// Start a fresh session.
    NewSession,
    /// List saved sessions, newest first.
    ListSessions,
    /// Make a saved session active.
    LoadSession(String),
    /// Delete a saved session.
    DeleteSession(String),
    /// Attach an image to the next prompt.
    AttachImage(String),
    /// Load a CSV from a path or URL.
    LoadCsv(String),
    /// Drop the loaded CSV.
    UnloadCsv,
    /// Show model, session and dataset status.
    ShowStatus,
    /// Show the token estimate of the current session.
    ShowTokens,
    /// Toggle message timestamps.
    ToggleTimestamps,
    /// Change the model.
    ModelChanged(String),
    /// Change the theme.
    ThemeChanged(String),
    /// Not a command - treat as regular input.
    NotACommand,
}

pub fn handle_command(input: &str) -> CommandResult {
    let input = input.trim();
    let (cmd, arg) = match input.split_once(char::is_whitespace) {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (input, ""),
    };

    match cmd {
        "/help" | "/h" => show_help(),
        "/exit" | "/quit" | "/q" => CommandResult::Quit,
        "/clear" => CommandResult::Clear,
        "/new" => CommandResult::NewSession,

        // Session commands
        "/sessions" | "/history" => CommandResult::ListSessions,
        "/load" => {
            if arg.is_empty() {
                CommandResult::Message("Usage: /load <session-id>".into())
            } else {
                CommandResult::LoadSession(arg.to_string())
            }
        }
        "/delete" => {
            if arg.is_empty() {
                CommandResult::Message("Usage: /delete <session-id>".into())
            } else {
                CommandResult::DeleteSession(arg.to_string())
            }
        }

        // Attachments
        "/image" => {
            if arg.is_empty() {
                CommandResult::Message(
                    "Usage: /image <path>\nSupported: JPG, JPEG, PNG, GIF, WEBP".into(),
                )
            } else {
                CommandResult::AttachImage(arg.to_string())
            }
        }
        "/csv" => match arg {
            "" => CommandResult::Message(
                "Usage: /csv <path-or-url>\n       /csv off    stop sending the dataset".into(),
            ),
            "off" | "none" => CommandResult::UnloadCsv,
            source => CommandResult::LoadCsv(source.to_string()),
        },

        // Display and model
        "/status" => CommandResult::ShowStatus,
        "/tokens" => CommandResult::ShowTokens,
        "/timestamps" => CommandResult::ToggleTimestamps,
        "/model" => {
            if arg.is_empty() {
                CommandResult::Message("Current model is shown in /status. Use: /model <model-name>".into())
            } else {
                CommandResult::ModelChanged(arg.to_string())
            }
        }
        "/theme" => {
            if arg.is_empty() {
                let themes = crate::theme::Theme::all_names().join(", ");
                CommandResult::Message(format!("Available themes: {themes}\nUsage: /theme <theme-name>"))
            } else {
                CommandResult::ThemeChanged(arg.to_string())
            }
        }
        "/version" => CommandResult::Message(format!("datachat v{}", env!("CARGO_PKG_VERSION"))),

        // Unknown command
        _ => {
            if input.starts_with('/') {
                CommandResult::Message(format!("Unknown command: {cmd}. Type /help for commands."))
            } else {
                CommandResult::NotACommand
            }
        }
    }
}

fn show_help() -> CommandResult {
    let help_text = "\
╭─ datachat Commands ────────────────────────────────────────────╮

  SESSIONS
    /clear                    Clear the current session
    /new                      Start a fresh session
    /sessions, /history       List saved sessions
    /load <id>                Switch to a saved session
    /delete <id>              Delete a saved session

  ATTACHMENTS
    /image <path>             Attach an image to your next message
    /csv <path-or-url>        Load a CSV to ask questions about
    /csv off                  Stop sending the loaded CSV

  DISPLAY & MODEL
    /status                   Show model, session and dataset
    /tokens                   Show the token estimate of this session
    /timestamps               Toggle message timestamps
    /model <name>             Change Gemini model
    /theme <name>             Change color theme

  OTHER
    /help, /h                 Show this help message
    /version                  Show version information
    /exit, /quit, /q          Quit the application

  Ask for a chart (\"plot\", \"visualize\", \"show me ...\") and the
  model runs Python to draw it; plots are saved under plots/.

╰────────────────────────────────────────────────────────────────╯";

    CommandResult::Message(help_text.into())
}
