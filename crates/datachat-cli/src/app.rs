use std::io::Write;
use std::path::Path;

use anyhow::Result;
use crossterm::style::{Color, Stylize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use datachat_core::constants::ui;
use datachat_core::llm::estimate_messages;
use datachat_core::{
    Attachment, ChatError, ChatEvent, ChatMessage, CsvDataset, ErrorKind, GeminiClient,
    HistoryManager, Reply, ResponseHandler, RestoreOutcome, Role, SessionId, Settings, UserTurn,
};

use crate::attachments::{image_after_failure, load_image, plot_count, save_plots};
use crate::commands::{handle_command, CommandResult};
use crate::theme::Theme;

/// Response handler for the configured model. Fails when no API key is set.
pub fn build_handler(settings: &Settings) -> Result<ResponseHandler, ChatError> {
    let client: GeminiClient = settings.build_client()?;
    Ok(ResponseHandler::new(Box::new(client)).with_code_execution(settings.llm.code_execution))
}

pub struct App {
    settings: Settings,
    history: HistoryManager,
    handler: ResponseHandler,
    theme: Theme,
    pending_image: Option<Attachment>,
    dataset: Option<CsvDataset>,
    show_timestamps: bool,
}

impl App {
    pub fn new(
        settings: Settings,
        handler: ResponseHandler,
        history: HistoryManager,
        theme: &str,
    ) -> Self {
        Self {
            show_timestamps: settings.chat.show_timestamps,
            settings,
            history,
            handler,
            theme: Theme::by_name(theme),
            pending_image: None,
            dataset: None,
        }
    }

    // ── Output helpers ──────────────────────────────────────────────────

    fn say(&self, color: Color, text: &str) {
        println!("{}", text.with(color));
    }

    fn system(&self, text: &str) {
        self.say(self.theme.system_color, text);
    }

    fn warn(&self, text: &str) {
        self.say(self.theme.warning, text);
    }

    fn error(&self, err: &ChatError) {
        let text = match err.kind() {
            ErrorKind::Remote => ui::api_error(&err.to_string()),
            _ => format!("Error: {err}"),
        };
        self.say(self.theme.error, &text);
    }

    fn header(&self, role: Role, time: Option<String>) -> String {
        let (name, color) = match role {
            Role::User => ("You", self.theme.user_color),
            Role::Assistant => ("Gemini", self.theme.assistant_color),
        };
        let stamp = match time {
            Some(t) if self.show_timestamps => format!("[{t}] ").with(self.theme.muted).to_string(),
            _ => String::new(),
        };
        format!("{stamp}{}", format!("{name}:").with(color).bold())
    }

    fn render_message(&self, message: &ChatMessage) {
        println!(
            "{} {}",
            self.header(message.role, Some(message.display_time())),
            message.content
        );
        if let Some(image) = &message.image {
            self.say(
                self.theme.muted,
                &format!("  [image: {}, {} bytes]", image.mime_type, image.len()),
            );
        }
        if !message.plots.is_empty() {
            self.say(
                self.theme.muted,
                &format!("  [{} plot(s)]", message.plots.len()),
            );
        }
    }

    fn render_history(&self) {
        for message in self.history.current_messages() {
            self.render_message(message);
        }
    }

    pub fn print_banner(&self) {
        println!("{}", ui::APP_TITLE.with(self.theme.accent).bold());
        self.say(self.theme.muted, ui::POWERED_BY);
        self.say(
            self.theme.muted,
            &format!(
                "Model: {} | Type /help for commands\n",
                self.handler.model_name()
            ),
        );
    }

    pub fn report_restore(&self, outcome: &RestoreOutcome) {
        match outcome {
            RestoreOutcome::Restored { id, message_count } => {
                self.system(&format!(
                    "Restored session {id} ({message_count} messages)"
                ));
                self.render_history();
            }
            RestoreOutcome::Fresh => {
                self.system(&format!("New session {}", self.history.session_id()));
            }
            RestoreOutcome::Skipped { id, reason } => {
                self.warn(&format!(
                    "Could not restore session {id}: {reason}\nStarted new session {}",
                    self.history.session_id()
                ));
            }
            RestoreOutcome::Unavailable { reason } => {
                self.warn(&format!("Saved sessions unavailable: {reason}"));
            }
        }
    }

    // ── Attachments ─────────────────────────────────────────────────────

    pub fn attach_image(&mut self, path: &Path) {
        match load_image(path) {
            Ok(image) => {
                self.system(&format!(
                    "Image attached to your next message: {} ({} bytes)",
                    path.display(),
                    image.len()
                ));
                self.pending_image = Some(image);
            }
            Err(e) => self.error(&e),
        }
    }

    pub async fn load_csv(&mut self, source: &str) {
        self.system("Loading CSV...");
        match CsvDataset::load(source).await {
            Ok(dataset) => {
                println!("{}", dataset.format_summary());
                if dataset.is_large() {
                    self.warn(&format!(
                        "Large dataset: only the first {} rows are sent with each question.",
                        self.settings.chat.csv_max_rows
                    ));
                }
                self.system("CSV loaded. Ask a question about it, or /csv off to stop.");
                self.dataset = Some(dataset);
            }
            Err(e) => self.error(&e),
        }
    }

    // ── Chat turn ───────────────────────────────────────────────────────

    pub async fn send(&mut self, text: &str) -> datachat_core::Result<Reply> {
        let mut turn = UserTurn::new(text);
        let image = self.pending_image.take();
        if let Some(image) = &image {
            turn = turn.with_image(image.clone());
        }
        if let Some(dataset) = &self.dataset {
            turn = turn.with_data_context(dataset.generate_context(self.settings.chat.csv_max_rows));
        }

        let first_plot = plot_count(self.history.current_messages());
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ChatEvent>();

        let theme = self.theme.clone();
        let assistant_header = self.header(Role::Assistant, Some(now()));
        let render = async move {
            let mut started = false;
            while let Some(event) = event_rx.recv().await {
                match event {
                    ChatEvent::Status(status) if !started && status != ui::COMPLETE => {
                        println!("{}", status.with(theme.muted));
                    }
                    ChatEvent::Status(_) => {}
                    ChatEvent::Fragment(fragment) => {
                        if !started {
                            print!("{assistant_header} ");
                            started = true;
                        }
                        print!("{fragment}");
                        let _ = std::io::stdout().flush();
                    }
                    ChatEvent::PersistenceFailed(e) => {
                        eprintln!("{}", format!("Could not save session: {e}").with(theme.warning));
                    }
                    ChatEvent::Complete { text, plots } => {
                        if !started {
                            print!("{assistant_header} {text}");
                        }
                        println!();
                        if !plots.is_empty() {
                            println!(
                                "{}",
                                format!("{} plot(s) generated", plots.len()).with(theme.success)
                            );
                        }
                    }
                    ChatEvent::Error(_) => {
                        if started {
                            println!();
                        }
                    }
                }
            }
        };

        let (result, ()) = tokio::join!(
            self.handler.respond(&mut self.history, turn, event_tx),
            render
        );

        match &result {
            Ok(reply) => self.write_plots(first_plot, reply),
            Err(e) => {
                self.error(e);
                self.pending_image = image_after_failure(image, e);
                if self.pending_image.is_some() {
                    self.system("Image still attached.");
                }
            }
        }
        result
    }

    fn write_plots(&self, first: usize, reply: &Reply) {
        match save_plots(
            &self.settings.chat.plots_dir,
            self.history.session_id(),
            first,
            &reply.plots,
        ) {
            Ok(paths) => {
                for path in paths {
                    self.say(self.theme.success, &format!("  saved {}", path.display()));
                }
            }
            Err(e) => self.warn(&format!("Could not save plots: {e}")),
        }
    }

    // ── Commands ────────────────────────────────────────────────────────

    /// Returns false when the user asked to quit.
    async fn handle_slash(&mut self, result: CommandResult) -> bool {
        match result {
            CommandResult::Message(msg) => println!("{msg}"),
            CommandResult::Quit => return false,
            CommandResult::Clear => match self.history.clear() {
                Ok(()) => self.system("Chat cleared."),
                Err(e) => self.warn(&format!("Chat cleared, but the session could not be saved: {e}")),
            },
            CommandResult::NewSession => {
                let id = self.history.start_new_session().clone();
                self.system(&format!("New session started: {id}"));
            }
            CommandResult::ListSessions => match self.history.list_sessions() {
                Ok(sessions) if sessions.is_empty() => self.system("No saved sessions."),
                Ok(sessions) => {
                    let mut list = String::from("Saved sessions:\n");
                    for s in &sessions {
                        let marker = if &s.id == self.history.session_id() { "*" } else { " " };
                        let count = s
                            .message_count
                            .map(|n| format!("{n} msgs"))
                            .unwrap_or_else(|| "unreadable".to_string());
                        list.push_str(&format!(
                            " {marker} {} | {count} | {}\n",
                            s.id,
                            s.last_modified
                                .with_timezone(&chrono::Local)
                                .format("%Y-%m-%d %H:%M")
                        ));
                    }
                    list.push_str("\nUse /load <id> to resume a session.");
                    self.system(&list);
                }
                Err(e) => self.error(&e),
            },
            CommandResult::LoadSession(raw) => {
                let loaded = SessionId::parse(&raw).and_then(|id| self.history.switch_to(&id));
                match loaded {
                    Ok(count) => {
                        self.system(&format!("Loaded session {raw} ({count} messages)"));
                        self.render_history();
                    }
                    Err(e) => self.error(&e),
                }
            }
            CommandResult::DeleteSession(raw) => {
                let deleted = SessionId::parse(&raw).and_then(|id| self.history.delete_session(&id));
                match deleted {
                    Ok(()) => self.system(&format!(
                        "Deleted session {raw}. Active session: {}",
                        self.history.session_id()
                    )),
                    Err(e) => self.error(&e),
                }
            }
            CommandResult::AttachImage(path) => self.attach_image(Path::new(&path)),
            CommandResult::LoadCsv(source) => self.load_csv(&source).await,
            CommandResult::UnloadCsv => {
                self.dataset = None;
                self.system("CSV unloaded.");
            }
            CommandResult::ShowStatus => self.show_status(),
            CommandResult::ShowTokens => {
                let estimate = estimate_messages(self.history.current_messages());
                let limit = self.handler.budget().limit();
                self.system(&format!(
                    "Session size: ~{estimate} tokens of {limit} allowed per request"
                ));
            }
            CommandResult::ToggleTimestamps => {
                self.show_timestamps = !self.show_timestamps;
                let state = if self.show_timestamps { "on" } else { "off" };
                self.system(&format!("Timestamps {state}"));
            }
            CommandResult::ModelChanged(model) => {
                let previous = std::mem::replace(&mut self.settings.llm.model, model.clone());
                match build_handler(&self.settings) {
                    Ok(handler) => {
                        self.handler = handler;
                        self.system(&format!("Model changed to: {model}"));
                    }
                    Err(e) => {
                        self.settings.llm.model = previous;
                        self.error(&e);
                    }
                }
            }
            CommandResult::ThemeChanged(name) => {
                if Theme::all_names().contains(&name.as_str()) {
                    self.theme = Theme::by_name(&name);
                    self.system(&format!("Theme changed to: {name}"));
                } else {
                    self.warn(&format!(
                        "Unknown theme: {name}. Available: {}",
                        Theme::all_names().join(", ")
                    ));
                }
            }
            CommandResult::NotACommand => {}
        }
        true
    }

    fn show_status(&self) {
        let dataset = match &self.dataset {
            Some(d) => format!("{} ({} rows, {} columns)", d.source(), d.row_count(), d.column_count()),
            None => "none".to_string(),
        };
        let image = match &self.pending_image {
            Some(i) => format!("{} ({} bytes)", i.mime_type, i.len()),
            None => "none".to_string(),
        };
        self.system(&format!(
            "Model:          {}\n\
             Session:        {} ({} messages)\n\
             Sessions dir:   {}\n\
             Dataset:        {dataset}\n\
             Pending image:  {image}\n\
             Code execution: {}\n\
             Timestamps:     {}",
            self.handler.model_name(),
            self.history.session_id(),
            self.history.message_count(),
            self.settings.storage.sessions_dir.display(),
            if self.settings.llm.code_execution { "on" } else { "off" },
            if self.show_timestamps { "on" } else { "off" },
        ));
    }

    // ── Entry points ────────────────────────────────────────────────────

    pub async fn run_single_prompt(&mut self, prompt: &str) -> Result<()> {
        self.send(prompt).await?;
        Ok(())
    }

    pub async fn run_repl(&mut self) -> Result<()> {
        self.print_banner();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            print!("{} ", ">".with(self.theme.accent).bold());
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let input = line.trim();
            if input.is_empty() {
                continue;
            }

            match handle_command(input) {
                CommandResult::NotACommand => {
                    if self.show_timestamps {
                        println!("{}", self.header(Role::User, Some(now())));
                    }
                    // failures are already reported; the turn stays in history for retry
                    let _ = self.send(input).await;
                }
                command => {
                    if !self.handle_slash(command).await {
                        break;
                    }
                }
            }
        }

        self.system("Goodbye.");
        Ok(())
    }
}

fn now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
