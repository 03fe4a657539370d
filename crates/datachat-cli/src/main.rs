use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use datachat_core::{HistoryManager, JsonSessionStore, Settings};

mod app;
mod attachments;
mod commands;
mod logging;
mod theme;

#[derive(Parser)]
#[command(name = "datachat")]
#[command(about = "Chat with Gemini about images and CSV data")]
#[command(version)]
struct Cli {
    /// Run a single prompt and exit
    #[arg(short, long)]
    prompt: Option<String>,

    /// Gemini model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Directory holding saved sessions
    #[arg(long)]
    sessions_dir: Option<PathBuf>,

    /// CSV file or URL to load before the first prompt
    #[arg(long)]
    csv: Option<String>,

    /// Image to attach to the first prompt
    #[arg(long)]
    image: Option<PathBuf>,

    /// Color theme (dark, tokyo-night, dracula, basic)
    #[arg(long, default_value = "dark")]
    theme: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // a missing .env is fine; the key may already be exported
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut settings = Settings::load();
    if let Some(ref model) = cli.model {
        settings.llm.model = model.clone();
    }
    if let Some(ref dir) = cli.sessions_dir {
        settings.storage.sessions_dir = dir.clone();
    }

    let _log_guard = logging::init(&settings.logging)?;
    tracing::info!("Starting datachat v{}", env!("CARGO_PKG_VERSION"));

    let handler = app::build_handler(&settings).inspect_err(|e| {
        tracing::error!("Startup failed: {e}");
    })?;

    let store = JsonSessionStore::new(&settings.storage.sessions_dir)?;
    let mut history = HistoryManager::new(Box::new(store));
    match history.prune_expired(settings.max_session_age()) {
        Ok(0) => {}
        Ok(n) => tracing::info!("Removed {n} expired session(s)"),
        Err(e) => tracing::warn!("Session cleanup failed: {e}"),
    }
    let outcome = history.initialize();

    let mut app = app::App::new(settings, handler, history, &cli.theme);
    app.report_restore(&outcome);

    if let Some(ref source) = cli.csv {
        app.load_csv(source).await;
    }
    if let Some(ref path) = cli.image {
        app.attach_image(path);
    }

    if let Some(prompt) = cli.prompt {
        app.run_single_prompt(&prompt).await?;
    } else {
        app.run_repl().await?;
    }

    Ok(())
}
