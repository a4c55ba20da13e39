use std::io;
use std::time::Duration;

use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc;

use tlfchat::config::AppConfig;
use tlfchat::core::api::ApiClient;
use tlfchat::tui::app::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load();
    let _log_guard = tlfchat::core::logging::init(&config.data_dir());
    log::info!("{} v{} starting", tlfchat::NAME, tlfchat::VERSION);

    let base_path = config.resolved_base_path();
    let api = ApiClient::new(&config.server.url, &base_path);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    if config.tui.mouse_enabled {
        execute!(stdout, EnableMouseCapture)?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let mut app = AppState::new(event_rx, event_tx, api);
    let tick_rate = Duration::from_millis(config.tui.tick_rate_ms);
    let result = app.run(&mut terminal, tick_rate).await;

    // Restore terminal
    disable_raw_mode()?;
    if config.tui.mouse_enabled {
        execute!(terminal.backend_mut(), DisableMouseCapture)?;
    }
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    log::info!("{} exiting", tlfchat::NAME);
    result?;
    Ok(())
}
