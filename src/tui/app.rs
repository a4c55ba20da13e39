use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Clear, Paragraph},
    Frame, Terminal,
};
use tokio::sync::mpsc;

use crate::core::api::ApiClient;
use crate::core::chat::ChatController;
use crate::core::upload::UploadEvent;
use crate::core::viewer::ViewerCoordinator;

use super::events::{Action, AppEvent, Focus, Notification, NotificationLevel};
use super::theme;
use super::views::browse::{BrowseResult, BrowseState};
use super::views::chat::ChatViewState;
use super::views::upload::UploadViewState;

/// Central application state (Elm architecture).
pub struct AppState {
    /// Whether the app is still running.
    pub running: bool,
    /// Currently focused top-level view.
    pub focus: Focus,
    /// Catalog browser state.
    pub browse: BrowseState,
    /// Chat view state (transcript presentation, input line).
    pub chat_view: ChatViewState,
    /// Chat session state machine.
    pub chat: ChatController,
    /// Upload form and progress state.
    pub upload: UploadViewState,
    /// Document viewer coordinator for citation jumps.
    viewer: Arc<ViewerCoordinator>,
    /// Active notifications (max 3 visible).
    pub notifications: Vec<Notification>,
    /// Monotonic counter for notification IDs.
    notification_counter: u64,
    /// Whether the help modal is open.
    pub show_help: bool,
    /// Receiver for backend events.
    event_rx: mpsc::UnboundedReceiver<AppEvent>,
    /// Sender for pushing events from within the app.
    event_tx: mpsc::UnboundedSender<AppEvent>,
    api: ApiClient,
}

impl AppState {
    pub fn new(
        event_rx: mpsc::UnboundedReceiver<AppEvent>,
        event_tx: mpsc::UnboundedSender<AppEvent>,
        api: ApiClient,
    ) -> Self {
        Self {
            running: true,
            focus: Focus::Browse,
            browse: BrowseState::new(),
            chat_view: ChatViewState::new(),
            chat: ChatController::new(api.clone()),
            upload: UploadViewState::new(),
            viewer: Arc::new(ViewerCoordinator::new()),
            notifications: Vec::new(),
            notification_counter: 0,
            show_help: false,
            event_rx,
            event_tx,
            api,
        }
    }

    // ── Elm event loop ──────────────────────────────────────────────────

    /// Main event loop: render → select → update → loop.
    pub async fn run(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
        tick_rate: Duration,
    ) -> io::Result<()> {
        let mut tick_interval = tokio::time::interval(tick_rate);
        let mut event_stream = EventStream::new();

        self.browse.load(&self.api, &self.event_tx);
        self.check_server();

        while self.running {
            terminal.draw(|frame| self.render(frame))?;

            tokio::select! {
                _ = tick_interval.tick() => {
                    self.on_tick();
                }
                Some(event) = self.event_rx.recv() => {
                    self.handle_event(event);
                }
                Some(Ok(crossterm_event)) = event_stream.next() => {
                    self.handle_event(AppEvent::Input(crossterm_event));
                }
            }
        }

        Ok(())
    }

    /// Background connectivity probe; failures surface as a notification.
    fn check_server(&self) {
        let api = self.api.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = api.health().await {
                let _ = tx.send(AppEvent::Notify {
                    message: format!("Server unreachable: {e}"),
                    level: NotificationLevel::Error,
                });
            }
        });
    }

    // ── Event handling ──────────────────────────────────────────────────

    fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Input(crossterm_event) => {
                // Help modal consumes all input when open.
                if self.show_help {
                    if let Some(action) = self.map_help_input(&crossterm_event) {
                        self.handle_action(action);
                    }
                    return;
                }

                if self.dispatch_view_input(&crossterm_event) {
                    return;
                }

                if let Some(action) = self.map_input_to_action(crossterm_event) {
                    self.handle_action(action);
                }
            }
            AppEvent::Chat(stream_event) => {
                if let Some(update) = self.chat.apply_event(stream_event) {
                    self.chat_view.on_stream_update(&update);
                }
            }
            AppEvent::ChatSessionReady(session) => {
                // A late response for a document the user already
                // navigated away from must not rebind the controller.
                let on_screen = self
                    .chat_view
                    .document()
                    .is_some_and(|d| d.document_id == session.document_id);
                if on_screen {
                    log::debug!("Chat session {} ready", session.id);
                    self.chat.attach_session(*session);
                    self.chat_view.on_session_ready();
                } else {
                    log::debug!(
                        "Dropping session {} for document {}: another document is open",
                        session.id,
                        session.document_id
                    );
                    self.chat_view
                        .on_stale_session(&self.chat, &self.api, &self.event_tx);
                }
            }
            AppEvent::ChatSessionFailed(error) => {
                self.chat_view.on_session_failed();
                self.push_notification(
                    format!("Could not start chat: {error}"),
                    NotificationLevel::Error,
                );
            }
            AppEvent::ChatCleared {
                keep_system_messages,
            } => {
                self.chat.truncate_local(keep_system_messages);
                self.push_notification("History cleared".to_string(), NotificationLevel::Success);
            }
            AppEvent::Upload(upload_event) => self.handle_upload_event(upload_event),
            AppEvent::Catalog(payload) => self.browse.handle_catalog(payload),
            AppEvent::CatalogFailed(error) => {
                self.browse.load_failed();
                self.push_notification(
                    format!("Catalog load failed: {error}"),
                    NotificationLevel::Error,
                );
            }
            AppEvent::DocumentDeleted(document_id) => {
                log::info!("Deleted document {document_id}");
                self.push_notification("Document deleted".to_string(), NotificationLevel::Success);
                self.browse.load(&self.api, &self.event_tx);
            }
            AppEvent::Notify { message, level } => self.push_notification(message, level),
        }
    }

    fn handle_upload_event(&mut self, event: UploadEvent) {
        // Terminal transitions get a notification; the gauges cover the rest.
        let file_name = self
            .upload
            .tracker
            .get(event.task_id())
            .map(|t| t.file_name.clone());

        match &event {
            UploadEvent::Failed { error, .. } => {
                let name = file_name.unwrap_or_default();
                self.push_notification(
                    format!("{name}: {error}"),
                    NotificationLevel::Error,
                );
            }
            UploadEvent::Progress { status, .. } if status.status.is_failed() => {
                let name = file_name.unwrap_or_default();
                let detail = status
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "processing failed".to_string());
                self.push_notification(format!("{name}: {detail}"), NotificationLevel::Error);
            }
            UploadEvent::Progress { status, .. } if status.status.is_terminal() => {
                let name = file_name.unwrap_or_default();
                self.push_notification(format!("{name} processed"), NotificationLevel::Success);
            }
            _ => {}
        }

        self.upload.tracker.apply(event);
    }

    /// Dispatch input to the currently focused view. Returns true if consumed.
    fn dispatch_view_input(&mut self, event: &Event) -> bool {
        match self.focus {
            Focus::Browse => {
                match self.browse.handle_input(event, &self.api, &self.event_tx) {
                    Some(BrowseResult::Consumed) => true,
                    Some(BrowseResult::OpenChat(doc)) => {
                        self.chat_view
                            .open_document(*doc, &self.chat, &self.api, &self.event_tx);
                        self.focus = Focus::Chat;
                        true
                    }
                    None => false,
                }
            }
            Focus::Chat => self.chat_view.handle_input(
                event,
                &mut self.chat,
                &self.api,
                &self.viewer,
                &self.event_tx,
            ),
            Focus::Upload => self.upload.handle_input(event, &self.api, &self.event_tx),
        }
    }

    // ── Input mapping ───────────────────────────────────────────────────

    fn map_help_input(&self, event: &Event) -> Option<Action> {
        let Event::Key(KeyEvent {
            code,
            kind: KeyEventKind::Press,
            ..
        }) = event
        else {
            return None;
        };
        match code {
            KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q') => Some(Action::CloseHelp),
            _ => None,
        }
    }

    fn map_input_to_action(&self, event: Event) -> Option<Action> {
        let Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) = event
        else {
            return None;
        };

        match (modifiers, code) {
            (KeyModifiers::CONTROL, KeyCode::Char('c')) => Some(Action::Quit),
            (KeyModifiers::NONE | KeyModifiers::SHIFT, _) => match code {
                KeyCode::Tab => Some(Action::TabNext),
                KeyCode::BackTab => Some(Action::TabPrev),
                // Plain chars only reach here from views that don't type.
                KeyCode::Char('q') => Some(Action::Quit),
                KeyCode::Char('?') => Some(Action::ShowHelp),
                KeyCode::Char('1') => Some(Action::FocusBrowse),
                KeyCode::Char('2') => Some(Action::FocusChat),
                KeyCode::Char('3') => Some(Action::FocusUpload),
                _ => None,
            },
            _ => None,
        }
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.running = false,
            Action::FocusBrowse => self.focus = Focus::Browse,
            Action::FocusChat => self.focus = Focus::Chat,
            Action::FocusUpload => self.focus = Focus::Upload,
            Action::TabNext => self.focus = self.focus.next(),
            Action::TabPrev => self.focus = self.focus.prev(),
            Action::ShowHelp => self.show_help = true,
            Action::CloseHelp => self.show_help = false,
        }
    }

    // ── Notifications ───────────────────────────────────────────────────

    /// Push a notification (dedup by message, max 3).
    pub fn push_notification(&mut self, message: String, level: NotificationLevel) {
        if self.notifications.iter().any(|n| n.message == message) {
            return;
        }

        self.notification_counter += 1;
        self.notifications.push(Notification {
            id: self.notification_counter,
            message,
            level,
            ttl_ticks: 100,
        });

        while self.notifications.len() > 3 {
            self.notifications.remove(0);
        }
    }

    /// Tick: decrement notification TTLs, dismiss expired.
    fn on_tick(&mut self) {
        for n in &mut self.notifications {
            n.ttl_ticks = n.ttl_ticks.saturating_sub(1);
        }
        self.notifications.retain(|n| n.ttl_ticks > 0);
    }

    // ── Rendering ───────────────────────────────────────────────────────

    fn render(&self, frame: &mut Frame) {
        let area = frame.area();
        let chunks = Layout::vertical([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(area);

        self.render_tabs(frame, chunks[0]);
        self.render_content(frame, chunks[1]);
        self.render_status_bar(frame, chunks[2]);

        self.render_notifications(frame, area);
        if self.show_help {
            self.render_help_modal(frame, area);
        }
    }

    fn render_tabs(&self, frame: &mut Frame, area: Rect) {
        let mut spans = vec![Span::styled(" tlfchat ", theme::brand_badge()), Span::raw("  ")];
        for focus in Focus::ALL {
            let style = if focus == self.focus {
                theme::highlight()
            } else {
                theme::muted()
            };
            spans.push(Span::styled(format!(" {} ", focus.label()), style));
            spans.push(Span::raw(" "));
        }
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn render_content(&self, frame: &mut Frame, area: Rect) {
        match self.focus {
            Focus::Browse => self.browse.render(frame, area, true),
            Focus::Chat => self.chat_view.render(frame, area, &self.chat, true),
            Focus::Upload => self.upload.render(frame, area, true),
        }
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let stream_status = if self.chat.is_streaming() {
            Span::styled("streaming", Style::default().fg(theme::PRIMARY_LIGHT))
        } else {
            Span::styled("idle", theme::muted())
        };
        let upload_status = if self.upload.tracker.any_active() {
            Span::styled("uploading", Style::default().fg(theme::WARNING))
        } else {
            Span::styled("idle", theme::muted())
        };

        let status = Line::from(vec![
            Span::styled(
                self.focus.label(),
                Style::default()
                    .fg(theme::PRIMARY_LIGHT)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" │ "),
            Span::styled("chat:", theme::key_hint()),
            stream_status,
            Span::raw(" │ "),
            Span::styled("upload:", theme::key_hint()),
            upload_status,
            Span::raw(" │ "),
            Span::styled("Tab", theme::key_hint()),
            Span::raw(":nav "),
            Span::styled("?", theme::key_hint()),
            Span::raw(":help "),
            Span::styled("Ctrl+C", theme::key_hint()),
            Span::raw(":quit"),
        ]);
        frame.render_widget(Paragraph::new(status), area);
    }

    fn render_notifications(&self, frame: &mut Frame, area: Rect) {
        if self.notifications.is_empty() {
            return;
        }

        let max_width = 50.min(area.width.saturating_sub(2));
        let height = self.notifications.len() as u16;
        let x = area.width.saturating_sub(max_width + 1);
        let notification_area = Rect::new(x, 1, max_width, height);

        let lines: Vec<Line> = self
            .notifications
            .iter()
            .map(|n| {
                let (prefix, color) = match n.level {
                    NotificationLevel::Info => ("ℹ", theme::INFO),
                    NotificationLevel::Success => ("✓", theme::SUCCESS),
                    NotificationLevel::Warning => ("⚠", theme::WARNING),
                    NotificationLevel::Error => ("✗", theme::ERROR),
                };
                Line::from(vec![
                    Span::styled(
                        format!(" {prefix} "),
                        Style::default().fg(color).add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(&n.message),
                ])
            })
            .collect();

        frame.render_widget(Clear, notification_area);
        frame.render_widget(Paragraph::new(lines), notification_area);
    }

    fn render_help_modal(&self, frame: &mut Frame, area: Rect) {
        let modal = centered_rect(60, 70, area);

        let keybindings = [
            ("Global:", ""),
            ("Tab / Shift+Tab", "Next / previous view"),
            ("1/2/3", "Jump to view (outside text fields)"),
            ("?", "Toggle this help"),
            ("Ctrl+C", "Quit"),
            ("", ""),
            ("Browse:", ""),
            ("j/k", "Move selection"),
            ("Enter / l", "Open level or document chat"),
            ("h / Backspace", "Go up a level"),
            ("r", "Refresh"),
            ("d", "Delete document (with confirm)"),
            ("", ""),
            ("Chat:", ""),
            ("Enter", "Send message"),
            ("Esc", "Cancel active stream"),
            ("Ctrl+T", "Toggle document context"),
            ("Ctrl+L", "Clear history (keeps system messages)"),
            ("Alt+1-9", "Open citation in viewer"),
            ("PgUp/PgDn", "Scroll transcript"),
            ("", ""),
            ("Upload:", ""),
            ("↑/↓ / Enter", "Move between fields"),
            ("Enter (Add file)", "Queue the typed path"),
            ("Ctrl+S", "Validate and upload batch"),
            ("Ctrl+D", "Drop last pending file"),
            ("Ctrl+K", "Clear finished tasks"),
        ];

        let lines: Vec<Line> = keybindings
            .iter()
            .map(|(key, desc)| {
                if desc.is_empty() {
                    Line::from(Span::styled(*key, theme::heading()))
                } else {
                    Line::from(vec![
                        Span::styled(format!("  {key:<18}"), theme::highlight()),
                        Span::styled(*desc, Style::default().fg(theme::TEXT)),
                    ])
                }
            })
            .collect();

        frame.render_widget(Clear, modal);
        frame.render_widget(
            Paragraph::new(lines).block(theme::block_focused("Help")),
            modal,
        );
    }
}

/// A rect centered in `area` with the given percentage size.
fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .split(area);
    let horizontal = Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .split(vertical[1]);
    horizontal[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{ChatSession, DocumentInfo};

    fn test_app() -> AppState {
        let (tx, rx) = mpsc::unbounded_channel();
        AppState::new(rx, tx, ApiClient::new("http://localhost:0", ""))
    }

    fn document(document_id: &str) -> DocumentInfo {
        serde_json::from_value(serde_json::json!({
            "document_id": document_id,
            "filename": format!("{document_id}.pdf"),
            "status": "completed",
            "created_at": "2025-03-01T10:00:00"
        }))
        .unwrap()
    }

    fn session(id: &str, document_id: &str) -> ChatSession {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "document_id": document_id,
            "created_at": "2025-03-01T10:00:00",
            "updated_at": "2025-03-01T10:00:00"
        }))
        .unwrap()
    }

    #[test]
    fn test_notifications_dedup_and_cap() {
        let mut app = test_app();
        app.push_notification("same".to_string(), NotificationLevel::Info);
        app.push_notification("same".to_string(), NotificationLevel::Info);
        assert_eq!(app.notifications.len(), 1);

        for i in 0..5 {
            app.push_notification(format!("n{i}"), NotificationLevel::Info);
        }
        assert_eq!(app.notifications.len(), 3);
    }

    #[test]
    fn test_tick_expires_notifications() {
        let mut app = test_app();
        app.push_notification("soon gone".to_string(), NotificationLevel::Info);
        app.notifications[0].ttl_ticks = 1;
        app.on_tick();
        assert!(app.notifications.is_empty());
    }

    #[tokio::test]
    async fn test_session_for_current_document_attaches() {
        let mut app = test_app();
        app.chat_view
            .open_document(document("doc-a"), &app.chat, &app.api, &app.event_tx);

        app.handle_event(AppEvent::ChatSessionReady(Box::new(session(
            "sess-a", "doc-a",
        ))));

        assert_eq!(app.chat.session().map(|s| s.id.as_str()), Some("sess-a"));
    }

    #[tokio::test]
    async fn test_stale_session_for_other_document_is_dropped() {
        let mut app = test_app();
        // The user opened doc-b, then switched to doc-a before doc-b's
        // session creation came back.
        app.chat_view
            .open_document(document("doc-b"), &app.chat, &app.api, &app.event_tx);
        app.chat_view
            .open_document(document("doc-a"), &app.chat, &app.api, &app.event_tx);

        app.handle_event(AppEvent::ChatSessionReady(Box::new(session(
            "sess-b", "doc-b",
        ))));

        // doc-b's session must not bind while doc-a is on screen.
        assert!(app.chat.session().is_none());

        // doc-a's own session still attaches normally afterwards.
        app.handle_event(AppEvent::ChatSessionReady(Box::new(session(
            "sess-a", "doc-a",
        ))));
        assert_eq!(
            app.chat.session().map(|s| s.document_id.as_str()),
            Some("doc-a")
        );
    }

    #[test]
    fn test_tab_actions_cycle_focus() {
        let mut app = test_app();
        assert_eq!(app.focus, Focus::Browse);
        app.handle_action(Action::TabNext);
        assert_eq!(app.focus, Focus::Chat);
        app.handle_action(Action::TabPrev);
        assert_eq!(app.focus, Focus::Browse);
    }
}
