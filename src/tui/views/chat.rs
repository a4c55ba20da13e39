//! Chat view: transcript, streaming tail, input line, and citation jumps.

use std::sync::Arc;

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;
use tokio::sync::mpsc;

use crate::core::api::ApiClient;
use crate::core::chat::{ChatController, ChatUpdate};
use crate::core::models::{ChatMessage, DocumentInfo, MessageRole, NewChatRequest, QuerySource};
use crate::core::viewer::{ShowOutcome, ViewerCoordinator};

use super::super::events::{AppEvent, NotificationLevel};
use super::super::theme;
use super::super::widgets::InputLine;

pub struct ChatViewState {
    input: InputLine,
    document: Option<DocumentInfo>,
    session_loading: bool,
    /// Send document context alongside each question.
    include_context: bool,
    /// Manual scroll offset; ignored while following the tail.
    scroll: u16,
    follow_tail: bool,
    last_error: Option<String>,
}

impl ChatViewState {
    pub fn new() -> Self {
        Self {
            input: InputLine::new(),
            document: None,
            session_loading: false,
            include_context: true,
            scroll: 0,
            follow_tail: true,
            last_error: None,
        }
    }

    pub fn document(&self) -> Option<&DocumentInfo> {
        self.document.as_ref()
    }

    /// Open (or resume) a chat for `doc`.
    ///
    /// If the controller already holds a session for this document the
    /// existing conversation is kept; otherwise session creation runs in
    /// the background and completes via `ChatSessionReady`.
    pub fn open_document(
        &mut self,
        doc: DocumentInfo,
        controller: &ChatController,
        api: &ApiClient,
        tx: &mpsc::UnboundedSender<AppEvent>,
    ) {
        let already_open = controller
            .session()
            .is_some_and(|s| s.document_id == doc.document_id);
        let document_id = doc.document_id.clone();
        self.document = Some(doc);
        self.last_error = None;
        self.follow_tail = true;

        if already_open || self.session_loading {
            return;
        }
        self.session_loading = true;

        let api = api.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let request = NewChatRequest {
                document_id,
                title: None,
            };
            let event = match api.create_chat(&request).await {
                Ok(session) => AppEvent::ChatSessionReady(Box::new(session)),
                Err(e) => AppEvent::ChatSessionFailed(e.to_string()),
            };
            let _ = tx.send(event);
        });
    }

    pub fn on_session_ready(&mut self) {
        self.session_loading = false;
    }

    pub fn on_session_failed(&mut self) {
        self.session_loading = false;
    }

    /// A session for a document that is no longer on screen arrived.
    ///
    /// The payload was dropped; retry creation for the document that is
    /// open now, since its own request may have been skipped while the
    /// stale one was in flight.
    pub fn on_stale_session(
        &mut self,
        controller: &ChatController,
        api: &ApiClient,
        tx: &mpsc::UnboundedSender<AppEvent>,
    ) {
        self.session_loading = false;
        if let Some(doc) = self.document.clone() {
            self.open_document(doc, controller, api, tx);
        }
    }

    /// React to a stream state change from the controller.
    pub fn on_stream_update(&mut self, update: &ChatUpdate) {
        match update {
            ChatUpdate::Appended | ChatUpdate::Completed => {
                self.follow_tail = true;
            }
            ChatUpdate::Failed(message) => {
                self.last_error = Some(message.clone());
            }
        }
    }

    pub fn handle_input(
        &mut self,
        event: &Event,
        controller: &mut ChatController,
        api: &ApiClient,
        viewer: &Arc<ViewerCoordinator>,
        tx: &mpsc::UnboundedSender<AppEvent>,
    ) -> bool {
        let Event::Key(
            key @ KeyEvent {
                code,
                modifiers,
                kind: KeyEventKind::Press,
                ..
            },
        ) = event
        else {
            return false;
        };

        // Citation jumps: Alt+1..9 opens the nth source of the latest
        // assistant message in the viewer.
        if *modifiers == KeyModifiers::ALT {
            if let KeyCode::Char(c @ '1'..='9') = code {
                let index = (*c as usize) - ('1' as usize);
                self.open_citation(index, controller, api, viewer, tx);
                return true;
            }
            return false;
        }

        match (*modifiers, *code) {
            (KeyModifiers::NONE, KeyCode::Enter) => {
                self.last_error = None;
                let event_tx = tx.clone();
                let sent = controller.send_message(self.input.text(), self.include_context, {
                    move |ev| {
                        let _ = event_tx.send(AppEvent::Chat(ev));
                    }
                });
                if sent {
                    self.input.clear();
                    self.follow_tail = true;
                } else if controller.is_streaming() {
                    let _ = tx.send(AppEvent::Notify {
                        message: "Still streaming; Esc to cancel".to_string(),
                        level: NotificationLevel::Warning,
                    });
                }
                true
            }
            (KeyModifiers::NONE, KeyCode::Esc) if controller.is_streaming() => {
                controller.cancel();
                true
            }
            (KeyModifiers::CONTROL, KeyCode::Char('l')) => {
                self.clear_history(controller, api, tx);
                true
            }
            (KeyModifiers::CONTROL, KeyCode::Char('t')) => {
                self.include_context = !self.include_context;
                true
            }
            (KeyModifiers::NONE, KeyCode::PageUp) => {
                self.follow_tail = false;
                self.scroll = self.scroll.saturating_sub(5);
                true
            }
            (KeyModifiers::NONE, KeyCode::PageDown) => {
                self.scroll = self.scroll.saturating_add(5);
                true
            }
            (KeyModifiers::NONE, KeyCode::End) if self.input.is_empty() => {
                self.follow_tail = true;
                true
            }
            _ => self.input.handle_key(key),
        }
    }

    fn clear_history(
        &mut self,
        controller: &ChatController,
        api: &ApiClient,
        tx: &mpsc::UnboundedSender<AppEvent>,
    ) {
        let Some(session_id) = controller.session().map(|s| s.id.clone()) else {
            return;
        };
        let api = api.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            match api.clear_history(&session_id, true).await {
                Ok(_) => {
                    let _ = tx.send(AppEvent::ChatCleared {
                        keep_system_messages: true,
                    });
                }
                Err(e) => {
                    let _ = tx.send(AppEvent::Notify {
                        message: format!("Clear failed: {e}"),
                        level: NotificationLevel::Error,
                    });
                }
            }
        });
    }

    fn open_citation(
        &self,
        index: usize,
        controller: &ChatController,
        api: &ApiClient,
        viewer: &Arc<ViewerCoordinator>,
        tx: &mpsc::UnboundedSender<AppEvent>,
    ) {
        let Some(document_id) = self.document.as_ref().map(|d| d.document_id.clone()) else {
            return;
        };
        let source = controller
            .messages()
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant && !m.sources_used.is_empty())
            .and_then(|m| m.sources_used.get(index).cloned());
        let Some(source) = source else {
            return;
        };

        let serve_url = api.serve_url(&document_id);
        let page = source.page_number.map(i64::from);
        let search = source.output_number.clone().or_else(|| source.title.clone());
        let viewer = Arc::clone(viewer);
        let tx = tx.clone();
        tokio::spawn(async move {
            let outcome = viewer
                .show_source(&serve_url, page, search.as_deref())
                .await;
            if outcome == ShowOutcome::OpenedExternally {
                let _ = tx.send(AppEvent::Notify {
                    message: "Source opened in browser".to_string(),
                    level: NotificationLevel::Info,
                });
            }
        });
    }

    pub fn render(
        &self,
        frame: &mut Frame,
        area: Rect,
        controller: &ChatController,
        focused: bool,
    ) {
        let title = match &self.document {
            Some(doc) => format!("Chat · {}", doc.filename),
            None => "Chat".to_string(),
        };
        let block = if focused {
            theme::block_focused(&title)
        } else {
            theme::block_default(&title)
        };
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let chunks = Layout::vertical([
            Constraint::Min(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(inner);

        self.render_transcript(frame, chunks[0], controller);
        self.render_status(frame, chunks[1], controller);
        self.render_input(frame, chunks[2], focused);
    }

    fn render_transcript(&self, frame: &mut Frame, area: Rect, controller: &ChatController) {
        if self.document.is_none() {
            frame.render_widget(
                Paragraph::new(vec![
                    Line::raw(""),
                    Line::from(Span::styled(
                        "Open a document from the Browse tab to start chatting.",
                        theme::muted(),
                    )),
                ]),
                area,
            );
            return;
        }

        let mut lines: Vec<Line> = Vec::new();
        for message in controller.messages() {
            lines.extend(message_lines(message));
            lines.push(Line::raw(""));
        }

        if controller.is_streaming() {
            let mut tail = vec![Span::styled("assistant ", role_style(MessageRole::Assistant))];
            tail.push(Span::styled(
                format!("{}▌", controller.live_buffer()),
                Style::default().fg(theme::TEXT),
            ));
            lines.push(Line::from(tail));
        }

        let total = lines.len() as u16;
        let offset = if self.follow_tail {
            total.saturating_sub(area.height)
        } else {
            self.scroll.min(total.saturating_sub(1))
        };
        frame.render_widget(
            Paragraph::new(lines).wrap(ratatui::widgets::Wrap { trim: false }).scroll((offset, 0)),
            area,
        );
    }

    fn render_status(&self, frame: &mut Frame, area: Rect, controller: &ChatController) {
        let status = if let Some(error) = &self.last_error {
            Span::styled(format!("error: {error}"), Style::default().fg(theme::ERROR))
        } else if self.session_loading {
            Span::styled("creating session…", theme::muted())
        } else if controller.is_streaming() {
            Span::styled("streaming (Esc to cancel)", Style::default().fg(theme::PRIMARY_LIGHT))
        } else {
            Span::styled("ready", theme::muted())
        };

        let context = if self.include_context {
            Span::styled("ctx:on", Style::default().fg(theme::SUCCESS))
        } else {
            Span::styled("ctx:off", theme::dim())
        };

        let line = Line::from(vec![
            status,
            Span::raw("  "),
            context,
            Span::raw("  "),
            Span::styled("Ctrl+T", theme::key_hint()),
            Span::raw(":ctx "),
            Span::styled("Ctrl+L", theme::key_hint()),
            Span::raw(":clear "),
            Span::styled("Alt+1-9", theme::key_hint()),
            Span::raw(":source"),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }

    fn render_input(&self, frame: &mut Frame, area: Rect, focused: bool) {
        let chunks =
            Layout::horizontal([Constraint::Length(2), Constraint::Min(1)]).split(area);
        frame.render_widget(
            Paragraph::new(Span::styled("❯ ", theme::heading())),
            chunks[0],
        );
        frame.render_widget(
            Paragraph::new(
                self.input
                    .styled_line(Style::default().fg(theme::TEXT), focused),
            ),
            chunks[1],
        );
    }
}

fn role_style(role: MessageRole) -> Style {
    let color = match role {
        MessageRole::User => theme::USER,
        MessageRole::Assistant => theme::ASSISTANT,
        MessageRole::System => theme::TEXT_MUTED,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

fn message_lines(message: &ChatMessage) -> Vec<Line<'_>> {
    let prefix = match message.role {
        MessageRole::User => "you",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
    };
    let mut lines = vec![Line::from(vec![
        Span::styled(format!("{prefix} "), role_style(message.role)),
        Span::styled(
            message.timestamp.format("%H:%M").to_string(),
            theme::dim(),
        ),
    ])];
    for text in message.content.lines() {
        lines.push(Line::from(Span::styled(
            text,
            Style::default().fg(theme::TEXT),
        )));
    }
    for (i, source) in message.sources_used.iter().enumerate() {
        lines.push(Line::from(Span::styled(
            format!("  [{}] {}", i + 1, source_label(source)),
            Style::default().fg(theme::SOURCE),
        )));
    }
    lines
}

/// One-line citation label: "table 14.1.1 · Demographics · p.12".
fn source_label(source: &QuerySource) -> String {
    let mut parts: Vec<String> = Vec::new();
    match (&source.output_type, &source.output_number) {
        (Some(kind), Some(number)) => parts.push(format!("{kind} {number}")),
        (Some(kind), None) => parts.push(kind.clone()),
        (None, Some(number)) => parts.push(number.clone()),
        (None, None) => {}
    }
    if let Some(title) = &source.title {
        parts.push(title.clone());
    }
    if let Some(page) = source.page_number {
        parts.push(format!("p.{page}"));
    }
    if parts.is_empty() {
        parts.push("source".to_string());
    }
    parts.join(" · ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(
        output_type: Option<&str>,
        output_number: Option<&str>,
        title: Option<&str>,
        page: Option<u32>,
    ) -> QuerySource {
        QuerySource {
            output_type: output_type.map(String::from),
            output_number: output_number.map(String::from),
            title: title.map(String::from),
            page_number: page,
            confidence: 0.8,
            chunk_count: 1,
        }
    }

    #[test]
    fn test_source_label_full() {
        let label = source_label(&source(
            Some("table"),
            Some("14.1.1"),
            Some("Demographics"),
            Some(12),
        ));
        assert_eq!(label, "table 14.1.1 · Demographics · p.12");
    }

    #[test]
    fn test_source_label_sparse() {
        assert_eq!(source_label(&source(None, None, None, None)), "source");
        assert_eq!(
            source_label(&source(None, Some("14.2"), None, None)),
            "14.2"
        );
    }

    #[test]
    fn test_message_lines_include_citations() {
        let message = ChatMessage::assistant(
            "See the table.",
            vec![source(Some("table"), Some("14.1.1"), None, Some(3))],
        );
        let lines = message_lines(&message);
        // Header, one content line, one citation line.
        assert_eq!(lines.len(), 3);
    }
}
