//! Catalog browser: compound → study → deliverable → document drill-down.

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Clear, List, ListItem, ListState, Paragraph};
use ratatui::Frame;
use tokio::sync::mpsc;

use crate::core::api::ApiClient;
use crate::core::models::DocumentInfo;

use super::super::events::{AppEvent, CatalogPayload, NotificationLevel};
use super::super::theme;

/// Which level of the hierarchy is on screen, with the path down to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseLevel {
    Compounds,
    Studies {
        compound: String,
    },
    Deliverables {
        compound: String,
        study_id: String,
    },
    Documents {
        compound: String,
        study_id: String,
        deliverable: String,
    },
}

impl BrowseLevel {
    /// Breadcrumb for the panel title.
    fn breadcrumb(&self) -> String {
        match self {
            BrowseLevel::Compounds => "Compounds".to_string(),
            BrowseLevel::Studies { compound } => format!("{compound} / Studies"),
            BrowseLevel::Deliverables { compound, study_id } => {
                format!("{compound} / {study_id} / Deliverables")
            }
            BrowseLevel::Documents {
                compound,
                study_id,
                deliverable,
            } => format!("{compound} / {study_id} / {deliverable}"),
        }
    }
}

/// One selectable row at a non-document level.
#[derive(Debug, Clone)]
struct BrowseRow {
    key: String,
    detail: String,
}

/// Result of handling input in the browse view.
pub enum BrowseResult {
    Consumed,
    /// User opened a chat-ready document.
    OpenChat(Box<DocumentInfo>),
}

pub struct BrowseState {
    level: BrowseLevel,
    rows: Vec<BrowseRow>,
    /// Populated at the documents level; rows are derived from it.
    documents: Vec<DocumentInfo>,
    selected: usize,
    loading: bool,
    /// Document id awaiting delete confirmation.
    confirm_delete: Option<String>,
}

impl BrowseState {
    pub fn new() -> Self {
        Self {
            level: BrowseLevel::Compounds,
            rows: Vec::new(),
            documents: Vec::new(),
            selected: 0,
            loading: false,
            confirm_delete: None,
        }
    }

    /// Kick off a fetch for the current level.
    pub fn load(&mut self, api: &ApiClient, tx: &mpsc::UnboundedSender<AppEvent>) {
        self.loading = true;
        self.confirm_delete = None;
        let level = self.level.clone();
        let api = api.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = match &level {
                BrowseLevel::Compounds => api.compounds().await.map(CatalogPayload::Compounds),
                BrowseLevel::Studies { compound } => {
                    api.studies(compound).await.map(CatalogPayload::Studies)
                }
                BrowseLevel::Deliverables { compound, study_id } => api
                    .deliverables(compound, study_id)
                    .await
                    .map(CatalogPayload::Deliverables),
                BrowseLevel::Documents {
                    compound,
                    study_id,
                    deliverable,
                } => api
                    .deliverable_documents(compound, study_id, deliverable)
                    .await
                    .map(CatalogPayload::Documents),
            };
            let event = match result {
                Ok(payload) => AppEvent::Catalog(payload),
                Err(e) => AppEvent::CatalogFailed(e.to_string()),
            };
            let _ = tx.send(event);
        });
    }

    pub fn load_failed(&mut self) {
        self.loading = false;
    }

    /// Fold a fetched level into the view.
    ///
    /// Stale payloads (user already navigated elsewhere) are dropped by
    /// matching the payload against the current level.
    pub fn handle_catalog(&mut self, payload: CatalogPayload) {
        match (&self.level, payload) {
            (BrowseLevel::Compounds, CatalogPayload::Compounds(response)) => {
                self.rows = response
                    .compound_details
                    .iter()
                    .map(|c| BrowseRow {
                        key: c.compound.clone(),
                        detail: format!(
                            "{} studies · {} documents",
                            c.study_count, c.document_count
                        ),
                    })
                    .collect();
                // Fall back to the bare name list when details are absent.
                if self.rows.is_empty() {
                    self.rows = response
                        .compounds
                        .into_iter()
                        .map(|key| BrowseRow {
                            key,
                            detail: String::new(),
                        })
                        .collect();
                }
                self.finish_load();
            }
            (BrowseLevel::Studies { compound }, CatalogPayload::Studies(response))
                if *compound == response.compound =>
            {
                self.rows = response
                    .study_details
                    .iter()
                    .map(|s| BrowseRow {
                        key: s.study_id.clone(),
                        detail: format!(
                            "{} deliverables · {} documents",
                            s.deliverable_count, s.document_count
                        ),
                    })
                    .collect();
                if self.rows.is_empty() {
                    self.rows = response
                        .studies
                        .into_iter()
                        .map(|key| BrowseRow {
                            key,
                            detail: String::new(),
                        })
                        .collect();
                }
                self.finish_load();
            }
            (
                BrowseLevel::Deliverables { compound, study_id },
                CatalogPayload::Deliverables(response),
            ) if *compound == response.compound && *study_id == response.study_id => {
                self.rows = response
                    .deliverable_details
                    .iter()
                    .map(|d| BrowseRow {
                        key: d.deliverable.clone(),
                        detail: format!("{} documents", d.document_count),
                    })
                    .collect();
                if self.rows.is_empty() {
                    self.rows = response
                        .deliverables
                        .into_iter()
                        .map(|key| BrowseRow {
                            key,
                            detail: String::new(),
                        })
                        .collect();
                }
                self.finish_load();
            }
            (
                BrowseLevel::Documents {
                    compound,
                    study_id,
                    deliverable,
                },
                CatalogPayload::Documents(response),
            ) if *compound == response.compound
                && *study_id == response.study_id
                && *deliverable == response.deliverable =>
            {
                self.documents = response.documents;
                self.rows = self
                    .documents
                    .iter()
                    .map(|d| BrowseRow {
                        key: d.filename.clone(),
                        detail: format!(
                            "{} · {} TLF outputs",
                            d.status.label(),
                            d.tlf_outputs_found
                        ),
                    })
                    .collect();
                self.finish_load();
            }
            (_, payload) => {
                log::debug!("Dropping stale catalog payload: {payload:?}");
            }
        }
    }

    fn finish_load(&mut self) {
        self.loading = false;
        self.selected = self.selected.min(self.rows.len().saturating_sub(1));
    }

    /// Handle input. Unhandled keys fall through to the global mapper.
    pub fn handle_input(
        &mut self,
        event: &Event,
        api: &ApiClient,
        tx: &mpsc::UnboundedSender<AppEvent>,
    ) -> Option<BrowseResult> {
        let Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) = event
        else {
            return None;
        };

        // Delete confirmation consumes everything.
        if let Some(document_id) = self.confirm_delete.clone() {
            match code {
                KeyCode::Char('y') => {
                    self.confirm_delete = None;
                    spawn_delete(api.clone(), document_id, tx.clone());
                }
                KeyCode::Char('n') | KeyCode::Esc => self.confirm_delete = None,
                _ => {}
            }
            return Some(BrowseResult::Consumed);
        }

        if *modifiers != KeyModifiers::NONE && *modifiers != KeyModifiers::SHIFT {
            return None;
        }

        match code {
            KeyCode::Char('j') | KeyCode::Down => {
                if !self.rows.is_empty() {
                    self.selected = (self.selected + 1).min(self.rows.len() - 1);
                }
                Some(BrowseResult::Consumed)
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
                Some(BrowseResult::Consumed)
            }
            KeyCode::Char('g') => {
                self.selected = 0;
                Some(BrowseResult::Consumed)
            }
            KeyCode::Char('G') => {
                self.selected = self.rows.len().saturating_sub(1);
                Some(BrowseResult::Consumed)
            }
            KeyCode::Enter | KeyCode::Char('l') => self.descend(api, tx),
            KeyCode::Char('h') | KeyCode::Backspace | KeyCode::Esc => {
                self.ascend(api, tx);
                Some(BrowseResult::Consumed)
            }
            KeyCode::Char('r') => {
                self.load(api, tx);
                Some(BrowseResult::Consumed)
            }
            KeyCode::Char('d') => {
                if let BrowseLevel::Documents { .. } = self.level {
                    if let Some(doc) = self.documents.get(self.selected) {
                        self.confirm_delete = Some(doc.document_id.clone());
                    }
                }
                Some(BrowseResult::Consumed)
            }
            _ => None,
        }
    }

    fn descend(
        &mut self,
        api: &ApiClient,
        tx: &mpsc::UnboundedSender<AppEvent>,
    ) -> Option<BrowseResult> {
        let row = self.rows.get(self.selected)?;
        let key = row.key.clone();

        match self.level.clone() {
            BrowseLevel::Compounds => {
                self.level = BrowseLevel::Studies { compound: key };
            }
            BrowseLevel::Studies { compound } => {
                self.level = BrowseLevel::Deliverables {
                    compound,
                    study_id: key,
                };
            }
            BrowseLevel::Deliverables { compound, study_id } => {
                self.level = BrowseLevel::Documents {
                    compound,
                    study_id,
                    deliverable: key,
                };
            }
            BrowseLevel::Documents { .. } => {
                let doc = self.documents.get(self.selected)?;
                if doc.is_chat_ready() {
                    return Some(BrowseResult::OpenChat(Box::new(doc.clone())));
                }
                let _ = tx.send(AppEvent::Notify {
                    message: format!("{} is not ready for chat ({})", doc.filename, doc.status.label()),
                    level: NotificationLevel::Warning,
                });
                return Some(BrowseResult::Consumed);
            }
        }

        self.rows.clear();
        self.documents.clear();
        self.selected = 0;
        self.load(api, tx);
        Some(BrowseResult::Consumed)
    }

    fn ascend(&mut self, api: &ApiClient, tx: &mpsc::UnboundedSender<AppEvent>) {
        let parent = match self.level.clone() {
            BrowseLevel::Compounds => return,
            BrowseLevel::Studies { .. } => BrowseLevel::Compounds,
            BrowseLevel::Deliverables { compound, .. } => BrowseLevel::Studies { compound },
            BrowseLevel::Documents {
                compound, study_id, ..
            } => BrowseLevel::Deliverables { compound, study_id },
        };
        self.level = parent;
        self.rows.clear();
        self.documents.clear();
        self.selected = 0;
        self.load(api, tx);
    }

    pub fn render(&self, frame: &mut Frame, area: Rect, focused: bool) {
        let breadcrumb = self.level.breadcrumb();
        let block = if focused {
            theme::block_focused(&breadcrumb)
        } else {
            theme::block_default(&breadcrumb)
        };
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let chunks =
            Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).split(inner);

        if self.loading {
            frame.render_widget(
                Paragraph::new(Line::from(Span::styled("Loading…", theme::muted()))),
                chunks[0],
            );
        } else if self.rows.is_empty() {
            frame.render_widget(
                Paragraph::new(Line::from(Span::styled("No entries", theme::dim()))),
                chunks[0],
            );
        } else {
            let items: Vec<ListItem> = self
                .rows
                .iter()
                .map(|row| {
                    let mut spans = vec![Span::styled(
                        row.key.clone(),
                        Style::default().fg(theme::TEXT),
                    )];
                    if !row.detail.is_empty() {
                        spans.push(Span::raw("  "));
                        spans.push(Span::styled(row.detail.clone(), theme::muted()));
                    }
                    ListItem::new(Line::from(spans))
                })
                .collect();

            let list = List::new(items)
                .highlight_style(theme::highlight())
                .highlight_symbol("▸ ");
            let mut state = ListState::default().with_selected(Some(self.selected));
            frame.render_stateful_widget(list, chunks[0], &mut state);
        }

        let hints = Line::from(vec![
            Span::styled("j/k", theme::key_hint()),
            Span::raw(":move "),
            Span::styled("Enter", theme::key_hint()),
            Span::raw(":open "),
            Span::styled("h", theme::key_hint()),
            Span::raw(":back "),
            Span::styled("r", theme::key_hint()),
            Span::raw(":refresh "),
            Span::styled("d", theme::key_hint()),
            Span::raw(":delete"),
        ]);
        frame.render_widget(Paragraph::new(hints), chunks[1]);

        if let Some(document_id) = &self.confirm_delete {
            self.render_confirm(frame, area, document_id);
        }
    }

    fn render_confirm(&self, frame: &mut Frame, area: Rect, document_id: &str) {
        let name = self
            .documents
            .iter()
            .find(|d| d.document_id == *document_id)
            .map(|d| d.filename.as_str())
            .unwrap_or(document_id);

        let width = 50.min(area.width.saturating_sub(4));
        let modal = Rect::new(
            area.x + (area.width.saturating_sub(width)) / 2,
            area.y + area.height / 2,
            width,
            4,
        );
        frame.render_widget(Clear, modal);
        let lines = vec![
            Line::from(Span::styled(format!("Delete {name}?"), theme::title())),
            Line::from(vec![
                Span::styled("y", Style::default().fg(theme::ERROR)),
                Span::raw(":confirm  "),
                Span::styled("n", theme::key_hint()),
                Span::raw(":cancel"),
            ]),
        ];
        frame.render_widget(
            Paragraph::new(lines).block(theme::block_focused("Confirm")),
            modal,
        );
    }
}

fn spawn_delete(api: ApiClient, document_id: String, tx: mpsc::UnboundedSender<AppEvent>) {
    tokio::spawn(async move {
        match api.delete_document(&document_id).await {
            Ok(()) => {
                let _ = tx.send(AppEvent::DocumentDeleted(document_id));
            }
            Err(e) => {
                let _ = tx.send(AppEvent::Notify {
                    message: format!("Delete failed: {e}"),
                    level: NotificationLevel::Error,
                });
            }
        }
    });
}
