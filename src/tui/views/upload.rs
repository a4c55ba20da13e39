//! Upload view: metadata form, file queue, and per-file progress gauges.

use std::path::PathBuf;

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::{LineGauge, Paragraph};
use ratatui::Frame;
use tokio::sync::mpsc;

use crate::core::api::ApiClient;
use crate::core::upload::{
    start_uploads, validate_batch, UploadEvent, UploadForm, UploadStatus, UploadTracker,
};

use super::super::events::{AppEvent, NotificationLevel};
use super::super::theme;
use super::super::widgets::InputLine;

/// Form fields in tab order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormField {
    Compound,
    StudyId,
    Deliverable,
    Description,
    FilePath,
}

impl FormField {
    const ALL: [FormField; 5] = [
        FormField::Compound,
        FormField::StudyId,
        FormField::Deliverable,
        FormField::Description,
        FormField::FilePath,
    ];

    fn label(self) -> &'static str {
        match self {
            FormField::Compound => "Compound",
            FormField::StudyId => "Study",
            FormField::Deliverable => "Deliverable",
            FormField::Description => "Description",
            FormField::FilePath => "Add file",
        }
    }

    fn next(self) -> FormField {
        let idx = Self::ALL.iter().position(|&f| f == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    fn prev(self) -> FormField {
        let idx = Self::ALL.iter().position(|&f| f == self).unwrap_or(0);
        Self::ALL[(idx + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

pub struct UploadViewState {
    compound: InputLine,
    study_id: InputLine,
    deliverable: InputLine,
    description: InputLine,
    file_path: InputLine,
    field: FormField,
    pub tracker: UploadTracker,
    error: Option<String>,
}

impl UploadViewState {
    pub fn new() -> Self {
        Self {
            compound: InputLine::new(),
            study_id: InputLine::new(),
            deliverable: InputLine::new(),
            description: InputLine::new(),
            file_path: InputLine::new(),
            field: FormField::Compound,
            tracker: UploadTracker::new(),
            error: None,
        }
    }

    fn form(&self) -> UploadForm {
        UploadForm {
            compound: self.compound.text().to_string(),
            study_id: self.study_id.text().to_string(),
            deliverable: self.deliverable.text().to_string(),
            description: self.description.text().to_string(),
        }
    }

    fn active_input(&mut self) -> &mut InputLine {
        match self.field {
            FormField::Compound => &mut self.compound,
            FormField::StudyId => &mut self.study_id,
            FormField::Deliverable => &mut self.deliverable,
            FormField::Description => &mut self.description,
            FormField::FilePath => &mut self.file_path,
        }
    }

    pub fn handle_input(
        &mut self,
        event: &Event,
        api: &ApiClient,
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

        match (*modifiers, *code) {
            (KeyModifiers::NONE, KeyCode::Down) => {
                self.field = self.field.next();
                true
            }
            (KeyModifiers::NONE, KeyCode::Up) => {
                self.field = self.field.prev();
                true
            }
            (KeyModifiers::NONE, KeyCode::Enter) => {
                match self.field {
                    FormField::FilePath => self.queue_file(),
                    _ => self.field = self.field.next(),
                }
                true
            }
            (KeyModifiers::CONTROL, KeyCode::Char('s')) => {
                self.submit(api, tx);
                true
            }
            (KeyModifiers::CONTROL, KeyCode::Char('d')) => {
                // Drop the most recently queued (still pending) file.
                if let Some((id, _)) = self.tracker.pending().last().cloned() {
                    self.tracker.remove(id);
                }
                true
            }
            (KeyModifiers::CONTROL, KeyCode::Char('k')) => {
                self.tracker.clear_finished();
                true
            }
            _ => self.active_input().handle_key(key),
        }
    }

    fn queue_file(&mut self) {
        let path = self.file_path.text().trim().to_string();
        if path.is_empty() {
            return;
        }
        self.tracker.add_file(PathBuf::from(path));
        self.file_path.clear();
        self.error = None;
    }

    /// Validate and start the batch. Errors stay on screen until the
    /// next attempt.
    fn submit(&mut self, api: &ApiClient, tx: &mpsc::UnboundedSender<AppEvent>) {
        let form = self.form();
        let pending = self.tracker.pending();
        let paths: Vec<PathBuf> = pending.iter().map(|(_, p)| p.clone()).collect();

        if let Err(e) = validate_batch(&form, &paths) {
            self.error = Some(e.to_string());
            return;
        }
        self.error = None;

        // Bridge upload events into the main loop; the forwarder ends
        // when the last per-file task drops its sender.
        let (upload_tx, mut upload_rx) = mpsc::unbounded_channel::<UploadEvent>();
        let app_tx = tx.clone();
        tokio::spawn(async move {
            while let Some(event) = upload_rx.recv().await {
                let _ = app_tx.send(AppEvent::Upload(event));
            }
        });

        let count = pending.len();
        start_uploads(api.clone(), &form, pending, upload_tx);
        let _ = tx.send(AppEvent::Notify {
            message: format!("Uploading {count} file(s)"),
            level: NotificationLevel::Info,
        });
    }

    pub fn render(&self, frame: &mut Frame, area: Rect, focused: bool) {
        let block = if focused {
            theme::block_focused("Upload")
        } else {
            theme::block_default("Upload")
        };
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let chunks = Layout::vertical([
            Constraint::Length(7),
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(inner);

        self.render_form(frame, chunks[0], focused);

        if let Some(error) = &self.error {
            frame.render_widget(
                Paragraph::new(Span::styled(
                    error.as_str(),
                    Style::default().fg(theme::ERROR),
                )),
                chunks[1],
            );
        }

        self.render_tasks(frame, chunks[2]);

        let hints = Line::from(vec![
            Span::styled("↑/↓", theme::key_hint()),
            Span::raw(":field "),
            Span::styled("Enter", theme::key_hint()),
            Span::raw(":add file "),
            Span::styled("Ctrl+S", theme::key_hint()),
            Span::raw(":upload "),
            Span::styled("Ctrl+D", theme::key_hint()),
            Span::raw(":drop pending "),
            Span::styled("Ctrl+K", theme::key_hint()),
            Span::raw(":clear finished"),
        ]);
        frame.render_widget(Paragraph::new(hints), chunks[3]);
    }

    fn render_form(&self, frame: &mut Frame, area: Rect, focused: bool) {
        let rows: [(FormField, &InputLine); 5] = [
            (FormField::Compound, &self.compound),
            (FormField::StudyId, &self.study_id),
            (FormField::Deliverable, &self.deliverable),
            (FormField::Description, &self.description),
            (FormField::FilePath, &self.file_path),
        ];

        let mut lines: Vec<Line> = Vec::new();
        for (field, input) in rows {
            let active = focused && field == self.field;
            let label_style = if active { theme::heading() } else { theme::muted() };
            let mut line = vec![Span::styled(format!("{:>12}: ", field.label()), label_style)];
            line.extend(
                input
                    .styled_line(Style::default().fg(theme::TEXT), active)
                    .spans,
            );
            lines.push(Line::from(line));
        }
        lines.push(Line::raw(""));
        lines.push(Line::from(Span::styled(
            format!("{} file(s) queued", self.tracker.pending().len()),
            theme::muted(),
        )));
        frame.render_widget(Paragraph::new(lines), area);
    }

    fn render_tasks(&self, frame: &mut Frame, area: Rect) {
        let tasks = self.tracker.tasks();
        if tasks.is_empty() {
            frame.render_widget(
                Paragraph::new(Span::styled("No uploads yet", theme::dim())),
                area,
            );
            return;
        }

        // Two rows per task: name + status line, then a gauge.
        let mut y = area.y;
        for task in tasks {
            if y + 1 >= area.y + area.height {
                break;
            }
            let (status_text, status_color) = match task.status {
                UploadStatus::Pending => ("pending".to_string(), theme::TEXT_MUTED),
                UploadStatus::Uploading => {
                    (format!("uploading {}%", task.upload_progress), theme::INFO)
                }
                UploadStatus::Uploaded => ("waiting for processing".to_string(), theme::INFO),
                UploadStatus::Processing => (
                    task.message.clone().unwrap_or_else(|| "processing".to_string()),
                    theme::WARNING,
                ),
                UploadStatus::Completed => {
                    let outputs = task.tlf_outputs_found.unwrap_or(0);
                    (format!("completed · {outputs} TLF outputs"), theme::SUCCESS)
                }
                UploadStatus::Error => (
                    task.error.clone().unwrap_or_else(|| "error".to_string()),
                    theme::ERROR,
                ),
            };

            let header = Line::from(vec![
                Span::styled(task.file_name.clone(), Style::default().fg(theme::TEXT)),
                Span::raw("  "),
                Span::styled(status_text, Style::default().fg(status_color)),
            ]);
            frame.render_widget(Paragraph::new(header), Rect::new(area.x, y, area.width, 1));
            y += 1;

            let (ratio, gauge_color) = match task.status {
                UploadStatus::Pending => (0.0, theme::TEXT_DIM),
                UploadStatus::Uploading => {
                    (f64::from(task.upload_progress) / 100.0, theme::INFO)
                }
                UploadStatus::Uploaded | UploadStatus::Processing => {
                    (f64::from(task.processing_progress) / 100.0, theme::WARNING)
                }
                UploadStatus::Completed => (1.0, theme::SUCCESS),
                UploadStatus::Error => {
                    (f64::from(task.processing_progress) / 100.0, theme::ERROR)
                }
            };
            let gauge = LineGauge::default()
                .filled_style(Style::default().fg(gauge_color))
                .unfilled_style(Style::default().fg(theme::TEXT_DIM))
                .ratio(ratio.clamp(0.0, 1.0));
            frame.render_widget(gauge, Rect::new(area.x, y, area.width, 1));
            y += 1;
        }
    }
}
