use crate::core::models::{
    ChatSession, CompoundsResponse, DeliverableDocumentsResponse, DeliverablesResponse,
    StudiesResponse,
};
use crate::core::sse::ChatStreamEvent;
use crate::core::upload::UploadEvent;

/// Events flowing through the Elm-architecture event loop.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Raw terminal input (keyboard/mouse).
    Input(crossterm::event::Event),
    /// One decoded frame from the active chat stream.
    Chat(ChatStreamEvent),
    /// Session creation finished for the document being opened.
    ChatSessionReady(Box<ChatSession>),
    /// Session creation failed.
    ChatSessionFailed(String),
    /// The server acknowledged a history clear.
    ChatCleared { keep_system_messages: bool },
    /// Upload/processing progress for one queued file.
    Upload(UploadEvent),
    /// A catalog level finished loading.
    Catalog(CatalogPayload),
    /// A catalog fetch failed.
    CatalogFailed(String),
    /// A document was deleted on the server.
    DocumentDeleted(String),
    /// Notification to display to the user.
    Notify {
        message: String,
        level: NotificationLevel,
    },
}

/// Payload for one level of the compound → study → deliverable →
/// document hierarchy.
#[derive(Debug, Clone)]
pub enum CatalogPayload {
    Compounds(CompoundsResponse),
    Studies(StudiesResponse),
    Deliverables(DeliverablesResponse),
    Documents(DeliverableDocumentsResponse),
}

/// High-level actions dispatched by the global input mapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    FocusBrowse,
    FocusChat,
    FocusUpload,
    TabNext,
    TabPrev,
    ShowHelp,
    CloseHelp,
    Quit,
}

/// Which top-level view has focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Focus {
    Browse,
    Chat,
    Upload,
}

impl Focus {
    pub const ALL: [Focus; 3] = [Focus::Browse, Focus::Chat, Focus::Upload];

    pub fn label(self) -> &'static str {
        match self {
            Focus::Browse => "Browse",
            Focus::Chat => "Chat",
            Focus::Upload => "Upload",
        }
    }

    pub fn next(self) -> Focus {
        let idx = Focus::ALL.iter().position(|&f| f == self).unwrap_or(0);
        Focus::ALL[(idx + 1) % Focus::ALL.len()]
    }

    pub fn prev(self) -> Focus {
        let idx = Focus::ALL.iter().position(|&f| f == self).unwrap_or(0);
        Focus::ALL[(idx + Focus::ALL.len() - 1) % Focus::ALL.len()]
    }
}

/// Notification level for the overlay system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A timed notification shown in the overlay.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: u64,
    pub message: String,
    pub level: NotificationLevel,
    /// Ticks remaining before auto-dismiss.
    pub ttl_ticks: u32,
}
