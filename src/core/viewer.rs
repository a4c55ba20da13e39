//! Document viewer coordination.
//!
//! Translates a citation click into navigation inside an attached
//! document viewer. Commands go over a [`ViewerChannel`] — fire and
//! forget, no acknowledgement — with a short settle delay between a page
//! jump and a follow-up search so the search runs against the right page.
//! When no channel is available the fallback reloads the document in an
//! external viewer with the target encoded in the URL fragment, which is
//! strictly worse (full reload) and only used as a last resort.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Wait for the viewer to land on the page before searching on it.
pub const PAGE_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Outbound command to the attached viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ViewerCommand {
    GoToPage { page: u32 },
    Search { text: String },
}

/// Inbound notice from the viewer. Diagnostic only — nothing in the
/// client reacts to these beyond logging.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ViewerNotice {
    PageChanged { page: u32 },
    SearchComplete {
        #[serde(default)]
        matches: Option<u32>,
    },
    Ready,
}

#[derive(Debug, Error)]
#[error("viewer channel closed")]
pub struct ChannelClosed;

/// Message channel into an attached viewer.
pub trait ViewerChannel: Send + Sync {
    fn post(&self, command: ViewerCommand) -> Result<(), ChannelClosed>;
}

/// Channel backed by an in-process queue the viewer side drains.
pub struct MpscViewerChannel {
    tx: mpsc::UnboundedSender<ViewerCommand>,
}

impl MpscViewerChannel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ViewerCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ViewerChannel for MpscViewerChannel {
    fn post(&self, command: ViewerCommand) -> Result<(), ChannelClosed> {
        self.tx.send(command).map_err(|_| ChannelClosed)
    }
}

/// What a citation click ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowOutcome {
    /// Commands were posted to the attached viewer.
    Posted,
    /// No usable channel; the document was reopened externally.
    OpenedExternally,
    /// Invalid page number — warned, nothing done.
    Rejected,
}

/// Opens a URL outside the application when no viewer channel works.
type ExternalOpener = Arc<dyn Fn(&str) + Send + Sync>;

fn system_opener() -> ExternalOpener {
    Arc::new(|url: &str| {
        if let Err(e) = open::that_detached(url) {
            log::error!("Failed to open external viewer: {e}");
        }
    })
}

pub struct ViewerCoordinator {
    channel: Option<Arc<dyn ViewerChannel>>,
    open_external: ExternalOpener,
}

impl Default for ViewerCoordinator {
    fn default() -> Self {
        Self {
            channel: None,
            open_external: system_opener(),
        }
    }
}

impl ViewerCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(channel: Arc<dyn ViewerChannel>) -> Self {
        Self {
            channel: Some(channel),
            open_external: system_opener(),
        }
    }

    /// Jump the viewer to a citation's page, optionally searching for its
    /// text once the page has settled.
    ///
    /// `page` must be a positive number; anything else is rejected with a
    /// warning and no action. `serve_url` is the document's serve URL and
    /// is only used by the reload fallback.
    pub async fn show_source(
        &self,
        serve_url: &str,
        page: Option<i64>,
        search: Option<&str>,
    ) -> ShowOutcome {
        let page = match page {
            Some(p) if p >= 1 => p as u32,
            other => {
                log::warn!("Ignoring citation with invalid page number {other:?}");
                return ShowOutcome::Rejected;
            }
        };
        let search = search.map(str::trim).filter(|s| !s.is_empty());

        if let Some(channel) = &self.channel {
            if channel.post(ViewerCommand::GoToPage { page }).is_ok() {
                if let Some(text) = search {
                    // Let the page render before searching on it.
                    tokio::time::sleep(PAGE_SETTLE_DELAY).await;
                    if let Err(e) = channel.post(ViewerCommand::Search {
                        text: text.to_string(),
                    }) {
                        log::warn!("Viewer search not delivered: {e}");
                    }
                }
                return ShowOutcome::Posted;
            }
            log::warn!("Viewer channel closed, falling back to external open");
        }

        let url = fallback_url(serve_url, page, search);
        log::info!("Opening document externally: {url}");
        (self.open_external)(&url);
        ShowOutcome::OpenedExternally
    }

    /// Inbound viewer messages: logged for diagnostics, no state changes.
    pub fn handle_notice(&self, notice: ViewerNotice) {
        match notice {
            ViewerNotice::PageChanged { page } => log::debug!("Viewer on page {page}"),
            ViewerNotice::SearchComplete { matches } => {
                log::debug!("Viewer search complete ({matches:?} matches)")
            }
            ViewerNotice::Ready => log::debug!("Viewer ready"),
        }
    }
}

/// Serve URL with the navigation target in the fragment, for the reload
/// fallback (`#page=N&search=...`).
pub fn fallback_url(serve_url: &str, page: u32, search: Option<&str>) -> String {
    let mut url = format!("{serve_url}#page={page}");
    if let Some(text) = search {
        url.push_str("&search=");
        // Fragment-safe percent encoding via the url crate's form encoder.
        url.push_str(&url::form_urlencoded::byte_serialize(text.as_bytes()).collect::<String>());
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Records posted commands with the (virtual) time they were posted.
    struct RecordingChannel {
        posts: Mutex<Vec<(ViewerCommand, Instant)>>,
        closed: bool,
    }

    impl RecordingChannel {
        fn open() -> Arc<Self> {
            Arc::new(Self {
                posts: Mutex::new(Vec::new()),
                closed: false,
            })
        }

        fn closed() -> Arc<Self> {
            Arc::new(Self {
                posts: Mutex::new(Vec::new()),
                closed: true,
            })
        }

        fn posts(&self) -> Vec<(ViewerCommand, Instant)> {
            self.posts.lock().unwrap().clone()
        }
    }

    impl ViewerChannel for RecordingChannel {
        fn post(&self, command: ViewerCommand) -> Result<(), ChannelClosed> {
            if self.closed {
                return Err(ChannelClosed);
            }
            self.posts.lock().unwrap().push((command, Instant::now()));
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_then_search_with_settle_delay() {
        let channel = RecordingChannel::open();
        let coordinator = ViewerCoordinator::with_channel(channel.clone());

        let outcome = coordinator
            .show_source("http://x/api/v1/documents/serve/d1", Some(5), Some("endpoint"))
            .await;
        assert_eq!(outcome, ShowOutcome::Posted);

        let posts = channel.posts();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].0, ViewerCommand::GoToPage { page: 5 });
        assert_eq!(
            posts[1].0,
            ViewerCommand::Search {
                text: "endpoint".to_string()
            }
        );
        assert!(posts[1].1 - posts[0].1 >= PAGE_SETTLE_DELAY);
    }

    #[tokio::test]
    async fn test_page_only_posts_single_command() {
        let channel = RecordingChannel::open();
        let coordinator = ViewerCoordinator::with_channel(channel.clone());

        coordinator.show_source("http://x/serve/d1", Some(3), None).await;
        let posts = channel.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, ViewerCommand::GoToPage { page: 3 });
    }

    #[tokio::test]
    async fn test_invalid_page_is_rejected() {
        let channel = RecordingChannel::open();
        let coordinator = ViewerCoordinator::with_channel(channel.clone());

        assert_eq!(
            coordinator.show_source("http://x/serve/d1", Some(-1), None).await,
            ShowOutcome::Rejected
        );
        assert_eq!(
            coordinator.show_source("http://x/serve/d1", Some(0), Some("q")).await,
            ShowOutcome::Rejected
        );
        assert_eq!(
            coordinator.show_source("http://x/serve/d1", None, Some("q")).await,
            ShowOutcome::Rejected
        );
        assert!(channel.posts().is_empty());
    }

    #[tokio::test]
    async fn test_closed_channel_falls_back() {
        let channel = RecordingChannel::closed();
        let opened = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&opened);
        let coordinator = ViewerCoordinator {
            channel: Some(channel.clone()),
            open_external: Arc::new(move |url| sink.lock().unwrap().push(url.to_string())),
        };

        let outcome = coordinator
            .show_source("http://x/serve/d1", Some(2), Some("ae"))
            .await;
        assert_eq!(outcome, ShowOutcome::OpenedExternally);
        assert!(channel.posts().is_empty());
        assert_eq!(
            opened.lock().unwrap().as_slice(),
            ["http://x/serve/d1#page=2&search=ae"]
        );
    }

    #[test]
    fn test_fallback_url_encoding() {
        assert_eq!(
            fallback_url("http://x/api/v1/documents/serve/d1", 5, Some("adverse events")),
            "http://x/api/v1/documents/serve/d1#page=5&search=adverse+events"
        );
        assert_eq!(fallback_url("http://x/serve/d1", 2, None), "http://x/serve/d1#page=2");
    }

    #[tokio::test]
    async fn test_mpsc_channel_delivers_in_order() {
        let (channel, mut rx) = MpscViewerChannel::new();
        let coordinator = ViewerCoordinator::with_channel(Arc::new(channel));

        coordinator.show_source("http://x/serve/d1", Some(4), None).await;
        assert_eq!(rx.recv().await, Some(ViewerCommand::GoToPage { page: 4 }));

        drop(coordinator);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_command_wire_shape() {
        let json = serde_json::to_string(&ViewerCommand::GoToPage { page: 7 }).unwrap();
        assert_eq!(json, r#"{"type":"goToPage","page":7}"#);
        let json = serde_json::to_string(&ViewerCommand::Search {
            text: "ae".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"search","text":"ae"}"#);
    }

    #[test]
    fn test_notice_decode() {
        let notice: ViewerNotice =
            serde_json::from_str(r#"{"type":"pageChanged","page":9}"#).unwrap();
        assert!(matches!(notice, ViewerNotice::PageChanged { page: 9 }));
        let notice: ViewerNotice = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert!(matches!(notice, ViewerNotice::Ready));
    }
}
