//! Client core: API access, streaming, and the session/upload/viewer
//! state machines the TUI drives.

pub mod api;
pub mod base_path;
pub mod chat;
pub mod error;
pub mod logging;
pub mod models;
pub mod sse;
pub mod upload;
pub mod viewer;
