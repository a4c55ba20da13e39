//! TLF Report Assistant (TUI edition).
//!
//! Core library providing the document catalog client, streaming chat
//! session management, upload tracking, and viewer coordination for
//! browsing clinical TLF reports and chatting over them.

pub mod config;
pub mod core;
pub mod tui;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
