//! Centralized color theme for the tlfchat TUI.
//!
//! All color constants are RGB truecolor. Views import from here
//! instead of using inline `Color::*` literals.

use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders};

// ── Primary palette ─────────────────────────────────────────────────────────

/// Steel blue — primary accent, active items, focused borders.
pub const PRIMARY: Color = Color::Rgb(0x4A, 0x7A, 0xB5);
/// Sky — highlights, hints, secondary focus.
pub const PRIMARY_LIGHT: Color = Color::Rgb(0x6F, 0xA8, 0xDC);

// ── Accent ──────────────────────────────────────────────────────────────────

/// Amber — accent, calls to action, selected rows.
pub const ACCENT: Color = Color::Rgb(0xE8, 0xA8, 0x3C);

// ── Backgrounds ─────────────────────────────────────────────────────────────

/// Slate — base background.
pub const BG_BASE: Color = Color::Rgb(0x10, 0x16, 0x1E);

// ── Text ────────────────────────────────────────────────────────────────────

/// Primary text.
pub const TEXT: Color = Color::Rgb(0xDD, 0xDD, 0xDD);
/// Muted text — secondary labels, borders.
pub const TEXT_MUTED: Color = Color::Rgb(0x7E, 0x7E, 0x7E);
/// Dim text — disabled items, faint hints.
pub const TEXT_DIM: Color = Color::Rgb(0x4C, 0x4C, 0x4C);

// ── Semantic ────────────────────────────────────────────────────────────────

/// Error — failures, destructive confirmations.
pub const ERROR: Color = Color::Rgb(0xE5, 0x50, 0x4E);
/// Success — completed processing, healthy status.
pub const SUCCESS: Color = Color::Rgb(0x6C, 0xB8, 0x6E);
/// Warning — degraded status, pending states.
pub const WARNING: Color = Color::Rgb(0xF5, 0xA6, 0x2C);
/// Info — informational highlights.
pub const INFO: Color = Color::Rgb(0x4F, 0xA8, 0xEE);

// ── Domain ──────────────────────────────────────────────────────────────────

/// User messages in the chat transcript.
pub const USER: Color = Color::Rgb(0x9A, 0xCD, 0xF0);
/// Assistant messages in the chat transcript.
pub const ASSISTANT: Color = Color::Rgb(0xC5, 0xE1, 0xA5);
/// Citation lines under assistant messages.
pub const SOURCE: Color = Color::Rgb(0xB3, 0x9D, 0xDB);

// ── Style helpers ───────────────────────────────────────────────────────────

/// Accent-colored bold text (titles, active items).
pub fn title() -> Style {
    Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
}

/// Section header style.
pub fn heading() -> Style {
    Style::default().fg(PRIMARY).add_modifier(Modifier::BOLD)
}

/// Focused border style.
pub fn border_focused() -> Style {
    Style::default().fg(PRIMARY)
}

/// Unfocused border style.
pub fn border_default() -> Style {
    Style::default().fg(TEXT_DIM)
}

/// Highlighted/selected item.
pub fn highlight() -> Style {
    Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
}

/// Muted label text.
pub fn muted() -> Style {
    Style::default().fg(TEXT_MUTED)
}

/// Dim text for disabled/faint items.
pub fn dim() -> Style {
    Style::default().fg(TEXT_DIM)
}

/// Key hint style (e.g., "[q]:quit").
pub fn key_hint() -> Style {
    Style::default().fg(TEXT_DIM)
}

/// Status bar brand badge.
pub fn brand_badge() -> Style {
    Style::default()
        .fg(BG_BASE)
        .bg(ACCENT)
        .add_modifier(Modifier::BOLD)
}

// ── Block builders ──────────────────────────────────────────────────────────

/// A bordered block with focused styling.
pub fn block_focused(title: &str) -> Block<'_> {
    Block::default()
        .title(format!(" {title} "))
        .borders(Borders::ALL)
        .border_style(border_focused())
}

/// A bordered block with default (unfocused) styling.
pub fn block_default(title: &str) -> Block<'_> {
    Block::default()
        .title(format!(" {title} "))
        .borders(Borders::ALL)
        .border_style(border_default())
}
