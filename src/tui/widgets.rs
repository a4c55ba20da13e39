//! Small shared widgets.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::style::Style;
use ratatui::text::{Line, Span};

use super::theme;

/// Single-line text input with a character-index cursor.
///
/// Cursor position is in characters, not bytes; edits go through
/// [`handle_key`](Self::handle_key) so every view gets the same motions.
#[derive(Debug, Default, Clone)]
pub struct InputLine {
    text: String,
    cursor: usize,
}

impl InputLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Take the contents, resetting the input.
    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.text)
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.cursor = self.text.chars().count();
    }

    /// Apply one key event. Returns true if the key edited or moved.
    pub fn handle_key(&mut self, key: &KeyEvent) -> bool {
        match (key.modifiers, key.code) {
            (KeyModifiers::NONE | KeyModifiers::SHIFT, KeyCode::Char(c)) => {
                let at = self.byte_offset(self.cursor);
                self.text.insert(at, c);
                self.cursor += 1;
                true
            }
            (KeyModifiers::NONE, KeyCode::Backspace) => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    let at = self.byte_offset(self.cursor);
                    self.text.remove(at);
                }
                true
            }
            (KeyModifiers::NONE, KeyCode::Delete) => {
                if self.cursor < self.text.chars().count() {
                    let at = self.byte_offset(self.cursor);
                    self.text.remove(at);
                }
                true
            }
            (KeyModifiers::NONE, KeyCode::Left) => {
                self.cursor = self.cursor.saturating_sub(1);
                true
            }
            (KeyModifiers::NONE, KeyCode::Right) => {
                self.cursor = (self.cursor + 1).min(self.text.chars().count());
                true
            }
            (KeyModifiers::NONE, KeyCode::Home) => {
                self.cursor = 0;
                true
            }
            (KeyModifiers::NONE, KeyCode::End) => {
                self.cursor = self.text.chars().count();
                true
            }
            (KeyModifiers::CONTROL, KeyCode::Char('u')) => {
                self.clear();
                true
            }
            _ => false,
        }
    }

    /// Render with a reverse-video cursor cell at the insertion point.
    pub fn styled_line(&self, style: Style, with_cursor: bool) -> Line<'_> {
        if !with_cursor {
            return Line::from(Span::styled(self.text.as_str(), style));
        }
        let at = self.byte_offset(self.cursor);
        let (before, rest) = self.text.split_at(at);
        let mut chars = rest.chars();
        let under = chars.next().map(String::from).unwrap_or_else(|| " ".to_string());
        let after = chars.as_str().to_string();
        Line::from(vec![
            Span::styled(before, style),
            Span::styled(under, style.bg(theme::TEXT).fg(theme::BG_BASE)),
            Span::styled(after, style),
        ])
    }

    fn byte_offset(&self, chars: usize) -> usize {
        self.text
            .char_indices()
            .nth(chars)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_insert_and_cursor_motion() {
        let mut input = InputLine::new();
        for c in "abc".chars() {
            input.handle_key(&key(KeyCode::Char(c)));
        }
        assert_eq!(input.text(), "abc");

        input.handle_key(&key(KeyCode::Left));
        input.handle_key(&key(KeyCode::Char('x')));
        assert_eq!(input.text(), "abxc");
    }

    #[test]
    fn test_backspace_multibyte() {
        let mut input = InputLine::new();
        input.set_text("μg/dL");
        input.handle_key(&key(KeyCode::Home));
        input.handle_key(&key(KeyCode::Right));
        input.handle_key(&key(KeyCode::Backspace));
        assert_eq!(input.text(), "g/dL");
    }

    #[test]
    fn test_take_resets() {
        let mut input = InputLine::new();
        input.set_text("hello");
        assert_eq!(input.take(), "hello");
        assert!(input.is_empty());
    }
}
