//! Input-interpretation state: the active mode, the shared text input,
//! the yank address buffer, and transient display annotations.

use std::time::{Duration, Instant};

use tui_textarea::{CursorMove, TextArea};

/// How long a transient status message stays on screen.
pub const STATUS_TTL: Duration = Duration::from_secs(3);

/// Window for the `g g` double tap.
pub const DOUBLE_TAP_WINDOW: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiMode {
    Normal,
    Insert,
    Command,
    YankCode,
    ModelSelect,
}

pub struct UiState {
    pub mode: UiMode,
    /// Shared buffer for Insert and Command input.
    pub input: TextArea<'static>,
    /// Block address typed in YankCode mode.
    pub yank_buffer: String,
    pub status: Option<String>,
    pub status_set_at: Option<Instant>,
    /// First half of a potential `g g`, with its arrival time.
    pub pending_g: Option<Instant>,
    pub scroll_offset: u16,
    /// Renderer keeps the transcript pinned to the bottom while set.
    pub auto_scroll: bool,
    pub selected_model: usize,
    /// Image-job progress note; lives outside turn content.
    pub image_progress: Option<String>,
}

impl UiState {
    pub fn new() -> Self {
        Self {
            mode: UiMode::Normal,
            input: TextArea::default(),
            yank_buffer: String::new(),
            status: None,
            status_set_at: None,
            pending_g: None,
            scroll_offset: 0,
            auto_scroll: true,
            selected_model: 0,
            image_progress: None,
        }
    }

    pub fn set_mode(&mut self, mode: UiMode) {
        self.mode = mode;
    }

    pub fn set_status<S: Into<String>>(&mut self, status: S) {
        self.status = Some(status.into());
        self.status_set_at = Some(Instant::now());
    }

    pub fn clear_status(&mut self) {
        self.status = None;
        self.status_set_at = None;
    }

    pub fn status_expired(&self, now: Instant) -> bool {
        match self.status_set_at {
            Some(set_at) => now.duration_since(set_at) >= STATUS_TTL,
            None => false,
        }
    }

    pub fn input_text(&self) -> String {
        self.input.lines().join("\n")
    }

    pub fn clear_input(&mut self) {
        self.input = TextArea::default();
    }

    pub fn set_input_text(&mut self, text: &str) {
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        self.input = TextArea::from(lines);
        self.input.move_cursor(CursorMove::Bottom);
        self.input.move_cursor(CursorMove::End);
    }

    pub fn scroll_to_top(&mut self) {
        self.scroll_offset = 0;
        self.auto_scroll = false;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.auto_scroll = true;
    }
}

impl Default for UiState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_text_round_trips_multiline() {
        let mut ui = UiState::new();
        ui.set_input_text("first\nsecond");
        assert_eq!(ui.input_text(), "first\nsecond");

        ui.clear_input();
        assert_eq!(ui.input_text(), "");
    }

    #[test]
    fn status_expiry_honors_ttl() {
        let mut ui = UiState::new();
        assert!(!ui.status_expired(Instant::now()));

        ui.set_status("copied");
        let set_at = ui.status_set_at.unwrap();
        assert!(!ui.status_expired(set_at + Duration::from_secs(1)));
        assert!(ui.status_expired(set_at + STATUS_TTL));
    }

    #[test]
    fn scroll_signals_toggle_auto_follow() {
        let mut ui = UiState::new();
        ui.scroll_offset = 40;
        ui.scroll_to_top();
        assert_eq!(ui.scroll_offset, 0);
        assert!(!ui.auto_scroll);

        ui.scroll_to_bottom();
        assert!(ui.auto_scroll);
    }
}
