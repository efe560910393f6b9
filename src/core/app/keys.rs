//! The modal key transition table.
//!
//! One function per source mode; a `(mode, key)` pair not listed here
//! leaves the session unchanged. Text editing inside Insert and Command
//! is delegated to the textarea; this module only owns the transitions
//! and their side effects.

use ratatui::crossterm::event::KeyCode;
use tui_textarea::Input;

use super::actions::{handle_process_command, handle_submit, AppCommand, KeyPress};
use super::ui_state::{UiMode, DOUBLE_TAP_WINDOW};
use super::App;

pub(super) fn handle_key(app: &mut App, key: KeyPress) -> Option<AppCommand> {
    match app.ui.mode {
        UiMode::Normal => handle_normal_key(app, key),
        UiMode::Insert => handle_insert_key(app, key),
        UiMode::Command => handle_command_key(app, key),
        UiMode::YankCode => handle_yank_key(app, key),
        UiMode::ModelSelect => handle_model_select_key(app, key),
    }
}

fn handle_normal_key(app: &mut App, key: KeyPress) -> Option<AppCommand> {
    // A pending `g` only survives into the `g` branch below; any other
    // key resolves the chord as a no-op.
    let pending_g = app.ui.pending_g.take();

    match key.code() {
        KeyCode::Char('c') if key.ctrl() => {
            if app.session.has_active_generation() {
                app.conversation().cancel_active_generation();
            } else {
                app.session.exit_requested = true;
            }
        }
        KeyCode::Char('q') => {
            app.session.exit_requested = true;
        }
        KeyCode::Char('i') => {
            app.ui.clear_input();
            app.ui.set_mode(UiMode::Insert);
        }
        KeyCode::Char('o') => {
            let last_user = app.conversation().last_user_content();
            app.ui.set_input_text(&last_user);
            app.ui.set_mode(UiMode::Insert);
        }
        KeyCode::Char('O') => {
            let last_assistant = app.conversation().last_assistant_content();
            app.ui.set_input_text(&last_assistant);
            app.ui.set_mode(UiMode::Insert);
        }
        KeyCode::Char(':') => {
            app.ui.clear_input();
            app.ui.set_mode(UiMode::Command);
        }
        KeyCode::Char('y') => {
            app.ui.yank_buffer.clear();
            app.ui.set_mode(UiMode::YankCode);
        }
        KeyCode::Char('G') => {
            app.ui.scroll_to_bottom();
        }
        KeyCode::Char('g') => match pending_g {
            Some(first) if key.pressed_at.duration_since(first) <= DOUBLE_TAP_WINDOW => {
                app.ui.scroll_to_top();
            }
            _ => {
                app.ui.pending_g = Some(key.pressed_at);
            }
        },
        _ => {}
    }
    None
}

fn handle_insert_key(app: &mut App, key: KeyPress) -> Option<AppCommand> {
    match key.code() {
        KeyCode::Enter if key.shift() => {
            app.ui.input.insert_newline();
            None
        }
        KeyCode::Enter => {
            let content = app.ui.input_text();
            if content.trim().is_empty() {
                return None;
            }
            app.ui.clear_input();
            app.ui.set_mode(UiMode::Normal);
            handle_submit(app, content)
        }
        KeyCode::Esc => {
            app.ui.clear_input();
            app.ui.set_mode(UiMode::Normal);
            None
        }
        _ => {
            app.ui.input.input(Input::from(key.event));
            None
        }
    }
}

fn handle_command_key(app: &mut App, key: KeyPress) -> Option<AppCommand> {
    match key.code() {
        KeyCode::Enter => {
            let input = app.ui.input_text();
            app.ui.clear_input();
            // Commands land in Normal mode unless the handler says otherwise.
            app.ui.set_mode(UiMode::Normal);
            handle_process_command(app, &input)
        }
        KeyCode::Esc => {
            app.ui.clear_input();
            app.ui.set_mode(UiMode::Normal);
            None
        }
        _ => {
            app.ui.input.input(Input::from(key.event));
            None
        }
    }
}

fn handle_yank_key(app: &mut App, key: KeyPress) -> Option<AppCommand> {
    match key.code() {
        KeyCode::Enter => {
            let address = std::mem::take(&mut app.ui.yank_buffer);
            app.ui.set_mode(UiMode::Normal);
            if address.is_empty() {
                return None;
            }
            match app.code_blocks.get(&address) {
                Some(block) => Some(AppCommand::CopyToClipboard {
                    text: block.content.clone(),
                    block_id: address,
                }),
                None => {
                    app.ui.set_status(format!("✖ invalid code id: {address}"));
                    None
                }
            }
        }
        KeyCode::Esc => {
            app.ui.yank_buffer.clear();
            app.ui.set_mode(UiMode::Normal);
            None
        }
        KeyCode::Backspace => {
            app.ui.yank_buffer.pop();
            None
        }
        KeyCode::Char(c) if !key.ctrl() => {
            app.ui.yank_buffer.push(c);
            None
        }
        _ => None,
    }
}

fn handle_model_select_key(app: &mut App, key: KeyPress) -> Option<AppCommand> {
    match key.code() {
        KeyCode::Char('j') => {
            let count = app.session.models.len();
            if count > 0 && app.ui.selected_model + 1 < count {
                app.ui.selected_model += 1;
            }
            None
        }
        KeyCode::Char('k') => {
            app.ui.selected_model = app.ui.selected_model.saturating_sub(1);
            None
        }
        KeyCode::Enter => {
            app.ui.set_mode(UiMode::Normal);
            let selected = app.ui.selected_model;
            match app.session.models.get(selected) {
                Some(model) => {
                    app.session.model = model.clone();
                    app.session.config.model = model.clone();
                    Some(AppCommand::SaveConfig(app.session.config.clone()))
                }
                None => {
                    app.ui.set_status("model selection out of range");
                    None
                }
            }
        }
        KeyCode::Esc => {
            app.ui.set_mode(UiMode::Normal);
            None
        }
        _ => None,
    }
}
