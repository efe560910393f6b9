//! The session's event union and reducer.
//!
//! Every external stimulus (keystrokes, generation events, completed
//! background work) arrives as an [`AppAction`]. [`apply_action`] is the
//! single write path into session state: it matches exhaustively over the
//! union, mutates the [`App`], and returns at most one [`AppCommand`]
//! describing I/O for the event loop to launch. The reducer itself never
//! performs I/O, which is what makes the whole state machine testable
//! without a runtime.

use std::time::Instant;

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::sync::mpsc;

use super::keys;
use super::App;
use crate::api::models::fallback_models;
use crate::core::chat_stream::StreamParams;
use crate::core::comfy::ImageJobParams;
use crate::core::config::Config;
use crate::core::message::Turn;

/// A key event stamped with its arrival time, so time-sensitive chords
/// (`g g`) stay testable without a clock in the reducer.
#[derive(Debug, Clone, Copy)]
pub struct KeyPress {
    pub event: KeyEvent,
    pub pressed_at: Instant,
}

impl KeyPress {
    pub fn new(event: KeyEvent, pressed_at: Instant) -> Self {
        Self { event, pressed_at }
    }

    pub fn code(&self) -> KeyCode {
        self.event.code
    }

    pub fn ctrl(&self) -> bool {
        self.event.modifiers.contains(KeyModifiers::CONTROL)
    }

    pub fn shift(&self) -> bool {
        self.event.modifiers.contains(KeyModifiers::SHIFT)
    }

    #[cfg(test)]
    pub fn of_char(c: char) -> Self {
        Self::new(KeyEvent::from(KeyCode::Char(c)), Instant::now())
    }

    #[cfg(test)]
    pub fn of_code(code: KeyCode) -> Self {
        Self::new(KeyEvent::from(code), Instant::now())
    }

    #[cfg(test)]
    pub fn of_char_at(c: char, pressed_at: Instant) -> Self {
        Self::new(KeyEvent::from(KeyCode::Char(c)), pressed_at)
    }

    #[cfg(test)]
    pub fn ctrl_char(c: char) -> Self {
        Self::new(
            KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL),
            Instant::now(),
        )
    }
}

pub enum AppAction {
    KeyPressed(KeyPress),
    /// Incremental text from the stream with the given ID.
    AppendResponseChunk {
        content: String,
        stream_id: u64,
    },
    /// Image-job progress note; display-only.
    StreamProgress {
        note: String,
        stream_id: u64,
    },
    StreamErrored {
        message: String,
        stream_id: u64,
    },
    StreamCompleted {
        stream_id: u64,
    },
    CancelStreaming,
    /// A prompt ready to send, as produced by Insert-mode enter.
    SubmitPrompt {
        content: String,
    },
    ProcessCommand {
        input: String,
    },
    ConfigLoaded {
        result: Result<Config, String>,
    },
    ModelsLoaded {
        result: Result<Vec<String>, String>,
    },
    ConfigSaved {
        result: Result<(), String>,
    },
    ClipboardCompleted {
        block_id: String,
        result: Result<(), String>,
    },
    ExportCompleted {
        filename: String,
        result: Result<(), String>,
    },
    ClearStatus,
}

/// Queues actions for the session step from any task.
#[derive(Clone)]
pub struct AppActionDispatcher {
    tx: mpsc::UnboundedSender<AppAction>,
}

impl AppActionDispatcher {
    pub fn new(tx: mpsc::UnboundedSender<AppAction>) -> Self {
        Self { tx }
    }

    pub fn dispatch(&self, action: AppAction) {
        let _ = self.tx.send(action);
    }

    pub fn dispatch_many<I>(&self, actions: I)
    where
        I: IntoIterator<Item = AppAction>,
    {
        for action in actions {
            self.dispatch(action);
        }
    }
}

/// I/O the event loop runs on the reducer's behalf.
pub enum AppCommand {
    SpawnStream(StreamParams),
    SpawnImageJob(ImageJobParams),
    LoadModels,
    SaveConfig(Config),
    CopyToClipboard { block_id: String, text: String },
    ExportConversation { filename: String, records: Vec<Turn> },
}

pub fn apply_actions(
    app: &mut App,
    actions: impl IntoIterator<Item = AppAction>,
) -> Vec<AppCommand> {
    let mut commands = Vec::new();
    for action in actions {
        if let Some(command) = apply_action(app, action) {
            commands.push(command);
        }
    }
    commands
}

pub fn apply_action(app: &mut App, action: AppAction) -> Option<AppCommand> {
    match action {
        AppAction::KeyPressed(key) => keys::handle_key(app, key),
        AppAction::AppendResponseChunk { content, stream_id } => {
            if !app.session.is_current_stream(stream_id) {
                return None;
            }
            app.conversation().apply_token(&content);
            None
        }
        AppAction::StreamProgress { note, stream_id } => {
            if !app.session.is_current_stream(stream_id) {
                return None;
            }
            if app.session.has_active_generation() {
                app.ui.image_progress = Some(note);
            }
            None
        }
        AppAction::StreamErrored { message, stream_id } => {
            if !app.session.is_current_stream(stream_id) {
                return None;
            }
            app.conversation().fail_generation(&message);
            None
        }
        AppAction::StreamCompleted { stream_id } => {
            if !app.session.is_current_stream(stream_id) {
                return None;
            }
            app.conversation().complete_generation();
            None
        }
        AppAction::CancelStreaming => {
            app.conversation().cancel_active_generation();
            None
        }
        AppAction::SubmitPrompt { content } => handle_submit(app, content),
        AppAction::ProcessCommand { input } => handle_process_command(app, &input),
        AppAction::ConfigLoaded { result } => handle_config_loaded(app, result),
        AppAction::ModelsLoaded { result } => {
            handle_models_loaded(app, result);
            None
        }
        AppAction::ConfigSaved { result } => {
            match result {
                Ok(()) => app.ui.set_status("config saved"),
                Err(e) => app.ui.set_status(format!("config save failed: {e}")),
            }
            None
        }
        AppAction::ClipboardCompleted { block_id, result } => {
            match result {
                Ok(()) => app.ui.set_status(format!("✔ copied {block_id}")),
                Err(e) => app.ui.set_status(format!("✖ copy failed: {e}")),
            }
            None
        }
        AppAction::ExportCompleted { filename, result } => {
            match result {
                Ok(()) => app.ui.set_status(format!("exported {filename}")),
                Err(e) => app.ui.set_status(format!("export failed: {e}")),
            }
            None
        }
        AppAction::ClearStatus => {
            app.ui.clear_status();
            None
        }
    }
}

/// Starts a new exchange: the previous generation (if any) is cancelled
/// and terminal-ized inside `begin_exchange` before the new one exists.
pub(super) fn handle_submit(app: &mut App, content: String) -> Option<AppCommand> {
    if content.trim().is_empty() {
        return None;
    }

    let (assistant_id, stream_id, cancel_token) =
        app.conversation().begin_exchange(content.clone());

    if app.session.image_mode {
        return Some(AppCommand::SpawnImageJob(ImageJobParams {
            client: app.session.client.clone(),
            base_url: app.session.config.image_service_url.clone(),
            workflow_path: app.session.config.expanded_workflow_path(),
            prompt: content,
            cancel_token,
            stream_id,
        }));
    }

    let api_messages = app.api_messages_excluding(&assistant_id);
    Some(AppCommand::SpawnStream(StreamParams {
        client: app.session.client.clone(),
        base_url: app.session.config.service_url.clone(),
        model: app.session.model.clone(),
        api_messages,
        cancel_token,
        stream_id,
    }))
}

pub(super) fn handle_process_command(app: &mut App, input: &str) -> Option<AppCommand> {
    use crate::commands::{self, CommandResult};

    match commands::process_input(app, input) {
        CommandResult::Continue => None,
        CommandResult::OpenModelPicker => Some(AppCommand::LoadModels),
        CommandResult::Export { filename } => Some(AppCommand::ExportConversation {
            records: app.export_records(),
            filename,
        }),
        CommandResult::Quit => None,
    }
}

fn handle_config_loaded(app: &mut App, result: Result<Config, String>) -> Option<AppCommand> {
    match result {
        Ok(config) => {
            if !app.session.model_overridden {
                app.session.model = config.model.clone();
            }
            app.session.config = config;
        }
        Err(e) => {
            // Built-in defaults stay in place; the session keeps running.
            app.ui.set_status(format!("config load failed: {e}"));
        }
    }
    // The model list is fetched once the service URL is settled.
    Some(AppCommand::LoadModels)
}

fn handle_models_loaded(app: &mut App, result: Result<Vec<String>, String>) {
    match result {
        Ok(models) if !models.is_empty() => app.session.models = models,
        Ok(_) => app.session.models = fallback_models(),
        Err(e) => {
            app.session.models = fallback_models();
            app.ui.set_status(format!("model list unavailable: {e}"));
        }
    }
    if app.ui.selected_model >= app.session.models.len() {
        app.ui.selected_model = 0;
    }
}
