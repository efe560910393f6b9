//! Command-mode surface: the verbs typed after `:`.
//!
//! Parsing splits the first word off as the command name and hands the
//! rest to the handler. An unknown name drops back to Normal mode with no
//! effect. Handlers mutate session state directly; anything that needs
//! I/O is described by the returned [`CommandResult`] and launched by the
//! caller.

mod registry;

pub use registry::{all_commands, find_command, Command, CommandInvocation};

use chrono::Utc;

use crate::core::app::{App, UiMode};

pub enum CommandResult {
    Continue,
    /// ModelSelect mode was entered; the model list should be refreshed.
    OpenModelPicker,
    /// Write the conversation to this file.
    Export { filename: String },
    Quit,
}

pub fn process_input(app: &mut App, input: &str) -> CommandResult {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return CommandResult::Continue;
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let args = parts.next().unwrap_or_default().trim();

    match registry::find_command(name) {
        Some(command) => (command.handler)(app, CommandInvocation { args }),
        None => CommandResult::Continue,
    }
}

pub(super) fn handle_config(app: &mut App, _invocation: CommandInvocation<'_>) -> CommandResult {
    app.ui.selected_model = app
        .session
        .models
        .iter()
        .position(|model| *model == app.session.model)
        .unwrap_or(0);
    app.ui.set_mode(UiMode::ModelSelect);
    CommandResult::OpenModelPicker
}

pub(super) fn handle_save(_app: &mut App, invocation: CommandInvocation<'_>) -> CommandResult {
    let filename = if invocation.args.is_empty() {
        format!("sotto-{}.json", Utc::now().format("%Y-%m-%d"))
    } else {
        let mut name = invocation.args.to_string();
        if !name.ends_with(".json") {
            name.push_str(".json");
        }
        name
    };
    CommandResult::Export { filename }
}

pub(super) fn handle_tldr(app: &mut App, _invocation: CommandInvocation<'_>) -> CommandResult {
    app.conversation().collapse_long_turns();
    CommandResult::Continue
}

pub(super) fn handle_verbose(app: &mut App, _invocation: CommandInvocation<'_>) -> CommandResult {
    app.conversation().expand_all_turns();
    CommandResult::Continue
}

pub(super) fn handle_quit(app: &mut App, _invocation: CommandInvocation<'_>) -> CommandResult {
    app.session.exit_requested = true;
    CommandResult::Quit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::app::COLLAPSE_THRESHOLD;
    use crate::core::message::Turn;
    use crate::utils::test_utils::create_test_app;

    #[test]
    fn config_opens_model_select_on_current_model() {
        let mut app = create_test_app();
        app.session.models = vec!["alpha".into(), "test-model".into(), "beta".into()];

        let result = process_input(&mut app, "config");
        assert!(matches!(result, CommandResult::OpenModelPicker));
        assert_eq!(app.ui.mode, UiMode::ModelSelect);
        assert_eq!(app.ui.selected_model, 1);
    }

    #[test]
    fn save_defaults_and_appends_json_suffix() {
        let mut app = create_test_app();

        match process_input(&mut app, "save notes") {
            CommandResult::Export { filename } => assert_eq!(filename, "notes.json"),
            _ => panic!("expected export"),
        }

        match process_input(&mut app, "save notes.json") {
            CommandResult::Export { filename } => assert_eq!(filename, "notes.json"),
            _ => panic!("expected export"),
        }

        match process_input(&mut app, "save") {
            CommandResult::Export { filename } => {
                assert!(filename.starts_with("sotto-"));
                assert!(filename.ends_with(".json"));
            }
            _ => panic!("expected export"),
        }
    }

    #[test]
    fn tldr_collapses_only_long_turns_and_verbose_expands() {
        let mut app = create_test_app();
        app.log.push(Turn::user("aa", "short"));
        app.log
            .push(Turn::new("ab", crate::core::message::Role::Assistant, "x".repeat(COLLAPSE_THRESHOLD + 1)));

        process_input(&mut app, "tldr");
        assert!(!app.log[0].collapsed);
        assert!(app.log[1].collapsed);

        process_input(&mut app, "verbose");
        assert!(!app.log[1].collapsed);
    }

    #[test]
    fn quit_and_alias_request_exit() {
        let mut app = create_test_app();
        assert!(matches!(process_input(&mut app, "quit"), CommandResult::Quit));
        assert!(app.session.exit_requested);

        let mut app = create_test_app();
        assert!(matches!(process_input(&mut app, "q"), CommandResult::Quit));
        assert!(app.session.exit_requested);
    }

    #[test]
    fn unknown_command_has_no_effect() {
        let mut app = create_test_app();
        let result = process_input(&mut app, "frobnicate now");
        assert!(matches!(result, CommandResult::Continue));
        assert_eq!(app.ui.mode, UiMode::Normal);
        assert!(app.log.is_empty());
    }
}
