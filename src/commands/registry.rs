use super::CommandResult;
use crate::core::app::App;

pub type CommandHandler = fn(&mut App, CommandInvocation<'_>) -> CommandResult;

pub struct Command {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub help: &'static str,
    pub handler: CommandHandler,
}

#[derive(Clone, Copy)]
pub struct CommandInvocation<'a> {
    pub args: &'a str,
}

pub fn all_commands() -> &'static [Command] {
    COMMANDS
}

pub fn find_command(name: &str) -> Option<&'static Command> {
    all_commands().iter().find(|command| {
        command.name.eq_ignore_ascii_case(name)
            || command
                .aliases
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(name))
    })
}

const COMMANDS: &[Command] = &[
    Command {
        name: "config",
        aliases: &[],
        help: "Open the model selection list.",
        handler: super::handle_config,
    },
    Command {
        name: "save",
        aliases: &[],
        help: "Export the conversation to a JSON file.",
        handler: super::handle_save,
    },
    Command {
        name: "tldr",
        aliases: &[],
        help: "Collapse long turns to a one-line summary.",
        handler: super::handle_tldr,
    },
    Command {
        name: "verbose",
        aliases: &[],
        help: "Expand every collapsed turn.",
        handler: super::handle_verbose,
    },
    Command {
        name: "quit",
        aliases: &["q"],
        help: "Leave the session.",
        handler: super::handle_quit,
    },
];
