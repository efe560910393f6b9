//! Sotto is a modal, terminal-first chat client for local generation
//! services.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns session state: the conversation log, turn and code
//!   block addressing, the mode state machine, configuration, and the
//!   streaming generation pipeline.
//! - [`ui`] renders the terminal interface and runs the interactive event
//!   loop that drives input and display updates.
//! - [`commands`] implements the `:` command surface used by the loop.
//! - [`api`] defines the wire payloads exchanged with the chat service.
//!
//! The binary entrypoint (`src/main.rs`) routes through [`crate::cli`],
//! which parses flags and dispatches into [`ui::chat_loop`].

pub mod api;
pub mod cli;
pub mod commands;
pub mod core;
pub mod ui;
pub mod utils;
