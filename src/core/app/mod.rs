//! Session composition.
//!
//! [`App`] owns the four pieces of session state:
//! the connection/session context, the conversation log, the derived
//! code block index, and the input-interpretation state. Mutation goes
//! through [`apply_action`], the single-writer event-processing step.

mod actions;
mod conversation;
mod keys;
mod session;
mod ui_state;


pub use actions::{
    apply_action, apply_actions, AppAction, AppActionDispatcher, AppCommand, KeyPress,
};
pub use conversation::{ConversationController, CANCELLED_ANNOTATION, COLLAPSE_THRESHOLD};
pub use session::{Generation, GenerationStatus, SessionContext};
pub use ui_state::{UiMode, UiState, DOUBLE_TAP_WINDOW, STATUS_TTL};

use crate::api::ChatMessage;
use crate::core::code_blocks::CodeBlockIndex;
use crate::core::message::Turn;

pub struct App {
    pub session: SessionContext,
    pub log: Vec<Turn>,
    pub code_blocks: CodeBlockIndex,
    pub ui: UiState,
}

impl App {
    pub fn new(session: SessionContext) -> Self {
        Self {
            session,
            log: Vec::new(),
            code_blocks: CodeBlockIndex::new(),
            ui: UiState::new(),
        }
    }

    /// Controller for all conversation-log mutations.
    pub fn conversation(&mut self) -> ConversationController<'_> {
        ConversationController::new(
            &mut self.session,
            &mut self.log,
            &mut self.code_blocks,
            &mut self.ui,
        )
    }

    /// History sent to the chat service: every turn except the placeholder
    /// the response will stream into.
    pub fn api_messages_excluding(&self, excluded_turn_id: &str) -> Vec<ChatMessage> {
        self.log
            .iter()
            .filter(|turn| turn.id != excluded_turn_id)
            .map(|turn| ChatMessage {
                role: turn.role.as_str().to_string(),
                content: turn.content.clone(),
            })
            .collect()
    }

    /// Snapshot of the log in export-record order.
    pub fn export_records(&self) -> Vec<Turn> {
        self.log.clone()
    }
}
