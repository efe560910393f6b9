//! Single-writer operations on the conversation log.
//!
//! Everything that mutates turns or the code block index goes through
//! this controller, and the controller is only ever called from the
//! session's event-processing step. Generation events are applied under
//! two gates: the stream-ID fence (checked by the caller) and the target
//! check here, which refuses tokens whose target turn is no longer the
//! final assistant turn.

use tokio_util::sync::CancellationToken;

use crate::core::app::session::{Generation, GenerationStatus, SessionContext};
use crate::core::app::ui_state::UiState;
use crate::core::code_blocks::CodeBlockIndex;
use crate::core::message::Turn;

/// Appended to the target turn when a generation is cancelled mid-flight.
pub const CANCELLED_ANNOTATION: &str = " [cancelled]";

/// Collapse threshold for the `tldr` command, in characters.
pub const COLLAPSE_THRESHOLD: usize = 100;

pub struct ConversationController<'a> {
    session: &'a mut SessionContext,
    log: &'a mut Vec<Turn>,
    code_blocks: &'a mut CodeBlockIndex,
    ui: &'a mut UiState,
}

impl<'a> ConversationController<'a> {
    pub fn new(
        session: &'a mut SessionContext,
        log: &'a mut Vec<Turn>,
        code_blocks: &'a mut CodeBlockIndex,
        ui: &'a mut UiState,
    ) -> Self {
        Self {
            session,
            log,
            code_blocks,
            ui,
        }
    }

    pub fn last_user_content(&self) -> String {
        self.log
            .iter()
            .rev()
            .find(|turn| turn.is_user())
            .map(|turn| turn.content.clone())
            .unwrap_or_default()
    }

    pub fn last_assistant_content(&self) -> String {
        self.log
            .iter()
            .rev()
            .find(|turn| turn.is_assistant())
            .map(|turn| turn.content.clone())
            .unwrap_or_default()
    }

    /// Cancels any active generation, appends the user turn and its
    /// assistant placeholder, and registers a fresh generation targeting
    /// the placeholder. Returns what the stream task needs to start.
    pub fn begin_exchange(&mut self, user_content: String) -> (String, u64, CancellationToken) {
        self.cancel_active_generation();

        let user_id = self.session.turn_ids.allocate();
        self.log.push(Turn::user(user_id, user_content));

        let assistant_id = self.session.turn_ids.allocate();
        self.log.push(Turn::assistant_placeholder(assistant_id.clone()));

        self.session.current_stream_id += 1;
        let stream_id = self.session.current_stream_id;

        let cancel_token = CancellationToken::new();
        self.session.stream_cancel_token = Some(cancel_token.clone());
        self.session.generation = Some(Generation {
            target_turn_id: assistant_id.clone(),
            status: GenerationStatus::Pending,
            stream_id,
        });

        self.ui.image_progress = None;
        self.ui.scroll_to_bottom();

        (assistant_id, stream_id, cancel_token)
    }

    /// Applies one token. Refused when the generation is already
    /// terminal, or when the target turn is no longer the last turn of
    /// the log (a newer exchange superseded this stream).
    pub fn apply_token(&mut self, content: &str) {
        let Some(generation) = self.session.generation.as_mut() else {
            return;
        };
        if generation.is_terminal() {
            return;
        }

        let Some(last) = self.log.last_mut() else {
            return;
        };
        if !last.is_assistant() || last.id != generation.target_turn_id {
            return;
        }

        last.content.push_str(content);
        generation.status = GenerationStatus::Streaming;
    }

    /// Terminal `Done`: the content is stable, so the code block index is
    /// rebuilt for the target turn. A generation that already reached a
    /// terminal state (errored, cancelled) is left untouched; the `End`
    /// marker that follows an error is not a completion.
    pub fn complete_generation(&mut self) {
        let Some(generation) = self.session.generation.as_mut() else {
            return;
        };
        if generation.is_terminal() {
            return;
        }

        generation.status = GenerationStatus::Done;
        let target = generation.target_turn_id.clone();
        self.stabilize_turn(&target);
        self.session.stream_cancel_token = None;
        self.ui.image_progress = None;
    }

    /// Terminal `Errored`: the target turn's content is replaced wholesale
    /// with the annotation. The session stays usable.
    pub fn fail_generation(&mut self, annotation: &str) {
        let Some(generation) = self.session.generation.as_mut() else {
            return;
        };
        if generation.is_terminal() {
            return;
        }

        generation.status = GenerationStatus::Errored;
        let target = generation.target_turn_id.clone();
        if let Some(turn) = self.log.iter_mut().find(|t| t.id == target) {
            turn.content = annotation.to_string();
        }
        self.stabilize_turn(&target);
        self.session.stream_cancel_token = None;
        self.ui.image_progress = None;
    }

    /// Terminal `Cancelled`: requests producer shutdown and records the
    /// terminal marker locally in the same step, so any still-queued token
    /// from this generation is ignored when it surfaces.
    pub fn cancel_active_generation(&mut self) {
        if let Some(token) = self.session.stream_cancel_token.take() {
            token.cancel();
        }

        let Some(generation) = self.session.generation.as_mut() else {
            return;
        };
        if generation.is_terminal() {
            return;
        }

        generation.status = GenerationStatus::Cancelled;
        let target = generation.target_turn_id.clone();
        if let Some(turn) = self.log.iter_mut().find(|t| t.id == target) {
            turn.content.push_str(CANCELLED_ANNOTATION);
        }
        self.stabilize_turn(&target);
        self.ui.image_progress = None;
    }

    /// Collapses every turn whose content exceeds the display threshold.
    pub fn collapse_long_turns(&mut self) {
        for turn in self.log.iter_mut() {
            if turn.content.chars().count() > COLLAPSE_THRESHOLD {
                turn.collapsed = true;
            }
        }
    }

    pub fn expand_all_turns(&mut self) {
        for turn in self.log.iter_mut() {
            turn.collapsed = false;
        }
    }

    fn stabilize_turn(&mut self, turn_id: &str) {
        if let Some(turn) = self.log.iter().find(|t| t.id == turn_id) {
            self.code_blocks.rebuild_for_turn(turn_id, &turn.content);
        }
    }
}
