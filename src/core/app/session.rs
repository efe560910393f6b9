//! Session-scoped state: service connection, model selection, and the
//! lifecycle of the one in-flight generation.

use tokio_util::sync::CancellationToken;

use crate::core::config::Config;
use crate::core::ids::TurnIdAllocator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStatus {
    /// Created, no tokens applied yet.
    Pending,
    /// At least one token has been applied.
    Streaming,
    Done,
    Errored,
    Cancelled,
}

impl GenerationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GenerationStatus::Done | GenerationStatus::Errored | GenerationStatus::Cancelled
        )
    }
}

/// The in-flight (or most recently finished) streaming generation.
///
/// At most one non-terminal generation exists per session. The
/// `stream_id` is the staleness fence: events tagged with an older ID are
/// dropped before they can touch the log, and a terminal status is sticky
/// against late tokens that carry the current ID.
#[derive(Debug, Clone)]
pub struct Generation {
    pub target_turn_id: String,
    pub status: GenerationStatus,
    pub stream_id: u64,
}

impl Generation {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

pub struct SessionContext {
    pub client: reqwest::Client,
    pub config: Config,
    pub model: String,
    /// Set when `--model` was given; a later config load must not clobber it.
    pub model_overridden: bool,
    pub models: Vec<String>,
    /// Prompts go to the image service instead of the chat service.
    pub image_mode: bool,
    pub turn_ids: TurnIdAllocator,
    pub generation: Option<Generation>,
    pub stream_cancel_token: Option<CancellationToken>,
    pub current_stream_id: u64,
    pub exit_requested: bool,
}

impl SessionContext {
    pub fn new(config: Config, model_override: Option<String>, image_mode: bool) -> Self {
        let model_overridden = model_override.is_some();
        let model = model_override.unwrap_or_else(|| config.model.clone());
        Self {
            client: reqwest::Client::new(),
            config,
            model,
            model_overridden,
            models: Vec::new(),
            image_mode,
            turn_ids: TurnIdAllocator::new(),
            generation: None,
            stream_cancel_token: None,
            current_stream_id: 0,
            exit_requested: false,
        }
    }

    pub fn is_current_stream(&self, stream_id: u64) -> bool {
        self.current_stream_id == stream_id
    }

    /// The generation, if one exists and has not reached a terminal state.
    pub fn active_generation(&self) -> Option<&Generation> {
        self.generation.as_ref().filter(|g| !g.is_terminal())
    }

    pub fn has_active_generation(&self) -> bool {
        self.active_generation().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!GenerationStatus::Pending.is_terminal());
        assert!(!GenerationStatus::Streaming.is_terminal());
        assert!(GenerationStatus::Done.is_terminal());
        assert!(GenerationStatus::Errored.is_terminal());
        assert!(GenerationStatus::Cancelled.is_terminal());
    }

    #[test]
    fn model_override_wins_over_config() {
        let mut config = Config::default();
        config.model = "from-config".to_string();

        let session = SessionContext::new(config.clone(), Some("from-cli".to_string()), false);
        assert_eq!(session.model, "from-cli");
        assert!(session.model_overridden);

        let session = SessionContext::new(config, None, false);
        assert_eq!(session.model, "from-config");
        assert!(!session.model_overridden);
    }

    #[test]
    fn terminal_generation_is_not_active() {
        let mut session = SessionContext::new(Config::default(), None, false);
        session.generation = Some(Generation {
            target_turn_id: "ab".to_string(),
            status: GenerationStatus::Done,
            stream_id: 1,
        });
        assert!(!session.has_active_generation());

        session.generation.as_mut().unwrap().status = GenerationStatus::Streaming;
        assert!(session.has_active_generation());
    }
}
