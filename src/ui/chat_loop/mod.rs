//! The interactive session loop.
//!
//! One task owns the [`App`] and is the only writer of session state.
//! Terminal input arrives from a reader task over a channel; generation
//! events arrive over the bounded stream queue; completed background work
//! (config, models, clipboard, export) arrives as actions. Each loop
//! iteration drains whatever is pending without blocking, applies it
//! through the reducer, launches the returned commands, and redraws.

use std::{
    error::Error,
    io,
    time::{Duration, Instant},
};

use ratatui::backend::CrosstermBackend;
use ratatui::crossterm::event::{self, Event, KeyEventKind};
use ratatui::crossterm::execute;
use ratatui::crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::Terminal;
use tokio::sync::mpsc;
use tracing::debug;

use crate::api::models::fetch_models;
use crate::core::app::{
    apply_actions, App, AppAction, AppActionDispatcher, AppCommand, KeyPress, SessionContext,
};
use crate::core::chat_stream::{ChatStreamService, StreamMessage};
use crate::core::comfy::ImageService;
use crate::core::config::Config;
use crate::core::message::Turn;
use crate::ui::renderer;
use crate::utils::clipboard::copy_to_clipboard;

const MAX_FPS: u64 = 60;
const IDLE_SLEEP: Duration = Duration::from_millis(16);

pub struct ChatOptions {
    pub model: Option<String>,
    pub image_mode: bool,
}

pub async fn run_chat(options: ChatOptions) -> Result<(), Box<dyn Error>> {
    let session = SessionContext::new(Config::default(), options.model, options.image_mode);
    let mut app = App::new(session);

    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<AppAction>();
    let dispatcher = AppActionDispatcher::new(action_tx);

    let (stream_service, mut stream_rx) = ChatStreamService::new();
    let image_service = ImageService::new(stream_service.sender());

    // The saved config (and then the model list) arrives as events.
    spawn_config_loader(dispatcher.clone());

    let mut terminal = setup_terminal()?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();
    let reader_handle = spawn_event_reader(event_tx);

    let frame_duration = Duration::from_millis(1000 / MAX_FPS);
    let mut last_draw = Instant::now() - frame_duration;
    let mut request_redraw = true;

    let result = loop {
        if app.session.exit_requested {
            break Ok(());
        }

        if request_redraw && last_draw.elapsed() >= frame_duration {
            terminal.draw(|frame| renderer::draw(frame, &mut app))?;
            last_draw = Instant::now();
            request_redraw = false;
        }

        // Pending generation events are drained ahead of new input, so a
        // keystroke always acts on the freshest conversation state.
        let received_any =
            drain_stream_events(&dispatcher, &mut stream_rx, app.session.current_stream_id);
        if received_any {
            request_redraw = true;
        }

        let mut events_processed = false;
        while let Ok(ev) = event_rx.try_recv() {
            events_processed = true;
            match ev {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    dispatcher.dispatch(AppAction::KeyPressed(KeyPress::new(key, Instant::now())));
                }
                Event::Resize(_, _) => {
                    request_redraw = true;
                }
                _ => {}
            }
        }

        let mut pending = Vec::new();
        while let Ok(action) = action_rx.try_recv() {
            pending.push(action);
        }
        if !pending.is_empty() {
            let commands = apply_actions(&mut app, pending);
            for command in commands {
                execute_command(&app, &dispatcher, &stream_service, &image_service, command);
            }
            request_redraw = true;
        }

        if app.ui.status_expired(Instant::now()) {
            dispatcher.dispatch(AppAction::ClearStatus);
        }

        if !events_processed && !received_any && !request_redraw {
            tokio::time::sleep(IDLE_SLEEP).await;
        }
    };

    reader_handle.abort();
    restore_terminal(&mut terminal)?;
    result
}

/// Non-blocking drain of the generation event queue. Events from a
/// superseded stream are dropped here, before they ever become actions;
/// consecutive tokens for the live stream are coalesced into one append.
fn drain_stream_events(
    dispatcher: &AppActionDispatcher,
    rx: &mut mpsc::Receiver<(StreamMessage, u64)>,
    current_stream_id: u64,
) -> bool {
    let mut received_any = false;
    let mut coalesced = String::new();
    let mut chunk_stream_id = None;
    let mut followups = Vec::new();

    while let Ok((message, stream_id)) = rx.try_recv() {
        if stream_id != current_stream_id {
            debug!(stream_id, current_stream_id, "dropping stale stream event");
            continue;
        }

        match message {
            StreamMessage::Token(content) => {
                coalesced.push_str(&content);
                chunk_stream_id = Some(stream_id);
            }
            StreamMessage::Progress(note) => {
                followups.push(AppAction::StreamProgress { note, stream_id });
            }
            StreamMessage::Error(message) => {
                followups.push(AppAction::StreamErrored { message, stream_id });
            }
            StreamMessage::End => {
                followups.push(AppAction::StreamCompleted { stream_id });
            }
        }
        received_any = true;
    }

    if !received_any {
        return false;
    }

    let mut actions = Vec::with_capacity(1 + followups.len());
    if !coalesced.is_empty() {
        if let Some(stream_id) = chunk_stream_id {
            actions.push(AppAction::AppendResponseChunk {
                content: coalesced,
                stream_id,
            });
        }
    }
    actions.extend(followups);
    dispatcher.dispatch_many(actions);

    true
}

fn execute_command(
    app: &App,
    dispatcher: &AppActionDispatcher,
    stream_service: &ChatStreamService,
    image_service: &ImageService,
    command: AppCommand,
) {
    match command {
        AppCommand::SpawnStream(params) => stream_service.spawn_stream(params),
        AppCommand::SpawnImageJob(params) => image_service.spawn_job(params),
        AppCommand::LoadModels => spawn_model_loader(
            dispatcher.clone(),
            app.session.client.clone(),
            app.session.config.service_url.clone(),
        ),
        AppCommand::SaveConfig(config) => spawn_config_saver(dispatcher.clone(), config),
        AppCommand::CopyToClipboard { block_id, text } => {
            spawn_clipboard_copy(dispatcher.clone(), block_id, text)
        }
        AppCommand::ExportConversation { filename, records } => {
            spawn_export(dispatcher.clone(), filename, records)
        }
    }
}

fn spawn_config_loader(dispatcher: AppActionDispatcher) {
    tokio::task::spawn_blocking(move || {
        let result = Config::load().map_err(|e| e.to_string());
        dispatcher.dispatch(AppAction::ConfigLoaded { result });
    });
}

fn spawn_model_loader(dispatcher: AppActionDispatcher, client: reqwest::Client, base_url: String) {
    tokio::spawn(async move {
        let result = fetch_models(&client, &base_url).await;
        dispatcher.dispatch(AppAction::ModelsLoaded { result });
    });
}

fn spawn_config_saver(dispatcher: AppActionDispatcher, config: Config) {
    tokio::task::spawn_blocking(move || {
        let result = config.save().map_err(|e| e.to_string());
        dispatcher.dispatch(AppAction::ConfigSaved { result });
    });
}

fn spawn_clipboard_copy(dispatcher: AppActionDispatcher, block_id: String, text: String) {
    tokio::task::spawn_blocking(move || {
        let result = copy_to_clipboard(&text);
        dispatcher.dispatch(AppAction::ClipboardCompleted { block_id, result });
    });
}

fn spawn_export(dispatcher: AppActionDispatcher, filename: String, records: Vec<Turn>) {
    tokio::task::spawn_blocking(move || {
        let result = serde_json::to_vec_pretty(&records)
            .map_err(|e| e.to_string())
            .and_then(|data| std::fs::write(&filename, data).map_err(|e| e.to_string()));
        dispatcher.dispatch(AppAction::ExportCompleted { filename, result });
    });
}

fn spawn_event_reader(event_tx: mpsc::UnboundedSender<Event>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Ok(true) = event::poll(Duration::from_millis(10)) {
                match event::read() {
                    Ok(ev) => {
                        if event_tx.send(ev).is_err() {
                            break;
                        }
                    }
                    Err(_) => continue,
                }
            } else {
                tokio::task::yield_now().await;
            }
        }
    })
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>, Box<dyn Error>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let terminal = Terminal::new(CrosstermBackend::new(stdout)).inspect_err(|_| {
        let _ = disable_raw_mode();
    })?;
    Ok(terminal)
}

fn restore_terminal(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
) -> Result<(), Box<dyn Error>> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    fn drain_actions(rx: &mut mpsc::UnboundedReceiver<AppAction>) -> Vec<AppAction> {
        let mut actions = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(action) => actions.push(action),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        actions
    }

    #[tokio::test]
    async fn stream_drain_coalesces_tokens_and_filters_stale_ids() {
        let (service, mut stream_rx) = ChatStreamService::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = AppActionDispatcher::new(tx);

        service.send_for_test(StreamMessage::Token("Hel".into()), 42).await;
        service.send_for_test(StreamMessage::Token("lo".into()), 42).await;
        service.send_for_test(StreamMessage::Token("stale".into()), 7).await;
        service.send_for_test(StreamMessage::End, 42).await;

        let received = drain_stream_events(&dispatcher, &mut stream_rx, 42);
        assert!(received);

        let actions = drain_actions(&mut rx);
        assert_eq!(actions.len(), 2);
        match &actions[0] {
            AppAction::AppendResponseChunk { content, stream_id } => {
                assert_eq!(content, "Hello");
                assert_eq!(*stream_id, 42);
            }
            _ => panic!("expected coalesced chunk first"),
        }
        assert!(matches!(
            actions[1],
            AppAction::StreamCompleted { stream_id: 42 }
        ));
    }

    #[tokio::test]
    async fn stream_drain_reports_quiet_queue() {
        let (_service, mut stream_rx) = ChatStreamService::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let dispatcher = AppActionDispatcher::new(tx);
        assert!(!drain_stream_events(&dispatcher, &mut stream_rx, 1));
    }
}
