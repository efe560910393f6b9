//! Command-line argument parsing and process startup.

use std::error::Error;

use clap::Parser;

use crate::ui::chat_loop::{run_chat, ChatOptions};

#[derive(Parser)]
#[command(name = "sotto")]
#[command(about = "A modal terminal chat client for local generation services")]
#[command(
    long_about = "Sotto is a full-screen terminal chat client that talks to a local \
Ollama-compatible text generation service, with optional image generation through a \
local ComfyUI-compatible service.\n\n\
Controls:\n\
  i                 Compose a message (o/O prefill the last user/assistant turn)\n\
  :                 Command mode (config, save, tldr, verbose, quit)\n\
  y                 Yank a code block to the clipboard by its address\n\
  gg / G            Scroll to the top / bottom of the transcript\n\
  Ctrl+C            Cancel the running generation, or quit when idle"
)]
pub struct Args {
    /// Model to use, overriding the configured default
    #[arg(short = 'm', long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Send prompts to the image service instead of the chat service
    #[arg(short = 'i', long)]
    pub image: bool,

    /// Write debug logs to this file (honors RUST_LOG)
    #[arg(short = 'l', long, value_name = "FILE")]
    pub log: Option<String>,
}

pub async fn run() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    if let Some(log_path) = &args.log {
        init_logging(log_path)?;
    }

    run_chat(ChatOptions {
        model: args.model,
        image_mode: args.image,
    })
    .await
}

/// File-backed tracing. Nothing may write to the terminal itself while
/// the alternate screen is active.
fn init_logging(log_path: &str) -> Result<(), Box<dyn Error>> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sotto=debug")),
        )
        .with_writer(std::sync::Arc::new(file))
        .with_ansi(false)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn image_flag_parses() {
        let args = Args::parse_from(["sotto", "-i", "-m", "gemma3"]);
        assert!(args.image);
        assert_eq!(args.model.as_deref(), Some("gemma3"));
    }
}
