pub mod app;
pub mod chat_stream;
pub mod code_blocks;
pub mod comfy;
pub mod config;
pub mod ids;
pub mod message;
