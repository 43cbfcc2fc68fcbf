pub mod ai_utils;
pub mod api;
pub mod auth;
pub mod config;
pub mod content;
pub mod error;
pub mod proctor;
pub mod prompts;
pub mod server;
pub mod settings;
pub mod store;
pub mod survey;
pub mod utils;
