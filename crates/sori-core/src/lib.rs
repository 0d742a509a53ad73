//! Core types and configuration for sori.
//!
//! This crate provides platform-agnostic types that can be used across
//! all sori sub-crates.

mod config;
mod event;
mod state;

pub use config::{Config, ConfigManager, DEFAULT_API_URL};
pub use event::{LogNotifier, Notice, Notifier};
pub use state::{InputMode, ListenState};

/// Application name
pub const APP_NAME: &str = "sori";

/// Pretty application name for display
pub const APP_NAME_PRETTY: &str = "Sori";

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default recognition locale
pub const DEFAULT_LOCALE: &str = "ko-KR";
