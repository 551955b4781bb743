//! TUI components for journalscope
//!
//! This crate provides the terminal user interface for journalscope,
//! including state management, keybindings, event handling, and UI components.

pub mod app;
pub mod config;
pub mod tui;
pub mod ui;

pub use app::{Action, AppState, InputField, Notice, UiState};
pub use config::{KeyBinding, KeyBindings, KeyContext};
pub use tui::{Event, EventHandler, Tui};
pub use ui::Theme;
pub use ui::components::{HelpOverlay, StatusBar, log_viewer_hints};
pub use ui::screens::LogViewerScreen;
