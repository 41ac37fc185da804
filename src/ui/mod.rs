//! User interface rendering and input handling.
//!
//! - **display**: the `Display` interface the event loop draws through
//! - **renderer**: crossterm implementation of `Display`
//! - **keyboard**: keyboard input as a byte stream
//! - **keymapper**: key events to the bytes a terminal would send
//! - **help**: the help overlay screen

pub mod display;
pub mod help;
pub mod keyboard;
pub mod keymapper;
pub mod renderer;

pub use display::{Display, DisplayMode};
pub use keyboard::{Keyboard, TerminalKeyboard};
pub use renderer::TerminalDisplay;
