//! Multiplexer: routes keyboard input, session output and prefix commands.

pub mod command;
pub mod event_loop;

#[cfg(test)]
pub mod testing;

pub use event_loop::{Multiplexer, MuxOptions};
