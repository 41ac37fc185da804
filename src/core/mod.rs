//! Core terminal emulation components.
//!
//! - **pty**: pseudoterminal allocation and child process control
//! - **screen**: the dumb-terminal virtual screen
//! - **session**: a pty plus its screen, and the table holding them
//!
//! ```text
//! SessionTable
//! └── Session
//!     ├── Pty (child process, reader and writer threads)
//!     └── VirtualScreen (rows, cursor, dirty lines)
//! ```

pub mod pty;
pub mod screen;
pub mod session;
