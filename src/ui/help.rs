//! Help overlay
//!
//! The overlay is an ordinary [`VirtualScreen`] filled with text, so it goes
//! through the same rendering path as a session.

use crate::core::screen::VirtualScreen;

/// Build the help screen for the current set of active sessions.
/// Lines that do not fit are dropped from the bottom.
pub fn help_screen(rows: u16, cols: u16, prefix: &str, active: &[usize]) -> VirtualScreen {
    let mut screen = VirtualScreen::new(rows, cols);
    let lines = help_lines(prefix, active);
    for (i, line) in lines.iter().take(rows.max(1) as usize).enumerate() {
        if i > 0 {
            screen.feed(b"\r\n");
        }
        screen.feed(line.as_bytes());
    }
    screen
}

fn help_lines(prefix: &str, active: &[usize]) -> Vec<String> {
    let sessions = active
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(" ");

    vec![
        "Help Screen".to_string(),
        "----------------------------".to_string(),
        "dumbmux understands the following commands:".to_string(),
        format!("{} n: Start a new terminal session", prefix),
        format!("{} 0-9: Switch to a session, if it is active", prefix),
        format!("{} k 0-9: Forcibly terminate a session", prefix),
        format!("{} s: Split the screen, showing the current session twice", prefix),
        format!("{} h: Display this help screen", prefix),
        format!("{} {}: Send a literal prefix to the session", prefix, prefix),
        "ESC: Leave the help screen".to_string(),
        format!("{} q: Quit", prefix),
        "Current Sessions that are active:".to_string(),
        sessions,
    ]
}
