//! Event loop
//!
//! One thread owns the session table and every virtual screen. Each pass it
//! drains session output in slot order, updates the clock, then waits briefly
//! for a keyboard byte and either forwards it or runs a prefix command.

use std::io;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::command::{Command, ESC};
use crate::config::{Config, ConfigError};
use crate::core::pty::CommandSpec;
use crate::core::session::{SessionError, SessionOptions, SessionTable};
use crate::ui::help::help_screen;
use crate::ui::{Display, DisplayMode, Keyboard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    RoutingInput,
    RoutingPtyOutput,
    Command,
    Help,
    Terminating,
}

/// Runtime settings for the multiplexer
#[derive(Debug, Clone)]
pub struct MuxOptions {
    /// Byte that starts a command
    pub prefix: u8,
    /// How the prefix is spelled on the help screen
    pub prefix_label: String,
    /// What `n` starts
    pub shell: CommandSpec,
    pub poll_interval: Duration,
    pub max_bytes_per_pass: usize,
    pub write_queue_limit: usize,
    pub show_time: bool,
    pub tick_interval: Duration,
}

impl MuxOptions {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            prefix: config.prefix_byte()?,
            prefix_label: config.prefix_key.trim().to_string(),
            shell: config.shell_command(),
            poll_interval: config.event_loop.poll_interval(),
            max_bytes_per_pass: config.event_loop.max_bytes_per_pass.max(1),
            write_queue_limit: config.event_loop.write_queue_limit,
            show_time: config.status_bar.show_time,
            tick_interval: config.status_bar.tick_interval(),
        })
    }
}

fn report(result: io::Result<()>, what: &str) {
    if let Err(e) = result {
        warn!("display error ({}): {}", what, e);
    }
}

pub struct Multiplexer<D: Display, K: Keyboard> {
    display: D,
    keyboard: K,
    sessions: SessionTable,
    options: MuxOptions,
    state: LoopState,
    mode: DisplayMode,
    /// Mode to go back to when the help screen closes
    mode_before_help: DisplayMode,
    last_tick: Option<Instant>,
}

impl<D: Display, K: Keyboard> Multiplexer<D, K> {
    pub fn new(display: D, keyboard: K, options: MuxOptions) -> Self {
        Self {
            display,
            keyboard,
            sessions: SessionTable::new(),
            options,
            state: LoopState::Idle,
            mode: DisplayMode::Normal,
            mode_before_help: DisplayMode::Normal,
            last_tick: None,
        }
    }

    /// Start a session running `command` in the first free slot and show it
    pub fn open_session(&mut self, command: &CommandSpec) -> Result<usize, SessionError> {
        let (rows, cols) = self.display.size();
        let opts = SessionOptions {
            rows,
            cols,
            write_queue_limit: self.options.write_queue_limit,
        };
        let slot = self.sessions.spawn(command, opts)?;
        self.show_foreground();
        Ok(slot)
    }

    /// Run until quit or until the last session is gone, then shut down.
    /// Only a failing keyboard ends the loop with an error.
    pub fn run(&mut self) -> io::Result<()> {
        info!("event loop started");
        let result = loop {
            if self.state == LoopState::Terminating {
                break Ok(());
            }
            if let Err(e) = self.step() {
                error!("keyboard input failed: {}", e);
                break Err(e);
            }
        };
        self.shutdown();
        result
    }

    /// One dispatch pass
    pub fn step(&mut self) -> io::Result<()> {
        if self.state == LoopState::Terminating {
            return Ok(());
        }
        let backlog = self.pump_sessions();
        self.tick();
        if self.state == LoopState::Terminating {
            return Ok(());
        }

        // Output already waiting is drained on the next pass without sleeping
        let timeout = if backlog {
            Duration::ZERO
        } else {
            self.options.poll_interval
        };
        if let Some(byte) = self.keyboard.try_next_byte(timeout)? {
            self.handle_byte(byte)?;
        }
        Ok(())
    }

    /// Kill every session in slot order and release the display
    pub fn shutdown(&mut self) {
        self.state = LoopState::Terminating;
        info!("shutting down {} session(s)", self.sessions.len());
        self.sessions.kill_all();
        report(self.display.shutdown(), "shutdown");
    }

    fn resting_state(&self) -> LoopState {
        match self.mode {
            DisplayMode::Help => LoopState::Help,
            _ => LoopState::Idle,
        }
    }

    /// Leave a transient state unless a command already moved elsewhere
    fn settle(&mut self, from: LoopState) {
        if self.state == from {
            self.state = self.resting_state();
        }
    }

    /// Drain every session once. Returns whether any of them hit the byte
    /// budget with output still waiting.
    fn pump_sessions(&mut self) -> bool {
        self.state = LoopState::RoutingPtyOutput;
        let foreground = self.sessions.foreground();
        let visible = self.mode != DisplayMode::Help;
        let limit = self.options.max_bytes_per_pass;
        let mut finished = Vec::new();
        let mut backlog = false;

        for id in self.sessions.active_ids() {
            let Some(session) = self.sessions.get_mut(id) else {
                continue;
            };

            match session.pump(limit) {
                Ok(n) => backlog |= n >= limit || session.has_backlog(),
                Err(SessionError::Closed) => finished.push(id),
                Err(e) => {
                    warn!("session {}: {}", id, e);
                    finished.push(id);
                }
            }
            // Reap promptly; the session stays until its output is drained
            session.try_wait();

            let bell = session.screen_mut().take_alert();
            if Some(id) != foreground || !visible {
                continue;
            }
            if session.screen().is_dirty() {
                let cursor = session.screen().cursor();
                let lines = session.screen_mut().changed_lines();
                report(self.display.render_lines(&lines, cursor), "render lines");
            }
            if bell {
                report(self.display.alert(), "alert");
            }
        }

        for id in finished {
            self.finish_session(id);
        }
        self.settle(LoopState::RoutingPtyOutput);
        backlog
    }

    fn finish_session(&mut self, id: usize) {
        if let Some(session) = self.sessions.get(id) {
            info!(
                "session {} exited: {} (pid {:?}, code {:?})",
                id,
                session.command().program,
                session.pid(),
                session.exit_code()
            );
        }

        let was_foreground = self.sessions.foreground() == Some(id);
        if self.sessions.kill(id).is_ok() {
            self.set_status(&format!("Session {} exited", id));
        }
        if was_foreground {
            self.foreground_changed();
        }
    }

    fn foreground_changed(&mut self) {
        match self.sessions.foreground() {
            Some(id) => {
                debug!("foreground is now session {}", id);
                self.show_foreground();
            }
            None => {
                info!("no sessions left");
                self.state = LoopState::Terminating;
            }
        }
    }

    /// Full redraw of the foreground screen
    fn show_foreground(&mut self) {
        if self.mode == DisplayMode::Help {
            return;
        }
        let Some(session) = self.sessions.foreground_session_mut() else {
            return;
        };
        let snapshot = session.screen().snapshot();
        session.screen_mut().mark_clean();
        report(self.display.render_full(&snapshot), "full redraw");
    }

    fn tick(&mut self) {
        if !self.options.show_time {
            return;
        }
        let due = self
            .last_tick
            .map_or(true, |t| t.elapsed() >= self.options.tick_interval);
        if due {
            self.last_tick = Some(Instant::now());
            let now = chrono::Local::now().format("%H:%M:%S").to_string();
            report(self.display.set_clock(&now), "clock");
        }
    }

    fn handle_byte(&mut self, byte: u8) -> io::Result<()> {
        if self.mode == DisplayMode::Help {
            // A lone Escape key; arrows and function keys also start with ESC
            if byte == ESC && !self.keyboard.key_continues() {
                self.leave_help();
            } else {
                debug!("ignored on help screen: {:#04x}", byte);
            }
            return Ok(());
        }

        if byte == self.options.prefix {
            self.state = LoopState::Command;
            self.set_status("");
            let prefix = self.options.prefix;
            let keyboard = &mut self.keyboard;
            let first = keyboard.next_byte()?;
            let command = Command::parse(first, prefix, || keyboard.next_byte())?;
            self.execute(command);
            self.settle(LoopState::Command);
        } else {
            self.state = LoopState::RoutingInput;
            self.forward(byte);
            self.settle(LoopState::RoutingInput);
        }
        Ok(())
    }

    /// Send a byte to the foreground session
    fn forward(&mut self, byte: u8) {
        let Some(session) = self.sessions.foreground_session_mut() else {
            self.alert();
            return;
        };
        match session.write(byte) {
            Ok(_) => {}
            Err(SessionError::Backpressure { slot, queued }) => {
                warn!("session {} input backed up ({} bytes), dropping input", slot, queued);
                self.alert();
            }
            Err(e) => {
                debug!("input not delivered: {}", e);
                self.alert();
            }
        }
    }

    fn execute(&mut self, command: Command) {
        debug!("command {:?}", command);
        match command {
            Command::Select(slot) => match self.sessions.set_foreground(slot) {
                Ok(()) => {
                    self.set_status(&format!("Current Session: Session {}", slot));
                    self.show_foreground();
                }
                Err(_) => self.no_such_session(slot),
            },
            Command::New => self.new_session(),
            Command::Kill(slot) => self.kill_session(slot),
            Command::ToggleSplit => {
                let mode = match self.mode {
                    DisplayMode::Split => DisplayMode::Normal,
                    _ => DisplayMode::Split,
                };
                self.set_mode(mode);
                self.show_foreground();
            }
            Command::Help => self.enter_help(),
            Command::Quit => {
                info!("quit requested");
                self.state = LoopState::Terminating;
            }
            Command::SendPrefix => self.forward(self.options.prefix),
            Command::LeaveHelp | Command::Unknown(_) => self.alert(),
        }
    }

    fn new_session(&mut self) {
        let shell = self.options.shell.clone();
        match self.open_session(&shell) {
            Ok(slot) => {
                info!("new session {}", slot);
                self.set_status("New Session Made");
            }
            Err(e @ (SessionError::AllocationExhausted | SessionError::PtyExhausted(_))) => {
                warn!("{}", e);
                self.alert();
                self.set_status("No More Sessions Available");
            }
            Err(e) => {
                error!("failed to create session: {}", e);
                self.alert();
                self.set_status(&e.to_string());
            }
        }
    }

    fn kill_session(&mut self, slot: usize) {
        let was_foreground = self.sessions.foreground() == Some(slot);
        match self.sessions.kill(slot) {
            Ok(()) => {
                info!("session {} killed", slot);
                self.set_status(&format!("Session {} Killed", slot));
                if was_foreground {
                    self.foreground_changed();
                }
            }
            Err(_) => self.no_such_session(slot),
        }
    }

    fn enter_help(&mut self) {
        let (rows, cols) = self.display.size();
        let help = help_screen(
            rows,
            cols,
            &self.options.prefix_label,
            &self.sessions.active_ids(),
        );
        self.mode_before_help = self.mode;
        self.set_mode(DisplayMode::Help);
        self.state = LoopState::Help;
        report(self.display.render_full(&help.snapshot()), "help screen");
    }

    fn leave_help(&mut self) {
        self.set_mode(self.mode_before_help);
        self.state = LoopState::Idle;
        self.show_foreground();
    }

    fn set_mode(&mut self, mode: DisplayMode) {
        self.mode = mode;
        report(self.display.set_mode(mode), "set mode");
    }

    fn no_such_session(&mut self, slot: usize) {
        self.alert();
        self.set_status(&format!("Session {} does not exist", slot));
    }

    fn set_status(&mut self, text: &str) {
        report(self.display.set_status_line(text), "status line");
    }

    fn alert(&mut self) {
        report(self.display.alert(), "alert");
    }
}

#[cfg(test)]
impl<D: Display, K: Keyboard> Multiplexer<D, K> {
    fn state(&self) -> LoopState {
        self.state
    }

    fn mode(&self) -> DisplayMode {
        self.mode
    }

    fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    fn sessions_mut(&mut self) -> &mut SessionTable {
        &mut self.sessions
    }

    fn display(&self) -> &D {
        &self.display
    }

    fn keyboard(&self) -> &K {
        &self.keyboard
    }

    fn keyboard_mut(&mut self) -> &mut K {
        &mut self.keyboard
    }
}
