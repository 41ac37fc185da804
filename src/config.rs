//! Configuration for dumbmux.
//!
//! Settings are read from `~/.dumbmux/config.toml`. Every field is optional:
//!
//! ```toml
//! # Command for new sessions (defaults to $SHELL, then /bin/sh)
//! shell = "/bin/bash"
//!
//! # Command prefix: "C-<letter>" or a bare letter, both meaning Ctrl+letter
//! prefix_key = "C-a"
//!
//! # trace, debug, info, warn, error (DUMBMUX_LOG overrides)
//! log_level = "info"
//!
//! [event_loop]
//! poll_interval_ms = 10
//! max_bytes_per_pass = 4096
//! write_queue_limit = 65536
//!
//! [status_bar]
//! show_time = true
//! tick_interval_ms = 1000
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::pty::CommandSpec;
use crate::ui::keymapper::control_byte;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid prefix key: {0:?}")]
    InvalidPrefix(String),
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default shell command
    pub shell: Option<String>,
    pub prefix_key: String,
    pub log_level: String,
    pub event_loop: EventLoopConfig,
    pub status_bar: StatusBarConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: None,
            prefix_key: "C-a".to_string(),
            log_level: "info".to_string(),
            event_loop: EventLoopConfig::default(),
            status_bar: StatusBarConfig::default(),
        }
    }
}

/// Dispatch tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLoopConfig {
    /// Longest wait for keyboard input per pass
    pub poll_interval_ms: u64,
    /// Output bytes taken from one session per pass
    pub max_bytes_per_pass: usize,
    /// Input bytes a session may have queued before writes are refused
    pub write_queue_limit: usize,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            max_bytes_per_pass: 4096,
            write_queue_limit: 64 * 1024,
        }
    }
}

impl EventLoopConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Status bar configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusBarConfig {
    pub show_time: bool,
    pub tick_interval_ms: u64,
}

impl Default for StatusBarConfig {
    fn default() -> Self {
        Self {
            show_time: true,
            tick_interval_ms: 1000,
        }
    }
}

impl StatusBarConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

impl Config {
    /// Load `~/.dumbmux/config.toml`. A missing file gives the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content)?;
        config.prefix_byte()?;
        Ok(config)
    }

    /// `~/.dumbmux`, created on first use
    pub fn config_dir() -> Option<PathBuf> {
        let dir = home_dir()?.join(".dumbmux");
        if !dir.exists() {
            let _ = fs::create_dir_all(&dir);
        }
        Some(dir)
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Where the log goes unless `-o` says otherwise
    pub fn default_log_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("dumbmux.log"))
    }

    /// The command prefix as the byte the keyboard produces
    pub fn prefix_byte(&self) -> Result<u8, ConfigError> {
        let key = self.prefix_key.trim();
        let letter = key
            .strip_prefix("C-")
            .or_else(|| key.strip_prefix("c-"))
            .or_else(|| key.strip_prefix('^'))
            .unwrap_or(key);

        let mut chars = letter.chars();
        let byte = match (chars.next(), chars.next()) {
            (Some(ch), None) => control_byte(ch),
            _ => None,
        };
        byte.ok_or_else(|| ConfigError::InvalidPrefix(self.prefix_key.clone()))
    }

    /// Command new sessions run
    pub fn shell_command(&self) -> CommandSpec {
        match &self.shell {
            Some(shell) if !shell.trim().is_empty() => {
                let mut words = shell.split_whitespace();
                let program = words.next().unwrap_or_default();
                CommandSpec::with_args(program, words)
            }
            _ => CommandSpec::default_shell(),
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.prefix_byte().unwrap(), 0x01);
        assert_eq!(config.event_loop.poll_interval(), Duration::from_millis(10));
        assert_eq!(config.event_loop.max_bytes_per_pass, 4096);
        assert_eq!(config.event_loop.write_queue_limit, 65536);
        assert!(config.status_bar.show_time);
        assert_eq!(config.status_bar.tick_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_config(
            r#"
shell = "/bin/zsh -l"
prefix_key = "C-b"

[event_loop]
max_bytes_per_pass = 512
"#,
        );
        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.prefix_byte().unwrap(), 0x02);
        assert_eq!(config.event_loop.max_bytes_per_pass, 512);
        assert_eq!(config.event_loop.poll_interval_ms, 10);
        assert_eq!(config.log_level, "info");

        let shell = config.shell_command();
        assert_eq!(shell.program, "/bin/zsh");
        assert_eq!(shell.args, vec!["-l".to_string()]);
    }

    #[test]
    fn test_invalid_toml() {
        let file = write_config("prefix_key = [");
        assert!(matches!(
            Config::load_from(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_invalid_prefix() {
        let file = write_config(r#"prefix_key = "C-1""#);
        assert!(matches!(
            Config::load_from(file.path()),
            Err(ConfigError::InvalidPrefix(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load_from(&dir.path().join("nope.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_prefix_spellings() {
        for (key, byte) in [("C-a", 0x01), ("c-x", 0x18), ("^b", 0x02), ("z", 0x1A)] {
            let config = Config {
                prefix_key: key.to_string(),
                ..Config::default()
            };
            assert_eq!(config.prefix_byte().unwrap(), byte, "{}", key);
        }
    }
}
