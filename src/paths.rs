//! Path resolution for Grace configuration and data files.
//!
//! GRACE_HOME resolution order:
//! 1. GRACE_HOME environment variable (if set)
//! 2. ~/.config/grace (default)

use std::path::PathBuf;

/// Returns the Grace home directory.
///
/// Checks GRACE_HOME env var first, falls back to ~/.config/grace
pub fn grace_home() -> PathBuf {
    if let Ok(home) = std::env::var("GRACE_HOME") {
        return PathBuf::from(home);
    }

    dirs::home_dir()
        .map(|h| h.join(".config").join("grace"))
        .expect("Could not determine home directory")
}

/// Returns the path to the config.toml file.
pub fn config_path() -> PathBuf {
    grace_home().join("config.toml")
}

/// Returns the path to the session snapshot file.
pub fn state_path() -> PathBuf {
    grace_home().join("chat-sessions.json")
}
