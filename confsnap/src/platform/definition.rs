//! Platform definition for device-type-specific configuration.

use indexmap::IndexMap;
use regex::bytes::Regex;
use serde::Deserialize;

use super::privilege_level::PrivilegeLevel;
use crate::channel::{combine_patterns, compile_prompt_pattern};
use crate::error::PlatformError;

/// Prompt pattern used for catalog entries that do not supply their own.
pub const GENERIC_PROMPT_PATTERN: &str = r"(?m)^[\w.\-@()/:]{1,63}[>#$%]\s?$";

/// Everything the session needs to know about one device type.
#[derive(Debug, Clone)]
pub struct PlatformDefinition {
    /// Device type identifier as it appears in the inventory (e.g. "cisco_ios").
    pub name: String,

    /// Command that prints the running configuration.
    pub command: String,

    /// Privilege levels for this platform.
    pub privilege_levels: IndexMap<String, PrivilegeLevel>,

    /// Privilege level the retrieval command must run in.
    pub default_privilege: String,

    /// Patterns that indicate command failure.
    pub failed_when_contains: Vec<String>,

    /// Session preparation commands (paging off, wide terminal).
    pub on_open_commands: Vec<String>,

    /// Terminal width for PTY.
    pub terminal_width: u32,

    /// Terminal height for PTY.
    pub terminal_height: u32,
}

impl PlatformDefinition {
    /// Create a new platform definition with minimal required fields.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            privilege_levels: IndexMap::new(),
            default_privilege: String::new(),
            failed_when_contains: vec![],
            on_open_commands: vec![],
            terminal_width: 511,
            terminal_height: 24,
        }
    }

    /// Add a privilege level.
    pub fn with_privilege(mut self, level: PrivilegeLevel) -> Self {
        self.privilege_levels.insert(level.name.clone(), level);
        self
    }

    /// Set the default privilege level.
    pub fn with_default_privilege(mut self, name: impl Into<String>) -> Self {
        self.default_privilege = name.into();
        self
    }

    /// Add a failure pattern.
    pub fn with_failure_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failed_when_contains.push(pattern.into());
        self
    }

    /// Add an on_open command.
    pub fn with_on_open_command(mut self, command: impl Into<String>) -> Self {
        self.on_open_commands.push(command.into());
        self
    }

    /// Set terminal dimensions.
    pub fn with_terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_width = width;
        self.terminal_height = height;
        self
    }

    /// Get a privilege level by name.
    pub fn get_privilege(&self, name: &str) -> Option<&PrivilegeLevel> {
        self.privilege_levels.get(name)
    }

    /// Build a combined regex that matches any privilege level's prompt.
    pub fn prompt_pattern(&self) -> Result<Regex, PlatformError> {
        if self.privilege_levels.is_empty() {
            return Err(PlatformError::InvalidDefinition {
                name: self.name.clone(),
                message: "no privilege levels defined".to_string(),
            });
        }

        Ok(combine_patterns(
            self.privilege_levels.values().map(|level| &level.pattern),
        )?)
    }

    /// Determine the privilege level a prompt belongs to.
    pub fn determine_privilege(&self, prompt: &str) -> Option<&PrivilegeLevel> {
        self.privilege_levels
            .values()
            .find(|level| level.matches(prompt))
    }

    /// Build a definition from a catalog file entry.
    pub fn from_entry(name: &str, entry: CatalogEntry) -> Result<Self, PlatformError> {
        if entry.command.trim().is_empty() {
            return Err(PlatformError::InvalidDefinition {
                name: name.to_string(),
                message: "command must not be empty".to_string(),
            });
        }

        let pattern = match entry.prompt.as_deref() {
            Some(prompt) => compile_prompt_pattern(prompt)?,
            None => Regex::new(GENERIC_PROMPT_PATTERN)?,
        };

        let level = PrivilegeLevel {
            name: "default".to_string(),
            pattern,
            previous_priv: None,
            escalate_command: None,
            escalate_prompt: None,
            not_contains: vec![],
        };

        let mut platform = PlatformDefinition::new(name, entry.command)
            .with_privilege(level)
            .with_default_privilege("default");
        platform.on_open_commands = entry.on_open;
        platform.failed_when_contains = entry.failure_patterns;

        Ok(platform)
    }
}

/// One device type in a catalog extension file.
///
/// ```json
/// {
///   "arista_eos": {
///     "command": "show running-config",
///     "on_open": ["terminal length 0"],
///     "failure_patterns": ["% Invalid input"]
///   }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogEntry {
    /// Retrieval command.
    pub command: String,

    /// Prompt regex; anchored to end of line if no anchor is given.
    #[serde(default)]
    pub prompt: Option<String>,

    /// Session preparation commands.
    #[serde(default)]
    pub on_open: Vec<String>,

    /// Output substrings that mark the command as failed.
    #[serde(default)]
    pub failure_patterns: Vec<String>,
}
