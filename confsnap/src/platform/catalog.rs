//! Device-type to platform catalog.
//!
//! The catalog is built once at start-up and shared read-only (usually
//! behind an `Arc`) by every session worker.

use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;
use log::debug;

use super::definition::{CatalogEntry, PlatformDefinition};
use super::vendors;
use crate::error::PlatformError;

/// Result of looking a device type up in the catalog.
#[derive(Debug, Clone, Copy)]
pub enum Dispatch<'a> {
    /// The device type is known; back it up with this platform.
    Supported(&'a PlatformDefinition),

    /// The device type has no entry. Skip the device without connecting.
    Unsupported,
}

impl<'a> Dispatch<'a> {
    /// The platform, if supported.
    pub fn platform(self) -> Option<&'a PlatformDefinition> {
        match self {
            Dispatch::Supported(platform) => Some(platform),
            Dispatch::Unsupported => None,
        }
    }

    /// The retrieval command, if supported.
    pub fn command(self) -> Option<&'a str> {
        self.platform().map(|p| p.command.as_str())
    }
}

/// Immutable mapping from device type to [`PlatformDefinition`].
#[derive(Debug, Default, Clone)]
pub struct CommandCatalog {
    platforms: HashMap<String, PlatformDefinition>,
}

impl CommandCatalog {
    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self {
            platforms: HashMap::new(),
        }
    }

    /// Catalog with the built-in Cisco device types.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for platform in vendors::cisco::platforms() {
            catalog.insert(platform);
        }
        catalog
    }

    /// Add or replace a platform definition.
    pub fn insert(&mut self, platform: PlatformDefinition) -> Option<PlatformDefinition> {
        self.platforms.insert(platform.name.clone(), platform)
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_platform(mut self, platform: PlatformDefinition) -> Self {
        self.insert(platform);
        self
    }

    /// Look up the platform for a device type.
    pub fn lookup(&self, device_type: &str) -> Dispatch<'_> {
        match self.platforms.get(device_type) {
            Some(platform) => Dispatch::Supported(platform),
            None => Dispatch::Unsupported,
        }
    }

    /// Check if a device type is supported.
    pub fn contains(&self, device_type: &str) -> bool {
        self.platforms.contains_key(device_type)
    }

    /// Supported device types, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.platforms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of supported device types.
    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }

    /// Merge entries from a JSON catalog file. File entries replace
    /// built-ins with the same device type.
    pub fn extend_from_file(&mut self, path: impl AsRef<Path>) -> Result<usize, PlatformError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| PlatformError::CatalogRead {
            path: path.to_path_buf(),
            source,
        })?;
        self.extend_from_json(&raw).map_err(|e| match e {
            ParseOrDefinition::Parse(source) => PlatformError::CatalogParse {
                path: path.to_path_buf(),
                source,
            },
            ParseOrDefinition::Definition(e) => e,
        })
    }

    fn extend_from_json(&mut self, raw: &str) -> Result<usize, ParseOrDefinition> {
        let entries: IndexMap<String, CatalogEntry> =
            serde_json::from_str(raw).map_err(ParseOrDefinition::Parse)?;

        let count = entries.len();
        for (name, entry) in entries {
            let platform =
                PlatformDefinition::from_entry(&name, entry).map_err(ParseOrDefinition::Definition)?;
            if self.insert(platform).is_some() {
                debug!("catalog entry '{}' replaces built-in definition", name);
            }
        }
        Ok(count)
    }
}

enum ParseOrDefinition {
    Parse(serde_json::Error),
    Definition(PlatformError),
}
