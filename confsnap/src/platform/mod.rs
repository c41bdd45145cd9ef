//! Platform definitions for device-type dispatch.
//!
//! This module defines per-device-type configuration including the
//! retrieval command, prompt patterns, privilege levels, and the catalog
//! that maps inventory `device_type` strings onto them.

mod catalog;
mod definition;
mod privilege_level;
pub mod vendors;

pub use catalog::{CommandCatalog, Dispatch};
pub use definition::{CatalogEntry, GENERIC_PROMPT_PATTERN, PlatformDefinition};
pub use privilege_level::PrivilegeLevel;
