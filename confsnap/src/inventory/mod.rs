//! Device inventory loading.
//!
//! An inventory is a JSON array of objects or a CSV file with a header row.
//! Every entry becomes a [`DeviceRecord`]: an ordered, immutable map of
//! field name to string value. Only `ip` and `device_type` have meaning to
//! the backup engine; everything else is connection detail interpreted by
//! [`ConnectionParams`].

mod params;

pub use params::ConnectionParams;

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use indexmap::IndexMap;
use log::debug;
use serde_json::Value;

use crate::error::{InventoryError, Result};

/// One inventory entry describing how to reach a single device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRecord {
    fields: IndexMap<String, String>,
}

impl DeviceRecord {
    /// Create a record from field/value pairs.
    pub fn new<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Get a field value.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// The device's network address.
    pub fn ip(&self) -> Option<&str> {
        self.get("ip")
    }

    /// The catalog key for this device.
    pub fn device_type(&self) -> Option<&str> {
        self.get("device_type")
    }

    /// Iterate over all fields in inventory order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Label used in log lines: the address, or a placeholder.
    pub fn label(&self) -> &str {
        self.ip().or_else(|| self.get("host")).unwrap_or("<no ip>")
    }
}

impl fmt::Display for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.label(),
            self.device_type().unwrap_or("<no device_type>")
        )
    }
}

/// Load an inventory, choosing the parser from the file extension.
///
/// Extension matching is case-insensitive. Anything other than `.json` or
/// `.csv` is rejected before the file is opened.
pub fn load_inventory(path: impl AsRef<Path>) -> Result<Vec<DeviceRecord>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let records = match extension.as_deref() {
        Some("json") => load_json(path)?,
        Some("csv") => load_csv(path)?,
        _ => {
            return Err(InventoryError::UnsupportedFormat {
                path: path.to_path_buf(),
            }
            .into());
        }
    };

    debug!("loaded {} device records from {}", records.len(), path.display());
    Ok(records)
}

/// Load a JSON array of objects.
///
/// Strings are taken as-is, numbers and booleans are stringified, and
/// `null` values are dropped.
pub fn load_json(path: &Path) -> Result<Vec<DeviceRecord>> {
    let file = File::open(path).map_err(|source| InventoryError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let raw: Vec<IndexMap<String, Value>> = serde_json::from_reader(BufReader::new(file))
        .map_err(|source| InventoryError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(raw
        .into_iter()
        .map(|entry| DeviceRecord {
            fields: entry
                .into_iter()
                .filter_map(|(k, v)| json_to_string(v).map(|v| (k, v)))
                .collect(),
        })
        .collect())
}

/// Load a CSV file with a header row. Cells are trimmed and empty cells
/// are dropped.
pub fn load_csv(path: &Path) -> Result<Vec<DeviceRecord>> {
    let csv_error = |source: csv::Error| InventoryError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_error)?;

    let mut records = Vec::new();
    for row in reader.deserialize::<IndexMap<String, String>>() {
        let row = row.map_err(csv_error)?;
        records.push(DeviceRecord {
            fields: row.into_iter().filter(|(_, v)| !v.is_empty()).collect(),
        });
    }
    Ok(records)
}

fn json_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}
