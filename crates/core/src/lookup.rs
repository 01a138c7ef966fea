//! Per-device configuration tables consulted during validation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Named lookup tables of one device, e.g. `points -> {home, pick}` for a
/// robot or `profiles -> {barcode, inspect}` for a camera.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceLookups(BTreeMap<String, BTreeSet<String>>);

impl DeviceLookups {
    /// Create empty tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table.
    pub fn with_table<I, S>(mut self, table: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .insert(table.into(), entries.into_iter().map(Into::into).collect());
        self
    }

    /// Get a table by name.
    pub fn table(&self, table: &str) -> Option<&BTreeSet<String>> {
        self.0.get(table)
    }

    /// Whether `entry` is listed in `table`.
    pub fn contains(&self, table: &str, entry: &str) -> bool {
        self.table(table).is_some_and(|t| t.contains(entry))
    }
}
