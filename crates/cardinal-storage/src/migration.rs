//! On-disk layout upgrades
//!
//! A persistent store records the layout version it was written with. On
//! open, every step between that version and [`LAYOUT_VERSION`] is applied
//! in order. Files written by a newer release are refused rather than read
//! with the wrong layout.

use crate::error::{StorageError, StorageResult};
use serde_json::Value;

/// Layout written by this release
pub const LAYOUT_VERSION: u32 = 2;

/// A single layout upgrade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutStep {
    /// Record, adjacency and node-type index tables
    CreateTables,
    /// Stored records switch `created_at`/`updated_at` to `createdAt`/`updatedAt`
    CamelCaseTimestamps,
}

impl LayoutStep {
    /// Version a store is at once this step has been applied
    pub fn version(self) -> u32 {
        match self {
            Self::CreateTables => 1,
            Self::CamelCaseTimestamps => 2,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::CreateTables => "create record and index tables",
            Self::CamelCaseTimestamps => "camelCase record timestamps",
        }
    }
}

const STEPS: [LayoutStep; 2] = [LayoutStep::CreateTables, LayoutStep::CamelCaseTimestamps];

/// Steps needed to bring a store at `current` up to [`LAYOUT_VERSION`]
pub fn plan(current: u32) -> StorageResult<Vec<LayoutStep>> {
    if current > LAYOUT_VERSION {
        return Err(StorageError::Migration(format!(
            "store layout v{} is newer than supported v{}",
            current, LAYOUT_VERSION
        )));
    }
    Ok(STEPS.into_iter().filter(|s| s.version() > current).collect())
}

/// Rewrite one stored record for [`LayoutStep::CamelCaseTimestamps`].
///
/// Returns `None` when the record has nothing to rename.
pub fn camel_case_timestamps(raw: &[u8]) -> StorageResult<Option<Vec<u8>>> {
    let mut value: Value = serde_json::from_slice(raw)?;
    let Value::Object(record) = &mut value else {
        return Err(StorageError::Migration("stored record is not an object".into()));
    };

    let mut changed = false;
    for (old, new) in [("created_at", "createdAt"), ("updated_at", "updatedAt")] {
        if let Some(v) = record.remove(old) {
            record.insert(new.to_string(), v);
            changed = true;
        }
    }
    if changed {
        Ok(Some(serde_json::to_vec(&value)?))
    } else {
        Ok(None)
    }
}
