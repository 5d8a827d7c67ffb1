//! JSON encoding for snapshots and grid dumps handed to the host.

use crate::nav_grid::NavGridSnapshot;
use crate::world::Snapshot;

/// Serialize a snapshot to a JSON string.
pub fn snapshot_to_json_string(snapshot: &Snapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string(snapshot)
}

/// Deserialize a snapshot from a JSON string.
pub fn snapshot_from_json_string(data: &str) -> Result<Snapshot, serde_json::Error> {
    serde_json::from_str(data)
}

/// Serialize a grid walkability dump to a JSON string.
pub fn nav_grid_to_json_string(grid: &NavGridSnapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string(grid)
}

/// Deserialize a grid walkability dump from a JSON string.
pub fn nav_grid_from_json_string(data: &str) -> Result<NavGridSnapshot, serde_json::Error> {
    serde_json::from_str(data)
}
