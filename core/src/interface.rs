//! Persisted coordinator state and JSON (de)serialization helpers.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use anyhow::Context;
use deed_registry::{AssetId, ID};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::EscrowConfig;
use crate::event::EscrowEvent;
use crate::listing::Listing;

/// Reads a JSON-encoded file from the given `path` and deserializes into type `T`.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the file cannot be opened, read, or parsed.
///
/// # Examples
///
/// ```ignore
/// # use deed_escrow_core::interface::load_escrow_data;
/// # use deed_escrow_core::EscrowConfig;
///
/// let config: EscrowConfig = load_escrow_data("./escrow_config.json").unwrap();
/// ```
pub fn load_escrow_data<P, T>(path: P) -> anyhow::Result<T>
where
    P: AsRef<Path>,
    T: DeserializeOwned,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("loading escrow data: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("parsing JSON from {:?}", path))
}

/// Writes `data` (serializable) as pretty-printed JSON to the given `path`,
/// creating parent directories as needed.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the file cannot be created or data cannot be serialized.
pub fn save_escrow_data<P, T>(path: P, data: &T) -> anyhow::Result<()>
where
    P: AsRef<Path>,
    T: Serialize,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {:?}", parent))?;
    }
    let file = File::create(path).with_context(|| format!("creating file {:?}", path))?;
    serde_json::to_writer_pretty(file, data)
        .with_context(|| format!("serializing to JSON to {:?}", path))
}

/// Everything the coordinator owns, detached from its registry.
///
/// Produced by [`Escrow::snapshot`](crate::Escrow::snapshot) and consumed by
/// [`Escrow::restore`](crate::Escrow::restore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub config: EscrowConfig,
    pub listings: BTreeMap<AssetId, Listing>,
    pub payouts: BTreeMap<ID, u128>,
    pub events: Vec<EscrowEvent>,
}

#[cfg(feature = "bincode")]
impl Snapshot {
    /// Compact binary encoding.
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| crate::EscrowError::Snapshot(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        let (snapshot, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| crate::EscrowError::Snapshot(e.to_string()))?;
        Ok(snapshot)
    }
}
