use crate::{SectorFileType, SectorFileTypes};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identifies one storage backend. One backend maps to one filesystem, local or
/// shared by several machines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StorageId(pub String);

impl StorageId {
    pub fn new(id: &str) -> Self {
        StorageId(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StorageId {
    fn from(id: &str) -> Self {
        StorageId::new(id)
    }
}

impl From<String> for StorageId {
    fn from(id: String) -> Self {
        StorageId(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectorId {
    pub miner: u64,
    pub number: u64,
}

impl SectorId {
    pub fn new(miner: u64, number: u64) -> Self {
        Self { miner, number }
    }

    pub fn sector_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s-t0{}-{}", self.miner, self.number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FsStat {
    pub capacity: u64,
    pub available: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HealthReport {
    pub stat: FsStat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl HealthReport {
    pub fn ok(stat: FsStat) -> Self {
        Self { stat, err: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageInfo {
    pub id: StorageId,
    pub urls: Vec<String>,
    pub weight: u64,

    pub can_seal: bool,
    pub can_store: bool,
}

/// Last known health of a backend, as seen by the index.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageHealth {
    pub stat: FsStat,
    pub err: Option<String>,
    pub since_heartbeat: Duration,
}

/// A single tracked fact: some backends hold this file kind of this sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Decl {
    pub sector: SectorId,
    pub file_type: SectorFileType,
}

impl Decl {
    pub fn new(sector: SectorId, file_type: SectorFileType) -> Self {
        Self { sector, file_type }
    }
}

/// Everything a backend holds of one sector, as listed by `storage_list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorDecl {
    pub sector: SectorId,
    pub file_types: SectorFileTypes,
}
