use crate::{SectorFileTypes, SectorIndexError, SectorIndexResult};
use serde::{Deserialize, Serialize};

const KIB: u64 = 1 << 10;
const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;

/// Registered proof type a sector is sealed with. Only the sector size matters here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegisteredProof {
    StackedDrg2KiBV1,
    StackedDrg8MiBV1,
    StackedDrg512MiBV1,
    StackedDrg32GiBV1,
    StackedDrg64GiBV1,
    Unknown(i64),
}

impl RegisteredProof {
    pub fn sector_size(&self) -> Option<u64> {
        match self {
            RegisteredProof::StackedDrg2KiBV1 => Some(2 * KIB),
            RegisteredProof::StackedDrg8MiBV1 => Some(8 * MIB),
            RegisteredProof::StackedDrg512MiBV1 => Some(512 * MIB),
            RegisteredProof::StackedDrg32GiBV1 => Some(32 * GIB),
            RegisteredProof::StackedDrg64GiBV1 => Some(64 * GIB),
            RegisteredProof::Unknown(_) => None,
        }
    }
}

impl From<i64> for RegisteredProof {
    fn from(id: i64) -> Self {
        match id {
            0 => RegisteredProof::StackedDrg2KiBV1,
            1 => RegisteredProof::StackedDrg8MiBV1,
            2 => RegisteredProof::StackedDrg512MiBV1,
            3 => RegisteredProof::StackedDrg32GiBV1,
            4 => RegisteredProof::StackedDrg64GiBV1,
            other => RegisteredProof::Unknown(other),
        }
    }
}

/// Estimates how many bytes allocating `kinds` for a `proof` sector needs.
pub trait SpaceEstimator: Send + Sync {
    fn space_required(&self, kinds: SectorFileTypes, proof: RegisteredProof)
        -> SectorIndexResult<u64>;
}

/// Default estimator: per-kind seal overhead applied to the proof's sector size.
#[derive(Debug, Clone, Copy, Default)]
pub struct SealOverheadEstimator;

impl SpaceEstimator for SealOverheadEstimator {
    fn space_required(
        &self,
        kinds: SectorFileTypes,
        proof: RegisteredProof,
    ) -> SectorIndexResult<u64> {
        let sector_size = proof.sector_size().ok_or_else(|| {
            SectorIndexError::UnsupportedAllocation(format!("no sector size for {:?}", proof))
        })?;

        let mut need: u64 = 0;
        for ft in kinds.iter() {
            let bytes = ft
                .seal_overhead()
                .checked_mul(sector_size)
                .map(|b| b / 10)
                .ok_or_else(|| {
                    SectorIndexError::UnsupportedAllocation(format!(
                        "space estimate overflow for {} on {:?}",
                        ft, proof
                    ))
                })?;
            need = need.checked_add(bytes).ok_or_else(|| {
                SectorIndexError::UnsupportedAllocation(format!(
                    "space estimate overflow for {} on {:?}",
                    kinds, proof
                ))
            })?;
        }

        Ok(need)
    }
}
