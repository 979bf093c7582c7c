use crate::{SectorIndexError, SectorIndexResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

/// One of the files that together make up a sector on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectorFileType {
    Unsealed,
    Sealed,
    Cache,
}

impl SectorFileType {
    /// Fixed iteration order used whenever a mask is decomposed.
    pub const ALL: [SectorFileType; 3] = [
        SectorFileType::Unsealed,
        SectorFileType::Sealed,
        SectorFileType::Cache,
    ];

    pub fn bit(&self) -> u8 {
        match self {
            SectorFileType::Unsealed => 1 << 0,
            SectorFileType::Sealed => 1 << 1,
            SectorFileType::Cache => 1 << 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SectorFileType::Unsealed => "unsealed",
            SectorFileType::Sealed => "sealed",
            SectorFileType::Cache => "cache",
        }
    }

    /// Space taken while sealing, in tenths of a sector.
    pub fn seal_overhead(&self) -> u64 {
        match self {
            SectorFileType::Unsealed => 10,
            SectorFileType::Sealed => 10,
            SectorFileType::Cache => 70,
        }
    }
}

impl fmt::Display for SectorFileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SectorFileType {
    type Err = SectorIndexError;

    fn from_str(s: &str) -> SectorIndexResult<Self> {
        SectorFileType::ALL
            .iter()
            .find(|ft| ft.name() == s)
            .copied()
            .ok_or_else(|| SectorIndexError::InvalidParam(format!("unknown sector file type: {}", s)))
    }
}

/// A set of sector file kinds, one bit per `SectorFileType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct SectorFileTypes(u8);

impl SectorFileTypes {
    pub const fn empty() -> Self {
        SectorFileTypes(0)
    }

    pub fn all() -> Self {
        SectorFileType::ALL
            .iter()
            .fold(SectorFileTypes::empty(), |acc, ft| acc | *ft)
    }

    /// Build a mask from raw bits, dropping bits that name no known kind.
    pub fn from_bits_truncate(bits: u8) -> Self {
        SectorFileTypes(bits & Self::all().0)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn has(&self, ft: SectorFileType) -> bool {
        self.0 & ft.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Kinds in the mask, in `SectorFileType::ALL` order.
    pub fn iter(&self) -> impl Iterator<Item = SectorFileType> + '_ {
        SectorFileType::ALL
            .iter()
            .copied()
            .filter(move |ft| self.has(*ft))
    }
}

impl From<SectorFileType> for SectorFileTypes {
    fn from(ft: SectorFileType) -> Self {
        SectorFileTypes(ft.bit())
    }
}

impl BitOr for SectorFileTypes {
    type Output = SectorFileTypes;

    fn bitor(self, rhs: SectorFileTypes) -> SectorFileTypes {
        SectorFileTypes(self.0 | rhs.0)
    }
}

impl BitOr<SectorFileType> for SectorFileTypes {
    type Output = SectorFileTypes;

    fn bitor(self, rhs: SectorFileType) -> SectorFileTypes {
        SectorFileTypes(self.0 | rhs.bit())
    }
}

impl BitOr for SectorFileType {
    type Output = SectorFileTypes;

    fn bitor(self, rhs: SectorFileType) -> SectorFileTypes {
        SectorFileTypes(self.bit() | rhs.bit())
    }
}

impl BitOrAssign<SectorFileType> for SectorFileTypes {
    fn bitor_assign(&mut self, rhs: SectorFileType) {
        self.0 |= rhs.bit();
    }
}

impl BitOrAssign for SectorFileTypes {
    fn bitor_assign(&mut self, rhs: SectorFileTypes) {
        self.0 |= rhs.0;
    }
}

// path segment used in location urls: "sealed", "unsealed+cache", ...
impl fmt::Display for SectorFileTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.iter().map(|ft| ft.name()).collect();
        f.write_str(&names.join("+"))
    }
}
