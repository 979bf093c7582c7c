use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SectorIndexError {
    #[error("malformed location: {0}")]
    MalformedLocation(String),
    #[error("unknown storage backend: {0}")]
    UnknownBackend(String),
    #[error("unsupported allocation: {0}")]
    UnsupportedAllocation(String),
    #[error("no viable placement: {0}")]
    NoViablePlacement(String),

    #[error("invalid param: {0}")]
    InvalidParam(String),
}

impl SectorIndexError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SectorIndexError::UnknownBackend(_))
    }

    pub fn is_no_viable_placement(&self) -> bool {
        matches!(self, SectorIndexError::NoViablePlacement(_))
    }
}

pub type SectorIndexResult<T> = std::result::Result<T, SectorIndexError>;

impl From<serde_json::Error> for SectorIndexError {
    fn from(err: serde_json::Error) -> Self {
        SectorIndexError::InvalidParam(err.to_string())
    }
}
