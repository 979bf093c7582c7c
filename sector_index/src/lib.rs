// sector_index is the in-memory registry of sector storage: which backend holds which
// sector files, how healthy each backend is, and where new sector data should go.

mod config;
mod error;
mod filetype;
mod index;
mod proof;
mod types;

pub use config::*;
pub use error::*;
pub use filetype::*;
pub use index::*;
pub use proof::*;
pub use types::*;
