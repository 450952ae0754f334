//! Filesystem primitives used by the segdl download engine.
//!
//! - [`atomic_write`]: write to a sibling temporary file, then rename it over
//!   the destination so readers only ever see the old or the new content.
//! - [`PositionedFile`]: random-access writes into a partially downloaded file.

mod error;
mod primitives;

pub use error::{Error, Result};
pub use primitives::{
    AtomicWriteOptions, PositionedFile, atomic_read, atomic_write, ensure_dir, remove_if_exists,
    temp_path_for,
};
