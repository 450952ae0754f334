use crate::{Error, Result};
use std::fs;
use std::path::Path;

/// Create `path` and any missing parents. An existing directory is fine.
pub fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    fs::create_dir_all(path).map_err(|source| Error::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}
