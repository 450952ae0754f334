use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A file written at absolute offsets, in any order.
///
/// Opening never truncates existing content: a partially written file from an
/// earlier run keeps its bytes.
#[derive(Debug)]
pub struct PositionedFile {
    path: PathBuf,
    file: File,
}

impl PositionedFile {
    /// Open (or create) `path` and size it to exactly `len` bytes.
    pub fn open(path: impl AsRef<Path>, len: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| Error::Open {
                path: path.clone(),
                source,
            })?;
        file.set_len(len).map_err(|source| Error::Write {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.write_all(data))
            .map_err(|source| Error::Write {
                path: self.path.clone(),
                source,
            })
    }

    /// Flush written data to the device.
    pub fn sync_data(&self) -> Result<()> {
        self.file.sync_data().map_err(|source| Error::Write {
            path: self.path.clone(),
            source,
        })
    }
}
