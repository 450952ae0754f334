use crate::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug)]
pub struct AtomicWriteOptions {
    prefix: &'static str,
    suffix: &'static str,
    sync: bool,
}

impl Default for AtomicWriteOptions {
    fn default() -> Self { Self::new() }
}

impl AtomicWriteOptions {
    pub fn new() -> Self {
        Self {
            prefix: ".",
            suffix: ".tmp",
            sync: true,
        }
    }

    pub fn prefix(mut self, prefix: &'static str) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn suffix(mut self, suffix: &'static str) -> Self {
        self.suffix = suffix;
        self
    }

    /// Flush the temporary file to the device before the rename.
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn prefix_str(&self) -> &'static str { self.prefix }

    pub fn suffix_str(&self) -> &'static str { self.suffix }
}

/// The sibling path `atomic_write` stages content in before renaming.
///
/// The name is deterministic so a crashed write can be found and removed.
pub fn temp_path_for(path: impl AsRef<Path>, options: AtomicWriteOptions) -> Result<PathBuf> {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::NoFileName(path.to_path_buf()))?
        .to_string_lossy();
    let parent = path.parent().unwrap_or(Path::new(""));
    Ok(parent.join(format!(
        "{}{}{}",
        options.prefix_str(),
        file_name,
        options.suffix_str()
    )))
}

pub fn atomic_write(
    path: impl AsRef<Path>,
    content: &[u8],
    options: AtomicWriteOptions,
) -> Result<()> {
    let path = path.as_ref();
    let tmp_path = temp_path_for(path, options)?;

    let write_tmp = || -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(content)?;
        if options.sync {
            file.sync_all()?;
        }
        Ok(())
    };
    write_tmp().map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        Error::Write {
            path: tmp_path.clone(),
            source,
        }
    })?;

    fs::rename(&tmp_path, path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        Error::Rename {
            from: tmp_path.clone(),
            to: path.to_path_buf(),
            source,
        }
    })?;

    Ok(())
}

pub fn atomic_read(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    fs::read(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Remove `path`, treating "already gone" as success.
///
/// Returns whether a file was actually removed.
pub fn remove_if_exists(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(Error::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.txt");
        atomic_write(&path, b"hello world", AtomicWriteOptions::new()).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello world");
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.metadata");
        let options = AtomicWriteOptions::new();
        atomic_write(&path, b"state", options).unwrap();
        assert!(!temp_path_for(&path, options).unwrap().exists());
    }

    #[test]
    fn test_temp_path_uses_prefix_and_suffix() {
        let options = AtomicWriteOptions::new().prefix("~").suffix(".part");
        let tmp = temp_path_for(Path::new("/data/file.bin"), options).unwrap();
        assert_eq!(tmp, Path::new("/data/~file.bin.part"));
    }

    #[test]
    fn test_temp_path_requires_file_name() {
        assert!(matches!(
            temp_path_for(Path::new("/"), AtomicWriteOptions::new()),
            Err(Error::NoFileName(_))
        ));
    }

    #[test]
    fn test_remove_if_exists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.txt");
        assert!(!remove_if_exists(&path).unwrap());
        fs::write(&path, "x").unwrap();
        assert!(remove_if_exists(&path).unwrap());
        assert!(!path.exists());
    }
}
