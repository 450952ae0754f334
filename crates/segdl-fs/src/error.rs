use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to write '{}'", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read '{}'", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open '{}'", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to replace '{}' with '{}'", to.display(), from.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove '{}'", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create directory '{}'", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("path has no file name: '{}'", .0.display())]
    NoFileName(PathBuf),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The underlying I/O error, when there is one.
    pub fn io(&self) -> Option<&std::io::Error> {
        match self {
            Error::Write { source, .. }
            | Error::Read { source, .. }
            | Error::Open { source, .. }
            | Error::Rename { source, .. }
            | Error::Remove { source, .. }
            | Error::CreateDir { source, .. } => Some(source),
            Error::NoFileName(_) => None,
        }
    }
}
