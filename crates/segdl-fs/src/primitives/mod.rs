pub mod atomic_write;
pub mod dir;
pub mod positioned;

pub use atomic_write::{AtomicWriteOptions, atomic_read, atomic_write, remove_if_exists, temp_path_for};
pub use dir::ensure_dir;
pub use positioned::PositionedFile;
