//! Working-directory layout.
//!
//! # Responsibility
//! - Derive every on-disk location from one home directory.
//! - Create the directories a command needs before it runs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Environment variable naming the home directory.
pub const HOME_ENV: &str = "PONYSTICKER_PATH";
/// Default port of the query service.
pub const DEFAULT_PORT: u16 = 50025;

const STICKER_DIR_NAME: &str = "sticker";
const DB_FILE_NAME: &str = "sticker.db";
const LOG_DIR_NAME: &str = "log";

/// Resolved paths under the home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub home: PathBuf,
    pub sticker_dir: PathBuf,
    pub db_path: PathBuf,
    pub log_dir: PathBuf,
}

impl Paths {
    pub fn new(home: impl AsRef<Path>) -> Self {
        let home = home.as_ref().to_path_buf();
        Self {
            sticker_dir: home.join(STICKER_DIR_NAME),
            db_path: home.join(DB_FILE_NAME),
            log_dir: home.join(LOG_DIR_NAME),
            home,
        }
    }

    /// Creates the home, sticker and log directories.
    pub fn create_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(&self.home)?;
        fs::create_dir_all(&self.sticker_dir)?;
        fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Paths;

    #[test]
    fn derives_layout_from_home() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path().join("home"));
        paths.create_dirs().unwrap();

        assert!(paths.sticker_dir.is_dir());
        assert!(paths.log_dir.is_dir());
        assert_eq!(paths.db_path, dir.path().join("home").join("sticker.db"));
    }
}
