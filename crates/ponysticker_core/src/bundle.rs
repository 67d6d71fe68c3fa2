//! On-disk package bundle layout.
//!
//! # Responsibility
//! - Map package ids and sticker names to files under the sticker directory.
//! - Read and write the per-package metadata document.
//!
//! # Invariants
//! - One directory per package id, named by the decimal id.
//! - Every stored image uses the `.jpg` extension.
//! - Sticker names are validated before they are turned into paths.

use crate::model::package::{Package, PackageId, StickerId};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Metadata document name inside each package directory.
pub const META_FILE_NAME: &str = "productInfo.meta";
/// Extension of every stored image.
pub const IMAGE_EXTENSION: &str = "jpg";
pub const IMAGE_MIME_TYPE: &str = "image/jpeg";

static STICKER_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?P<tab>tab_on|tab_off)|(?P<id>-?\d+)(?P<key>_key)?)$")
        .expect("valid sticker name regex")
});

pub type BundleResult<T> = Result<T, BundleError>;

#[derive(Debug)]
pub enum BundleError {
    Io { path: PathBuf, source: io::Error },
    Metadata { path: PathBuf, source: serde_json::Error },
}

impl BundleError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure means the file is simply not there.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

impl Display for BundleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Metadata { path, source } => {
                write!(f, "invalid package metadata {}: {source}", path.display())
            }
        }
    }
}

impl Error for BundleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Metadata { source, .. } => Some(source),
        }
    }
}

/// Image file addressable inside a package directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StickerName {
    Sticker(StickerId),
    /// Thumbnail variant (`<id>_key`).
    Key(StickerId),
    TabOn,
    TabOff,
}

impl StickerName {
    pub fn file_name(self) -> String {
        match self {
            Self::Sticker(id) => format!("{id}.{IMAGE_EXTENSION}"),
            Self::Key(id) => format!("{id}_key.{IMAGE_EXTENSION}"),
            Self::TabOn => format!("tab_on.{IMAGE_EXTENSION}"),
            Self::TabOff => format!("tab_off.{IMAGE_EXTENSION}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidStickerName(pub String);

impl Display for InvalidStickerName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid sticker name `{}`", self.0)
    }
}

impl Error for InvalidStickerName {}

impl FromStr for StickerName {
    type Err = InvalidStickerName;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidStickerName(value.to_string());
        let caps = STICKER_NAME_RE.captures(value).ok_or_else(invalid)?;
        if let Some(tab) = caps.name("tab") {
            return Ok(if tab.as_str() == "tab_on" {
                Self::TabOn
            } else {
                Self::TabOff
            });
        }
        let id = caps
            .name("id")
            .and_then(|id| id.as_str().parse::<StickerId>().ok())
            .ok_or_else(invalid)?;
        Ok(if caps.name("key").is_some() {
            Self::Key(id)
        } else {
            Self::Sticker(id)
        })
    }
}

/// Root of the per-package directories.
#[derive(Debug, Clone)]
pub struct BundleStore {
    root: PathBuf,
}

impl BundleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn package_dir(&self, id: PackageId) -> PathBuf {
        self.root.join(id.to_string())
    }

    pub fn meta_path(&self, id: PackageId) -> PathBuf {
        self.package_dir(id).join(META_FILE_NAME)
    }

    pub fn image_path(&self, id: PackageId, name: StickerName) -> PathBuf {
        self.package_dir(id).join(name.file_name())
    }

    /// Creates the package directory if needed and returns it.
    pub fn ensure_package_dir(&self, id: PackageId) -> BundleResult<PathBuf> {
        let dir = self.package_dir(id);
        fs::create_dir_all(&dir).map_err(|err| BundleError::io(&dir, err))?;
        Ok(dir)
    }

    /// Reads the raw metadata document of a stored package.
    pub fn read_meta_text(&self, id: PackageId) -> BundleResult<String> {
        let path = self.meta_path(id);
        fs::read_to_string(&path).map_err(|err| BundleError::io(path, err))
    }

    pub fn read_package(&self, id: PackageId) -> BundleResult<Package> {
        let text = self.read_meta_text(id)?;
        serde_json::from_str(&text).map_err(|source| BundleError::Metadata {
            path: self.meta_path(id),
            source,
        })
    }

    pub fn write_package(&self, package: &Package) -> BundleResult<()> {
        self.ensure_package_dir(package.package_id)?;
        let path = self.meta_path(package.package_id);
        let bytes = serde_json::to_vec(package).map_err(|source| BundleError::Metadata {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, bytes).map_err(|err| BundleError::io(path, err))
    }

    pub fn read_image(&self, id: PackageId, name: StickerName) -> BundleResult<Vec<u8>> {
        let path = self.image_path(id, name);
        fs::read(&path).map_err(|err| BundleError::io(path, err))
    }
}
