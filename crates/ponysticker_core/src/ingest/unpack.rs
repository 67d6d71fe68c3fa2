//! Store bundle extraction.
//!
//! # Responsibility
//! - Spool a downloaded bundle to scratch storage and open it as a zip.
//! - Write each entry into the package directory, converting PNG stickers to
//!   JPEG and flattening the metadata document.
//!
//! # Invariants
//! - Entries whose names would escape the package directory are rejected.
//! - The first failing entry aborts the unpack; files already written stay.

use crate::bundle::{BundleError, BundleStore, IMAGE_EXTENSION, META_FILE_NAME};
use crate::ingest::image::png_to_jpeg;
use crate::model::package::{Package, PackageId, SourcePackage};
use log::debug;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use zip::result::ZipError;
use zip::ZipArchive;

pub type UnpackResult<T> = Result<T, UnpackError>;

#[derive(Debug)]
pub enum UnpackError {
    Io(io::Error),
    Archive(ZipError),
    Image {
        entry: String,
        source: image::ImageError,
    },
    Metadata(serde_json::Error),
    Bundle(BundleError),
    UnsafeEntry(String),
}

impl Display for UnpackError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Archive(err) => write!(f, "invalid bundle archive: {err}"),
            Self::Image { entry, source } => write!(f, "cannot convert `{entry}`: {source}"),
            Self::Metadata(err) => write!(f, "invalid bundle metadata: {err}"),
            Self::Bundle(err) => write!(f, "{err}"),
            Self::UnsafeEntry(name) => write!(f, "bundle entry `{name}` escapes package directory"),
        }
    }
}

impl Error for UnpackError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Archive(err) => Some(err),
            Self::Image { source, .. } => Some(source),
            Self::Metadata(err) => Some(err),
            Self::Bundle(err) => Some(err),
            Self::UnsafeEntry(_) => None,
        }
    }
}

impl From<io::Error> for UnpackError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ZipError> for UnpackError {
    fn from(value: ZipError) -> Self {
        Self::Archive(value)
    }
}

impl From<BundleError> for UnpackError {
    fn from(value: BundleError) -> Self {
        Self::Bundle(value)
    }
}

/// Extracts store bundles into the bundle store.
#[derive(Debug, Clone)]
pub struct Unpacker {
    store: BundleStore,
}

impl Unpacker {
    pub fn new(store: BundleStore) -> Self {
        Self { store }
    }

    /// Unpacks one bundle into the directory of package `id`.
    pub fn unpack(&self, id: PackageId, mut bundle: impl Read) -> UnpackResult<()> {
        let mut scratch = tempfile::tempfile()?;
        io::copy(&mut bundle, &mut scratch)?;
        scratch.seek(SeekFrom::Start(0))?;

        let mut archive = ZipArchive::new(scratch)?;
        let package_dir = self.store.ensure_package_dir(id)?;

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let relative = entry
                .enclosed_name()
                .ok_or_else(|| UnpackError::UnsafeEntry(name.clone()))?;

            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;

            let (target, bytes) = convert_entry(&name, &relative, content)?;
            let target = package_dir.join(target);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, bytes)?;
            debug!(
                "event=unpack_entry module=ingest status=ok package_id={id} entry={name}"
            );
        }

        Ok(())
    }
}

fn convert_entry(
    name: &str,
    relative: &Path,
    content: Vec<u8>,
) -> UnpackResult<(PathBuf, Vec<u8>)> {
    if has_extension(relative, "png") {
        let jpeg = png_to_jpeg(&content).map_err(|source| UnpackError::Image {
            entry: name.to_string(),
            source,
        })?;
        return Ok((relative.with_extension(IMAGE_EXTENSION), jpeg));
    }

    if relative.file_name().is_some_and(|file| file == META_FILE_NAME) {
        return Ok((relative.to_path_buf(), flatten_meta(&content)?));
    }

    Ok((relative.to_path_buf(), content))
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .is_some_and(|value| value.eq_ignore_ascii_case(ext))
}

/// Rewrites store metadata (nested sticker objects) into the flat schema.
pub fn flatten_meta(source: &[u8]) -> UnpackResult<Vec<u8>> {
    let source: SourcePackage = serde_json::from_slice(source).map_err(UnpackError::Metadata)?;
    serde_json::to_vec(&Package::from(source)).map_err(UnpackError::Metadata)
}
