//! Custom package authoring.
//!
//! # Responsibility
//! - Renumber a directory of hand-picked images into contiguous descending
//!   sticker ids.
//! - Generate tab icons and the metadata document, then index the package.
//!
//! # Invariants
//! - Only negative (custom) package ids can be authored.
//! - Every source file is moved out of the way before any final name is
//!   written, so overlapping old and new numbering never overwrites an image.

use crate::bundle::{BundleError, BundleStore, StickerName, IMAGE_EXTENSION};
use crate::ingest::image::{png_to_jpeg, tab_images};
use crate::model::package::{LocalizedText, Package, PackageId, StickerId};
use crate::service::index_service::{IndexError, PackageIndexer};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const AUTHORED_LOCALE: &str = "en";
const TAB_STEMS: [&str; 2] = ["tab_on", "tab_off"];

pub type CreateResult<T> = Result<T, CreateError>;

#[derive(Debug)]
pub enum CreateError {
    NotCustom(PackageId),
    NoImages(PathBuf),
    /// Counting down from `begin` runs past the smallest sticker id.
    IdOverflow { begin: StickerId, count: usize },
    Bundle(BundleError),
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
    Index(IndexError),
}

impl Display for CreateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotCustom(id) => write!(f, "custom package ids must be negative, got {id}"),
            Self::NoImages(dir) => write!(f, "no .jpg or .png images in {}", dir.display()),
            Self::IdOverflow { begin, count } => {
                write!(f, "cannot number {count} stickers down from {begin}")
            }
            Self::Bundle(err) => write!(f, "{err}"),
            Self::Image { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Index(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CreateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Bundle(err) => Some(err),
            Self::Image { source, .. } => Some(source),
            Self::Index(err) => Some(err),
            Self::NotCustom(_) | Self::NoImages(_) | Self::IdOverflow { .. } => None,
        }
    }
}

impl From<BundleError> for CreateError {
    fn from(value: BundleError) -> Self {
        Self::Bundle(value)
    }
}

impl From<IndexError> for CreateError {
    fn from(value: IndexError) -> Self {
        Self::Index(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub package_id: PackageId,
    /// Id of the first sticker; following ones count down from it.
    pub begin: StickerId,
    pub title: String,
    pub author: String,
}

/// One planned move: `source` becomes sticker `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renumbering {
    pub source: PathBuf,
    pub target: StickerId,
}

/// Refuses ids outside the custom (negative) range.
pub fn ensure_custom(id: PackageId) -> CreateResult<()> {
    if id >= 0 {
        return Err(CreateError::NotCustom(id));
    }
    Ok(())
}

/// Assigns `begin, begin - 1, ...` to the sources in the given order.
///
/// # Errors
/// - `IdOverflow` when a target would fall below `StickerId::MIN`.
pub fn plan_renumbering(
    sources: Vec<PathBuf>,
    begin: StickerId,
) -> CreateResult<Vec<Renumbering>> {
    let count = sources.len();
    sources
        .into_iter()
        .zip(0..)
        .map(|(source, offset)| {
            begin
                .checked_sub(offset)
                .map(|target| Renumbering { source, target })
                .ok_or(CreateError::IdOverflow { begin, count })
        })
        .collect()
}

/// Authors custom packages from image directories.
#[derive(Clone)]
pub struct PackageAuthor {
    store: BundleStore,
    indexer: PackageIndexer,
}

impl PackageAuthor {
    pub fn new(store: BundleStore, indexer: PackageIndexer) -> Self {
        Self { store, indexer }
    }

    /// Turns `<sticker dir>/<id>/` into a complete, indexed custom package.
    pub fn create_package(&self, request: &CreateRequest) -> CreateResult<Package> {
        let id = request.package_id;
        ensure_custom(id)?;

        let dir = self.store.package_dir(id);
        let sources = collect_sources(&dir)?;
        if sources.is_empty() {
            return Err(CreateError::NoImages(dir));
        }

        let plan = plan_renumbering(sources, request.begin)?;
        self.apply(id, &dir, &plan)?;
        self.write_tabs(id, request.begin)?;

        let package = Package {
            package_id: id,
            title: authored_text(&request.title),
            author: authored_text(&request.author),
            stickers: plan.iter().map(|step| step.target).collect(),
        };
        self.store.write_package(&package)?;
        self.indexer.insert_package(id)?;

        info!(
            "event=package_create module=service status=ok package_id={id} stickers={}",
            package.stickers.len()
        );
        Ok(package)
    }

    fn apply(&self, id: PackageId, dir: &Path, plan: &[Renumbering]) -> CreateResult<()> {
        let staging = dir.join(format!(".staging-{}", Uuid::new_v4()));
        fs::create_dir(&staging).map_err(|err| BundleError::io(&staging, err))?;

        let mut staged = Vec::with_capacity(plan.len());
        for (index, step) in plan.iter().enumerate() {
            let ext = if is_png(&step.source) { "png" } else { IMAGE_EXTENSION };
            let temp = staging.join(format!("{index}.{ext}"));
            fs::rename(&step.source, &temp).map_err(|err| BundleError::io(&step.source, err))?;
            staged.push((temp, step.target));
        }

        for (temp, target) in staged {
            let dest = self.store.image_path(id, StickerName::Sticker(target));
            if is_png(&temp) {
                let png = fs::read(&temp).map_err(|err| BundleError::io(&temp, err))?;
                let jpeg = png_to_jpeg(&png).map_err(|source| CreateError::Image {
                    path: temp.clone(),
                    source,
                })?;
                fs::write(&dest, jpeg).map_err(|err| BundleError::io(&dest, err))?;
                fs::remove_file(&temp).map_err(|err| BundleError::io(&temp, err))?;
            } else {
                fs::rename(&temp, &dest).map_err(|err| BundleError::io(&temp, err))?;
            }
        }

        fs::remove_dir(&staging).map_err(|err| BundleError::io(&staging, err))?;
        Ok(())
    }

    fn write_tabs(&self, id: PackageId, begin: StickerId) -> CreateResult<()> {
        let first = self.store.read_image(id, StickerName::Sticker(begin))?;
        let (tab_on, tab_off) = tab_images(&first).map_err(|source| CreateError::Image {
            path: self.store.image_path(id, StickerName::Sticker(begin)),
            source,
        })?;
        for (name, bytes) in [(StickerName::TabOn, tab_on), (StickerName::TabOff, tab_off)] {
            let path = self.store.image_path(id, name);
            fs::write(&path, bytes).map_err(|err| BundleError::io(path, err))?;
        }
        Ok(())
    }
}

/// Image files of a package directory sorted by name, tab icons excluded.
fn collect_sources(dir: &Path) -> CreateResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|err| BundleError::io(dir, err))?;
    let mut sources = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| BundleError::io(dir, err))?;
        let path = entry.path();
        if !path.is_file() || !(is_png(&path) || has_extension(&path, IMAGE_EXTENSION)) {
            continue;
        }
        let is_tab = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .is_some_and(|stem| TAB_STEMS.contains(&stem));
        if !is_tab {
            sources.push(path);
        }
    }
    sources.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(sources)
}

fn is_png(path: &Path) -> bool {
    has_extension(path, "png")
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .is_some_and(|value| value.eq_ignore_ascii_case(ext))
}

fn authored_text(value: &str) -> LocalizedText {
    LocalizedText::from([(AUTHORED_LOCALE.to_string(), value.to_string())])
}

#[cfg(test)]
mod tests {
    use super::{plan_renumbering, CreateError, Renumbering};
    use std::path::PathBuf;

    #[test]
    fn plan_counts_down_from_begin() {
        let plan = plan_renumbering(
            vec![PathBuf::from("a.jpg"), PathBuf::from("b.png"), PathBuf::from("c.jpg")],
            -5,
        )
        .unwrap();
        let targets: Vec<_> = plan.iter().map(|step| step.target).collect();
        assert_eq!(targets, vec![-5, -6, -7]);
        assert_eq!(
            plan[1],
            Renumbering {
                source: PathBuf::from("b.png"),
                target: -6
            }
        );
    }

    #[test]
    fn empty_plan_for_no_sources() {
        assert!(plan_renumbering(Vec::new(), 10).unwrap().is_empty());
    }

    #[test]
    fn plan_refuses_to_count_past_the_smallest_id() {
        let sources = vec![PathBuf::from("a.jpg"), PathBuf::from("b.jpg")];
        let err = plan_renumbering(sources.clone(), i64::MIN).unwrap_err();
        assert!(matches!(
            err,
            CreateError::IdOverflow {
                begin: i64::MIN,
                count: 2
            }
        ));

        let plan = plan_renumbering(sources, i64::MIN + 1).unwrap();
        assert_eq!(plan[1].target, i64::MIN);
    }
}
