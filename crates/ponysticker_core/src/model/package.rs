//! Package and partition model.
//!
//! # Invariants
//! - `Repo::for_package` never assigns id `999999` to a partition.
//! - Locale maps are ordered by locale code so serialized metadata and derived
//!   index text are deterministic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Signed package identifier. Negative ids are locally authored packages.
pub type PackageId = i64;

/// Signed sticker identifier.
pub type StickerId = i64;

/// Locale code (`en`, `ja`, `zh-Hant`, ...) to display string.
pub type LocalizedText = BTreeMap<String, String>;

const OFFICIAL_END: PackageId = 999_999;
const CREATOR_BEGIN: PackageId = 1_000_000;

/// Logical catalog partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Repo {
    /// Store-published packages, ids `0..999999`.
    Official,
    /// Creator-market packages, ids `1000000..`.
    Creator,
    /// Locally authored packages, negative ids.
    Custom,
}

impl Repo {
    /// All partitions in summary order.
    pub const ALL: [Repo; 3] = [Repo::Official, Repo::Creator, Repo::Custom];

    /// Routes a package id to its partition.
    ///
    /// Returns `None` for `999999`, which sits between the official and creator
    /// ranges and belongs to neither.
    pub fn for_package(id: PackageId) -> Option<Self> {
        match id {
            i64::MIN..=-1 => Some(Self::Custom),
            0..OFFICIAL_END => Some(Self::Official),
            OFFICIAL_END => None,
            CREATOR_BEGIN.. => Some(Self::Creator),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Official => "official",
            Self::Creator => "creator",
            Self::Custom => "custom",
        }
    }
}

impl Display for Repo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a partition or order name is outside the allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownNameError {
    pub kind: &'static str,
    pub value: String,
}

impl Display for UnknownNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown {} `{}`", self.kind, self.value)
    }
}

impl std::error::Error for UnknownNameError {}

impl FromStr for Repo {
    type Err = UnknownNameError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "official" => Ok(Self::Official),
            "creator" => Ok(Self::Creator),
            "custom" => Ok(Self::Custom),
            other => Err(UnknownNameError {
                kind: "repo",
                value: other.to_string(),
            }),
        }
    }
}

/// Sort key for listing and search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderKey {
    /// Ascending numeric package id.
    #[default]
    PackageId,
    /// Ascending insertion time, ties broken by package id.
    Date,
}

impl OrderKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PackageId => "packageId",
            Self::Date => "date",
        }
    }
}

impl FromStr for OrderKey {
    type Err = UnknownNameError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "packageId" => Ok(Self::PackageId),
            "date" => Ok(Self::Date),
            other => Err(UnknownNameError {
                kind: "order",
                value: other.to_string(),
            }),
        }
    }
}

/// Flat package metadata as stored on disk and in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub package_id: PackageId,
    #[serde(default)]
    pub title: LocalizedText,
    #[serde(default)]
    pub author: LocalizedText,
    #[serde(default)]
    pub stickers: Vec<StickerId>,
}

impl Package {
    /// Partition this package is stored in, if any.
    pub fn repo(&self) -> Option<Repo> {
        Repo::for_package(self.package_id)
    }

    /// All title translations joined with spaces, in locale order.
    pub fn title_text(&self) -> String {
        join_values(&self.title)
    }

    /// All author translations joined with spaces, in locale order.
    pub fn author_text(&self) -> String {
        join_values(&self.author)
    }
}

fn join_values(text: &LocalizedText) -> String {
    text.values().map(String::as_str).collect::<Vec<_>>().join(" ")
}

/// One sticker object inside a store bundle's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceSticker {
    pub id: StickerId,
}

/// Package metadata in the store's bundle schema.
///
/// Stickers are nested objects; everything beyond `id` is dropped when the
/// document is flattened into a [`Package`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcePackage {
    pub package_id: PackageId,
    #[serde(default)]
    pub title: LocalizedText,
    #[serde(default)]
    pub author: LocalizedText,
    #[serde(default)]
    pub stickers: Vec<SourceSticker>,
}

impl From<SourcePackage> for Package {
    fn from(source: SourcePackage) -> Self {
        Self {
            package_id: source.package_id,
            title: source.title,
            author: source.author,
            stickers: source.stickers.into_iter().map(|sticker| sticker.id).collect(),
        }
    }
}
