use image::{ImageFormat, Rgba, RgbaImage};
use ponysticker_core::bundle::{BundleStore, StickerName};
use ponysticker_core::db::open_db_in_memory;
use ponysticker_core::ingest::coordinator::{IngestReport, Ingestor};
use ponysticker_core::ingest::fetch::{BundleSource, FetchError, FetchOutcome, FetchResult};
use ponysticker_core::ingest::unpack::{UnpackError, Unpacker};
use ponysticker_core::model::package::{Package, PackageId, Repo};
use ponysticker_core::repo::catalog_repo::{CatalogRepository, SqliteCatalog};
use ponysticker_core::service::index_service::index_row;
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

fn png_bytes(pixel: Rgba<u8>) -> Vec<u8> {
    let img = RgbaImage::from_pixel(4, 4, pixel);
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn source_meta(id: PackageId, title: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "packageId": id,
        "title": { "en": title },
        "author": { "en": "Hasbro" },
        "stickers": [ { "id": id * 10, "width": 120 }, { "id": id * 10 + 1 } ],
    }))
    .unwrap()
}

fn bundle(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, bytes) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn package_bundle(id: PackageId, title: &str) -> Vec<u8> {
    bundle(&[
        ("productInfo.meta", source_meta(id, title)),
        (format!("{}.png", id * 10).as_str(), png_bytes(Rgba([0, 0, 0, 0]))),
        ("tab_on.png", png_bytes(Rgba([200, 10, 10, 255]))),
    ])
}

enum Scripted {
    Bundle(Vec<u8>),
    Missing,
    Broken,
}

/// In-memory store that records which ids were requested.
struct FakeStore {
    packages: HashMap<PackageId, Scripted>,
    requested: Mutex<Vec<PackageId>>,
}

impl BundleSource for FakeStore {
    fn fetch(&self, id: PackageId) -> FetchResult<FetchOutcome> {
        self.requested.lock().unwrap().push(id);
        match self.packages.get(&id) {
            Some(Scripted::Bundle(bytes)) => {
                Ok(FetchOutcome::Found(Box::new(Cursor::new(bytes.clone()))))
            }
            Some(Scripted::Broken) => Err(FetchError::RetriesExhausted {
                id,
                attempts: 5,
                last: "connection reset".into(),
            }),
            Some(Scripted::Missing) | None => Ok(FetchOutcome::Missing { status: 404 }),
        }
    }
}

#[test]
fn batch_stores_new_packages_and_isolates_failures() {
    let dir = tempfile::tempdir().unwrap();
    let store = BundleStore::new(dir.path().join("sticker"));
    let catalog: Arc<dyn CatalogRepository> =
        Arc::new(SqliteCatalog::new(open_db_in_memory().unwrap()));

    let existing = Package {
        package_id: 102,
        title: BTreeMap::from([("en".to_string(), "Old".to_string())]),
        author: BTreeMap::new(),
        stickers: vec![],
    };
    catalog
        .insert(Repo::Official, &existing, &index_row(&existing), 1)
        .unwrap();

    let source = FakeStore {
        packages: HashMap::from([
            (100, Scripted::Bundle(package_bundle(100, "Twilight Sparkle"))),
            (101, Scripted::Missing),
            (102, Scripted::Bundle(package_bundle(102, "Should not be fetched"))),
            (103, Scripted::Bundle(package_bundle(103, "Rainbow Dash"))),
            (104, Scripted::Broken),
        ]),
        requested: Mutex::new(Vec::new()),
    };

    let ingestor = Ingestor::new(Arc::clone(&catalog), &source, store.clone()).with_workers(3);
    let report = ingestor.run(100, 105);

    assert_eq!(
        report,
        IngestReport {
            stored: 2,
            skipped: 1,
            missing: 1,
            failed: 1
        }
    );
    assert!(catalog.exists(Repo::Official, 100).unwrap());
    assert!(catalog.exists(Repo::Official, 103).unwrap());
    assert!(!catalog.exists(Repo::Official, 101).unwrap());
    assert!(!catalog.exists(Repo::Official, 104).unwrap());

    let stored = store.read_package(100).unwrap();
    assert_eq!(stored.stickers, vec![1000, 1001]);
    assert!(store.image_path(100, StickerName::Sticker(1000)).is_file());
    assert!(store.image_path(100, StickerName::TabOn).is_file());
    assert!(!store.package_dir(102).exists());

    let mut requested = source.requested.lock().unwrap().clone();
    requested.sort_unstable();
    assert_eq!(requested, vec![100, 101, 103, 104]);
}

#[test]
fn batch_skips_existing_id_and_stores_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let store = BundleStore::new(dir.path());
    let catalog: Arc<dyn CatalogRepository> =
        Arc::new(SqliteCatalog::new(open_db_in_memory().unwrap()));
    let existing = Package {
        package_id: 102,
        title: BTreeMap::new(),
        author: BTreeMap::new(),
        stickers: vec![],
    };
    catalog
        .insert(Repo::Official, &existing, &index_row(&existing), 1)
        .unwrap();

    let source = FakeStore {
        packages: (100..105)
            .map(|id| (id, Scripted::Bundle(package_bundle(id, "Pony"))))
            .collect(),
        requested: Mutex::new(Vec::new()),
    };
    let report = Ingestor::new(Arc::clone(&catalog), &source, store).run(100, 105);

    // `run` has returned, so every job is already finished.
    assert_eq!(report.stored, 4);
    assert_eq!(report.skipped, 1);
    for id in [100, 101, 103, 104] {
        assert!(catalog.exists(Repo::Official, id).unwrap(), "package {id}");
    }
    assert!(!source.requested.lock().unwrap().contains(&102));
}

#[test]
fn empty_range_does_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let catalog: Arc<dyn CatalogRepository> =
        Arc::new(SqliteCatalog::new(open_db_in_memory().unwrap()));
    let source = FakeStore {
        packages: HashMap::new(),
        requested: Mutex::new(Vec::new()),
    };

    let ingestor = Ingestor::new(catalog, source, BundleStore::new(dir.path()));
    assert_eq!(ingestor.run(10, 10), IngestReport::default());
}

#[test]
fn already_stored_ids_are_not_fetched() {
    let dir = tempfile::tempdir().unwrap();
    let catalog: Arc<dyn CatalogRepository> =
        Arc::new(SqliteCatalog::new(open_db_in_memory().unwrap()));
    let source = FakeStore {
        packages: HashMap::from([(5, Scripted::Bundle(package_bundle(5, "Spike")))]),
        requested: Mutex::new(Vec::new()),
    };
    let ingestor = Ingestor::new(catalog, source, BundleStore::new(dir.path()));

    assert_eq!(ingestor.run(5, 6).stored, 1);
    assert_eq!(ingestor.run(5, 6).skipped, 1);
}

#[test]
fn unpack_converts_png_and_flattens_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let store = BundleStore::new(dir.path());
    let unpacker = Unpacker::new(store.clone());

    unpacker
        .unpack(7, Cursor::new(package_bundle(7, "Applejack")))
        .unwrap();

    let meta: serde_json::Value =
        serde_json::from_str(&store.read_meta_text(7).unwrap()).unwrap();
    assert_eq!(meta["stickers"], serde_json::json!([70, 71]));
    assert_eq!(meta["title"]["en"], "Applejack");

    let jpeg = store.read_image(7, StickerName::Sticker(70)).unwrap();
    assert_eq!(
        image::guess_format(&jpeg).unwrap(),
        ImageFormat::Jpeg,
        "png stickers are stored as jpeg"
    );
    let decoded = image::load_from_memory(&jpeg).unwrap().to_rgb8();
    let pixel = decoded.get_pixel(1, 1);
    assert!(pixel.0.iter().all(|channel| *channel > 245), "transparent becomes white");
    assert!(!store.package_dir(7).join("70.png").exists());
}

#[test]
fn unpack_rejects_entries_escaping_the_package_directory() {
    let dir = tempfile::tempdir().unwrap();
    let unpacker = Unpacker::new(BundleStore::new(dir.path().join("sticker")));
    let evil = bundle(&[("../escape.txt", b"nope".to_vec())]);

    let err = unpacker.unpack(8, Cursor::new(evil)).unwrap_err();
    assert!(matches!(err, UnpackError::UnsafeEntry(_)));
    assert!(!dir.path().join("escape.txt").exists());
}

#[test]
fn unpack_rejects_non_zip_bodies() {
    let dir = tempfile::tempdir().unwrap();
    let unpacker = Unpacker::new(BundleStore::new(dir.path()));
    let err = unpacker
        .unpack(9, Cursor::new(b"<html>not found</html>".to_vec()))
        .unwrap_err();
    assert!(matches!(err, UnpackError::Archive(_)));
}
