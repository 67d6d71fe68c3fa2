use ponysticker_core::db::open_db_in_memory;
use ponysticker_core::model::package::{OrderKey, Package, PackageId, Repo};
use ponysticker_core::repo::catalog_repo::{
    CatalogRepository, PageRequest, RepoError, SqliteCatalog,
};
use ponysticker_core::search::tokenizer::normalize;
use ponysticker_core::service::index_service::index_row;
use std::collections::BTreeMap;

fn package(id: PackageId, title: &str, author: &str) -> Package {
    Package {
        package_id: id,
        title: BTreeMap::from([("en".to_string(), title.to_string())]),
        author: BTreeMap::from([("en".to_string(), author.to_string())]),
        stickers: vec![id * 10, id * 10 + 1],
    }
}

fn store(catalog: &SqliteCatalog, package: &Package, inserted_at: i64) {
    let repo = package.repo().unwrap();
    catalog
        .insert(repo, package, &index_row(package), inserted_at)
        .unwrap();
}

fn ids(metas: &[String]) -> Vec<PackageId> {
    metas
        .iter()
        .map(|meta| serde_json::from_str::<Package>(meta).unwrap().package_id)
        .collect()
}

#[test]
fn insert_then_exists_and_meta_round_trip() {
    let catalog = SqliteCatalog::new(open_db_in_memory().unwrap());
    let pkg = package(42, "Pinkie Pie", "Hasbro");

    assert!(!catalog.exists(Repo::Official, 42).unwrap());
    store(&catalog, &pkg, 1);
    assert!(catalog.exists(Repo::Official, 42).unwrap());
    assert!(!catalog.exists(Repo::Creator, 42).unwrap());

    let meta = catalog.get_meta(Repo::Official, 42).unwrap().unwrap();
    assert_eq!(serde_json::from_str::<Package>(&meta).unwrap(), pkg);
    assert!(catalog.get_meta(Repo::Official, 43).unwrap().is_none());
}

#[test]
fn second_insert_of_same_id_is_rejected() {
    let catalog = SqliteCatalog::new(open_db_in_memory().unwrap());
    let pkg = package(7, "Rarity", "Hasbro");
    store(&catalog, &pkg, 1);

    let err = catalog
        .insert(Repo::Official, &pkg, &index_row(&pkg), 2)
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::AlreadyExists {
            repo: Repo::Official,
            id: 7
        }
    ));
    assert_eq!(catalog.count(Repo::Official, None).unwrap(), 1);
}

#[test]
fn failed_index_write_leaves_no_catalog_row() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch("DROP TABLE official_fts;").unwrap();
    let catalog = SqliteCatalog::new(conn);
    let pkg = package(5, "Applejack", "Hasbro");

    assert!(catalog
        .insert(Repo::Official, &pkg, &index_row(&pkg), 1)
        .is_err());
    assert!(!catalog.exists(Repo::Official, 5).unwrap());
}

#[test]
fn insert_into_wrong_partition_is_rejected() {
    let catalog = SqliteCatalog::new(open_db_in_memory().unwrap());
    let pkg = package(-3, "Mine", "Me");
    let err = catalog
        .insert(Repo::Official, &pkg, &index_row(&pkg), 1)
        .unwrap_err();
    assert!(matches!(err, RepoError::Misrouted { .. }));

    let gap = package(999_999, "Nobody", "Nobody");
    let err = catalog
        .insert(Repo::Official, &gap, &index_row(&gap), 1)
        .unwrap_err();
    assert!(matches!(err, RepoError::NoPartition(999_999)));
}

#[test]
fn listing_is_paginated_by_package_id() {
    let catalog = SqliteCatalog::new(open_db_in_memory().unwrap());
    for id in (0..25).rev() {
        store(&catalog, &package(id, "Pony", "Hasbro"), 100 - id);
    }

    let page = catalog
        .list(Repo::Official, PageRequest::new(2, 10), OrderKey::PackageId)
        .unwrap();
    assert_eq!(ids(&page), (10..20).collect::<Vec<_>>());

    let last = catalog
        .list(Repo::Official, PageRequest::new(3, 10), OrderKey::PackageId)
        .unwrap();
    assert_eq!(ids(&last), (20..25).collect::<Vec<_>>());

    let beyond = catalog
        .list(Repo::Official, PageRequest::new(4, 10), OrderKey::PackageId)
        .unwrap();
    assert!(beyond.is_empty());
    assert_eq!(catalog.count(Repo::Official, None).unwrap(), 25);
}

#[test]
fn date_order_follows_insertion_time() {
    let catalog = SqliteCatalog::new(open_db_in_memory().unwrap());
    store(&catalog, &package(3, "A", "x"), 10);
    store(&catalog, &package(1, "B", "x"), 30);
    store(&catalog, &package(2, "C", "x"), 20);

    let page = PageRequest::new(1, 10);
    let by_date = catalog.list(Repo::Official, page, OrderKey::Date).unwrap();
    assert_eq!(ids(&by_date), vec![3, 2, 1]);
    let by_id = catalog.list(Repo::Official, page, OrderKey::PackageId).unwrap();
    assert_eq!(ids(&by_id), vec![1, 2, 3]);
}

#[test]
fn search_matches_partial_words_and_counts() {
    let catalog = SqliteCatalog::new(open_db_in_memory().unwrap());
    store(&catalog, &package(1, "Twilight Sparkle", "Hasbro"), 1);
    store(&catalog, &package(2, "Rainbow Dash", "Hasbro"), 2);
    store(&catalog, &package(3, "Twilight Time", "Studio"), 3);

    let page = PageRequest::new(1, 10);
    let hits = catalog
        .search(Repo::Official, page, OrderKey::PackageId, &normalize("twilight"))
        .unwrap();
    assert_eq!(ids(&hits), vec![1, 3]);

    let hits = catalog
        .search(Repo::Official, page, OrderKey::PackageId, &normalize("Twilight Sparkle"))
        .unwrap();
    assert_eq!(ids(&hits), vec![1]);

    let by_author = catalog
        .search(Repo::Official, page, OrderKey::PackageId, &normalize("studio"))
        .unwrap();
    assert_eq!(ids(&by_author), vec![3]);

    assert_eq!(
        catalog
            .count(Repo::Official, Some(&normalize("twilight")))
            .unwrap(),
        2
    );
    assert_eq!(
        catalog
            .count(Repo::Creator, Some(&normalize("twilight")))
            .unwrap(),
        0
    );
}

#[test]
fn query_without_tokens_matches_nothing() {
    let catalog = SqliteCatalog::new(open_db_in_memory().unwrap());
    store(&catalog, &package(1, "Fluttershy", "Hasbro"), 1);

    let hits = catalog
        .search(Repo::Official, PageRequest::new(1, 10), OrderKey::PackageId, "")
        .unwrap();
    assert!(hits.is_empty());
    assert_eq!(catalog.count(Repo::Official, Some("")).unwrap(), 0);
}

#[test]
fn cjk_titles_are_searchable_per_character() {
    let catalog = SqliteCatalog::new(open_db_in_memory().unwrap());
    store(&catalog, &package(1_000_001, "小马宝莉", "Hasbro"), 1);

    let hits = catalog
        .search(Repo::Creator, PageRequest::new(1, 10), OrderKey::Date, &normalize("宝莉"))
        .unwrap();
    assert_eq!(ids(&hits), vec![1_000_001]);
}

#[test]
fn refresh_count_records_partition_size() {
    let catalog = SqliteCatalog::new(open_db_in_memory().unwrap());
    store(&catalog, &package(-1, "Mine", "Me"), 1);
    store(&catalog, &package(-2, "Also mine", "Me"), 2);

    assert_eq!(catalog.recorded_count(Repo::Custom).unwrap(), 0);
    assert_eq!(catalog.refresh_count(Repo::Custom).unwrap(), 2);
    assert_eq!(catalog.recorded_count(Repo::Custom).unwrap(), 2);
    assert_eq!(catalog.recorded_count(Repo::Official).unwrap(), 0);
}
