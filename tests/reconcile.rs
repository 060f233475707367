mod common;

use std::path::Path;

use districtbuilder::{reconcile, CatalogStore, Config, MemStore, ReconcileError, RowCounts, SqliteStore};

#[test]
fn first_run_creates_the_whole_hierarchy() {
    let config = common::config();
    let mut store = MemStore::new();

    let reconciled = reconcile(&mut store, &config).unwrap();

    let expected = RowCounts {
        geolevels: 3,
        bodies: 2,
        subjects: 2,
        targets: 2,
        legislative_levels: 4,
        defaults: 2,
        users: 1,
        geounits: 0,
        characteristics: 0,
    };
    assert_eq!(reconciled.created, expected);
    assert_eq!(store.counts().unwrap(), expected);
}

#[test]
fn second_run_creates_nothing() {
    let config = common::config();
    for store in [&mut MemStore::new() as &mut dyn CatalogStore, &mut SqliteStore::open_in_memory().unwrap()] {
        let first = reconcile(store, &config).unwrap();
        let before = store.counts().unwrap();

        let second = reconcile(store, &config).unwrap();
        assert_eq!(second.created.total(), 0);
        assert_eq!(store.counts().unwrap(), before);
        assert_eq!(first.geolevels, second.geolevels);
        assert_eq!(first.targets, second.targets);
    }
}

#[test]
fn existing_anonymous_user_is_left_alone() {
    let config = common::config();
    let mut store = SqliteStore::open_in_memory().unwrap();
    let (existing, _) = store.get_or_create_user("anonymous").unwrap();

    let reconciled = reconcile(&mut store, &config).unwrap();
    assert_eq!(reconciled.created.users, 0);
    assert_eq!(store.counts().unwrap().users, 1);
    assert_eq!(store.get_or_create_user("anonymous").unwrap(), (existing, false));
}

#[test]
fn alias_subjects_are_never_persisted() {
    let config = common::config();
    let mut store = MemStore::new();
    let reconciled = reconcile(&mut store, &config).unwrap();

    let names = store.subjects().unwrap().into_iter().map(|s| s.name).collect::<Vec<_>>();
    assert_eq!(names, vec!["totpop", "vap"]);
    assert!(!reconciled.subjects.contains_key("pop20"));

    // congress_pop references the alias, so the totpop subject is the only one behind it.
    assert!(reconciled.subject("totpop").is_some());
    assert_eq!(reconciled.targets.len(), 2);
}

#[test]
fn parents_link_levels_of_the_same_body_and_target() {
    let config = common::config();
    let mut store = MemStore::new();
    let reconciled = reconcile(&mut store, &config).unwrap();

    let congress = reconciled.bodies["congress"];
    let target = reconciled.targets["congress_pop"];
    let level = |geolevel: &str| {
        store.find_legislative_level(congress, reconciled.geolevel(geolevel).unwrap(), target).unwrap().unwrap()
    };

    let (county, tract, block) = (level("county"), level("tract"), level("block"));
    assert_eq!(county.parent, None);
    assert_eq!(tract.parent, Some(county.id));
    assert_eq!(block.parent, Some(tract.id));

    assert_eq!(store.default_target(congress).unwrap(), Some(target));
    assert_eq!(store.default_target(reconciled.bodies["house"]).unwrap(), Some(reconciled.targets["house_vap"]));
}

#[test]
fn parent_declared_after_child_is_an_error() {
    // Move the block geolevel (child of tract) in front of everything else.
    let block_start = common::CONFIG.find(r#"<GeoLevel id="block""#).unwrap();
    let block_end = block_start + common::CONFIG[block_start..].find("</GeoLevel>").unwrap() + "</GeoLevel>".len();
    let block = &common::CONFIG[block_start..block_end];
    let reordered = common::CONFIG.replacen(block, "", 1).replacen("<GeoLevels>", &format!("<GeoLevels>{block}"), 1);

    let config = Config::parse_str(&reordered, Path::new(".")).unwrap();
    let mut store = MemStore::new();
    let err = reconcile(&mut store, &config).unwrap_err();

    assert_eq!(err.downcast_ref::<ReconcileError>(), Some(&ReconcileError::MissingParentLevel {
        body: "congress".into(),
        level: "block".into(),
        parent: "tract".into(),
        target: "congress_pop".into(),
    }));
    assert_eq!(store.counts().unwrap().legislative_levels, 0);
}

#[test]
fn changed_attributes_keep_the_stored_row() {
    let config = common::config();
    let mut store = MemStore::new();
    reconcile(&mut store, &config).unwrap();

    let edited = common::CONFIG.replace(r#"maxdistricts="3""#, r#"maxdistricts="4""#);
    let edited = Config::parse_str(&edited, Path::new(".")).unwrap();
    let second = reconcile(&mut store, &edited).unwrap();

    assert_eq!(second.created.total(), 0);
    assert_eq!(store.counts().unwrap().bodies, 2);
}
