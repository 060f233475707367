mod common;

use std::str::FromStr;

use districtbuilder::{
    reconcile, AttrValue, CatalogStore, Feature, FailureKind, GeounitImporter, ImportSettings, LayerSpec, MemStore,
    RepairError, SqliteStore,
};
use rust_decimal::Decimal;

fn county_layer(store: &mut MemStore) -> LayerSpec {
    let config = common::config();
    let reconciled = reconcile(store, &config).unwrap();
    LayerSpec::from_config(&config, config.geolevel("county").unwrap(), &reconciled).unwrap()
}

fn tract_layer(store: &mut dyn CatalogStore) -> LayerSpec {
    let config = common::config();
    let reconciled = reconcile(store, &config).unwrap();
    LayerSpec::from_config(&config, config.geolevel("tract").unwrap(), &reconciled).unwrap()
}

fn tract(index: usize, geoid: AttrValue) -> Feature {
    common::feature(index, Ok(common::unit_square(index as f64 * 2.0, 5.0)), &[
        ("NAME", AttrValue::Text(format!("Tract {index}"))),
        ("GEOID", geoid),
        ("POP20", AttrValue::Integer(100)),
        ("VAP", AttrValue::Integer(60)),
    ])
}

/// Imports a present, a blank and a null GEOID and returns the stored supplemental ids.
fn import_tract_ids(store: &mut dyn CatalogStore) -> Vec<Option<String>> {
    let layer = tract_layer(store);
    assert_eq!(layer.supplement_field.as_deref(), Some("GEOID"));
    let features = vec![
        tract(0, AttrValue::Text("48001000100".into())),
        tract(1, AttrValue::Text("  ".into())),
        tract(2, AttrValue::Null),
    ];

    let report = importer().import(store, &layer, features).unwrap();
    assert_eq!(report.imported, 3);
    assert!(report.failures.is_empty(), "{:?}", report.failures);

    store.geounits(layer.geolevel).unwrap().into_iter().map(|g| g.supplemental_id).collect()
}

fn importer() -> GeounitImporter {
    GeounitImporter::new(ImportSettings { simplify_tolerance: 0.01, report_progress: false })
}

#[test]
fn alias_field_maps_to_the_aliased_subject() {
    let mut store = MemStore::new();
    let layer = county_layer(&mut store);

    let subjects = store.subjects().unwrap();
    let totpop = subjects.iter().find(|s| s.name == "totpop").unwrap().id;
    let vap = subjects.iter().find(|s| s.name == "vap").unwrap().id;
    assert_eq!(layer.subject_fields, vec![("POP20".to_string(), totpop), ("VAP".to_string(), vap)]);
    assert_eq!(layer.name_field, "NAME");
}

#[test]
fn invalid_third_feature_is_skipped_and_the_rest_import() {
    let mut store = MemStore::new();
    let layer = county_layer(&mut store);
    let features = vec![
        common::county(0, 10.0),
        common::county(1, 20.0),
        common::point_county(2),
        common::county(3, 30.0),
        common::county(4, 40.0),
    ];

    let report = importer().import(&mut store, &layer, features).unwrap();

    assert_eq!(report.features, 5);
    assert_eq!(report.imported, 4);
    assert_eq!(report.skipped(), 1);
    assert_eq!(report.failures[0].index, 2);
    assert!(matches!(report.failures[0].kind, FailureKind::Geometry { .. }));

    let geounits = store.geounits(layer.geolevel).unwrap();
    let indices = geounits.iter().map(|g| g.feature_index).collect::<Vec<_>>();
    assert_eq!(indices, vec![0, 1, 3, 4]);
    assert_eq!(geounits[3].name, "County 4");
    assert_eq!(store.counts().unwrap().characteristics, 8);
}

#[test]
fn unreadable_geometry_is_recorded_not_fatal() {
    let mut store = MemStore::new();
    let layer = county_layer(&mut store);
    let mut broken = common::county(0, 1.0);
    broken.geometry = Err(RepairError::EmptyGeometry);

    let report = importer().import(&mut store, &layer, vec![broken, common::county(1, 2.0)]).unwrap();
    assert_eq!(report.imported, 1);
    assert_eq!(report.failures[0].kind, FailureKind::Geometry { reason: RepairError::EmptyGeometry.to_string() });
}

#[test]
fn bad_value_is_zero_filled_and_geounit_kept() {
    let mut store = MemStore::new();
    let layer = county_layer(&mut store);
    let mut feature = common::county(0, 0.0);
    feature.attributes.insert("POP20".into(), AttrValue::Text("n/a".into()));

    let report = importer().import(&mut store, &layer, vec![feature]).unwrap();

    assert_eq!(report.imported, 1);
    assert_eq!(report.zero_filled(), 1);
    assert!(matches!(&report.failures[0].kind, FailureKind::Attribute { field, .. } if field == "POP20"));

    let geounit = store.geounits(layer.geolevel).unwrap().remove(0);
    let values = store.characteristics(geounit.id).unwrap().into_iter().map(|c| c.number).collect::<Vec<_>>();
    assert_eq!(values, vec![Decimal::ZERO, Decimal::ZERO]);
}

#[test]
fn values_are_truncated_to_four_places() {
    let mut store = MemStore::new();
    let layer = county_layer(&mut store);
    let mut feature = common::county(0, 0.0);
    feature.attributes.insert("POP20".into(), AttrValue::Text("1.23456".into()));
    feature.attributes.insert("VAP".into(), AttrValue::Number(7.99999));

    importer().import(&mut store, &layer, vec![feature]).unwrap();

    let geounit = store.geounits(layer.geolevel).unwrap().remove(0);
    let values = store.characteristics(geounit.id).unwrap().into_iter().map(|c| c.number).collect::<Vec<_>>();
    assert_eq!(values, vec![Decimal::from_str("1.2345").unwrap(), Decimal::from_str("7.9999").unwrap()]);
}

#[test]
fn missing_name_skips_the_feature() {
    let mut store = MemStore::new();
    let layer = county_layer(&mut store);
    let mut feature = common::county(0, 5.0);
    feature.attributes.remove("NAME");

    let report = importer().import(&mut store, &layer, vec![feature]).unwrap();
    assert_eq!(report.imported, 0);
    assert_eq!(report.failures[0].kind, FailureKind::MissingField { field: "NAME".into() });
    assert_eq!(store.counts().unwrap().geounits, 0);
}

#[test]
fn repaired_centroids_lie_inside() {
    use geo::{Contains, MultiPolygon, polygon};

    let mut store = MemStore::new();
    let layer = county_layer(&mut store);
    let split = MultiPolygon(vec![
        polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 2.0), (x: 0.0, y: 2.0), (x: 0.0, y: 0.0)],
        polygon![(x: 10.0, y: 0.0), (x: 12.0, y: 0.0), (x: 12.0, y: 2.0), (x: 10.0, y: 2.0), (x: 10.0, y: 0.0)],
    ]);
    let mut feature = common::county(0, 1.0);
    feature.geometry = Ok(geo::Geometry::MultiPolygon(split));

    importer().import(&mut store, &layer, vec![feature]).unwrap();

    let geounit = store.geounits(layer.geolevel).unwrap().remove(0);
    assert!(geounit.geom.contains(&geounit.center));
    assert_eq!(geounit.geom.0.len(), 2);
}

#[test]
fn reimport_creates_no_rows_and_fills_missing_values() {
    let mut store = MemStore::new();
    let layer = county_layer(&mut store);
    let features = || vec![common::county(0, 1.0), common::county(1, 2.0)];

    let mut partial = layer.clone();
    partial.subject_fields.truncate(1);
    importer().import(&mut store, &partial, features()).unwrap();
    assert_eq!(store.counts().unwrap().characteristics, 2);

    let report = importer().import(&mut store, &layer, features()).unwrap();
    assert_eq!(report.imported, 0);
    assert_eq!(report.existing, 2);
    assert_eq!(report.characteristics, 2);

    let counts = store.counts().unwrap();
    assert_eq!(counts.geounits, 2);
    assert_eq!(counts.characteristics, 4);
}

#[test]
fn supplemental_ids_are_kept_or_left_empty_in_memory() {
    let ids = import_tract_ids(&mut MemStore::new());
    assert_eq!(ids, vec![Some("48001000100".to_string()), None, None]);
}

#[test]
fn supplemental_ids_are_kept_or_left_empty_in_sqlite() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let ids = import_tract_ids(&mut store);
    assert_eq!(ids, vec![Some("48001000100".to_string()), None, None]);
}

#[test]
fn absent_supplement_field_skips_the_feature() {
    let mut store = MemStore::new();
    let layer = tract_layer(&mut store);
    let mut feature = tract(0, AttrValue::Null);
    feature.attributes.remove("GEOID");

    let report = importer().import(&mut store, &layer, vec![feature, tract(1, AttrValue::Integer(7))]).unwrap();
    assert_eq!(report.imported, 1);
    assert_eq!(report.failures[0].index, 0);
    assert_eq!(report.failures[0].kind, FailureKind::MissingField { field: "GEOID".into() });
    assert_eq!(store.geounits(layer.geolevel).unwrap()[0].supplemental_id.as_deref(), Some("7"));
}

#[test]
fn blank_name_is_stored_and_null_name_is_skipped() {
    let mut store = MemStore::new();
    let layer = county_layer(&mut store);
    let mut blank = common::county(0, 1.0);
    blank.attributes.insert("NAME".into(), AttrValue::Text("   ".into()));
    let mut null = common::county(1, 1.0);
    null.attributes.insert("NAME".into(), AttrValue::Null);

    let report = importer().import(&mut store, &layer, vec![blank, null]).unwrap();
    assert_eq!(report.imported, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 1);
    assert_eq!(report.failures[0].kind, FailureKind::MissingField { field: "NAME".into() });

    let geounits = store.geounits(layer.geolevel).unwrap();
    assert_eq!(geounits.len(), 1);
    assert_eq!(geounits[0].name, "");
}

#[test]
fn reimporting_a_bad_value_records_nothing_new() {
    let mut store = MemStore::new();
    let layer = county_layer(&mut store);
    let bad = || {
        let mut feature = common::county(0, 0.0);
        feature.attributes.insert("POP20".into(), AttrValue::Text("n/a".into()));
        vec![feature]
    };

    let first = importer().import(&mut store, &layer, bad()).unwrap();
    assert_eq!(first.zero_filled(), 1);

    let second = importer().import(&mut store, &layer, bad()).unwrap();
    assert_eq!(second.existing, 1);
    assert_eq!(second.characteristics, 0);
    assert_eq!(second.zero_filled(), 0);
    assert!(second.failures.is_empty());
    assert_eq!(store.counts().unwrap().characteristics, 2);
}
