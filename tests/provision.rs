use std::path::Path;

use districtbuilder::{
    DatabaseConfig, GeoLevel, GeoLevelId, GeoServerClient, MapServerConfig, ProvisionError, ProvisionPlan, Subject,
    SubjectId, ViewPlan,
};
use geo::{Coord, Rect};
use mockito::Matcher;

fn map_server() -> MapServerConfig {
    MapServerConfig {
        hostname: "localhost".into(),
        port: 8080,
        namespace: "db".into(),
        namespace_href: "https://example.org/db".into(),
        admin_user: "admin".into(),
        admin_pass: "secret".into(),
        styles: "styles".into(),
    }
}

fn database() -> DatabaseConfig {
    DatabaseConfig {
        name: "districts".into(),
        user: "mapper".into(),
        password: "pw".into(),
        host: "localhost".into(),
        port: 5432,
        dbtype: "postgis".into(),
    }
}

fn plan(styles: &Path) -> ProvisionPlan {
    let geolevels = [GeoLevel { id: GeoLevelId(1), name: "county".into(), min_zoom: 0, sort_key: 1 }];
    let subjects = [Subject {
        id: SubjectId(1),
        name: "totpop".into(),
        display: "Total Population".into(),
        short_display: "Pop.".into(),
        is_displayed: true,
        sort_key: 1,
    }];
    let extent = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 100.0, y: 50.0 });
    ProvisionPlan::build(&map_server(), &database(), styles, &ViewPlan::build(&geolevels, &subjects), extent)
}

fn style_dir(names: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for name in names {
        std::fs::write(dir.path().join(format!("{name}.sld")), format!("<StyledLayerDescriptor>{name}</StyledLayerDescriptor>")).unwrap();
    }
    dir
}

#[test]
fn every_step_is_sent_in_order() {
    let styles = style_dir(&["county_totpop", "county_none", "county_boundaries"]);
    let plan = plan(styles.path());
    let mut server = mockito::Server::new();

    let namespace = server.mock("POST", "/geoserver/rest/namespaces")
        .match_header("authorization", "Basic YWRtaW46c2VjcmV0")
        .match_header("content-type", "application/xml")
        .match_body(Matcher::Regex("<prefix>db</prefix><uri>https://example.org/db</uri>".into()))
        .with_status(201)
        .expect(1)
        .create();
    let sld = server.mock("PUT", "/geoserver/rest/styles/county_totpop")
        .match_header("content-type", "application/vnd.ogc.sld+xml")
        .match_body("<StyledLayerDescriptor>county_totpop</StyledLayerDescriptor>")
        .with_status(200)
        .expect(1)
        .create();
    let _posts = server.mock("POST", Matcher::Any).with_status(201).create();
    let _puts = server.mock("PUT", Matcher::Any).with_status(200).create();

    let client = GeoServerClient::with_base_url(server.url(), "admin", "secret").unwrap();
    let report = client.run(&plan).unwrap();

    assert_eq!(report.completed.len(), plan.len());
    assert_eq!(report.completed[0], "create workspace and namespace");
    namespace.assert();
    sld.assert();
}

#[test]
fn first_failure_stops_the_sequence() {
    let styles = style_dir(&["county_totpop", "county_none", "county_boundaries"]);
    let plan = plan(styles.path());
    let mut server = mockito::Server::new();

    let _namespace = server.mock("POST", "/geoserver/rest/namespaces").with_status(201).create();
    let _datastore = server.mock("POST", "/geoserver/rest/workspaces/db/datastores").with_status(500).create();
    let featuretypes = server.mock("POST", "/geoserver/rest/workspaces/db/datastores/PostGIS/featuretypes")
        .with_status(201)
        .expect(0)
        .create();

    let client = GeoServerClient::with_base_url(server.url(), "admin", "secret").unwrap();
    let err = client.run(&plan).unwrap_err();

    assert!(matches!(err, ProvisionError::Status { status: 500, ref step } if step == "add PostGIS data store"));
    featuretypes.assert();
}

#[test]
fn missing_style_file_aborts() {
    let styles = style_dir(&[]);
    let plan = plan(styles.path());
    let mut server = mockito::Server::new();
    let _posts = server.mock("POST", Matcher::Any).with_status(201).create();
    let uploads = server.mock("PUT", Matcher::Any).with_status(200).expect(0).create();

    let client = GeoServerClient::with_base_url(server.url(), "admin", "secret").unwrap();
    let err = client.run(&plan).unwrap_err();

    assert!(matches!(err, ProvisionError::StyleFile { ref path, .. } if path.ends_with("county_totpop.sld")));
    uploads.assert();
}

#[test]
fn unreachable_server_is_a_transport_error() {
    let styles = style_dir(&[]);
    // Nothing listens on port 9 locally.
    let client = GeoServerClient::with_base_url("http://127.0.0.1:9", "admin", "secret").unwrap();
    let err = client.run(&plan(styles.path())).unwrap_err();
    assert!(matches!(err, ProvisionError::Transport { .. }));
}
