#![doc = "District Builder setup: catalog reconciliation, geometry import, views and map server provisioning"]
mod catalog;
mod common;
mod config;
mod geom;
mod import;
mod provision;
mod setup;
mod views;

#[doc(inline)]
pub use catalog::{
    reconcile, CatalogStore, Characteristic, GeoLevel, Geounit, LegislativeBody, LegislativeLevel,
    MemStore, NewCharacteristic, NewGeoLevel, NewGeounit, NewLegislativeBody, NewLegislativeLevel,
    NewSubject, NewTarget, PostgisStore, ReconcileError, Reconciliation, RowCounts, SqliteStore, Subject,
    Target, User, GEOMETRY_SRID,
};

#[doc(inline)]
pub use catalog::{CharacteristicId, GeoLevelId, GeounitId, LegislativeBodyId, LegislativeLevelId, SubjectId, TargetId, UserId};

#[doc(inline)]
pub use config::{
    BodyConfig, Config, ConfigError, DatabaseConfig, GeoLevelBodyConfig, GeoLevelConfig, ImportSettings,
    LegislativeTargetConfig, MapServerConfig, SubjectAliases, SubjectConfig, TargetConfig,
};

#[doc(inline)]
pub use geom::{GeometryRepairer, RepairError, RepairedGeometry};

#[doc(inline)]
pub use import::{
    quantize, AttrValue, Feature, FeatureFailure, FailureKind, GeounitImporter, ImportReport,
    LayerSpec, QuantizeError,
};

#[doc(inline)]
pub use provision::{GeoServerClient, Method, Payload, ProvisionError, ProvisionPlan, ProvisionReport, Step};

#[doc(inline)]
pub use setup::{run as run_setup, GeolevelSelection, SetupOptions, SetupReport};

#[doc(inline)]
pub use views::{LevelViews, ViewDefinition, ViewPlan};
