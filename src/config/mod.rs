mod aliases;
mod document;

use thiserror::Error;

pub use aliases::SubjectAliases;
pub use document::{
    BodyConfig, Config, DatabaseConfig, GeoLevelBodyConfig, GeoLevelConfig, LegislativeTargetConfig,
    MapServerConfig, SubjectConfig, TargetConfig,
};

/// Problems with the setup document. All of them are fatal to a run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed configuration document: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("configuration root must be <DistrictBuilder>, found <{0}>")]
    Root(String),
    #[error("<{element}> is missing required attribute '{attribute}'")]
    MissingAttribute { element: String, attribute: String },
    #[error("<{element}> attribute '{attribute}' has invalid value '{value}'")]
    InvalidAttribute { element: String, attribute: String, value: String },
    #[error("configuration has no <{0}> element")]
    MissingElement(&'static str),
    #[error("duplicate {kind} id '{id}'")]
    DuplicateId { kind: &'static str, id: String },
    #[error("{kind} reference '{id}' does not resolve")]
    UnresolvedReference { kind: &'static str, id: String },
    #[error("subject alias chain starting at '{0}' is cyclic")]
    AliasCycle(String),
    #[error("geolevel '{0}' is not declared in the configuration")]
    UnknownGeoLevel(String),
    #[error("map server layers read from database '{0}', but the catalog is stored elsewhere; run setup against the <Database> catalog")]
    CatalogNotShared(String),
}

/// Settings threaded into the geometry repairer and geounit importer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportSettings {
    /// Simplification tolerance in map units.
    pub simplify_tolerance: f64,
    /// Log coarse progress while importing a layer.
    pub report_progress: bool,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self { simplify_tolerance: 100.0, report_progress: true }
    }
}

impl ImportSettings {
    /// Defaults, overridden by the document's `<Settings>` and then by an explicit tolerance.
    pub fn resolve(config: &Config, tolerance: Option<f64>) -> Self {
        let default = Self::default();
        Self {
            simplify_tolerance: tolerance
                .or(config.simplify_tolerance)
                .unwrap_or(default.simplify_tolerance),
            ..default
        }
    }
}
