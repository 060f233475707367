use serde::Serialize;

/// Why one feature (or one of its characteristics) did not import cleanly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// The geometry could not be repaired; no geounit was stored.
    Geometry { reason: String },
    /// A required attribute was absent or null; no geounit was stored.
    MissingField { field: String },
    /// A characteristic value could not be quantized; zero was stored instead.
    Attribute { field: String, subject: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureFailure {
    pub index: usize,
    pub name: Option<String>,
    #[serde(flatten)]
    pub kind: FailureKind,
}

impl FeatureFailure {
    /// Whether the feature was skipped entirely, as opposed to zero-filled.
    pub fn is_skip(&self) -> bool { !matches!(self.kind, FailureKind::Attribute { .. }) }
}

/// Outcome of importing one geolevel's layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub geolevel: String,
    pub features: usize,
    /// Geounits created by this run.
    pub imported: usize,
    /// Features whose geounit was already stored by an earlier run.
    pub existing: usize,
    pub characteristics: usize,
    pub failures: Vec<FeatureFailure>,
}

impl ImportReport {
    pub fn new(geolevel: &str) -> Self { Self { geolevel: geolevel.to_string(), ..Self::default() } }

    /// Features that produced no geounit.
    pub fn skipped(&self) -> usize { self.failures.iter().filter(|f| f.is_skip()).count() }

    /// Characteristics stored as zero.
    pub fn zero_filled(&self) -> usize { self.failures.iter().filter(|f| !f.is_skip()).count() }
}
