mod geounit;
mod quantize;
mod report;

pub use geounit::{AttrValue, Feature, GeounitImporter, LayerSpec};
pub use quantize::{quantize, QuantizeError};
pub use report::{FailureKind, FeatureFailure, ImportReport};
