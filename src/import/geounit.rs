use std::{collections::HashMap, fmt, path::Path};

use anyhow::{Context, Result};
use geo::Geometry;
use rust_decimal::Decimal;
use tracing::{debug, info, info_span, warn};

use crate::{
    catalog::{CatalogStore, GeoLevelId, GeounitId, NewCharacteristic, NewGeounit, Reconciliation, SubjectId},
    common,
    config::{Config, ConfigError, GeoLevelConfig, ImportSettings},
    geom::{GeometryRepairer, RepairError},
    import::{quantize::quantize_attr, FailureKind, FeatureFailure, ImportReport},
};

/// Features written per store transaction. A failed batch is rolled back whole.
const FEATURES_PER_TRANSACTION: usize = 500;

/// A single attribute value read from a feature layer.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Number(f64),
    Integer(i64),
    Null,
}

impl AttrValue {
    /// Textual form for names and identifiers; `None` for null or blank values.
    pub fn as_text(&self) -> Option<String> {
        match self {
            AttrValue::Text(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            AttrValue::Text(_) | AttrValue::Null => None,
            AttrValue::Number(number) => Some(number.to_string()),
            AttrValue::Integer(integer) => Some(integer.to_string()),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Text(text) => f.write_str(text),
            AttrValue::Number(number) => write!(f, "{number}"),
            AttrValue::Integer(integer) => write!(f, "{integer}"),
            AttrValue::Null => f.write_str("NULL"),
        }
    }
}

/// Names may be blank but not null.
fn feature_name(value: &AttrValue) -> Option<String> {
    match value {
        AttrValue::Null => None,
        AttrValue::Text(text) => Some(text.trim().to_string()),
        other => other.as_text(),
    }
}

/// One feature of a layer: its position in the layer, its raw geometry (or why
/// the geometry could not be read) and its attributes by field name.
#[derive(Debug, Clone)]
pub struct Feature {
    pub index: usize,
    pub geometry: Result<Geometry<f64>, RepairError>,
    pub attributes: HashMap<String, AttrValue>,
}

/// What to read from a layer and where to store it.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    pub geolevel: GeoLevelId,
    pub geolevel_name: String,
    pub name_field: String,
    pub supplement_field: Option<String>,
    /// Attribute field to canonical subject, in configuration order.
    pub subject_fields: Vec<(String, SubjectId)>,
}

impl LayerSpec {
    /// Build the layer description for a configured geolevel from reconciled row ids.
    pub fn from_config(config: &Config, geolevel: &GeoLevelConfig, reconciled: &Reconciliation) -> Result<Self> {
        let id = reconciled.geolevel(&geolevel.id)
            .with_context(|| format!("Geolevel '{}' has not been reconciled", geolevel.id))?;

        let name_field = geolevel.name_field.clone().ok_or_else(|| ConfigError::MissingAttribute {
            element: format!("GeoLevel id=\"{}\"", geolevel.id),
            attribute: "namefield".into(),
        })?;

        let subject_fields = config.subject_fields(geolevel)?.into_iter()
            .map(|(field, canonical)| {
                reconciled.subject(&canonical)
                    .map(|subject| (field, subject))
                    .with_context(|| format!("Subject '{canonical}' has not been reconciled"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            geolevel: id,
            geolevel_name: geolevel.name.clone(),
            name_field,
            supplement_field: geolevel.supplement_field.clone(),
            subject_fields,
        })
    }
}

/// Imports the features of one layer as geounits with their characteristics.
///
/// A feature whose geometry cannot be repaired, or that lacks its name or
/// supplemental id, is recorded and skipped. A characteristic whose value cannot
/// be quantized is stored as zero and recorded; its geounit stays.
#[derive(Debug, Clone, Copy)]
pub struct GeounitImporter {
    repairer: GeometryRepairer,
    settings: ImportSettings,
}

impl GeounitImporter {
    pub fn new(settings: ImportSettings) -> Self {
        Self { repairer: GeometryRepairer::new(settings.simplify_tolerance), settings }
    }

    /// Read every feature of a shapefile and import it.
    pub fn import_shapefile(&self, store: &mut dyn CatalogStore, layer: &LayerSpec, path: &Path) -> Result<ImportReport> {
        info!(geolevel = %layer.geolevel_name, path = %path.display(), "Importing shapefile");
        let features = common::read_features(path)?;
        self.import(store, layer, features)
    }

    /// Import features in order. Only store errors abort the batch.
    pub fn import(&self, store: &mut dyn CatalogStore, layer: &LayerSpec, features: Vec<Feature>) -> Result<ImportReport> {
        let mut report = ImportReport::new(&layer.geolevel_name);
        report.features = features.len();
        info!(geolevel = %layer.geolevel_name, "{} features in layer", features.len());

        let step = (features.len() / 10).max(1);
        let mut done = 0;
        for batch in features.chunks(FEATURES_PER_TRANSACTION) {
            store.atomically(&mut |store: &mut dyn CatalogStore| -> Result<()> {
                for feature in batch {
                    let _span = info_span!("feature", index = feature.index).entered();
                    self.import_feature(store, layer, feature, &mut report)?;

                    done += 1;
                    if self.settings.report_progress && done % step == 0 && done < report.features {
                        info!(geolevel = %layer.geolevel_name, "{:.0}% ..", 100.0 * done as f64 / report.features as f64);
                    }
                }
                Ok(())
            }).with_context(|| format!("Failed to store features of geolevel '{}'", layer.geolevel_name))?;
        }

        info!(
            geolevel = %layer.geolevel_name,
            imported = report.imported,
            existing = report.existing,
            skipped = report.skipped(),
            zero_filled = report.zero_filled(),
            "Finished importing layer",
        );
        Ok(report)
    }

    fn import_feature(
        &self,
        store: &mut dyn CatalogStore,
        layer: &LayerSpec,
        feature: &Feature,
        report: &mut ImportReport,
    ) -> Result<()> {
        let name = feature.attributes.get(&layer.name_field).and_then(feature_name);

        // Geounits from an earlier run are kept as they are; only missing characteristics are filled.
        if let Some(geounit) = store.find_geounit(layer.geolevel, feature.index)? {
            debug!("geounit already exists");
            report.existing += 1;
            return self.store_characteristics(store, layer, geounit, feature, name, report);
        }

        let mut skip = |kind: FailureKind| {
            warn!(name = name.as_deref().unwrap_or_default(), "Failed to import geometry for feature {}: {kind:?}", feature.index);
            report.failures.push(FeatureFailure { index: feature.index, name: name.clone(), kind });
        };

        let Some(display_name) = name.clone() else {
            skip(FailureKind::MissingField { field: layer.name_field.clone() });
            return Ok(());
        };

        // A blank or null supplemental id is stored as absent; only a field the layer lacks is fatal.
        let supplemental_id = match &layer.supplement_field {
            None => None,
            Some(field) => match feature.attributes.get(field) {
                Some(value) => value.as_text(),
                None => {
                    skip(FailureKind::MissingField { field: field.clone() });
                    return Ok(());
                }
            },
        };

        let repaired = match feature.geometry.clone().and_then(|raw| self.repairer.repair(raw)) {
            Ok(repaired) => repaired,
            Err(e) => {
                skip(FailureKind::Geometry { reason: e.to_string() });
                return Ok(());
            }
        };

        let geounit = store.insert_geounit(&NewGeounit {
            geolevel: layer.geolevel,
            feature_index: feature.index,
            name: display_name,
            supplemental_id,
            geometry: repaired,
        })?;
        report.imported += 1;

        self.store_characteristics(store, layer, geounit, feature, name, report)
    }

    /// One characteristic per configured subject field, zero-filled when the value does not quantize.
    fn store_characteristics(
        &self,
        store: &mut dyn CatalogStore,
        layer: &LayerSpec,
        geounit: GeounitId,
        feature: &Feature,
        name: Option<String>,
        report: &mut ImportReport,
    ) -> Result<()> {
        for (field, subject) in &layer.subject_fields {
            let value = feature.attributes.get(field).unwrap_or(&AttrValue::Null);
            let quantized = quantize_attr(value);
            let number = quantized.clone().unwrap_or(Decimal::ZERO);

            let (_, created) = store.get_or_create_characteristic(&NewCharacteristic { geounit, subject: *subject, number })?;
            if !created { continue }
            report.characteristics += 1;

            if let Err(e) = quantized {
                warn!(field = %field, name = name.as_deref().unwrap_or_default(), "Failed to set value \"{value}\": {e}");
                report.failures.push(FeatureFailure {
                    index: feature.index,
                    name: name.clone(),
                    kind: FailureKind::Attribute { field: field.clone(), subject: subject.to_string(), reason: e.to_string() },
                });
            }
        }
        Ok(())
    }
}
