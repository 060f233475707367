//! SQL views over the catalog used for identify queries and map layers.

use serde::Serialize;

use crate::catalog::{GeoLevel, Subject};

/// Name of the view joining every geounit to its characteristics.
pub(crate) const IDENTIFY_VIEW: &str = "identify_geounit";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewDefinition {
    pub name: String,
    #[serde(skip)]
    pub sql: String,
}

/// Views belonging to one geolevel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelViews {
    pub geolevel: String,
    /// `simple_<geolevel>`: simplified boundaries.
    pub boundary: ViewDefinition,
    /// `demo_<geolevel>_<subject>`, one per subject in catalog order.
    pub demographics: Vec<(String, ViewDefinition)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewPlan {
    pub identify: ViewDefinition,
    pub levels: Vec<LevelViews>,
}

/// Double-quote an identifier for SQL.
fn quote(ident: &str) -> String { format!("\"{}\"", ident.replace('"', "\"\"")) }

fn view(name: String, select: String) -> ViewDefinition {
    let sql = format!("DROP VIEW IF EXISTS {0};\nCREATE VIEW {0} AS {1};", quote(&name), select);
    ViewDefinition { name, sql }
}

impl ViewPlan {
    /// One identify view, then per geolevel a boundary view and a demographic view per subject.
    pub fn build(geolevels: &[GeoLevel], subjects: &[Subject]) -> Self {
        let identify = view(
            IDENTIFY_VIEW.to_string(),
            "SELECT g.id, g.name, g.geolevel_id, g.geom, c.number, c.subject_id \
             FROM geounit g JOIN characteristic c ON g.id = c.geounit_id".to_string(),
        );

        let levels = geolevels.iter().map(|geolevel| LevelViews {
            geolevel: geolevel.name.clone(),
            boundary: view(
                format!("simple_{}", geolevel.name),
                format!("SELECT id, name, geolevel_id, simple AS geom FROM geounit WHERE geolevel_id = {}", geolevel.id),
            ),
            demographics: subjects.iter().map(|subject| {
                (subject.name.clone(), view(
                    format!("demo_{}_{}", geolevel.name, subject.name),
                    format!(
                        "SELECT g.id, g.name, g.geolevel_id, g.geom, c.number \
                         FROM geounit g JOIN characteristic c ON g.id = c.geounit_id \
                         WHERE c.subject_id = {} AND g.geolevel_id = {}",
                        subject.id, geolevel.id,
                    ),
                ))
            }).collect(),
        }).collect();

        Self { identify, levels }
    }

    /// Every view in creation order.
    pub fn views(&self) -> impl Iterator<Item = &ViewDefinition> {
        std::iter::once(&self.identify).chain(self.levels.iter().flat_map(|level| {
            std::iter::once(&level.boundary).chain(level.demographics.iter().map(|(_, view)| view))
        }))
    }

    pub fn names(&self) -> Vec<String> { self.views().map(|view| view.name.clone()).collect() }
}
