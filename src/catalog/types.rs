use geo::{MultiPolygon, Point};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::geom::RepairedGeometry;

macro_rules! row_id {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { self.0.fmt(f) }
        }
    )*};
}

row_id! {
    GeoLevelId,
    LegislativeBodyId,
    SubjectId,
    TargetId,
    LegislativeLevelId,
    UserId,
    GeounitId,
    CharacteristicId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoLevel {
    pub id: GeoLevelId,
    pub name: String,
    pub min_zoom: i32,
    pub sort_key: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewGeoLevel {
    pub name: String,
    pub min_zoom: i32,
    pub sort_key: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegislativeBody {
    pub id: LegislativeBodyId,
    pub name: String,
    pub member: String,
    pub max_districts: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewLegislativeBody {
    pub name: String,
    pub member: String,
    pub max_districts: i32,
}

/// A persisted demographic measure. `name` is the canonical subject id from the document.
#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
    pub display: String,
    pub short_display: String,
    pub is_displayed: bool,
    pub sort_key: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSubject {
    pub name: String,
    pub display: String,
    pub short_display: String,
    pub is_displayed: bool,
    pub sort_key: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub id: TargetId,
    pub subject: SubjectId,
    pub value: i64,
    pub range1: Option<i64>,
    pub range2: Option<i64>,
}

/// Natural key of a target: (subject, value, range1, range2).
#[derive(Debug, Clone, PartialEq)]
pub struct NewTarget {
    pub subject: SubjectId,
    pub value: i64,
    pub range1: Option<i64>,
    pub range2: Option<i64>,
}

/// Binding of (body, geolevel, target), optionally under a parent level of the same body.
#[derive(Debug, Clone, PartialEq)]
pub struct LegislativeLevel {
    pub id: LegislativeLevelId,
    pub body: LegislativeBodyId,
    pub geolevel: GeoLevelId,
    pub target: TargetId,
    pub parent: Option<LegislativeLevelId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewLegislativeLevel {
    pub body: LegislativeBodyId,
    pub geolevel: GeoLevelId,
    pub target: TargetId,
    pub parent: Option<LegislativeLevelId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

/// One imported feature. `feature_index` is the feature's position in its source layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Geounit {
    pub id: GeounitId,
    pub geolevel: GeoLevelId,
    pub feature_index: usize,
    pub name: String,
    pub supplemental_id: Option<String>,
    pub geom: MultiPolygon<f64>,
    pub simple: MultiPolygon<f64>,
    pub center: Point<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewGeounit {
    pub geolevel: GeoLevelId,
    pub feature_index: usize,
    pub name: String,
    pub supplemental_id: Option<String>,
    pub geometry: RepairedGeometry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Characteristic {
    pub id: CharacteristicId,
    pub geounit: GeounitId,
    pub subject: SubjectId,
    pub number: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCharacteristic {
    pub geounit: GeounitId,
    pub subject: SubjectId,
    pub number: Decimal,
}

/// Number of rows per entity table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RowCounts {
    pub geolevels: usize,
    pub bodies: usize,
    pub subjects: usize,
    pub targets: usize,
    pub legislative_levels: usize,
    pub defaults: usize,
    pub users: usize,
    pub geounits: usize,
    pub characteristics: usize,
}

impl RowCounts {
    pub fn total(&self) -> usize {
        self.geolevels + self.bodies + self.subjects + self.targets + self.legislative_levels
            + self.defaults + self.users + self.geounits + self.characteristics
    }
}
