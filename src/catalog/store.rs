use anyhow::Result;
use geo::Rect;

use crate::{catalog::*, config::DatabaseConfig, views::ViewPlan};

/// Storage seam between the setup pipeline and the catalog database.
///
/// Every `get_or_create_*` looks a row up by its natural key and only inserts
/// when nothing matches; the flag in the returned pair is `true` when a row was
/// created. Non-key attributes of an existing row are never overwritten.
pub trait CatalogStore {
    fn get_or_create_geolevel(&mut self, new: &NewGeoLevel) -> Result<(GeoLevel, bool)>;

    fn get_or_create_body(&mut self, new: &NewLegislativeBody) -> Result<(LegislativeBody, bool)>;

    fn get_or_create_subject(&mut self, new: &NewSubject) -> Result<(Subject, bool)>;

    fn get_or_create_target(&mut self, new: &NewTarget) -> Result<(Target, bool)>;

    fn get_or_create_legislative_level(&mut self, new: &NewLegislativeLevel) -> Result<(LegislativeLevel, bool)>;

    fn find_legislative_level(
        &self,
        body: LegislativeBodyId,
        geolevel: GeoLevelId,
        target: TargetId,
    ) -> Result<Option<LegislativeLevel>>;

    /// Point the body's defaults row at `target`, creating the row if needed.
    fn set_default_target(&mut self, body: LegislativeBodyId, target: TargetId) -> Result<bool>;

    fn default_target(&self, body: LegislativeBodyId) -> Result<Option<TargetId>>;

    fn get_or_create_user(&mut self, username: &str) -> Result<(User, bool)>;

    /// Geounit previously imported from feature `feature_index` of the geolevel's layer.
    fn find_geounit(&self, geolevel: GeoLevelId, feature_index: usize) -> Result<Option<GeounitId>>;

    fn insert_geounit(&mut self, new: &NewGeounit) -> Result<GeounitId>;

    fn geounits(&self, geolevel: GeoLevelId) -> Result<Vec<Geounit>>;

    fn get_or_create_characteristic(&mut self, new: &NewCharacteristic) -> Result<(Characteristic, bool)>;

    fn characteristics(&self, geounit: GeounitId) -> Result<Vec<Characteristic>>;

    /// All geolevels, ordered by id.
    fn geolevels(&self) -> Result<Vec<GeoLevel>>;

    /// All subjects, ordered by id.
    fn subjects(&self) -> Result<Vec<Subject>>;

    /// Bounding extent of every stored geounit geometry.
    fn extent(&self) -> Result<Option<Rect<f64>>>;

    /// Create or replace the planned views.
    fn apply_views(&mut self, plan: &ViewPlan) -> Result<()>;

    fn counts(&self) -> Result<RowCounts>;

    /// Run `work` against this store so that its writes land together or not at all.
    fn atomically(&mut self, work: &mut dyn FnMut(&mut dyn CatalogStore) -> Result<()>) -> Result<()>;

    /// Whether a map server data store built from `database` reads this catalog's tables.
    fn serves(&self, _database: &DatabaseConfig) -> bool { false }
}
