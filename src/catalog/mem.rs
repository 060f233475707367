use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use geo::Rect;

use crate::{catalog::*, geom::extent_of, views::ViewPlan};

/// Simple in-memory catalog.
/// Row ids are assigned sequentially from 1 per table.
#[derive(Debug, Default, Clone)]
pub struct MemStore {
    geolevels: Vec<GeoLevel>,
    bodies: Vec<LegislativeBody>,
    subjects: Vec<Subject>,
    targets: Vec<Target>,
    legislative_levels: Vec<LegislativeLevel>,
    defaults: BTreeMap<LegislativeBodyId, TargetId>,
    users: Vec<User>,
    geounits: Vec<Geounit>,
    characteristics: Vec<Characteristic>,
    views: BTreeMap<String, String>,
}

/// Next id for a table holding `len` rows.
#[inline]
fn next_id(len: usize) -> i64 { len as i64 + 1 }

impl MemStore {
    pub fn new() -> Self { Self::default() }

    /// SQL text of an applied view.
    pub fn view(&self, name: &str) -> Option<&str> { self.views.get(name).map(String::as_str) }

    pub fn view_names(&self) -> impl Iterator<Item = &str> { self.views.keys().map(String::as_str) }
}

impl CatalogStore for MemStore {
    fn get_or_create_geolevel(&mut self, new: &NewGeoLevel) -> Result<(GeoLevel, bool)> {
        if let Some(row) = self.geolevels.iter().find(|row| row.name == new.name) {
            return Ok((row.clone(), false));
        }
        let row = GeoLevel {
            id: GeoLevelId(next_id(self.geolevels.len())),
            name: new.name.clone(),
            min_zoom: new.min_zoom,
            sort_key: new.sort_key,
        };
        self.geolevels.push(row.clone());
        Ok((row, true))
    }

    fn get_or_create_body(&mut self, new: &NewLegislativeBody) -> Result<(LegislativeBody, bool)> {
        if let Some(row) = self.bodies.iter().find(|row| row.name == new.name) {
            return Ok((row.clone(), false));
        }
        let row = LegislativeBody {
            id: LegislativeBodyId(next_id(self.bodies.len())),
            name: new.name.clone(),
            member: new.member.clone(),
            max_districts: new.max_districts,
        };
        self.bodies.push(row.clone());
        Ok((row, true))
    }

    fn get_or_create_subject(&mut self, new: &NewSubject) -> Result<(Subject, bool)> {
        if let Some(row) = self.subjects.iter().find(|row| row.name == new.name) {
            return Ok((row.clone(), false));
        }
        let row = Subject {
            id: SubjectId(next_id(self.subjects.len())),
            name: new.name.clone(),
            display: new.display.clone(),
            short_display: new.short_display.clone(),
            is_displayed: new.is_displayed,
            sort_key: new.sort_key,
        };
        self.subjects.push(row.clone());
        Ok((row, true))
    }

    fn get_or_create_target(&mut self, new: &NewTarget) -> Result<(Target, bool)> {
        let existing = self.targets.iter().find(|row| {
            row.subject == new.subject && row.value == new.value && row.range1 == new.range1 && row.range2 == new.range2
        });
        if let Some(row) = existing {
            return Ok((row.clone(), false));
        }
        let row = Target {
            id: TargetId(next_id(self.targets.len())),
            subject: new.subject,
            value: new.value,
            range1: new.range1,
            range2: new.range2,
        };
        self.targets.push(row.clone());
        Ok((row, true))
    }

    fn get_or_create_legislative_level(&mut self, new: &NewLegislativeLevel) -> Result<(LegislativeLevel, bool)> {
        if let Some(row) = self.find_legislative_level(new.body, new.geolevel, new.target)? {
            return Ok((row, false));
        }
        if let Some(parent) = new.parent {
            self.legislative_levels.iter().find(|row| row.id == parent)
                .ok_or_else(|| anyhow!("[catalog::mem] parent legislative level {parent} does not exist"))?;
        }
        let row = LegislativeLevel {
            id: LegislativeLevelId(next_id(self.legislative_levels.len())),
            body: new.body,
            geolevel: new.geolevel,
            target: new.target,
            parent: new.parent,
        };
        self.legislative_levels.push(row.clone());
        Ok((row, true))
    }

    fn find_legislative_level(
        &self,
        body: LegislativeBodyId,
        geolevel: GeoLevelId,
        target: TargetId,
    ) -> Result<Option<LegislativeLevel>> {
        Ok(self.legislative_levels.iter()
            .find(|row| row.body == body && row.geolevel == geolevel && row.target == target)
            .cloned())
    }

    fn set_default_target(&mut self, body: LegislativeBodyId, target: TargetId) -> Result<bool> {
        Ok(self.defaults.insert(body, target).is_none())
    }

    fn default_target(&self, body: LegislativeBodyId) -> Result<Option<TargetId>> {
        Ok(self.defaults.get(&body).copied())
    }

    fn get_or_create_user(&mut self, username: &str) -> Result<(User, bool)> {
        if let Some(row) = self.users.iter().find(|row| row.username == username) {
            return Ok((row.clone(), false));
        }
        let row = User { id: UserId(next_id(self.users.len())), username: username.to_string() };
        self.users.push(row.clone());
        Ok((row, true))
    }

    fn find_geounit(&self, geolevel: GeoLevelId, feature_index: usize) -> Result<Option<GeounitId>> {
        Ok(self.geounits.iter()
            .find(|row| row.geolevel == geolevel && row.feature_index == feature_index)
            .map(|row| row.id))
    }

    fn insert_geounit(&mut self, new: &NewGeounit) -> Result<GeounitId> {
        if self.find_geounit(new.geolevel, new.feature_index)?.is_some() {
            return Err(anyhow!(
                "[catalog::mem] geounit for feature {} of geolevel {} already exists",
                new.feature_index, new.geolevel,
            ));
        }
        let id = GeounitId(next_id(self.geounits.len()));
        self.geounits.push(Geounit {
            id,
            geolevel: new.geolevel,
            feature_index: new.feature_index,
            name: new.name.clone(),
            supplemental_id: new.supplemental_id.clone(),
            geom: new.geometry.geom.clone(),
            simple: new.geometry.simple.clone(),
            center: new.geometry.center,
        });
        Ok(id)
    }

    fn geounits(&self, geolevel: GeoLevelId) -> Result<Vec<Geounit>> {
        Ok(self.geounits.iter().filter(|row| row.geolevel == geolevel).cloned().collect())
    }

    fn get_or_create_characteristic(&mut self, new: &NewCharacteristic) -> Result<(Characteristic, bool)> {
        let existing = self.characteristics.iter()
            .find(|row| row.geounit == new.geounit && row.subject == new.subject);
        if let Some(row) = existing {
            return Ok((row.clone(), false));
        }
        let row = Characteristic {
            id: CharacteristicId(next_id(self.characteristics.len())),
            geounit: new.geounit,
            subject: new.subject,
            number: new.number,
        };
        self.characteristics.push(row.clone());
        Ok((row, true))
    }

    fn characteristics(&self, geounit: GeounitId) -> Result<Vec<Characteristic>> {
        Ok(self.characteristics.iter().filter(|row| row.geounit == geounit).cloned().collect())
    }

    fn geolevels(&self) -> Result<Vec<GeoLevel>> { Ok(self.geolevels.clone()) }

    fn subjects(&self) -> Result<Vec<Subject>> { Ok(self.subjects.clone()) }

    fn extent(&self) -> Result<Option<Rect<f64>>> {
        Ok(extent_of(self.geounits.iter().map(|row| &row.geom)))
    }

    fn apply_views(&mut self, plan: &ViewPlan) -> Result<()> {
        for view in plan.views() {
            self.views.insert(view.name.clone(), view.sql.clone());
        }
        Ok(())
    }

    fn counts(&self) -> Result<RowCounts> {
        Ok(RowCounts {
            geolevels: self.geolevels.len(),
            bodies: self.bodies.len(),
            subjects: self.subjects.len(),
            targets: self.targets.len(),
            legislative_levels: self.legislative_levels.len(),
            defaults: self.defaults.len(),
            users: self.users.len(),
            geounits: self.geounits.len(),
            characteristics: self.characteristics.len(),
        })
    }

    /// Restores a snapshot when `work` fails.
    fn atomically(&mut self, work: &mut dyn FnMut(&mut dyn CatalogStore) -> Result<()>) -> Result<()> {
        let snapshot = self.clone();
        let result = work(self);
        if result.is_err() { *self = snapshot }
        result
    }
}
