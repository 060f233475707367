use std::{path::Path, str::FromStr};

use anyhow::{bail, Context, Result};
use geo::{BoundingRect, Coord, Rect};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use tracing::warn;

use crate::{
    catalog::*,
    geom::{multipolygon_from_wkb, multipolygon_to_wkb, point_from_wkb, point_to_wkb},
    views::ViewPlan,
};

/// Newest schema this build knows how to migrate to.
const CATALOG_SCHEMA_VERSION: i64 = 2;

const MIGRATIONS: [&str; 2] = [
    include_str!("migrations/sqlite/0001_catalog.sql"),
    include_str!("migrations/sqlite/0002_geounit.sql"),
];

/// Catalog stored in a SQLite database. Geometries are little-endian WKB blobs,
/// with bounding box columns kept alongside for extent queries.
pub struct SqliteStore {
    conn: Connection,
}

fn geolevel_from_row(row: &Row) -> rusqlite::Result<GeoLevel> {
    Ok(GeoLevel {
        id: GeoLevelId(row.get(0)?),
        name: row.get(1)?,
        min_zoom: row.get(2)?,
        sort_key: row.get(3)?,
    })
}

fn body_from_row(row: &Row) -> rusqlite::Result<LegislativeBody> {
    Ok(LegislativeBody {
        id: LegislativeBodyId(row.get(0)?),
        name: row.get(1)?,
        member: row.get(2)?,
        max_districts: row.get(3)?,
    })
}

fn subject_from_row(row: &Row) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: SubjectId(row.get(0)?),
        name: row.get(1)?,
        display: row.get(2)?,
        short_display: row.get(3)?,
        is_displayed: row.get(4)?,
        sort_key: row.get(5)?,
    })
}

fn target_from_row(row: &Row) -> rusqlite::Result<Target> {
    Ok(Target {
        id: TargetId(row.get(0)?),
        subject: SubjectId(row.get(1)?),
        value: row.get(2)?,
        range1: row.get(3)?,
        range2: row.get(4)?,
    })
}

fn legislative_level_from_row(row: &Row) -> rusqlite::Result<LegislativeLevel> {
    Ok(LegislativeLevel {
        id: LegislativeLevelId(row.get(0)?),
        body: LegislativeBodyId(row.get(1)?),
        geolevel: GeoLevelId(row.get(2)?),
        target: TargetId(row.get(3)?),
        parent: row.get::<_, Option<i64>>(4)?.map(LegislativeLevelId),
    })
}

fn characteristic_from_row(row: &Row) -> rusqlite::Result<Characteristic> {
    let text: String = row.get(3)?;
    let number = Decimal::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    Ok(Characteristic {
        id: CharacteristicId(row.get(0)?),
        geounit: GeounitId(row.get(1)?),
        subject: SubjectId(row.get(2)?),
        number,
    })
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open catalog database: {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn schema_version(&self) -> Result<i64> {
        Ok(self.conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    /// Bring the schema up to date, one `user_version` step at a time.
    pub fn migrate(&self) -> Result<()> {
        let current = self.schema_version()?;
        if current > CATALOG_SCHEMA_VERSION {
            bail!("[catalog::sqlite] unsupported schema version {current} (newest known is {CATALOG_SCHEMA_VERSION})");
        }

        for (version, sql) in (1..).zip(MIGRATIONS) {
            if current < version {
                self.conn.execute_batch(sql)
                    .with_context(|| format!("[catalog::sqlite] migration {version} failed"))?;
                self.conn.pragma_update(None, "user_version", version)?;
            }
        }
        Ok(())
    }

    fn count(&self, table: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl CatalogStore for SqliteStore {
    fn get_or_create_geolevel(&mut self, new: &NewGeoLevel) -> Result<(GeoLevel, bool)> {
        let existing = self.conn.query_row(
            "SELECT id, name, min_zoom, sort_key FROM geolevel WHERE name = ?1",
            params![new.name],
            geolevel_from_row,
        ).optional()?;
        if let Some(row) = existing { return Ok((row, false)) }

        self.conn.execute(
            "INSERT INTO geolevel (name, min_zoom, sort_key) VALUES (?1, ?2, ?3)",
            params![new.name, new.min_zoom, new.sort_key],
        ).context("[catalog::sqlite] Failed to insert geolevel")?;
        Ok((GeoLevel {
            id: GeoLevelId(self.conn.last_insert_rowid()),
            name: new.name.clone(),
            min_zoom: new.min_zoom,
            sort_key: new.sort_key,
        }, true))
    }

    fn get_or_create_body(&mut self, new: &NewLegislativeBody) -> Result<(LegislativeBody, bool)> {
        let existing = self.conn.query_row(
            "SELECT id, name, member, max_districts FROM legislative_body WHERE name = ?1",
            params![new.name],
            body_from_row,
        ).optional()?;
        if let Some(row) = existing { return Ok((row, false)) }

        self.conn.execute(
            "INSERT INTO legislative_body (name, member, max_districts) VALUES (?1, ?2, ?3)",
            params![new.name, new.member, new.max_districts],
        ).context("[catalog::sqlite] Failed to insert legislative body")?;
        Ok((LegislativeBody {
            id: LegislativeBodyId(self.conn.last_insert_rowid()),
            name: new.name.clone(),
            member: new.member.clone(),
            max_districts: new.max_districts,
        }, true))
    }

    fn get_or_create_subject(&mut self, new: &NewSubject) -> Result<(Subject, bool)> {
        let existing = self.conn.query_row(
            "SELECT id, name, display, short_display, is_displayed, sort_key FROM subject WHERE name = ?1",
            params![new.name],
            subject_from_row,
        ).optional()?;
        if let Some(row) = existing { return Ok((row, false)) }

        self.conn.execute(
            "INSERT INTO subject (name, display, short_display, is_displayed, sort_key) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![new.name, new.display, new.short_display, new.is_displayed, new.sort_key],
        ).context("[catalog::sqlite] Failed to insert subject")?;
        Ok((Subject {
            id: SubjectId(self.conn.last_insert_rowid()),
            name: new.name.clone(),
            display: new.display.clone(),
            short_display: new.short_display.clone(),
            is_displayed: new.is_displayed,
            sort_key: new.sort_key,
        }, true))
    }

    fn get_or_create_target(&mut self, new: &NewTarget) -> Result<(Target, bool)> {
        let existing = self.conn.query_row(
            "SELECT id, subject_id, value, range1, range2 FROM target
             WHERE subject_id = ?1 AND value = ?2 AND range1 IS ?3 AND range2 IS ?4",
            params![new.subject.0, new.value, new.range1, new.range2],
            target_from_row,
        ).optional()?;
        if let Some(row) = existing { return Ok((row, false)) }

        self.conn.execute(
            "INSERT INTO target (subject_id, value, range1, range2) VALUES (?1, ?2, ?3, ?4)",
            params![new.subject.0, new.value, new.range1, new.range2],
        ).context("[catalog::sqlite] Failed to insert target")?;
        Ok((Target {
            id: TargetId(self.conn.last_insert_rowid()),
            subject: new.subject,
            value: new.value,
            range1: new.range1,
            range2: new.range2,
        }, true))
    }

    fn get_or_create_legislative_level(&mut self, new: &NewLegislativeLevel) -> Result<(LegislativeLevel, bool)> {
        if let Some(row) = self.find_legislative_level(new.body, new.geolevel, new.target)? {
            return Ok((row, false));
        }

        self.conn.execute(
            "INSERT INTO legislative_level (legislative_body_id, geolevel_id, target_id, parent_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![new.body.0, new.geolevel.0, new.target.0, new.parent.map(|p| p.0)],
        ).context("[catalog::sqlite] Failed to insert legislative level")?;
        Ok((LegislativeLevel {
            id: LegislativeLevelId(self.conn.last_insert_rowid()),
            body: new.body,
            geolevel: new.geolevel,
            target: new.target,
            parent: new.parent,
        }, true))
    }

    fn find_legislative_level(
        &self,
        body: LegislativeBodyId,
        geolevel: GeoLevelId,
        target: TargetId,
    ) -> Result<Option<LegislativeLevel>> {
        Ok(self.conn.query_row(
            "SELECT id, legislative_body_id, geolevel_id, target_id, parent_id FROM legislative_level
             WHERE legislative_body_id = ?1 AND geolevel_id = ?2 AND target_id = ?3",
            params![body.0, geolevel.0, target.0],
            legislative_level_from_row,
        ).optional()?)
    }

    fn set_default_target(&mut self, body: LegislativeBodyId, target: TargetId) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE legislative_default SET target_id = ?2 WHERE legislative_body_id = ?1",
            params![body.0, target.0],
        )?;
        if updated > 0 { return Ok(false) }

        self.conn.execute(
            "INSERT INTO legislative_default (legislative_body_id, target_id) VALUES (?1, ?2)",
            params![body.0, target.0],
        ).context("[catalog::sqlite] Failed to insert legislative defaults")?;
        Ok(true)
    }

    fn default_target(&self, body: LegislativeBodyId) -> Result<Option<TargetId>> {
        Ok(self.conn.query_row(
            "SELECT target_id FROM legislative_default WHERE legislative_body_id = ?1",
            params![body.0],
            |row| row.get(0).map(TargetId),
        ).optional()?)
    }

    fn get_or_create_user(&mut self, username: &str) -> Result<(User, bool)> {
        let existing = self.conn.query_row(
            "SELECT id, username FROM app_user WHERE username = ?1",
            params![username],
            |row| Ok(User { id: UserId(row.get(0)?), username: row.get(1)? }),
        ).optional()?;
        if let Some(row) = existing { return Ok((row, false)) }

        self.conn.execute("INSERT INTO app_user (username) VALUES (?1)", params![username])?;
        Ok((User { id: UserId(self.conn.last_insert_rowid()), username: username.to_string() }, true))
    }

    fn find_geounit(&self, geolevel: GeoLevelId, feature_index: usize) -> Result<Option<GeounitId>> {
        Ok(self.conn.query_row(
            "SELECT id FROM geounit WHERE geolevel_id = ?1 AND feature_index = ?2",
            params![geolevel.0, feature_index as i64],
            |row| row.get(0).map(GeounitId),
        ).optional()?)
    }

    fn insert_geounit(&mut self, new: &NewGeounit) -> Result<GeounitId> {
        let geometry = &new.geometry;
        let bbox = geometry.geom.bounding_rect();

        self.conn.execute(
            "INSERT INTO geounit (geolevel_id, feature_index, name, supplemental_id, geom, simple, center,
                                  min_x, min_y, max_x, max_y)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                new.geolevel.0,
                new.feature_index as i64,
                new.name,
                new.supplemental_id,
                multipolygon_to_wkb(&geometry.geom)?,
                multipolygon_to_wkb(&geometry.simple)?,
                point_to_wkb(&geometry.center)?,
                bbox.map(|r| r.min().x),
                bbox.map(|r| r.min().y),
                bbox.map(|r| r.max().x),
                bbox.map(|r| r.max().y),
            ],
        ).with_context(|| format!("[catalog::sqlite] Failed to insert geounit for feature {}", new.feature_index))?;
        Ok(GeounitId(self.conn.last_insert_rowid()))
    }

    fn geounits(&self, geolevel: GeoLevelId) -> Result<Vec<Geounit>> {
        let mut statement = self.conn.prepare(
            "SELECT id, feature_index, name, supplemental_id, geom, simple, center
             FROM geounit WHERE geolevel_id = ?1 ORDER BY id",
        )?;
        let rows = statement.query_map(params![geolevel.0], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Vec<u8>>(4)?,
                row.get::<_, Vec<u8>>(5)?,
                row.get::<_, Vec<u8>>(6)?,
            ))
        })?;

        rows.map(|row| -> Result<Geounit> {
            let (id, feature_index, name, supplemental_id, geom, simple, center) = row?;
            Ok(Geounit {
                id: GeounitId(id),
                geolevel,
                feature_index: feature_index as usize,
                name,
                supplemental_id,
                geom: multipolygon_from_wkb(&geom).with_context(|| format!("[catalog::sqlite] geounit {id} geom"))?,
                simple: multipolygon_from_wkb(&simple).with_context(|| format!("[catalog::sqlite] geounit {id} simple"))?,
                center: point_from_wkb(&center).with_context(|| format!("[catalog::sqlite] geounit {id} center"))?,
            })
        }).collect()
    }

    fn get_or_create_characteristic(&mut self, new: &NewCharacteristic) -> Result<(Characteristic, bool)> {
        let existing = self.conn.query_row(
            "SELECT id, geounit_id, subject_id, number FROM characteristic WHERE geounit_id = ?1 AND subject_id = ?2",
            params![new.geounit.0, new.subject.0],
            characteristic_from_row,
        ).optional()?;
        if let Some(row) = existing { return Ok((row, false)) }

        self.conn.execute(
            "INSERT INTO characteristic (geounit_id, subject_id, number) VALUES (?1, ?2, ?3)",
            params![new.geounit.0, new.subject.0, new.number.to_string()],
        ).context("[catalog::sqlite] Failed to insert characteristic")?;
        Ok((Characteristic {
            id: CharacteristicId(self.conn.last_insert_rowid()),
            geounit: new.geounit,
            subject: new.subject,
            number: new.number,
        }, true))
    }

    fn characteristics(&self, geounit: GeounitId) -> Result<Vec<Characteristic>> {
        let mut statement = self.conn.prepare(
            "SELECT id, geounit_id, subject_id, number FROM characteristic WHERE geounit_id = ?1 ORDER BY id",
        )?;
        let rows = statement.query_map(params![geounit.0], characteristic_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn geolevels(&self) -> Result<Vec<GeoLevel>> {
        let mut statement = self.conn.prepare("SELECT id, name, min_zoom, sort_key FROM geolevel ORDER BY id")?;
        let rows = statement.query_map([], geolevel_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn subjects(&self) -> Result<Vec<Subject>> {
        let mut statement = self.conn.prepare(
            "SELECT id, name, display, short_display, is_displayed, sort_key FROM subject ORDER BY id",
        )?;
        let rows = statement.query_map([], subject_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn extent(&self) -> Result<Option<Rect<f64>>> {
        let bounds: (Option<f64>, Option<f64>, Option<f64>, Option<f64>) = self.conn.query_row(
            "SELECT MIN(min_x), MIN(min_y), MAX(max_x), MAX(max_y) FROM geounit",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

        Ok(match bounds {
            (Some(min_x), Some(min_y), Some(max_x), Some(max_y)) => {
                Some(Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y }))
            }
            _ => None,
        })
    }

    fn apply_views(&mut self, plan: &ViewPlan) -> Result<()> {
        let tx = self.conn.transaction()?;
        for view in plan.views() {
            tx.execute_batch(&view.sql)
                .with_context(|| format!("[catalog::sqlite] Failed to create view {}", view.name))?;
        }
        tx.commit()?;
        Ok(())
    }

    fn counts(&self) -> Result<RowCounts> {
        Ok(RowCounts {
            geolevels: self.count("geolevel")?,
            bodies: self.count("legislative_body")?,
            subjects: self.count("subject")?,
            targets: self.count("target")?,
            legislative_levels: self.count("legislative_level")?,
            defaults: self.count("legislative_default")?,
            users: self.count("app_user")?,
            geounits: self.count("geounit")?,
            characteristics: self.count("characteristic")?,
        })
    }

    fn atomically(&mut self, work: &mut dyn FnMut(&mut dyn CatalogStore) -> Result<()>) -> Result<()> {
        self.conn.execute_batch("BEGIN")?;
        match work(self) {
            Ok(()) => {
                self.conn.execute_batch("COMMIT").context("[catalog::sqlite] Failed to commit")?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    warn!("[catalog::sqlite] rollback failed: {rollback}");
                }
                Err(e)
            }
        }
    }
}
