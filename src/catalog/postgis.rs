use std::future::Future;

use anyhow::{bail, Context, Result};
use geo::{Coord, Rect};
use tokio::runtime::Runtime;
use tokio_postgres::{types::ToSql, Client, NoTls, Row};
use tracing::{error, info, warn};

use crate::{
    catalog::*,
    config::DatabaseConfig,
    geom::{multipolygon_from_wkb, multipolygon_to_wkb, point_from_wkb, point_to_wkb},
    views::ViewPlan,
};

/// Spatial reference of every stored geometry column.
pub const GEOMETRY_SRID: i32 = 3785;

/// Newest schema this build knows how to migrate to.
const CATALOG_SCHEMA_VERSION: i32 = 2;

const MIGRATIONS: [&str; 2] = [
    include_str!("migrations/postgis/0001_catalog.sql"),
    include_str!("migrations/postgis/0002_geounit.sql"),
];

type Params<'a> = &'a [&'a (dyn ToSql + Sync)];

/// Catalog stored in the PostGIS database the map server reads from.
///
/// Tables live in a schema named after the database user, which is the schema
/// the map server data store is registered against. Calls block on a private
/// single-threaded runtime.
pub struct PostgisStore {
    runtime: Runtime,
    client: Client,
    database: DatabaseConfig,
}

/// Double-quote an identifier for PostgreSQL.
fn quote(ident: &str) -> String { format!("\"{}\"", ident.replace('"', "\"\"")) }

/// Whether two database declarations name the same schema of the same server.
fn same_database(a: &DatabaseConfig, b: &DatabaseConfig) -> bool {
    a.host == b.host && a.port == b.port && a.name == b.name && a.user == b.user
}

fn geolevel_from_row(row: &Row) -> Result<GeoLevel, tokio_postgres::Error> {
    Ok(GeoLevel {
        id: GeoLevelId(row.try_get(0)?),
        name: row.try_get(1)?,
        min_zoom: row.try_get(2)?,
        sort_key: row.try_get(3)?,
    })
}

fn body_from_row(row: &Row) -> Result<LegislativeBody, tokio_postgres::Error> {
    Ok(LegislativeBody {
        id: LegislativeBodyId(row.try_get(0)?),
        name: row.try_get(1)?,
        member: row.try_get(2)?,
        max_districts: row.try_get(3)?,
    })
}

fn subject_from_row(row: &Row) -> Result<Subject, tokio_postgres::Error> {
    Ok(Subject {
        id: SubjectId(row.try_get(0)?),
        name: row.try_get(1)?,
        display: row.try_get(2)?,
        short_display: row.try_get(3)?,
        is_displayed: row.try_get(4)?,
        sort_key: row.try_get(5)?,
    })
}

fn target_from_row(row: &Row) -> Result<Target, tokio_postgres::Error> {
    Ok(Target {
        id: TargetId(row.try_get(0)?),
        subject: SubjectId(row.try_get(1)?),
        value: row.try_get(2)?,
        range1: row.try_get(3)?,
        range2: row.try_get(4)?,
    })
}

fn legislative_level_from_row(row: &Row) -> Result<LegislativeLevel, tokio_postgres::Error> {
    Ok(LegislativeLevel {
        id: LegislativeLevelId(row.try_get(0)?),
        body: LegislativeBodyId(row.try_get(1)?),
        geolevel: GeoLevelId(row.try_get(2)?),
        target: TargetId(row.try_get(3)?),
        parent: row.try_get::<_, Option<i64>>(4)?.map(LegislativeLevelId),
    })
}

fn characteristic_from_row(row: &Row) -> Result<Characteristic, tokio_postgres::Error> {
    Ok(Characteristic {
        id: CharacteristicId(row.try_get(0)?),
        geounit: GeounitId(row.try_get(1)?),
        subject: SubjectId(row.try_get(2)?),
        number: row.try_get(3)?,
    })
}

impl PostgisStore {
    /// Connect to the configured database and bring the catalog schema up to date.
    pub fn connect(database: &DatabaseConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("[catalog::postgis] Failed to start runtime")?;

        let mut config = tokio_postgres::Config::new();
        config
            .host(&database.host)
            .port(database.port)
            .dbname(&database.name)
            .user(&database.user)
            .password(&database.password)
            .application_name("districtbuilder");

        let (client, connection) = runtime.block_on(config.connect(NoTls)).with_context(|| {
            format!("[catalog::postgis] Failed to connect to {}@{}:{}/{}", database.user, database.host, database.port, database.name)
        })?;
        runtime.spawn(async move {
            if let Err(e) = connection.await {
                error!("[catalog::postgis] connection closed: {e}");
            }
        });

        let store = Self { runtime, client, database: database.clone() };
        store.migrate()?;
        info!(database = %database.name, schema = %database.user, "Opened PostGIS catalog");
        Ok(store)
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output { self.runtime.block_on(future) }

    fn batch(&self, sql: &str) -> Result<()> {
        Ok(self.block_on(self.client.batch_execute(sql))?)
    }

    fn query(&self, sql: &str, params: Params) -> Result<Vec<Row>> {
        Ok(self.block_on(self.client.query(sql, params))?)
    }

    fn query_opt(&self, sql: &str, params: Params) -> Result<Option<Row>> {
        Ok(self.block_on(self.client.query_opt(sql, params))?)
    }

    fn query_one(&self, sql: &str, params: Params) -> Result<Row> {
        Ok(self.block_on(self.client.query_one(sql, params))?)
    }

    fn execute(&self, sql: &str, params: Params) -> Result<u64> {
        Ok(self.block_on(self.client.execute(sql, params))?)
    }

    /// Run `run` inside its own transaction, rolling back on failure.
    fn in_transaction<T>(&self, run: impl FnOnce() -> Result<T>) -> Result<T> {
        self.batch("BEGIN")?;
        match run() {
            Ok(value) => {
                self.batch("COMMIT").context("[catalog::postgis] Failed to commit")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.batch("ROLLBACK") {
                    warn!("[catalog::postgis] rollback failed: {rollback}");
                }
                Err(e)
            }
        }
    }

    pub fn schema_version(&self) -> Result<i32> {
        let row = self.query_one("SELECT COALESCE(MAX(version), 0) FROM catalog_schema_version", &[])?;
        Ok(row.try_get(0)?)
    }

    /// Create the user's schema, then apply each migration not yet recorded.
    pub fn migrate(&self) -> Result<()> {
        let schema = quote(&self.database.user);
        self.batch("CREATE EXTENSION IF NOT EXISTS postgis")
            .context("[catalog::postgis] The PostGIS extension is required")?;
        self.batch(&format!(
            "CREATE SCHEMA IF NOT EXISTS {schema};
             SET search_path TO {schema}, public;
             CREATE TABLE IF NOT EXISTS catalog_schema_version (version INTEGER NOT NULL);"
        ))?;

        let current = self.schema_version()?;
        if current > CATALOG_SCHEMA_VERSION {
            bail!("[catalog::postgis] unsupported schema version {current} (newest known is {CATALOG_SCHEMA_VERSION})");
        }

        for (version, sql) in (1..).zip(MIGRATIONS) {
            if current < version {
                self.in_transaction(|| {
                    self.batch(sql)?;
                    self.execute("INSERT INTO catalog_schema_version (version) VALUES ($1)", &[&version])?;
                    Ok(())
                }).with_context(|| format!("[catalog::postgis] migration {version} failed"))?;
            }
        }
        Ok(())
    }

    fn count(&self, table: &str) -> Result<usize> {
        let count: i64 = self.query_one(&format!("SELECT COUNT(*) FROM {table}"), &[])?.try_get(0)?;
        Ok(count as usize)
    }

    fn multipolygon(row: &Row, index: usize, id: i64) -> Result<geo::MultiPolygon<f64>> {
        let bytes: Vec<u8> = row.try_get(index)?;
        multipolygon_from_wkb(&bytes).with_context(|| format!("[catalog::postgis] geounit {id} column {index}"))
    }
}

impl CatalogStore for PostgisStore {
    fn get_or_create_geolevel(&mut self, new: &NewGeoLevel) -> Result<(GeoLevel, bool)> {
        let existing = self.query_opt(
            "SELECT id, name, min_zoom, sort_key FROM geolevel WHERE name = $1",
            &[&new.name],
        )?;
        if let Some(row) = existing { return Ok((geolevel_from_row(&row)?, false)) }

        let row = self.query_one(
            "INSERT INTO geolevel (name, min_zoom, sort_key) VALUES ($1, $2, $3) RETURNING id",
            &[&new.name, &new.min_zoom, &new.sort_key],
        ).context("[catalog::postgis] Failed to insert geolevel")?;
        Ok((GeoLevel {
            id: GeoLevelId(row.try_get(0)?),
            name: new.name.clone(),
            min_zoom: new.min_zoom,
            sort_key: new.sort_key,
        }, true))
    }

    fn get_or_create_body(&mut self, new: &NewLegislativeBody) -> Result<(LegislativeBody, bool)> {
        let existing = self.query_opt(
            "SELECT id, name, member, max_districts FROM legislative_body WHERE name = $1",
            &[&new.name],
        )?;
        if let Some(row) = existing { return Ok((body_from_row(&row)?, false)) }

        let row = self.query_one(
            "INSERT INTO legislative_body (name, member, max_districts) VALUES ($1, $2, $3) RETURNING id",
            &[&new.name, &new.member, &new.max_districts],
        ).context("[catalog::postgis] Failed to insert legislative body")?;
        Ok((LegislativeBody {
            id: LegislativeBodyId(row.try_get(0)?),
            name: new.name.clone(),
            member: new.member.clone(),
            max_districts: new.max_districts,
        }, true))
    }

    fn get_or_create_subject(&mut self, new: &NewSubject) -> Result<(Subject, bool)> {
        let existing = self.query_opt(
            "SELECT id, name, display, short_display, is_displayed, sort_key FROM subject WHERE name = $1",
            &[&new.name],
        )?;
        if let Some(row) = existing { return Ok((subject_from_row(&row)?, false)) }

        let row = self.query_one(
            "INSERT INTO subject (name, display, short_display, is_displayed, sort_key)
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
            &[&new.name, &new.display, &new.short_display, &new.is_displayed, &new.sort_key],
        ).context("[catalog::postgis] Failed to insert subject")?;
        Ok((Subject {
            id: SubjectId(row.try_get(0)?),
            name: new.name.clone(),
            display: new.display.clone(),
            short_display: new.short_display.clone(),
            is_displayed: new.is_displayed,
            sort_key: new.sort_key,
        }, true))
    }

    fn get_or_create_target(&mut self, new: &NewTarget) -> Result<(Target, bool)> {
        let existing = self.query_opt(
            "SELECT id, subject_id, value, range1, range2 FROM target
             WHERE subject_id = $1 AND value = $2
               AND range1 IS NOT DISTINCT FROM $3 AND range2 IS NOT DISTINCT FROM $4",
            &[&new.subject.0, &new.value, &new.range1, &new.range2],
        )?;
        if let Some(row) = existing { return Ok((target_from_row(&row)?, false)) }

        let row = self.query_one(
            "INSERT INTO target (subject_id, value, range1, range2) VALUES ($1, $2, $3, $4) RETURNING id",
            &[&new.subject.0, &new.value, &new.range1, &new.range2],
        ).context("[catalog::postgis] Failed to insert target")?;
        Ok((Target {
            id: TargetId(row.try_get(0)?),
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

        let parent = new.parent.map(|p| p.0);
        let row = self.query_one(
            "INSERT INTO legislative_level (legislative_body_id, geolevel_id, target_id, parent_id)
             VALUES ($1, $2, $3, $4) RETURNING id",
            &[&new.body.0, &new.geolevel.0, &new.target.0, &parent],
        ).context("[catalog::postgis] Failed to insert legislative level")?;
        Ok((LegislativeLevel {
            id: LegislativeLevelId(row.try_get(0)?),
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
        let row = self.query_opt(
            "SELECT id, legislative_body_id, geolevel_id, target_id, parent_id FROM legislative_level
             WHERE legislative_body_id = $1 AND geolevel_id = $2 AND target_id = $3",
            &[&body.0, &geolevel.0, &target.0],
        )?;
        Ok(row.as_ref().map(legislative_level_from_row).transpose()?)
    }

    fn set_default_target(&mut self, body: LegislativeBodyId, target: TargetId) -> Result<bool> {
        let updated = self.execute(
            "UPDATE legislative_default SET target_id = $2 WHERE legislative_body_id = $1",
            &[&body.0, &target.0],
        )?;
        if updated > 0 { return Ok(false) }

        self.execute(
            "INSERT INTO legislative_default (legislative_body_id, target_id) VALUES ($1, $2)",
            &[&body.0, &target.0],
        ).context("[catalog::postgis] Failed to insert legislative defaults")?;
        Ok(true)
    }

    fn default_target(&self, body: LegislativeBodyId) -> Result<Option<TargetId>> {
        let row = self.query_opt(
            "SELECT target_id FROM legislative_default WHERE legislative_body_id = $1",
            &[&body.0],
        )?;
        Ok(row.map(|row| row.try_get(0).map(TargetId)).transpose()?)
    }

    fn get_or_create_user(&mut self, username: &str) -> Result<(User, bool)> {
        let existing = self.query_opt("SELECT id, username FROM app_user WHERE username = $1", &[&username])?;
        if let Some(row) = existing {
            return Ok((User { id: UserId(row.try_get(0)?), username: row.try_get(1)? }, false));
        }

        let row = self.query_one("INSERT INTO app_user (username) VALUES ($1) RETURNING id", &[&username])?;
        Ok((User { id: UserId(row.try_get(0)?), username: username.to_string() }, true))
    }

    fn find_geounit(&self, geolevel: GeoLevelId, feature_index: usize) -> Result<Option<GeounitId>> {
        let row = self.query_opt(
            "SELECT id FROM geounit WHERE geolevel_id = $1 AND feature_index = $2",
            &[&geolevel.0, &(feature_index as i64)],
        )?;
        Ok(row.map(|row| row.try_get(0).map(GeounitId)).transpose()?)
    }

    fn insert_geounit(&mut self, new: &NewGeounit) -> Result<GeounitId> {
        let geometry = &new.geometry;
        let row = self.query_one(
            "INSERT INTO geounit (geolevel_id, feature_index, name, supplemental_id, geom, simple, center)
             VALUES ($1, $2, $3, $4, ST_GeomFromWKB($5, $8), ST_GeomFromWKB($6, $8), ST_GeomFromWKB($7, $8))
             RETURNING id",
            &[
                &new.geolevel.0,
                &(new.feature_index as i64),
                &new.name,
                &new.supplemental_id,
                &multipolygon_to_wkb(&geometry.geom)?,
                &multipolygon_to_wkb(&geometry.simple)?,
                &point_to_wkb(&geometry.center)?,
                &GEOMETRY_SRID,
            ],
        ).with_context(|| format!("[catalog::postgis] Failed to insert geounit for feature {}", new.feature_index))?;
        Ok(GeounitId(row.try_get(0)?))
    }

    fn geounits(&self, geolevel: GeoLevelId) -> Result<Vec<Geounit>> {
        let rows = self.query(
            "SELECT id, feature_index, name, supplemental_id, ST_AsBinary(geom), ST_AsBinary(simple), ST_AsBinary(center)
             FROM geounit WHERE geolevel_id = $1 ORDER BY id",
            &[&geolevel.0],
        )?;

        rows.iter().map(|row| -> Result<Geounit> {
            let id: i64 = row.try_get(0)?;
            let feature_index: i64 = row.try_get(1)?;
            let center: Vec<u8> = row.try_get(6)?;
            Ok(Geounit {
                id: GeounitId(id),
                geolevel,
                feature_index: feature_index as usize,
                name: row.try_get(2)?,
                supplemental_id: row.try_get(3)?,
                geom: Self::multipolygon(row, 4, id)?,
                simple: Self::multipolygon(row, 5, id)?,
                center: point_from_wkb(&center).with_context(|| format!("[catalog::postgis] geounit {id} center"))?,
            })
        }).collect()
    }

    fn get_or_create_characteristic(&mut self, new: &NewCharacteristic) -> Result<(Characteristic, bool)> {
        let existing = self.query_opt(
            "SELECT id, geounit_id, subject_id, number FROM characteristic WHERE geounit_id = $1 AND subject_id = $2",
            &[&new.geounit.0, &new.subject.0],
        )?;
        if let Some(row) = existing { return Ok((characteristic_from_row(&row)?, false)) }

        let row = self.query_one(
            "INSERT INTO characteristic (geounit_id, subject_id, number) VALUES ($1, $2, $3) RETURNING id",
            &[&new.geounit.0, &new.subject.0, &new.number],
        ).context("[catalog::postgis] Failed to insert characteristic")?;
        Ok((Characteristic {
            id: CharacteristicId(row.try_get(0)?),
            geounit: new.geounit,
            subject: new.subject,
            number: new.number,
        }, true))
    }

    fn characteristics(&self, geounit: GeounitId) -> Result<Vec<Characteristic>> {
        let rows = self.query(
            "SELECT id, geounit_id, subject_id, number FROM characteristic WHERE geounit_id = $1 ORDER BY id",
            &[&geounit.0],
        )?;
        Ok(rows.iter().map(characteristic_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    fn geolevels(&self) -> Result<Vec<GeoLevel>> {
        let rows = self.query("SELECT id, name, min_zoom, sort_key FROM geolevel ORDER BY id", &[])?;
        Ok(rows.iter().map(geolevel_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    fn subjects(&self) -> Result<Vec<Subject>> {
        let rows = self.query(
            "SELECT id, name, display, short_display, is_displayed, sort_key FROM subject ORDER BY id",
            &[],
        )?;
        Ok(rows.iter().map(subject_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    fn extent(&self) -> Result<Option<Rect<f64>>> {
        let row = self.query_one(
            "SELECT ST_XMin(e), ST_YMin(e), ST_XMax(e), ST_YMax(e)
             FROM (SELECT ST_Extent(geom) AS e FROM geounit) AS extent",
            &[],
        )?;
        let bounds: (Option<f64>, Option<f64>, Option<f64>, Option<f64>) =
            (row.try_get(0)?, row.try_get(1)?, row.try_get(2)?, row.try_get(3)?);

        Ok(match bounds {
            (Some(min_x), Some(min_y), Some(max_x), Some(max_y)) => {
                Some(Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y }))
            }
            _ => None,
        })
    }

    fn apply_views(&mut self, plan: &ViewPlan) -> Result<()> {
        self.in_transaction(|| {
            for view in plan.views() {
                self.batch(&view.sql)
                    .with_context(|| format!("[catalog::postgis] Failed to create view {}", view.name))?;
            }
            Ok(())
        })
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
        self.batch("BEGIN")?;
        match work(self) {
            Ok(()) => {
                self.batch("COMMIT").context("[catalog::postgis] Failed to commit")?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.batch("ROLLBACK") {
                    warn!("[catalog::postgis] rollback failed: {rollback}");
                }
                Err(e)
            }
        }
    }

    fn serves(&self, database: &DatabaseConfig) -> bool { same_database(&self.database, database) }
}
