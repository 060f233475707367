//! Minimal WKB encoding for the geometry columns of the catalog store.

use std::io::{Cursor, Read, Write};

use anyhow::{bail, ensure, Context, Result};
use geo::{Coord, LineString, MultiPolygon, Point, Polygon};

/// WKB geometry type for Point
const WKB_POINT: u32 = 1;
/// WKB geometry type for Polygon
const WKB_POLYGON: u32 = 3;
/// WKB geometry type for MultiPolygon
const WKB_MULTIPOLYGON: u32 = 6;
/// WKB byte order: little endian
const WKB_LE: u8 = 1;

fn write_header(wkb: &mut Vec<u8>, geom_type: u32) -> Result<()> {
    wkb.write_all(&[WKB_LE])?;
    wkb.write_all(&geom_type.to_le_bytes())?;
    Ok(())
}

fn write_coord(wkb: &mut Vec<u8>, coord: Coord<f64>) -> Result<()> {
    wkb.write_all(&coord.x.to_le_bytes())?;
    wkb.write_all(&coord.y.to_le_bytes())?;
    Ok(())
}

fn write_polygon(wkb: &mut Vec<u8>, poly: &Polygon<f64>) -> Result<()> {
    write_header(wkb, WKB_POLYGON)?;

    // Number of rings (1 exterior + interiors)
    wkb.write_all(&((1 + poly.interiors().len()) as u32).to_le_bytes())?;
    for ring in std::iter::once(poly.exterior()).chain(poly.interiors()) {
        wkb.write_all(&(ring.0.len() as u32).to_le_bytes())?;
        for &coord in &ring.0 {
            write_coord(wkb, coord)?;
        }
    }
    Ok(())
}

/// Write a MultiPolygon to little-endian WKB.
pub(crate) fn multipolygon_to_wkb(mp: &MultiPolygon<f64>) -> Result<Vec<u8>> {
    let mut wkb = Vec::new();
    write_header(&mut wkb, WKB_MULTIPOLYGON)?;
    wkb.write_all(&(mp.0.len() as u32).to_le_bytes())?;
    for poly in &mp.0 {
        write_polygon(&mut wkb, poly).context("[geom::wkb] Failed to write polygon")?;
    }
    Ok(wkb)
}

/// Write a Point to little-endian WKB.
pub(crate) fn point_to_wkb(point: &Point<f64>) -> Result<Vec<u8>> {
    let mut wkb = Vec::with_capacity(21);
    write_header(&mut wkb, WKB_POINT)?;
    write_coord(&mut wkb, point.0)?;
    Ok(wkb)
}

/// Byte-order aware reader over a WKB buffer.
struct WkbReader<'a> {
    cursor: Cursor<&'a [u8]>,
    is_le: bool,
}

impl<'a> WkbReader<'a> {
    fn new(bytes: &'a [u8]) -> Self { Self { cursor: Cursor::new(bytes), is_le: true } }

    /// Read the byte order and geometry type, erroring unless it matches `expected`.
    fn header(&mut self, expected: u32) -> Result<()> {
        let mut byte_order = [0u8; 1];
        self.cursor.read_exact(&mut byte_order)
            .context("[geom::wkb] Failed to read byte order")?;
        self.is_le = byte_order[0] == WKB_LE;

        let geom_type = self.u32().context("[geom::wkb] Failed to read geometry type")?;
        ensure!(geom_type == expected, "[geom::wkb] Expected geometry type {}, got {}", expected, geom_type);
        Ok(())
    }

    fn u32(&mut self) -> Result<u32> {
        let mut bytes = [0u8; 4];
        self.cursor.read_exact(&mut bytes)?;
        Ok(if self.is_le { u32::from_le_bytes(bytes) } else { u32::from_be_bytes(bytes) })
    }

    fn f64(&mut self) -> Result<f64> {
        let mut bytes = [0u8; 8];
        self.cursor.read_exact(&mut bytes)?;
        Ok(if self.is_le { f64::from_le_bytes(bytes) } else { f64::from_be_bytes(bytes) })
    }

    fn coord(&mut self) -> Result<Coord<f64>> {
        let x = self.f64().context("[geom::wkb] Failed to read x coordinate")?;
        let y = self.f64().context("[geom::wkb] Failed to read y coordinate")?;
        Ok(Coord { x, y })
    }

    fn ring(&mut self) -> Result<LineString<f64>> {
        let len = self.u32().context("[geom::wkb] Failed to read ring length")?;
        (0..len).map(|_| self.coord()).collect::<Result<Vec<_>>>().map(LineString)
    }

    fn polygon(&mut self) -> Result<Polygon<f64>> {
        self.header(WKB_POLYGON)?;
        let num_rings = self.u32().context("[geom::wkb] Failed to read number of rings")?;
        if num_rings == 0 {
            bail!("[geom::wkb] Polygon must have at least one ring");
        }
        let exterior = self.ring()?;
        let interiors = (1..num_rings).map(|_| self.ring()).collect::<Result<Vec<_>>>()?;
        Ok(Polygon::new(exterior, interiors))
    }
}

/// Read a MultiPolygon from WKB.
pub(crate) fn multipolygon_from_wkb(bytes: &[u8]) -> Result<MultiPolygon<f64>> {
    let mut reader = WkbReader::new(bytes);
    reader.header(WKB_MULTIPOLYGON)?;
    let count = reader.u32().context("[geom::wkb] Failed to read polygon count")?;
    (0..count).map(|_| reader.polygon()).collect::<Result<Vec<_>>>().map(MultiPolygon)
}

/// Read a Point from WKB.
pub(crate) fn point_from_wkb(bytes: &[u8]) -> Result<Point<f64>> {
    let mut reader = WkbReader::new(bytes);
    reader.header(WKB_POINT)?;
    Ok(Point(reader.coord()?))
}
