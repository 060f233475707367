use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result};
use geo::{Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use shapefile::{self as shp, dbase::FieldValue, Reader, Shape};

use crate::{geom::RepairError, import::{AttrValue, Feature}};

/// Reads every shape + attribute record from a `.shp` file, in file order.
/// Geometry conversion failures are kept per feature so the importer can skip them.
pub(crate) fn read_features(path: &Path) -> Result<Vec<Feature>> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open shapefile: {}", path.display()))?;

    let mut features = Vec::with_capacity(reader.shape_count()?);
    for (index, result) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = result
            .with_context(|| format!("Error reading shape+record {} in {}", index, path.display()))?;
        features.push(Feature {
            index,
            geometry: shape_to_geometry(shape),
            attributes: record.into_iter()
                .map(|(field, value)| (field, field_to_attr(value)))
                .collect::<HashMap<_, _>>(),
        });
    }
    Ok(features)
}

/// Convert a shapefile shape to a geo geometry.
/// Single-ring-group polygons come back as `Polygon`, the rest as `MultiPolygon`.
pub(crate) fn shape_to_geometry(shape: Shape) -> Result<Geometry<f64>, RepairError> {
    fn polygonal(mp: MultiPolygon<f64>) -> Geometry<f64> {
        match <[Polygon<f64>; 1]>::try_from(mp.0) {
            Ok([polygon]) => Geometry::Polygon(polygon),
            Err(polygons) => Geometry::MultiPolygon(MultiPolygon(polygons)),
        }
    }

    fn lines<P>(parts: &[Vec<P>], xy: impl Fn(&P) -> (f64, f64)) -> Geometry<f64> {
        Geometry::MultiLineString(MultiLineString(parts.iter()
            .map(|part| LineString(part.iter().map(|p| { let (x, y) = xy(p); Coord { x, y } }).collect()))
            .collect()))
    }

    fn points<P>(pts: &[P], xy: impl Fn(&P) -> (f64, f64)) -> Geometry<f64> {
        Geometry::MultiPoint(MultiPoint(pts.iter().map(|p| { let (x, y) = xy(p); Point::new(x, y) }).collect()))
    }

    Ok(match shape {
        Shape::NullShape => return Err(RepairError::EmptyGeometry),
        Shape::Polygon(p) => polygonal(rings_to_multipolygon(p.rings(), |pt| (pt.x, pt.y))),
        Shape::PolygonM(p) => polygonal(rings_to_multipolygon(p.rings(), |pt| (pt.x, pt.y))),
        Shape::PolygonZ(p) => polygonal(rings_to_multipolygon(p.rings(), |pt| (pt.x, pt.y))),
        Shape::Point(p) => Geometry::Point(Point::new(p.x, p.y)),
        Shape::PointM(p) => Geometry::Point(Point::new(p.x, p.y)),
        Shape::PointZ(p) => Geometry::Point(Point::new(p.x, p.y)),
        Shape::Polyline(l) => lines(l.parts(), |pt| (pt.x, pt.y)),
        Shape::PolylineM(l) => lines(l.parts(), |pt| (pt.x, pt.y)),
        Shape::PolylineZ(l) => lines(l.parts(), |pt| (pt.x, pt.y)),
        Shape::Multipoint(m) => points(m.points(), |pt| (pt.x, pt.y)),
        Shape::MultipointM(m) => points(m.points(), |pt| (pt.x, pt.y)),
        Shape::MultipointZ(m) => points(m.points(), |pt| (pt.x, pt.y)),
        other => return Err(RepairError::UnsupportedGeometryKind(format!("{:?}", other.shapetype()))),
    })
}

/// Convert shapefile polygon rings to geo::MultiPolygon<f64>.
/// Shapefiles store each exterior ring (clockwise) followed by its holes (counter-clockwise).
fn rings_to_multipolygon<P>(rings: &[shp::PolygonRing<P>], xy: impl Fn(&P) -> (f64, f64)) -> MultiPolygon<f64> {
    /// Ensure first and last are the same for geo::LineString coords
    fn ensure_closed(coords: &mut Vec<Coord<f64>>) {
        if let (Some(&first), Some(&last)) = (coords.first(), coords.last()) {
            if first != last { coords.push(first) }
        }
    }

    /// Get the signed area of a geo::Coord list (negative for clockwise)
    fn signed_area(pts: &[Coord<f64>]) -> f64 {
        pts.windows(2).map(|w| w[0].x * w[1].y - w[1].x * w[0].y).sum::<f64>() / 2.0
    }

    let mut polys = Vec::new();
    let mut exterior: Option<LineString<f64>> = None;
    let mut holes = Vec::new();

    for ring in rings {
        let mut coords = ring.points().iter()
            .map(|p| { let (x, y) = xy(p); Coord { x, y } })
            .collect::<Vec<_>>();
        ensure_closed(&mut coords);

        if signed_area(&coords) < 0.0 {
            if let Some(ext) = exterior.take() {
                polys.push(Polygon::new(ext, std::mem::take(&mut holes)));
            }
            exterior = Some(LineString(coords));
        } else {
            holes.push(LineString(coords));
        }
    }
    if let Some(ext) = exterior {
        polys.push(Polygon::new(ext, holes));
    }

    MultiPolygon(polys)
}

/// Map a dBase field value to an importer attribute.
fn field_to_attr(value: FieldValue) -> AttrValue {
    match value {
        FieldValue::Character(Some(s)) | FieldValue::Memo(s) => AttrValue::Text(s.trim().to_string()),
        FieldValue::Numeric(Some(n)) | FieldValue::Double(n) | FieldValue::Currency(n) => AttrValue::Number(n),
        FieldValue::Float(Some(f)) => AttrValue::Number(f as f64),
        FieldValue::Integer(i) => AttrValue::Integer(i as i64),
        FieldValue::Logical(Some(b)) => AttrValue::Text(b.to_string()),
        _ => AttrValue::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(pts: &[(f64, f64)]) -> Vec<shp::Point> {
        pts.iter().map(|&(x, y)| shp::Point { x, y }).collect()
    }

    #[test]
    fn exterior_and_hole_become_one_polygon() {
        let polygon = shp::Polygon::with_rings(vec![
            shp::PolygonRing::Outer(ring(&[(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0), (0.0, 0.0)])),
            shp::PolygonRing::Inner(ring(&[(2.0, 2.0), (4.0, 2.0), (4.0, 4.0), (2.0, 4.0), (2.0, 2.0)])),
        ]);

        let Ok(Geometry::Polygon(polygon)) = shape_to_geometry(Shape::Polygon(polygon)) else {
            panic!("expected a single polygon");
        };
        assert_eq!(polygon.interiors().len(), 1);
        assert_eq!(polygon.exterior().0.len(), 5);
    }

    #[test]
    fn two_exteriors_become_multipolygon() {
        let polygon = shp::Polygon::with_rings(vec![
            shp::PolygonRing::Outer(ring(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0), (0.0, 0.0)])),
            shp::PolygonRing::Outer(ring(&[(5.0, 0.0), (5.0, 1.0), (6.0, 1.0), (6.0, 0.0), (5.0, 0.0)])),
        ]);

        let Ok(Geometry::MultiPolygon(mp)) = shape_to_geometry(Shape::Polygon(polygon)) else {
            panic!("expected a multipolygon");
        };
        assert_eq!(mp.0.len(), 2);
    }

    #[test]
    fn null_shape_is_empty() {
        assert!(matches!(shape_to_geometry(Shape::NullShape), Err(RepairError::EmptyGeometry)));
    }

    #[test]
    fn field_values_map_to_attributes() {
        assert_eq!(field_to_attr(FieldValue::Character(Some(" Adams ".into()))), AttrValue::Text("Adams".into()));
        assert_eq!(field_to_attr(FieldValue::Numeric(Some(12.5))), AttrValue::Number(12.5));
        assert_eq!(field_to_attr(FieldValue::Integer(7)), AttrValue::Integer(7));
        assert_eq!(field_to_attr(FieldValue::Numeric(None)), AttrValue::Null);
    }
}
