use geo::{
    BooleanOps, BoundingRect, Centroid, Contains, Coord, Geometry, Intersects, Line, LineString,
    MultiLineString, MultiPolygon, Point, Polygon, SimplifyVwPreserve, Validation,
};
use thiserror::Error;
use tracing::{debug, enabled, Level};

/// Reasons a raw feature geometry cannot be turned into a geounit geometry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RepairError {
    #[error("unsupported geometry kind: {0}")]
    UnsupportedGeometryKind(String),
    #[error("geometry is empty")]
    EmptyGeometry,
    #[error("first member polygon is degenerate (no area)")]
    DegenerateMember,
    #[error("could not place a centroid inside the geometry")]
    CentroidRepair,
}

/// The geometry triple stored on a geounit.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairedGeometry {
    pub geom: MultiPolygon<f64>,
    pub simple: MultiPolygon<f64>,
    pub center: Point<f64>,
}

/// Produces multipolygon, simplified multipolygon and interior centroid for raw feature geometries.
#[derive(Debug, Clone, Copy)]
pub struct GeometryRepairer {
    tolerance: f64,
}

impl GeometryRepairer {
    /// `tolerance` is a distance in map units; the area threshold used by
    /// Visvalingam-Whyatt is its square.
    pub fn new(tolerance: f64) -> Self { Self { tolerance } }

    #[inline] pub fn tolerance(&self) -> f64 { self.tolerance }

    /// Repair one raw geometry. Validity is only reported, never enforced.
    pub fn repair(&self, raw: Geometry<f64>) -> Result<RepairedGeometry, RepairError> {
        let geom = coerce_multipolygon(raw)?;
        let first = geom.0.first().ok_or(RepairError::EmptyGeometry)?;
        if first.exterior().0.len() < 4 || first.bounding_rect().is_none() {
            return Err(RepairError::DegenerateMember);
        }

        let simple = self.simplify(&geom);
        let center = interior_centroid(&geom)?;

        if enabled!(Level::DEBUG) {
            if !is_simple(&geom) { debug!("geometry is not simple") }
            if !geom.is_valid() { debug!("geometry is not valid") }
            if !is_simple(&simple) { debug!("simplified geometry is not simple") }
            if !simple.is_valid() { debug!("simplified geometry is not valid") }
        }

        Ok(RepairedGeometry { geom, simple, center })
    }

    /// Topology-preserving simplification; the result is always a multipolygon.
    fn simplify(&self, geom: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        if self.tolerance <= 0.0 { return geom.clone() }
        geom.simplify_vw_preserve(&(self.tolerance * self.tolerance))
    }
}

/// Coerce a bare polygon into a single-member multipolygon; pass multipolygons through.
pub(crate) fn coerce_multipolygon(raw: Geometry<f64>) -> Result<MultiPolygon<f64>, RepairError> {
    let mp = match raw {
        Geometry::Polygon(polygon) => MultiPolygon(vec![polygon]),
        Geometry::MultiPolygon(mp) => mp,
        other => return Err(RepairError::UnsupportedGeometryKind(kind_name(&other).into())),
    };
    if mp.0.is_empty() { return Err(RepairError::EmptyGeometry) }
    Ok(mp)
}

fn kind_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// True when no ring of `mp` crosses or touches itself away from its shared vertices.
pub(crate) fn is_simple(mp: &MultiPolygon<f64>) -> bool {
    mp.0.iter()
        .flat_map(|polygon| std::iter::once(polygon.exterior()).chain(polygon.interiors()))
        .all(ring_is_simple)
}

fn ring_is_simple(ring: &LineString<f64>) -> bool {
    let segments = ring.lines().collect::<Vec<Line<f64>>>();
    let n = segments.len();
    for i in 0..n {
        for j in i + 2..n {
            // first and last segments meet at the closing vertex
            if i == 0 && j == n - 1 { continue }
            if segments[i].intersects(&segments[j]) { return false }
        }
    }
    true
}

/// Centroid of `geom`, moved inside the first member polygon when the true centroid falls outside.
pub(crate) fn interior_centroid(geom: &MultiPolygon<f64>) -> Result<Point<f64>, RepairError> {
    let center = geom.centroid().ok_or(RepairError::EmptyGeometry)?;
    if geom.contains(&center) { return Ok(center) }

    let first = geom.0.first().ok_or(RepairError::EmptyGeometry)?;
    debug!(x = center.x(), y = center.y(), "centroid falls outside geometry, repairing");
    centerline_midpoint(first)
}

/// Cut the polygon with a horizontal line through its own centroid and take
/// the centroid of the first piece of that line that lies inside.
fn centerline_midpoint(polygon: &Polygon<f64>) -> Result<Point<f64>, RepairError> {
    let extent = polygon.bounding_rect().ok_or(RepairError::DegenerateMember)?;
    let y = polygon.centroid().ok_or(RepairError::DegenerateMember)?.y();

    let centerline = MultiLineString(vec![LineString(vec![
        Coord { x: extent.min().x, y },
        Coord { x: extent.max().x, y },
    ])]);

    polygon.clip(&centerline, false).0.first()
        .and_then(|piece| piece.centroid())
        .ok_or(RepairError::CentroidRepair)
}
