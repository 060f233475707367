use geo::{BoundingRect, Coord, MultiPolygon, Rect};

/// Smallest rectangle covering both inputs.
#[inline]
pub(crate) fn merge_rects(a: Rect<f64>, b: Rect<f64>) -> Rect<f64> {
    Rect::new(
        Coord {
            x: a.min().x.min(b.min().x),
            y: a.min().y.min(b.min().y),
        },
        Coord {
            x: a.max().x.max(b.max().x),
            y: a.max().y.max(b.max().y),
        },
    )
}

/// Compute the bounding rectangle of all MultiPolygons, if any has one.
pub(crate) fn extent_of<'a>(shapes: impl IntoIterator<Item = &'a MultiPolygon<f64>>) -> Option<Rect<f64>> {
    shapes.into_iter()
        .filter_map(|shape| shape.bounding_rect())
        .reduce(merge_rects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn extent_covers_all_shapes() {
        let a = MultiPolygon(vec![polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)]]);
        let b = MultiPolygon(vec![polygon![(x: -3.0, y: 2.0), (x: 5.0, y: 2.0), (x: 5.0, y: 4.0), (x: -3.0, y: 2.0)]]);

        let rect = extent_of([&a, &b]).unwrap();
        assert_eq!(rect.min(), Coord { x: -3.0, y: 0.0 });
        assert_eq!(rect.max(), Coord { x: 5.0, y: 4.0 });
    }

    #[test]
    fn no_shapes_no_extent() {
        assert!(extent_of(std::iter::empty()).is_none());
    }
}
