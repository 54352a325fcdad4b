//! Named polygon regions used as zones for statistics

use geo::{BooleanOps, BoundingRect, Contains, Simplify};
use geo_types::{MultiPolygon, Point, Polygon};

use crate::raster::Extent;

/// A named polygon or multipolygon, typically an administrative district.
///
/// Regions are read-only once built. Membership tests use the pixel centre:
/// a point on the boundary is outside.
#[derive(Debug, Clone)]
pub struct Region {
    name: String,
    geometry: MultiPolygon<f64>,
    /// Simplification tolerance in CRS units (0 = keep geometry as-is)
    tolerance: f64,
    bbox: Extent,
}

impl Region {
    pub fn new(name: impl Into<String>, geometry: MultiPolygon<f64>) -> Self {
        let bbox = bbox_of(&geometry);
        Self {
            name: name.into(),
            geometry,
            tolerance: 0.0,
            bbox,
        }
    }

    pub fn from_polygon(name: impl Into<String>, polygon: Polygon<f64>) -> Self {
        Self::new(name, MultiPolygon::new(vec![polygon]))
    }

    /// Rectangular region covering `extent`
    pub fn from_extent(name: impl Into<String>, extent: &Extent) -> Self {
        let rect = geo_types::Rect::new(
            geo_types::coord! { x: extent.min_x, y: extent.min_y },
            geo_types::coord! { x: extent.max_x, y: extent.max_y },
        );
        Self::from_polygon(name, rect.to_polygon())
    }

    /// Copy simplified with Ramer-Douglas-Peucker at `tolerance`
    pub fn simplified(&self, tolerance: f64) -> Self {
        if tolerance <= 0.0 {
            return self.clone();
        }
        let geometry = self.geometry.simplify(&tolerance);
        let bbox = bbox_of(&geometry);
        Self {
            name: self.name.clone(),
            geometry,
            tolerance,
            bbox,
        }
    }

    /// Union of several regions under a new name
    pub fn union_of<'a, I>(name: impl Into<String>, regions: I) -> Self
    where
        I: IntoIterator<Item = &'a Region>,
    {
        let mut merged = MultiPolygon::<f64>::new(Vec::new());
        let mut tolerance = 0.0_f64;
        for region in regions {
            merged = if merged.0.is_empty() {
                region.geometry.clone()
            } else {
                merged.union(&region.geometry)
            };
            tolerance = tolerance.max(region.tolerance);
        }
        let mut united = Self::new(name, merged);
        united.tolerance = tolerance;
        united
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Bounding box of the geometry
    pub fn bbox(&self) -> Extent {
        self.bbox
    }

    /// Whether (x, y) lies strictly inside the region
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        if !self.bbox.contains_point(x, y) {
            return false;
        }
        self.geometry.contains(&Point::new(x, y))
    }
}

fn bbox_of(geometry: &MultiPolygon<f64>) -> Extent {
    match geometry.bounding_rect() {
        Some(rect) => Extent::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y),
        None => Extent::new(0.0, 0.0, 0.0, 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::polygon;

    fn triangle() -> Region {
        Region::from_polygon(
            "tri",
            polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 0.0, y: 10.0), (x: 0.0, y: 0.0)],
        )
    }

    #[test]
    fn test_contains_point() {
        let region = triangle();
        assert!(region.contains_point(2.0, 2.0));
        assert!(!region.contains_point(8.0, 8.0));
        assert!(!region.contains_point(-1.0, 5.0));
        assert_eq!(region.bbox(), Extent::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_union_of_disjoint() {
        let a = Region::from_extent("a", &Extent::new(0.0, 0.0, 1.0, 1.0));
        let b = Region::from_extent("b", &Extent::new(5.0, 5.0, 6.0, 6.0));
        let both = Region::union_of("ab", [&a, &b]);
        assert_eq!(both.name(), "ab");
        assert!(both.contains_point(0.5, 0.5));
        assert!(both.contains_point(5.5, 5.5));
        assert!(!both.contains_point(3.0, 3.0));
        assert_eq!(both.bbox(), Extent::new(0.0, 0.0, 6.0, 6.0));
    }

    #[test]
    fn test_simplified_keeps_name() {
        let region = triangle().simplified(0.5);
        assert_eq!(region.name(), "tri");
        assert_eq!(region.tolerance(), 0.5);
        assert!(region.contains_point(1.0, 1.0));
    }
}
