//! Composite Albers USA projection: conic equal-area lower 48 with
//! Alaska and Hawaii insets, fitted to a drawing area.

use geo::{Coord, LineString, MultiPolygon, Polygon, Rect};

const BASE_SCALE: f64 = 150.0;

#[derive(Debug, Clone, Copy)]
struct ConicEqualArea {
    n: f64,
    c: f64,
    r0: f64,
    rotate: f64,
    // Projected center in raw units.
    center: (f64, f64),
}

impl ConicEqualArea {
    fn new(parallels: (f64, f64), rotate: f64, center: (f64, f64)) -> Self {
        let (phi0, phi1) = (parallels.0.to_radians(), parallels.1.to_radians());
        let sy0 = phi0.sin();
        let n = (sy0 + phi1.sin()) / 2.0;
        let c = 1.0 + sy0 * (2.0 * n - sy0);
        let r0 = c.sqrt() / n;
        let mut projection = Self { n, c, r0, rotate: rotate.to_radians(), center: (0.0, 0.0) };
        projection.center = projection.raw(center.0.to_radians(), center.1.to_radians());
        projection
    }

    fn raw(&self, lambda: f64, phi: f64) -> (f64, f64) {
        let r = (self.c - 2.0 * self.n * phi.sin()).max(0.0).sqrt() / self.n;
        (r * (lambda * self.n).sin(), self.r0 - r * (lambda * self.n).cos())
    }

    fn rotated(&self, lon: f64, lat: f64) -> (f64, f64) {
        let mut lambda = lon.to_radians() + self.rotate;
        if lambda > std::f64::consts::PI {
            lambda -= 2.0 * std::f64::consts::PI;
        } else if lambda < -std::f64::consts::PI {
            lambda += 2.0 * std::f64::consts::PI;
        }
        self.raw(lambda, lat.to_radians())
    }
}

// One piece of the composite: a conic projection placed in the unit frame
// (screen = translate + scale * unit) and clipped to its inset box there.
#[derive(Debug, Clone, Copy)]
struct Inset {
    projection: ConicEqualArea,
    scale: f64,
    offset: (f64, f64),
    extent: ((f64, f64), (f64, f64)),
}

impl Inset {
    fn unit(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        let (x, y) = self.projection.rotated(lon, lat);
        let p = self.projection.center;
        let u = (self.offset.0 + self.scale * (x - p.0), self.offset.1 - self.scale * (y - p.1));
        let ((x0, y0), (x1, y1)) = self.extent;
        (u.0 >= x0 && u.0 <= x1 && u.1 >= y0 && u.1 <= y1).then_some(u)
    }
}

#[derive(Debug, Clone)]
pub struct AlbersUsa {
    // Tried in order; the first inset whose box holds the point wins.
    insets: [Inset; 3],
    scale: f64,
    translate: (f64, f64),
}

impl Default for AlbersUsa {
    fn default() -> Self {
        Self::new()
    }
}

impl AlbersUsa {
    pub fn new() -> Self {
        let lower48 = Inset {
            projection: ConicEqualArea::new((29.5, 45.5), 96.0, (-0.6, 38.7)),
            scale: 1.0,
            offset: (0.0, 0.0),
            extent: ((-0.455, -0.238), (0.455, 0.238)),
        };
        let alaska = Inset {
            projection: ConicEqualArea::new((55.0, 65.0), 154.0, (-2.0, 58.5)),
            scale: 0.35,
            offset: (-0.307, 0.201),
            extent: ((-0.425, 0.120), (-0.214, 0.234)),
        };
        let hawaii = Inset {
            projection: ConicEqualArea::new((8.0, 18.0), 157.0, (-3.0, 19.9)),
            scale: 1.0,
            offset: (-0.205, 0.212),
            extent: ((-0.214, 0.166), (-0.115, 0.234)),
        };
        Self { insets: [lower48, alaska, hawaii], scale: 1070.0, translate: (480.0, 250.0) }
    }

    // Screen position of a lon/lat pair (y grows downward), or `None`
    // outside the lower 48, Alaska and Hawaii.
    fn project(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        let (ux, uy) = self.insets.iter().find_map(|inset| inset.unit(lon, lat))?;
        Some((self.translate.0 + self.scale * ux, self.translate.1 + self.scale * uy))
    }

    fn project_coord(&self, coord: Coord<f64>) -> Option<Coord<f64>> {
        self.project(coord.x, coord.y)
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .map(|(x, y)| Coord { x, y })
    }

    // Unprojectable vertices are dropped, and so are rings left with nothing.
    pub fn project_multi_polygon(&self, geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        let ring = |ls: &LineString<f64>| {
            let coords: Vec<Coord<f64>> = ls.coords().filter_map(|c| self.project_coord(*c)).collect();
            (!coords.is_empty()).then(|| LineString::new(coords))
        };
        MultiPolygon::new(
            geometry
                .iter()
                .filter_map(|p| Some(Polygon::new(ring(p.exterior())?, p.interiors().iter().filter_map(ring).collect())))
                .collect(),
        )
    }

    fn projected_bounds<'a>(&self, geometries: impl Iterator<Item = &'a MultiPolygon<f64>>) -> Option<Rect<f64>> {
        let mut min = Coord { x: f64::INFINITY, y: f64::INFINITY };
        let mut max = Coord { x: f64::NEG_INFINITY, y: f64::NEG_INFINITY };
        for geometry in geometries {
            for polygon in geometry {
                for p in polygon.exterior().coords().filter_map(|c| self.project_coord(*c)) {
                    min.x = min.x.min(p.x);
                    min.y = min.y.min(p.y);
                    max.x = max.x.max(p.x);
                    max.y = max.y.max(p.y);
                }
            }
        }
        (min.x <= max.x && min.y <= max.y).then(|| Rect::new(min, max))
    }

    // Scale and translate so the geometries' extent fills `size`,
    // centered on the spare axis. Nothing to fit leaves the base scale.
    pub fn fit_size<'a>(&mut self, size: (f64, f64), geometries: impl Iterator<Item = &'a MultiPolygon<f64>>) {
        self.scale = BASE_SCALE;
        self.translate = (0.0, 0.0);
        let Some(bounds) = self.projected_bounds(geometries) else {
            return;
        };
        let (dx, dy) = (bounds.width(), bounds.height());
        let k = match (dx > 0.0, dy > 0.0) {
            (true, true) => (size.0 / dx).min(size.1 / dy),
            (true, false) => size.0 / dx,
            (false, true) => size.1 / dy,
            (false, false) => 1.0,
        };
        let x = (size.0 - k * (bounds.max().x + bounds.min().x)) / 2.0;
        let y = (size.1 - k * (bounds.max().y + bounds.min().y)) / 2.0;
        self.scale = BASE_SCALE * k;
        self.translate = (x, y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square(lon: f64, lat: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: lon, y: lat),
            (x: lon + size, y: lat),
            (x: lon + size, y: lat + size),
            (x: lon, y: lat + size),
            (x: lon, y: lat),
        ]])
    }

    #[test]
    fn center_projects_to_translate() {
        let projection = AlbersUsa::new();
        let (x, y) = projection.project(-96.6, 38.7).unwrap();
        assert!((x - 480.0).abs() < 1e-6 && (y - 250.0).abs() < 1e-6, "{x} {y}");
    }

    #[test]
    fn north_is_up() {
        let projection = AlbersUsa::new();
        let (_, south) = projection.project(-90.0, 30.0).unwrap();
        let (_, north) = projection.project(-90.0, 45.0).unwrap();
        assert!(north < south);
        let (west, _) = projection.project(-120.0, 40.0).unwrap();
        let (east, _) = projection.project(-75.0, 40.0).unwrap();
        assert!(west < east);
    }

    #[test]
    fn fitted_geometry_lies_inside_the_extent() {
        let shapes = vec![square(-100.0, 35.0, 2.0), square(-80.0, 40.0, 1.0), square(-150.0, 61.0, 3.0)];
        let mut projection = AlbersUsa::new();
        projection.fit_size((760.0, 560.0), shapes.iter());

        let bounds = projection.projected_bounds(shapes.iter()).unwrap();
        let eps = 1e-6;
        assert!(bounds.min().x >= -eps && bounds.min().y >= -eps);
        assert!(bounds.max().x <= 760.0 + eps && bounds.max().y <= 560.0 + eps);
        // One axis is filled exactly.
        let fills_x = (bounds.width() - 760.0).abs() < 1e-6;
        let fills_y = (bounds.height() - 560.0).abs() < 1e-6;
        assert!(fills_x || fills_y);
    }

    #[test]
    fn fitting_nothing_keeps_finite_state() {
        let mut projection = AlbersUsa::new();
        projection.fit_size((100.0, 100.0), std::iter::empty());
        assert_eq!(projection.scale, BASE_SCALE);
        assert_eq!(projection.translate, (0.0, 0.0));
    }

    #[test]
    fn insets_take_alaska_and_hawaii_and_clip_the_rest() {
        let projection = AlbersUsa::new();
        assert!(projection.project(-150.0, 61.0).is_some());
        assert!(projection.project(-157.0, 20.5).is_some());
        // Puerto Rico, Midway and null island are outside every inset.
        assert!(projection.project(-66.5, 18.2).is_none());
        assert!(projection.project(-177.4, 28.2).is_none());
        assert!(projection.project(0.0, 0.0).is_none());
    }

    #[test]
    fn puerto_rico_does_not_move_the_fit() {
        let lower48 = vec![square(-100.0, 35.0, 2.0), square(-80.0, 40.0, 1.0)];
        let mut with_pr = lower48.clone();
        with_pr.push(square(-66.5, 18.0, 1.0));

        let mut a = AlbersUsa::new();
        a.fit_size((760.0, 560.0), lower48.iter());
        let mut b = AlbersUsa::new();
        b.fit_size((760.0, 560.0), with_pr.iter());

        assert_eq!(a.scale, b.scale);
        assert_eq!(a.translate, b.translate);
        assert!(b.project_multi_polygon(&with_pr[2]).0.is_empty());
        assert_eq!(b.project_multi_polygon(&with_pr[0]).0.len(), 1);
    }
}
