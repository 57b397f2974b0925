use std::f64::consts::PI;

pub const RANGE_LIGHT: Rgb = Rgb(0xcf, 0xe2, 0xf2);
pub const RANGE_DARK: Rgb = Rgb(0x0d, 0x30, 0x6b);
pub const MISSING_FILL: Rgb = Rgb(0xcc, 0xcc, 0xcc);
pub const REGION_STROKE: Rgb = Rgb(0xff, 0xff, 0xff);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

// CIE Lab with the D50 white point used by d3-color.
const XN: f64 = 0.96422;
const YN: f64 = 1.0;
const ZN: f64 = 0.82521;
const T0: f64 = 4.0 / 29.0;
const T1: f64 = 6.0 / 29.0;
const T2: f64 = 3.0 * T1 * T1;
const T3: f64 = T1 * T1 * T1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hcl {
    pub h: f64,
    pub c: f64,
    pub l: f64,
}

fn srgb_to_linear(v: u8) -> f64 {
    let x = v as f64 / 255.0;
    if x <= 0.04045 { x / 12.92 } else { ((x + 0.055) / 1.055).powf(2.4) }
}

fn linear_to_srgb(x: f64) -> u8 {
    let v = if x <= 0.0031308 { 12.92 * x } else { 1.055 * x.powf(1.0 / 2.4) - 0.055 };
    (255.0 * v).round().clamp(0.0, 255.0) as u8
}

fn xyz_to_lab(t: f64) -> f64 {
    if t > T3 { t.cbrt() } else { t / T2 + T0 }
}

fn lab_to_xyz(t: f64) -> f64 {
    if t > T1 { t * t * t } else { T2 * (t - T0) }
}

impl Hcl {
    pub fn from_rgb(rgb: Rgb) -> Self {
        let (r, g, b) = (srgb_to_linear(rgb.0), srgb_to_linear(rgb.1), srgb_to_linear(rgb.2));
        let y = xyz_to_lab((0.2225045 * r + 0.7168786 * g + 0.0606169 * b) / YN);
        let (x, z) = if rgb.0 == rgb.1 && rgb.1 == rgb.2 {
            (y, y)
        } else {
            (
                xyz_to_lab((0.4360747 * r + 0.3850649 * g + 0.1430804 * b) / XN),
                xyz_to_lab((0.0139322 * r + 0.0971045 * g + 0.7141733 * b) / ZN),
            )
        };
        let (l, a, b) = (116.0 * y - 16.0, 500.0 * (x - y), 200.0 * (y - z));
        let c = (a * a + b * b).sqrt();
        // Achromatic colors carry no hue.
        let h = if c < 1e-9 { f64::NAN } else { (b.atan2(a) * 180.0 / PI).rem_euclid(360.0) };
        Hcl { h, c, l }
    }

    pub fn to_rgb(self) -> Rgb {
        let (a, b) = if self.h.is_nan() {
            (0.0, 0.0)
        } else {
            let h = self.h * PI / 180.0;
            (h.cos() * self.c, h.sin() * self.c)
        };
        let y = (self.l + 16.0) / 116.0;
        let x = XN * lab_to_xyz(y + a / 500.0);
        let z = ZN * lab_to_xyz(y - b / 200.0);
        let y = YN * lab_to_xyz(y);
        Rgb(
            linear_to_srgb(3.1338561 * x - 1.6168667 * y - 0.4906146 * z),
            linear_to_srgb(-0.9787684 * x + 1.9161415 * y + 0.0334540 * z),
            linear_to_srgb(0.0719453 * x - 0.2289914 * y + 1.4052427 * z),
        )
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn lerp_hue(a: f64, b: f64, t: f64) -> f64 {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => f64::NAN,
        (true, false) => b,
        (false, true) => a,
        (false, false) => {
            let mut d = b - a;
            if !(-180.0..=180.0).contains(&d) {
                d -= 360.0 * (d / 360.0).round();
            }
            a + t * d
        }
    }
}

pub fn interpolate_hcl(from: Hcl, to: Hcl, t: f64) -> Rgb {
    Hcl {
        h: lerp_hue(from.h, to.h, t),
        c: lerp(from.c, to.c, t),
        l: lerp(from.l, to.l, t),
    }
    .to_rgb()
}

#[derive(Debug, Clone)]
pub struct SequentialScale {
    domain: (f64, f64),
    range: (Rgb, Rgb),
    hcl: (Hcl, Hcl),
}

impl SequentialScale {
    pub fn new(range: (Rgb, Rgb)) -> Self {
        Self { domain: (0.0, 1.0), range, hcl: (Hcl::from_rgb(range.0), Hcl::from_rgb(range.1)) }
    }

    pub fn set_domain(&mut self, min: f64, max: f64) {
        self.domain = (min, max);
    }

    pub fn range(&self) -> (Rgb, Rgb) {
        self.range
    }

    pub fn color(&self, value: f64) -> Rgb {
        let (d0, d1) = self.domain;
        let span = d1 - d0;
        let t = if span == 0.0 { 0.5 } else { (value - d0) / span };
        interpolate_hcl(self.hcl.0, self.hcl.1, t)
    }
}

impl Default for SequentialScale {
    fn default() -> Self {
        Self::new((RANGE_LIGHT, RANGE_DARK))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Rgb, b: Rgb) -> bool {
        let d = |x: u8, y: u8| (x as i16 - y as i16).abs() <= 1;
        d(a.0, b.0) && d(a.1, b.1) && d(a.2, b.2)
    }

    #[test]
    fn hcl_round_trips_reference_colors() {
        for rgb in [RANGE_LIGHT, RANGE_DARK, Rgb(255, 0, 0), Rgb(128, 128, 128)] {
            assert!(close(Hcl::from_rgb(rgb).to_rgb(), rgb), "{rgb:?}");
        }
        assert!(Hcl::from_rgb(Rgb(128, 128, 128)).h.is_nan());
    }

    #[test]
    fn scale_endpoints_hit_the_range() {
        let mut scale = SequentialScale::default();
        scale.set_domain(10.0, 30.0);
        assert!(close(scale.color(10.0), RANGE_LIGHT));
        assert!(close(scale.color(30.0), RANGE_DARK));
    }

    #[test]
    fn midpoint_is_between_the_endpoints() {
        let mut scale = SequentialScale::default();
        scale.set_domain(0.0, 100.0);
        let mid = scale.color(50.0);
        // Lightness falls monotonically along the ramp.
        let l = |c: Rgb| Hcl::from_rgb(c).l;
        assert!(l(RANGE_LIGHT) > l(mid) && l(mid) > l(RANGE_DARK));
        assert_ne!(mid, RANGE_LIGHT);
        assert_ne!(mid, RANGE_DARK);
    }

    #[test]
    fn degenerate_domain_maps_to_midpoint() {
        let mut scale = SequentialScale::default();
        scale.set_domain(5.0, 5.0);
        let mut reference = SequentialScale::default();
        reference.set_domain(0.0, 2.0);
        assert_eq!(scale.color(5.0), reference.color(1.0));
    }
}
