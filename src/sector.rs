//! Sector coverage geometry.
//!
//! A sector is drawn as a flat triangle fan anchored at the tower: the two
//! edges of the antenna's beam are projected `radius` meters away from the
//! tower using a fixed meters-per-degree factor. This is an equirectangular
//! approximation that is good enough for drawing on a web map at city scale.

use geo_types::{coord, Coord, LineString, Polygon};
use serde::Serialize;

/// Meters per degree used to project the coverage radius.
pub const METERS_PER_DEGREE: f64 = 111_000.0;

/// Coverage used when neither the database nor the technology tables know
/// anything about a cell.
pub const DEFAULT_COVERAGE: Coverage = Coverage::new(100.0, 30.0);

const BAND_COVERAGE: &[(&str, &str, Coverage)] = &[
    ("2G", "900", Coverage::new(150.0, 10.0)),
    ("2G", "1800", Coverage::new(140.0, 15.0)),
    ("2G", "DCS", Coverage::new(140.0, 15.0)),
    ("4G", "900", Coverage::new(130.0, 30.0)),
    ("4G", "1800", Coverage::new(110.0, 34.0)),
    ("4G", "2100", Coverage::new(120.0, 32.0)),
    ("4G", "2300", Coverage::new(100.0, 36.0)),
    ("4G", "2300 F1", Coverage::new(80.0, 40.0)),
    ("4G", "2300 F2", Coverage::new(90.0, 38.0)),
    ("4G", "2300 F3", Coverage::new(100.0, 36.0)),
    ("5G", "2300", Coverage::new(155.0, 7.0)),
    ("5G", "2100", Coverage::new(160.0, 5.0)),
];

const TECH_COVERAGE: &[(&str, Coverage)] = &[
    ("2G", Coverage::new(140.0, 15.0)),
    ("4G", Coverage::new(120.0, 32.0)),
    ("5G", Coverage::new(155.0, 7.0)),
];

const BAND_COLORS: &[(&str, &str, &str)] = &[
    ("2G", "900", "#ff4444"),
    ("2G", "1800", "#ff8844"),
    ("2G", "DCS", "#ff8844"),
    ("4G", "900", "#33b5e5"),
    ("4G", "1800", "#4285f4"),
    ("4G", "2100", "#0d47a1"),
    ("4G", "2300", "#1565c0"),
    ("4G", "2300 F1", "#1976d2"),
    ("4G", "2300 F2", "#1565c0"),
    ("4G", "2300 F3", "#0d47a1"),
    ("5G", "2100", "#00C851"),
    ("5G", "2300", "#00695c"),
];

pub const DEFAULT_COLOR: &str = "#fbbc04";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coverage {
    /// meters
    pub radius: f64,
    /// degrees
    pub beamwidth: f64,
}

impl Coverage {
    pub const fn new(radius: f64, beamwidth: f64) -> Self {
        Self { radius, beamwidth }
    }

    /// Default coverage for a technology and band.
    pub fn lookup(tech: &str, band: &str) -> Self {
        let band = normalize_band(band);
        BAND_COVERAGE
            .iter()
            .find(|(t, b, _)| *t == tech && *b == band)
            .map(|(_, _, c)| *c)
            .or_else(|| {
                TECH_COVERAGE
                    .iter()
                    .find(|(t, _)| *t == tech)
                    .map(|(_, c)| *c)
            })
            .unwrap_or(DEFAULT_COVERAGE)
    }

    /// Coverage from database values, falling back per field to the default
    /// tables when a value is missing or not positive.
    pub fn resolve(tech: &str, band: &str, radius: Option<f64>, beamwidth: Option<f64>) -> Self {
        let usable = |x: Option<f64>| x.filter(|x| x.is_finite() && *x > 0.0);
        let (radius, beamwidth) = match (usable(radius), usable(beamwidth)) {
            (Some(r), Some(b)) => (r, b),
            (r, b) => {
                let fallback = Self::lookup(tech, band);
                (
                    r.unwrap_or(fallback.radius),
                    b.unwrap_or(fallback.beamwidth),
                )
            }
        };
        Self::new(radius, beamwidth.min(360.0))
    }

    pub fn is_drawable(&self) -> bool {
        self.radius > 0.0 && self.beamwidth > 0.0
    }
}

/// Strips the `L`/`N` technology prefix and the `NR` suffix from a band
/// label, so `L1800` and `1800` share a table entry.
pub fn normalize_band(band: &str) -> &str {
    let band = band.strip_prefix(&['L', 'N'][..]).unwrap_or(band);
    band.strip_suffix("NR").unwrap_or(band)
}

pub fn band_color(tech: &str, band: &str) -> &'static str {
    let band = normalize_band(band);
    BAND_COLORS
        .iter()
        .find(|(t, b, _)| *t == tech && *b == band)
        .map(|(_, _, color)| *color)
        .unwrap_or(DEFAULT_COLOR)
}

/// Azimuth assumed for a sector whose antenna bearing is not recorded.
pub fn default_azimuth(sector: u8) -> f64 {
    let n = f64::from(sector);
    match sector {
        0..=3 => (n - 1.0) * 120.0,
        4..=5 => (n - 1.0) * 72.0,
        14..=17 => ((n - 14.0) * 90.0) % 360.0,
        _ => (n - 1.0) * (360.0 / 17.0),
    }
}

/// Closed triangle fan `[center, left, right, center]`, in map coordinates
/// (x = longitude, y = latitude).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub center: Coord,
    pub left: Coord,
    pub right: Coord,
}

impl Triangle {
    pub fn new(latitude: f64, longitude: f64, azimuth: f64, coverage: Coverage) -> Self {
        // telecom azimuth is clockwise from north
        let angle = (270.0 - azimuth).rem_euclid(360.0).to_radians();
        let half_beam = (coverage.beamwidth / 2.0).to_radians();
        let distance = coverage.radius / METERS_PER_DEGREE;

        let edge = |angle: f64| {
            coord! {
                x: longitude + distance * angle.sin(),
                y: latitude + distance * angle.cos()
            }
        };

        Self {
            center: coord! { x: longitude, y: latitude },
            left: edge(angle - half_beam),
            right: edge(angle + half_beam),
        }
    }

    pub fn to_polygon(&self) -> Polygon {
        Polygon::new(
            LineString::new(vec![self.center, self.left, self.right, self.center]),
            vec![],
        )
    }

    /// `[lat, lng]` pairs, the order Leaflet expects.
    pub fn lat_lngs(&self) -> [[f64; 2]; 4] {
        [self.center, self.left, self.right, self.center].map(|c| [c.y, c.x])
    }
}
