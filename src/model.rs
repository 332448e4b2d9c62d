use std::collections::{BTreeMap, HashMap};

use geo::Point;
use serde::Serialize;
use sqlx::FromRow;
use strum::{AsRefStr, EnumString};

use crate::{
    dedup,
    sector::{default_azimuth, Coverage},
};

/// Columns selected for every query that returns one row per cell, joined
/// with the coverage dimensions of its technology and band.
pub const CELL_SELECT: &str = "select
        cast(c.site_id as char) as site_id,
        cast(c.Latitude as double) as latitude,
        cast(c.Longitude as double) as longitude,
        c.KELURAHAN_DESA as kelurahan,
        c.Kecamatan as kecamatan,
        c.Kabupaten as kabupaten,
        c.Site_type as site_type,
        c.Tech as tech,
        c.BAND as band,
        cast(c.Sector_Final as signed) as sector,
        c.Cellname as cellname,
        cast(c.Azimuth as double) as azimuth,
        cast(d.`Radius(m)` as double) as radius,
        cast(d.Beamwidth as double) as beamwidth
    from cells c
    left join dimensi d on c.Tech = d.Tech and c.BAND = d.Band";

pub const SECTOR_RANGE: std::ops::RangeInclusive<u8> = 1..=17;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SiteType {
    Macro,
    #[strum(serialize = "easy macro")]
    EasyMacro,
    Outdoor,
    Indoor,
    Lampsite,
    Femto,
}

impl SiteType {
    pub fn parse(s: &str) -> Option<Self> {
        s.trim().parse().ok()
    }

    pub fn score(self) -> u32 {
        match self {
            SiteType::Macro => 8,
            SiteType::EasyMacro => 7,
            SiteType::Outdoor => 6,
            SiteType::Indoor => 4,
            SiteType::Lampsite => 3,
            SiteType::Femto => 2,
        }
    }

    pub fn is_indoor(self) -> bool {
        matches!(self, SiteType::Indoor | SiteType::Lampsite | SiteType::Femto)
    }
}

/// One row of `cells` reduced to the site it belongs to.
#[derive(Debug, Clone, FromRow)]
pub struct SiteRow {
    pub site_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub kelurahan: Option<String>,
    pub kecamatan: Option<String>,
    pub kabupaten: Option<String>,
    pub site_type: Option<String>,
}

/// One row of `cells` with its coverage dimensions.
#[derive(Debug, Clone, FromRow)]
pub struct CellRow {
    #[sqlx(flatten)]
    pub site: SiteRow,
    pub tech: Option<String>,
    pub band: Option<String>,
    pub sector: Option<i64>,
    pub cellname: Option<String>,
    pub azimuth: Option<f64>,
    pub radius: Option<f64>,
    pub beamwidth: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub kelurahan: String,
    pub kecamatan: String,
    pub kabupaten: String,
}

impl Location {
    /// Whether the location can be put on a map. Zero is what missing or
    /// garbage coordinates turn into.
    pub fn is_plottable(&self) -> bool {
        self.latitude != 0.0
            && self.longitude != 0.0
            && self.latitude.is_finite()
            && self.longitude.is_finite()
    }

    pub fn point(&self) -> Point {
        Point::new(self.longitude, self.latitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
    pub tech: String,
    pub band: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cellname: Option<String>,
    pub coverage: Coverage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sector {
    pub number: u8,
    pub azimuth: f64,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tower {
    pub site_id: String,
    pub site_type: String,
    pub location: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sectors: Option<Vec<Sector>>,
}

impl Tower {
    pub fn from_site(row: SiteRow) -> Self {
        Self {
            site_id: row.site_id,
            site_type: row
                .site_type
                .filter(|x| !x.trim().is_empty())
                .unwrap_or_else(|| "outdoor".to_owned()),
            location: Location {
                latitude: coordinate(row.latitude),
                longitude: coordinate(row.longitude),
                kelurahan: row.kelurahan.unwrap_or_default(),
                kecamatan: row.kecamatan.unwrap_or_default(),
                kabupaten: row.kabupaten.unwrap_or_default(),
            },
            sectors: None,
        }
    }

    /// Builds a tower from all of its cell rows. Site fields come from the
    /// first row.
    pub fn from_cells(rows: Vec<CellRow>) -> Option<Self> {
        let mut rows = rows.into_iter();
        let first = rows.next()?;

        let mut sectors = SectorSet::default();
        sectors.push(&first);
        for row in rows {
            sectors.push(&row);
        }

        let mut tower = Tower::from_site(first.site);
        tower.sectors = Some(sectors.finish());
        Some(tower)
    }

    pub fn kind(&self) -> Option<SiteType> {
        SiteType::parse(&self.site_type)
    }

    pub fn is_indoor(&self) -> bool {
        self.kind().is_some_and(SiteType::is_indoor)
    }

    pub fn sectors(&self) -> &[Sector] {
        self.sectors.as_deref().unwrap_or_default()
    }
}

fn coordinate(x: Option<f64>) -> f64 {
    x.filter(|x| x.is_finite()).unwrap_or(0.0)
}

/// Collects cell rows into sectors keyed by sector number.
#[derive(Debug, Default)]
pub struct SectorSet {
    sectors: BTreeMap<u8, Sector>,
}

impl SectorSet {
    pub fn push(&mut self, row: &CellRow) {
        let Some(number) = row
            .sector
            .and_then(|x| u8::try_from(x).ok())
            .filter(|x| SECTOR_RANGE.contains(x))
        else {
            return;
        };

        // the first row of a sector decides its azimuth
        let sector = self.sectors.entry(number).or_insert_with(|| Sector {
            number,
            azimuth: row
                .azimuth
                .filter(|x| x.is_finite() && *x != 0.0)
                .unwrap_or_else(|| default_azimuth(number)),
            cells: Vec::new(),
        });

        let tech = row.tech.as_deref().filter(|x| !x.is_empty());
        let band = row.band.as_deref().filter(|x| !x.is_empty());
        if let (Some(tech), Some(band)) = (tech, band) {
            sector.cells.push(Cell {
                tech: tech.to_owned(),
                band: band.to_owned(),
                cellname: row.cellname.clone(),
                coverage: Coverage::resolve(tech, band, row.radius, row.beamwidth),
            });
        }
    }

    /// Sectors in ascending order, without the ones that ended up empty.
    pub fn finish(self) -> Vec<Sector> {
        self.sectors
            .into_values()
            .filter(|x| !x.cells.is_empty())
            .collect()
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct SiteKey {
    site_id: String,
    latitude: Option<u64>,
    longitude: Option<u64>,
    kelurahan: Option<String>,
    kecamatan: Option<String>,
    kabupaten: Option<String>,
    site_type: Option<String>,
}

impl From<&SiteRow> for SiteKey {
    fn from(row: &SiteRow) -> Self {
        Self {
            site_id: row.site_id.clone(),
            latitude: row.latitude.map(f64::to_bits),
            longitude: row.longitude.map(f64::to_bits),
            kelurahan: row.kelurahan.clone(),
            kecamatan: row.kecamatan.clone(),
            kabupaten: row.kabupaten.clone(),
            site_type: row.site_type.clone(),
        }
    }
}

/// Groups cell rows of many sites into towers.
///
/// Rows are grouped on every site column, so a site id recorded with two
/// different locations yields two candidate towers; [`SiteGrouper::finish`]
/// then keeps the better one.
#[derive(Debug, Default)]
pub struct SiteGrouper {
    index: HashMap<SiteKey, usize>,
    sites: Vec<(SiteRow, SectorSet)>,
}

impl SiteGrouper {
    pub fn push(&mut self, row: CellRow) {
        let key = SiteKey::from(&row.site);
        let i = match self.index.get(&key) {
            Some(i) => *i,
            None => {
                self.index.insert(key, self.sites.len());
                self.sites.push((row.site.clone(), SectorSet::default()));
                self.sites.len() - 1
            }
        };
        self.sites[i].1.push(&row);
    }

    pub fn finish(self) -> Vec<Tower> {
        let towers = self
            .sites
            .into_iter()
            .map(|(site, sectors)| {
                let mut tower = Tower::from_site(site);
                tower.sectors = Some(sectors.finish());
                tower
            })
            .filter(|x| x.location.is_plottable())
            .collect();
        dedup::dedup(towers)
    }
}
