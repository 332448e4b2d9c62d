//! Sector coverage triangles as GeoJSON.

use std::{
    fs,
    io::{self, Write},
    path::Path,
};

use anyhow::{Context, Result};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue};
use tracing::info;

use crate::{
    db::Database,
    kabupaten,
    model::{Cell, Sector, Tower},
    sector::{band_color, Triangle},
};

pub const CONTENT_TYPE: &str = "application/geo+json";

fn feature(tower: &Tower, sector: &Sector, cell: &Cell) -> Feature {
    let triangle = Triangle::new(
        tower.location.latitude,
        tower.location.longitude,
        sector.azimuth,
        cell.coverage,
    );

    let mut properties = JsonObject::new();
    let mut set = |key: &str, value: JsonValue| {
        properties.insert(key.to_owned(), value);
    };
    set("site_id", tower.site_id.as_str().into());
    set("sector", sector.number.into());
    set("azimuth", sector.azimuth.into());
    set("tech", cell.tech.as_str().into());
    set("band", cell.band.as_str().into());
    set("radius", cell.coverage.radius.into());
    set("beamwidth", cell.coverage.beamwidth.into());
    set("color", band_color(&cell.tech, &cell.band).into());

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geojson::Value::from(&triangle.to_polygon()))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// One polygon per cell. Indoor towers and cells without a usable coverage
/// are left out.
pub fn feature_collection(towers: &[Tower]) -> FeatureCollection {
    let features = towers
        .iter()
        .filter(|tower| !tower.is_indoor() && tower.location.is_plottable())
        .flat_map(|tower| {
            tower.sectors().iter().flat_map(move |sector| {
                sector
                    .cells
                    .iter()
                    .filter(|cell| cell.coverage.is_drawable())
                    .map(move |cell| feature(tower, sector, cell))
            })
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Writes the coverage of every tower in kabupaten `name` to `output`, or to
/// stdout.
pub async fn export(db: &Database, name: &str, output: Option<&Path>) -> Result<()> {
    let towers = kabupaten::fetch_towers(db, name)
        .await
        .with_context(|| format!("Failed to fetch towers for {name}"))?;
    let collection = feature_collection(&towers);
    info!(
        kabupaten = name,
        towers = towers.len(),
        features = collection.features.len(),
        "coverage built"
    );

    let x = collection.to_string();
    match output {
        Some(path) => fs::write(path, x)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(x.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }

    Ok(())
}
