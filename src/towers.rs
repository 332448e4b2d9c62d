use actix_web::{get, routes, web, HttpResponse};
use geo::{Distance, Haversine};
use serde::{Deserialize, Serialize};
use sqlx::query_as;
use tracing::{info, warn};

use crate::{
    coverage,
    db::Database,
    dedup,
    error::{ApiError, QueryError},
    model::{CellRow, Location, SiteRow, Tower, CELL_SELECT},
};

const MAX_TOWER_CELLS: u32 = 100;
const DEFAULT_NEARBY_KM: f64 = 1.0;

const SITE_QUERY: &str = "select distinct
        cast(site_id as char) as site_id,
        cast(Latitude as double) as latitude,
        cast(Longitude as double) as longitude,
        KELURAHAN_DESA as kelurahan,
        Kecamatan as kecamatan,
        Kabupaten as kabupaten,
        Site_type as site_type
    from cells
    where Longitude is not null
        and Latitude is not null
        and site_id is not null
    order by site_id";

/// Every plottable tower, one record per site.
pub async fn fetch_all(db: &Database) -> Result<Vec<Tower>, QueryError> {
    let rows: Vec<SiteRow> = db
        .timed_scan(query_as(SITE_QUERY).fetch_all(db.pool()))
        .await?;
    let towers = rows
        .into_iter()
        .map(Tower::from_site)
        .filter(|x| x.location.is_plottable())
        .collect();
    Ok(dedup::dedup(towers))
}

/// A tower with its sectors, `None` when the site has no usable cells.
pub async fn fetch_one(db: &Database, site_id: &str) -> Result<Option<Tower>, QueryError> {
    let sql = format!(
        "{CELL_SELECT}
        where c.site_id = ?
            and c.Sector_Final between 1 and 17
            and c.Tech is not null
            and c.BAND is not null
        order by c.Sector_Final
        limit {MAX_TOWER_CELLS}"
    );
    let rows: Vec<CellRow> = db
        .timed(query_as(&sql).bind(site_id).fetch_all(db.pool()))
        .await?;
    Ok(Tower::from_cells(rows))
}

async fn find(db: &Database, site_id: &str) -> Result<Tower, ApiError> {
    let site_id = site_id.trim();
    if site_id.is_empty() {
        return Err(ApiError::bad_request(
            "Site ID is required",
            "Site ID is required",
        ));
    }

    fetch_one(db, site_id)
        .await
        .map_err(ApiError::query("Database error"))?
        .ok_or_else(|| {
            warn!(site_id, "no data found for tower");
            ApiError::not_found(
                "Tower not found",
                format!("No tower found with site_id: {site_id}"),
            )
        })
}

#[routes]
#[get("/towers")]
#[get("/cells")]
pub async fn list(db: web::Data<Database>) -> Result<HttpResponse, ApiError> {
    let towers = fetch_all(&db)
        .await
        .map_err(ApiError::query("Failed to fetch tower data"))?;
    Ok(HttpResponse::Ok().json(towers))
}

#[routes]
#[get("/towers/{site_id}")]
#[get("/cells/site/{site_id}")]
pub async fn detail(
    path: web::Path<String>,
    db: web::Data<Database>,
) -> Result<HttpResponse, ApiError> {
    let tower = find(&db, &path).await?;
    info!(
        site_id = %tower.site_id,
        sectors = tower.sectors().len(),
        cells = tower.sectors().iter().map(|x| x.cells.len()).sum::<usize>(),
        "tower processed"
    );
    Ok(HttpResponse::Ok().json(tower))
}

#[get("/towers/{site_id}/coverage")]
pub async fn tower_coverage(
    path: web::Path<String>,
    db: web::Data<Database>,
) -> Result<HttpResponse, ApiError> {
    let tower = find(&db, &path).await?;
    let collection = coverage::feature_collection(std::slice::from_ref(&tower));
    let body = serde_json::to_string(&collection)
        .map_err(|e| ApiError::internal("Failed to encode coverage")(e.into()))?;
    Ok(HttpResponse::Ok()
        .content_type(coverage::CONTENT_TYPE)
        .body(body))
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    radius_km: Option<f64>,
}

#[derive(Debug, Serialize)]
struct NearbyTower {
    #[serde(flatten)]
    tower: Tower,
    distance_km: f64,
}

pub fn distance_km(a: &Location, b: &Location) -> f64 {
    Haversine::distance(a.point(), b.point()) / 1000.0
}

/// Towers within `radius_km` of `origin`, nearest first.
fn within(origin: &Tower, towers: Vec<Tower>, radius_km: f64) -> Vec<NearbyTower> {
    let mut found: Vec<_> = towers
        .into_iter()
        .filter(|x| x.site_id != origin.site_id)
        .map(|tower| NearbyTower {
            distance_km: distance_km(&origin.location, &tower.location),
            tower,
        })
        .filter(|x| x.distance_km <= radius_km)
        .collect();
    found.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    found
}

#[get("/towers/{site_id}/nearby")]
pub async fn nearby_towers(
    path: web::Path<String>,
    query: web::Query<NearbyQuery>,
    db: web::Data<Database>,
) -> Result<HttpResponse, ApiError> {
    let radius_km = query.radius_km.unwrap_or(DEFAULT_NEARBY_KM);
    if !radius_km.is_finite() || radius_km <= 0.0 {
        return Err(ApiError::bad_request(
            "Invalid radius",
            "radius_km must be a positive number",
        ));
    }

    let towers = fetch_all(&db)
        .await
        .map_err(ApiError::query("Failed to fetch tower data"))?;
    let site_id = path.trim();
    let origin = towers
        .iter()
        .find(|x| x.site_id == site_id)
        .cloned()
        .ok_or_else(|| {
            ApiError::not_found(
                "Tower not found",
                format!("No tower found with site_id: {site_id}"),
            )
        })?;

    Ok(HttpResponse::Ok().json(within(&origin, towers, radius_km)))
}
