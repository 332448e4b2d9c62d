use actix_web::{get, web, HttpResponse};
use futures::TryStreamExt;
use serde::Serialize;
use sqlx::{query_as, FromRow};
use tracing::info;

use crate::{
    db::Database,
    error::{ApiError, QueryError},
    model::{CellRow, SiteGrouper, Tower, CELL_SELECT},
};

#[derive(Debug, FromRow)]
struct KabupatenRow {
    kota: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Serialize)]
struct Center {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Serialize)]
struct Kabupaten {
    kota: String,
    center: Center,
}

impl From<KabupatenRow> for Kabupaten {
    fn from(row: KabupatenRow) -> Self {
        Self {
            kota: row.kota,
            center: Center {
                lat: row.latitude.filter(|x| x.is_finite()).unwrap_or(0.0),
                lng: row.longitude.filter(|x| x.is_finite()).unwrap_or(0.0),
            },
        }
    }
}

#[get("/kabupaten")]
pub async fn list(db: web::Data<Database>) -> Result<HttpResponse, ApiError> {
    let rows: Vec<KabupatenRow> = db
        .timed(
            query_as(
                "select kota, cast(Latitude as double) as latitude, cast(Longitude as double) as longitude
                from kabupaten
                order by kota",
            )
            .fetch_all(db.pool()),
        )
        .await
        .map_err(ApiError::query("Failed to fetch kabupaten data"))?;

    let kabupaten: Vec<Kabupaten> = rows.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(kabupaten))
}

/// Towers, with sectors, whose kabupaten contains `name`.
pub async fn fetch_towers(db: &Database, name: &str) -> Result<Vec<Tower>, QueryError> {
    let sql = format!(
        "{CELL_SELECT}
        where c.Kabupaten like ?
            and c.Longitude is not null
            and c.Latitude is not null
            and c.Sector_Final between 1 and 17
            and c.Tech is not null
            and c.BAND is not null
        order by c.site_id, c.Sector_Final"
    );
    let pattern = format!("%{name}%");

    let mut grouper = SiteGrouper::default();
    db.timed_scan(async {
        let mut rows = query_as::<_, CellRow>(&sql)
            .bind(&pattern)
            .fetch(db.pool());
        while let Some(row) = rows.try_next().await? {
            grouper.push(row);
        }
        Ok::<_, sqlx::Error>(())
    })
    .await?;

    Ok(grouper.finish())
}

#[get("/kabupaten/{kabupaten}/towers")]
pub async fn towers(
    path: web::Path<String>,
    db: web::Data<Database>,
) -> Result<HttpResponse, ApiError> {
    let name = path.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request(
            "Kabupaten name is required",
            "Kabupaten name is required",
        ));
    }

    let found = fetch_towers(&db, name)
        .await
        .map_err(ApiError::query("Failed to fetch towers for kabupaten"))?;

    info!(
        kabupaten = name,
        total = found.len(),
        indoor = found.iter().filter(|x| x.is_indoor()).count(),
        with_sectors = found.iter().filter(|x| !x.sectors().is_empty()).count(),
        "sending towers"
    );
    Ok(HttpResponse::Ok().json(found))
}
