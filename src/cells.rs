use actix_web::{get, web, HttpResponse};
use serde::{Deserialize, Serialize};
use sqlx::{query_as, FromRow};

use crate::{db::Database, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct CellQuery {
    site_id: Option<String>,
    sector: Option<String>,
    tech: Option<String>,
    band: Option<String>,
}

#[derive(Debug, FromRow, Serialize)]
struct CellDetails {
    site_id: String,
    #[serde(rename = "Cellname")]
    cellname: Option<String>,
    #[serde(rename = "Sector_Final")]
    sector: Option<i64>,
    #[serde(rename = "Tech")]
    tech: Option<String>,
    #[serde(rename = "BAND")]
    band: Option<String>,
}

fn field(x: &Option<String>) -> Option<&str> {
    x.as_deref().map(str::trim).filter(|x| !x.is_empty())
}

impl CellQuery {
    fn params(&self) -> Option<[&str; 4]> {
        Some([
            field(&self.site_id)?,
            field(&self.sector)?,
            field(&self.tech)?,
            field(&self.band)?,
        ])
    }
}

#[get("/cell-details")]
pub async fn details(
    query: web::Query<CellQuery>,
    db: web::Data<Database>,
) -> Result<HttpResponse, ApiError> {
    let [site_id, sector, tech, band] = query.params().ok_or_else(|| {
        ApiError::bad_request(
            "Missing parameters",
            "site_id, sector, tech and band are required",
        )
    })?;

    let cell: Option<CellDetails> = db
        .timed(
            query_as(
                "select
                    cast(site_id as char) as site_id,
                    Cellname as cellname,
                    cast(Sector_Final as signed) as sector,
                    Tech as tech,
                    BAND as band
                from cells
                where site_id = ?
                    and Sector_Final = ?
                    and Tech = ?
                    and BAND = ?
                limit 1",
            )
            .bind(site_id)
            .bind(sector)
            .bind(tech)
            .bind(band)
            .fetch_optional(db.pool()),
        )
        .await
        .map_err(ApiError::query("Failed to fetch cell details"))?;

    match cell {
        Some(cell) => Ok(HttpResponse::Ok().json(cell)),
        None => Err(ApiError::not_found(
            "Cell not found",
            "No cell found with the specified parameters",
        )),
    }
}
