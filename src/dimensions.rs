use actix_web::{get, web, HttpResponse};
use serde::Serialize;
use sqlx::{query_as, FromRow};

use crate::{db::Database, error::ApiError, sector::Coverage};

#[derive(Debug, FromRow)]
struct DimensionRow {
    technology: String,
    kind: Option<String>,
    band: String,
    radius: Option<f64>,
    beamwidth: Option<f64>,
}

/// Coverage dimensions of one technology and band, as stored.
#[derive(Debug, Serialize)]
struct TriangleDimension {
    technology: String,
    #[serde(rename = "type")]
    kind: String,
    band: String,
    coverage: Coverage,
}

impl From<DimensionRow> for TriangleDimension {
    fn from(row: DimensionRow) -> Self {
        let number = |x: Option<f64>| x.filter(|x| x.is_finite()).unwrap_or(0.0);
        Self {
            technology: row.technology,
            kind: row
                .kind
                .filter(|x| !x.is_empty())
                .unwrap_or_else(|| "Unknown".to_owned()),
            band: row.band,
            coverage: Coverage::new(number(row.radius), number(row.beamwidth)),
        }
    }
}

#[get("/triangle-dimensions")]
pub async fn list(db: web::Data<Database>) -> Result<HttpResponse, ApiError> {
    let rows: Vec<DimensionRow> = db
        .timed(
            query_as(
                "select
                    Tech as technology,
                    Type as kind,
                    Band as band,
                    cast(`Radius(m)` as double) as radius,
                    cast(Beamwidth as double) as beamwidth
                from dimensi
                where Tech is not null and Band is not null
                order by Tech, Band",
            )
            .fetch_all(db.pool()),
        )
        .await
        .map_err(ApiError::query("Failed to fetch triangle dimensions"))?;

    if rows.is_empty() {
        return Err(ApiError::not_found(
            "No dimension data found",
            "The dimensi table is empty",
        ));
    }

    let dimensions: Vec<TriangleDimension> = rows.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(dimensions))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_defaults() {
        let d = TriangleDimension::from(DimensionRow {
            technology: "4G".to_owned(),
            kind: None,
            band: "L1800".to_owned(),
            radius: Some(110.0),
            beamwidth: None,
        });
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["type"], "Unknown");
        assert_eq!(json["coverage"]["radius"], 110.0);
        assert_eq!(json["coverage"]["beamwidth"], 0.0);
    }
}
