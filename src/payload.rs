//! Daily payload (KPI) series per cell.

use std::collections::BTreeMap;

use actix_web::{get, post, web, HttpResponse};
use anyhow::anyhow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{query, query_as, FromRow};
use tracing::{debug, info};

use crate::{
    db::Database,
    error::{ApiError, QueryError},
};

/// Date format the dashboard charts expect.
const DISPLAY_DATE: &str = "%m/%d/%Y";
const INPUT_DATE: &str = "%Y-%m-%d";
const SUMMARY_DAYS: u32 = 7;

#[derive(Debug, Clone, FromRow, Serialize)]
struct CellInfo {
    cellname: String,
    tech: Option<String>,
    band: Option<String>,
    sector: Option<i64>,
}

#[derive(Debug, FromRow)]
struct PayloadRow {
    // null when `kpi.day` does not hold a date
    day: Option<NaiveDate>,
    payload: Option<f64>,
    tech: Option<String>,
    band: Option<String>,
    sector: Option<i64>,
}

#[derive(Debug, PartialEq, Serialize)]
struct PayloadPoint {
    date: String,
    raw_date: NaiveDate,
    payload: f64,
    tech: Option<String>,
    band: Option<String>,
    sector: Option<i64>,
}

impl PayloadPoint {
    fn from_row(row: PayloadRow) -> Option<Self> {
        let day = row.day?;
        Some(Self {
            date: day.format(DISPLAY_DATE).to_string(),
            raw_date: day,
            payload: gigabytes(row.payload),
            tech: row.tech,
            band: row.band,
            sector: row.sector,
        })
    }
}

/// Rows without a usable day are dropped.
fn points(rows: Vec<PayloadRow>) -> Vec<PayloadPoint> {
    rows.into_iter().filter_map(PayloadPoint::from_row).collect()
}

#[derive(Debug, FromRow)]
struct KpiStats {
    count: i64,
    earliest: Option<NaiveDate>,
    latest: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
struct DateRange<T> {
    earliest: Option<T>,
    latest: Option<T>,
}

#[derive(Debug, Serialize)]
struct DebugInfo {
    total_kpi_records: i64,
    date_range: DateRange<NaiveDate>,
}

#[derive(Debug, Serialize)]
struct PayloadResponse {
    message: &'static str,
    cell_info: CellInfo,
    data: Vec<PayloadPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_range: Option<DateRange<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug_info: Option<DebugInfo>,
}

impl PayloadResponse {
    fn found(cell_info: CellInfo, data: Vec<PayloadPoint>) -> Self {
        let date_range = DateRange {
            earliest: data.first().map(|x| x.date.clone()),
            latest: data.last().map(|x| x.date.clone()),
        };
        Self {
            message: "Payload data retrieved successfully",
            cell_info,
            data,
            date_range: Some(date_range),
            debug_info: None,
        }
    }

    fn empty(cell_info: CellInfo, stats: KpiStats) -> Self {
        Self {
            message: "No payload data available for this cell",
            cell_info,
            data: Vec::new(),
            date_range: None,
            debug_info: Some(DebugInfo {
                total_kpi_records: stats.count,
                date_range: DateRange {
                    earliest: stats.earliest,
                    latest: stats.latest,
                },
            }),
        }
    }
}

/// Rounds to two decimals, missing values count as zero.
fn gigabytes(x: Option<f64>) -> f64 {
    x.filter(|x| x.is_finite())
        .map(|x| (x * 100.0).round() / 100.0)
        .unwrap_or(0.0)
}

fn required(value: &str, error: &'static str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::bad_request(error, error));
    }
    Ok(value.to_owned())
}

async fn find_cell(db: &Database, cellname: &str) -> Result<Option<CellInfo>, QueryError> {
    db.timed(
        query_as(
            "select
                Cellname as cellname,
                Tech as tech,
                BAND as band,
                cast(Sector_Final as signed) as sector
            from cells
            where Cellname = ?
            limit 1",
        )
        .bind(cellname)
        .fetch_optional(db.pool()),
    )
    .await
}

/// The cell and its payload series, oldest first. `Err` when the cell does
/// not exist.
async fn load_series(
    db: &Database,
    cellname: &str,
) -> Result<(CellInfo, Vec<PayloadPoint>), ApiError> {
    let failed = "Failed to fetch payload data";
    let cell = find_cell(db, cellname)
        .await
        .map_err(ApiError::query(failed))?
        .ok_or_else(|| {
            ApiError::not_found(
                "Cell not found",
                format!("No cell found with name: {cellname}"),
            )
        })?;

    let rows: Vec<PayloadRow> = db
        .timed(
            query_as(
                "select
                    cast(k.day as date) as day,
                    cast(k.Total_Payload_GB as double) as payload,
                    c.Tech as tech,
                    c.BAND as band,
                    cast(c.Sector_Final as signed) as sector
                from cells c
                inner join kpi k on c.Cellname = k.Cellname
                where c.Cellname = ?
                    and k.Total_Payload_GB is not null
                order by k.day asc",
            )
            .bind(cellname)
            .fetch_all(db.pool()),
        )
        .await
        .map_err(ApiError::query(failed))?;

    Ok((cell, points(rows)))
}

#[get("/payload/cellname/{cellname}")]
pub async fn series(
    path: web::Path<String>,
    db: web::Data<Database>,
) -> Result<HttpResponse, ApiError> {
    let cellname = required(&path, "Missing cellname parameter")?;
    let (cell, data) = load_series(&db, &cellname).await?;

    if !data.is_empty() {
        debug!(
            cellname = %cellname,
            records = data.len(),
            earliest = data.first().map(|x| x.date.as_str()),
            latest = data.last().map(|x| x.date.as_str()),
            "formatted payload series"
        );
        return Ok(HttpResponse::Ok().json(PayloadResponse::found(cell, data)));
    }

    let stats: KpiStats = db
        .timed(
            query_as(
                "select
                    count(k.day) as count,
                    min(cast(k.day as date)) as earliest,
                    max(cast(k.day as date)) as latest
                from cells c
                left join kpi k on c.Cellname = k.Cellname
                where c.Cellname = ?",
            )
            .bind(&cellname)
            .fetch_one(db.pool()),
        )
        .await
        .map_err(ApiError::query("Failed to fetch payload data"))?;
    info!(cellname = %cellname, total_records = stats.count, "no payload data found");

    Ok(HttpResponse::Ok().json(PayloadResponse::empty(cell, stats)))
}

#[derive(Debug, PartialEq, Serialize)]
struct DailyPayload {
    date: NaiveDate,
    payload: f64,
}

/// Sums the series per day. A cell listed more than once in `cells` yields
/// the same day several times.
fn daily(points: &[PayloadPoint]) -> Vec<DailyPayload> {
    let mut days: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for point in points {
        *days.entry(point.raw_date).or_default() += point.payload;
    }
    days.into_iter()
        .map(|(date, payload)| DailyPayload {
            date,
            payload: gigabytes(Some(payload)),
        })
        .collect()
}

fn encode_csv(days: &[DailyPayload]) -> anyhow::Result<Vec<u8>> {
    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    csv.write_record(["date", "payload"])?;
    for day in days {
        csv.serialize(day)?;
    }
    csv.into_inner().map_err(|e| anyhow!("{e}"))
}

/// File name for the CSV download, restricted to characters that are safe
/// inside a quoted header parameter.
fn attachment_name(cellname: &str) -> String {
    let name: String = cellname
        .chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect();
    format!("{name}-payload.csv")
}

#[get("/payload/cellname/{cellname}/csv")]
pub async fn series_csv(
    path: web::Path<String>,
    db: web::Data<Database>,
) -> Result<HttpResponse, ApiError> {
    let cellname = required(&path, "Missing cellname parameter")?;
    let (_, data) = load_series(&db, &cellname).await?;
    let body = encode_csv(&daily(&data)).map_err(ApiError::internal("Failed to encode payload"))?;

    Ok(HttpResponse::Ok()
        .content_type("text/csv")
        .insert_header((
            "content-disposition",
            format!("attachment; filename=\"{}\"", attachment_name(&cellname)),
        ))
        .body(body))
}

#[derive(Debug, FromRow)]
struct SummaryRow {
    cellname: String,
    day: Option<NaiveDate>,
    payload: Option<f64>,
}

#[derive(Debug, PartialEq, Serialize)]
struct SummaryPoint {
    date: String,
    payload: f64,
}

#[derive(Debug, Serialize)]
struct SiteSummary {
    site_id: String,
    cells: BTreeMap<String, Vec<SummaryPoint>>,
}

fn summarize(site_id: String, rows: Vec<SummaryRow>) -> SiteSummary {
    let mut cells: BTreeMap<String, Vec<SummaryPoint>> = BTreeMap::new();
    for row in rows {
        let Some(day) = row.day else {
            continue;
        };
        cells.entry(row.cellname).or_default().push(SummaryPoint {
            date: day.format(DISPLAY_DATE).to_string(),
            payload: row.payload.filter(|x| x.is_finite()).unwrap_or(0.0),
        });
    }
    SiteSummary { site_id, cells }
}

#[get("/payload/site/{site_id}")]
pub async fn site_summary(
    path: web::Path<String>,
    db: web::Data<Database>,
) -> Result<HttpResponse, ApiError> {
    let site_id = required(&path, "Site ID is required")?;
    let rows: Vec<SummaryRow> = db
        .timed(
            query_as(
                "select
                    p.Cellname as cellname,
                    cast(p.day as date) as day,
                    cast(p.Total_Payload_GB as double) as payload
                from kpi p
                join cells c on p.Cellname = c.Cellname
                where c.site_id = ?
                    and p.day >= date_sub(current_date, interval ? day)
                order by p.day desc, p.Cellname",
            )
            .bind(&site_id)
            .bind(SUMMARY_DAYS)
            .fetch_all(db.pool()),
        )
        .await
        .map_err(ApiError::query("Failed to fetch payload summary"))?;

    Ok(HttpResponse::Ok().json(summarize(site_id, rows)))
}

#[derive(Debug, Deserialize)]
pub struct NewPayload {
    cellname: Option<String>,
    day: Option<String>,
    payload_gb: Option<Value>,
}

#[derive(Debug, PartialEq, Serialize)]
struct ValidPayload {
    cellname: String,
    day: NaiveDate,
    payload_gb: f64,
}

impl NewPayload {
    fn validate(self) -> Result<ValidPayload, ApiError> {
        let missing = || {
            ApiError::bad_request(
                "Missing required fields",
                "cellname, day, and payload_gb are required",
            )
        };
        let cellname = self
            .cellname
            .map(|x| x.trim().to_owned())
            .filter(|x| !x.is_empty())
            .ok_or_else(missing)?;
        let day = self
            .day
            .filter(|x| !x.trim().is_empty())
            .ok_or_else(missing)?;
        let payload_gb = self.payload_gb.ok_or_else(missing)?;

        let day = NaiveDate::parse_from_str(day.trim(), INPUT_DATE).map_err(|_| {
            ApiError::bad_request("Invalid day", "day must be a date formatted as YYYY-MM-DD")
        })?;

        // the upload scripts send numbers as strings
        let payload_gb = match &payload_gb {
            Value::Number(x) => x.as_f64(),
            Value::String(x) => x.trim().parse().ok(),
            _ => None,
        }
        .filter(|x: &f64| x.is_finite() && *x >= 0.0)
        .ok_or_else(|| {
            ApiError::bad_request(
                "Invalid payload value",
                "payload_gb must be a non-negative number",
            )
        })?;

        Ok(ValidPayload {
            cellname,
            day,
            payload_gb,
        })
    }
}

#[post("/payload")]
pub async fn add(
    data: web::Json<NewPayload>,
    db: web::Data<Database>,
) -> Result<HttpResponse, ApiError> {
    let payload = data.into_inner().validate()?;
    let failed = "Failed to add payload data";

    if find_cell(&db, &payload.cellname)
        .await
        .map_err(ApiError::query(failed))?
        .is_none()
    {
        return Err(ApiError::bad_request(
            "Invalid cellname",
            "Cellname does not exist in cells table",
        ));
    }

    let result = db
        .timed(
            query(
                "insert into kpi (Cellname, day, Total_Payload_GB)
                values (?, ?, ?)
                on duplicate key update Total_Payload_GB = values(Total_Payload_GB)",
            )
            .bind(&payload.cellname)
            .bind(payload.day)
            .bind(payload.payload_gb)
            .execute(db.pool()),
        )
        .await
        .map_err(ApiError::query(failed))?;

    info!(
        cellname = %payload.cellname,
        day = %payload.day,
        payload_gb = payload.payload_gb,
        rows_affected = result.rows_affected(),
        "payload data added"
    );

    Ok(HttpResponse::Ok().json(json!({
        "message": "Payload data added successfully",
        "data": payload,
    })))
}

#[cfg(test)]
mod tests {
    use actix_web::{
        http::StatusCode,
        test::{call_service, init_service, read_body_json, TestRequest},
        App,
    };

    use super::*;
    use crate::db::tests::unreachable;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, INPUT_DATE).unwrap()
    }

    fn row(d: &str, payload: Option<f64>) -> PayloadRow {
        PayloadRow {
            day: Some(day(d)),
            payload,
            tech: Some("4G".to_owned()),
            band: Some("L1800".to_owned()),
            sector: Some(1),
        }
    }

    fn point(d: &str, payload: Option<f64>) -> PayloadPoint {
        PayloadPoint::from_row(row(d, payload)).unwrap()
    }

    fn cell() -> CellInfo {
        CellInfo {
            cellname: "BDG001_1_L1800".to_owned(),
            tech: Some("4G".to_owned()),
            band: Some("L1800".to_owned()),
            sector: Some(1),
        }
    }

    fn new(cellname: Option<&str>, d: Option<&str>, payload_gb: Option<Value>) -> NewPayload {
        NewPayload {
            cellname: cellname.map(str::to_owned),
            day: d.map(str::to_owned),
            payload_gb,
        }
    }

    #[test]
    fn point_formatting() {
        let formatted = point("2025-02-14", Some(12.3456));
        assert_eq!(formatted.date, "02/14/2025");
        assert_eq!(formatted.payload, 12.35);

        let json = serde_json::to_value(&formatted).unwrap();
        assert_eq!(json["raw_date"], "2025-02-14");

        assert_eq!(point("2025-02-14", None).payload, 0.0);
    }

    #[test]
    fn rows_without_day_are_dropped() {
        let undated = PayloadRow {
            day: None,
            ..row("2025-02-14", Some(3.0))
        };
        let data = points(vec![
            row("2025-02-13", Some(1.0)),
            undated,
            row("2025-02-15", Some(2.0)),
        ]);
        let dates: Vec<_> = data.iter().map(|x| x.date.as_str()).collect();
        assert_eq!(dates, ["02/13/2025", "02/15/2025"]);
    }

    #[test]
    fn attachment_name_is_header_safe() {
        assert_eq!(attachment_name("BDG001_1_L1800"), "BDG001_1_L1800-payload.csv");
        assert_eq!(
            attachment_name("a\"b;c\r\nd"),
            "a_b_c__d-payload.csv"
        );
        assert_eq!(attachment_name("sel ç"), "sel__-payload.csv");
    }

    #[test]
    fn found_response() {
        let data = vec![
            point("2025-02-14", Some(1.0)),
            point("2025-02-16", Some(2.0)),
        ];
        let json = serde_json::to_value(PayloadResponse::found(cell(), data)).unwrap();
        assert_eq!(json["message"], "Payload data retrieved successfully");
        assert_eq!(json["cell_info"]["cellname"], "BDG001_1_L1800");
        assert_eq!(json["date_range"]["earliest"], "02/14/2025");
        assert_eq!(json["date_range"]["latest"], "02/16/2025");
        assert!(json.get("debug_info").is_none());
    }

    #[test]
    fn empty_response() {
        let stats = KpiStats {
            count: 0,
            earliest: None,
            latest: None,
        };
        let json = serde_json::to_value(PayloadResponse::empty(cell(), stats)).unwrap();
        assert_eq!(json["message"], "No payload data available for this cell");
        assert_eq!(json["data"], Value::Array(Vec::new()));
        assert_eq!(json["debug_info"]["total_kpi_records"], 0);
        assert!(json["debug_info"]["date_range"]["earliest"].is_null());
        assert!(json.get("date_range").is_none());
    }

    #[test]
    fn daily_sums_duplicates() {
        let points: Vec<PayloadPoint> = vec![
            point("2025-02-15", Some(1.25)),
            point("2025-02-14", Some(1.0)),
            point("2025-02-14", Some(0.5)),
        ];
        assert_eq!(
            daily(&points),
            vec![
                DailyPayload {
                    date: day("2025-02-14"),
                    payload: 1.5
                },
                DailyPayload {
                    date: day("2025-02-15"),
                    payload: 1.25
                },
            ]
        );
    }

    #[test]
    fn csv_encoding() {
        let body = encode_csv(&[DailyPayload {
            date: day("2025-02-14"),
            payload: 1.5,
        }])
        .unwrap();
        assert_eq!(String::from_utf8(body).unwrap(), "date,payload\n2025-02-14,1.5\n");

        let body = encode_csv(&[]).unwrap();
        assert_eq!(String::from_utf8(body).unwrap(), "date,payload\n");
    }

    #[test]
    fn summary_groups_by_cell() {
        let rows = vec![
            SummaryRow {
                cellname: "B".to_owned(),
                day: Some(day("2025-02-16")),
                payload: Some(3.0),
            },
            SummaryRow {
                cellname: "A".to_owned(),
                day: Some(day("2025-02-16")),
                payload: None,
            },
            SummaryRow {
                cellname: "C".to_owned(),
                day: None,
                payload: Some(9.0),
            },
            SummaryRow {
                cellname: "B".to_owned(),
                day: Some(day("2025-02-15")),
                payload: Some(2.0),
            },
        ];
        let summary = summarize("BDG001".to_owned(), rows);
        assert_eq!(summary.cells.len(), 2);
        assert_eq!(summary.cells["A"][0].payload, 0.0);
        assert_eq!(
            summary.cells["B"],
            vec![
                SummaryPoint {
                    date: "02/16/2025".to_owned(),
                    payload: 3.0
                },
                SummaryPoint {
                    date: "02/15/2025".to_owned(),
                    payload: 2.0
                },
            ]
        );
    }

    #[test]
    fn validate_accepts_numbers_and_strings() {
        let valid = new(Some(" CELL1 "), Some("2025-02-14"), Some(json!(4.5)))
            .validate()
            .unwrap();
        assert_eq!(
            valid,
            ValidPayload {
                cellname: "CELL1".to_owned(),
                day: day("2025-02-14"),
                payload_gb: 4.5
            }
        );

        let valid = new(Some("CELL1"), Some("2025-02-14"), Some(json!("0")))
            .validate()
            .unwrap();
        assert_eq!(valid.payload_gb, 0.0);
    }

    #[test]
    fn validate_rejects() {
        let cases = [
            (new(None, Some("2025-02-14"), Some(json!(1))), "Missing required fields"),
            (new(Some(""), Some("2025-02-14"), Some(json!(1))), "Missing required fields"),
            (new(Some("CELL1"), None, Some(json!(1))), "Missing required fields"),
            (new(Some("CELL1"), Some("2025-02-14"), None), "Missing required fields"),
            (new(Some("CELL1"), Some("14/02/2025"), Some(json!(1))), "Invalid day"),
            (new(Some("CELL1"), Some("2025-02-14"), Some(json!(-1))), "Invalid payload value"),
            (new(Some("CELL1"), Some("2025-02-14"), Some(json!("lots"))), "Invalid payload value"),
            (new(Some("CELL1"), Some("2025-02-14"), Some(json!([1]))), "Invalid payload value"),
        ];
        for (input, expected) in cases {
            match input.validate() {
                Err(ApiError::BadRequest { error, .. }) => assert_eq!(error, expected),
                other => panic!("expected {expected}, got {other:?}"),
            }
        }
    }

    #[actix_web::test]
    async fn add_rejects_before_querying() {
        let app = init_service(
            App::new()
                .app_data(web::Data::new(unreachable()))
                .service(add),
        )
        .await;
        let req = TestRequest::post()
            .uri("/payload")
            .set_json(json!({ "cellname": "CELL1", "day": "2025-02-14" }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = read_body_json(resp).await;
        assert_eq!(body["error"], "Missing required fields");
        assert_eq!(body["message"], "cellname, day, and payload_gb are required");
    }
}
