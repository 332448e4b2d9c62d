use actix_cors::Cors;
use actix_web::{get, routes, web, HttpResponse};
use serde_json::json;

use crate::{cells, dimensions, error::ApiError, kabupaten, payload, towers};

#[get("/test")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "message": "Server is running" }))
}

#[routes]
#[get("")]
#[get("/")]
async fn index() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "message": "Tower API is working" }))
}

/// The dashboard is served from another origin.
pub fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(["GET", "POST"])
        .allow_any_header()
        .max_age(3600)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    let json = web::JsonConfig::default().error_handler(|err, _| {
        ApiError::bad_request("Invalid JSON body", err.to_string()).into()
    });

    cfg.app_data(json).service(health).service(
        web::scope("/api")
            .service(index)
            .service(towers::list)
            .service(towers::detail)
            .service(towers::tower_coverage)
            .service(towers::nearby_towers)
            .service(dimensions::list)
            .service(kabupaten::list)
            .service(kabupaten::towers)
            .service(payload::series)
            .service(payload::series_csv)
            .service(payload::site_summary)
            .service(payload::add)
            .service(cells::details),
    );
}

#[cfg(test)]
mod tests {
    use actix_web::{
        http::{header, Method, StatusCode},
        test::{call_service, init_service, read_body, read_body_json, TestRequest},
        App,
    };
    use serde_json::Value;

    use super::*;
    use crate::db::tests::unreachable;

    macro_rules! app {
        () => {
            init_service(
                App::new()
                    .app_data(web::Data::new(unreachable()))
                    .wrap(cors())
                    .configure(configure),
            )
            .await
        };
    }

    async fn get(uri: &str) -> (StatusCode, Option<Value>) {
        let app = app!();
        let resp = call_service(&app, TestRequest::get().uri(uri).to_request()).await;
        let status = resp.status();
        let body = read_body(resp).await;
        (status, serde_json::from_slice(&body).ok())
    }

    #[actix_web::test]
    async fn health_check() {
        let (status, body) = get("/test").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.unwrap()["message"], "Server is running");
    }

    #[actix_web::test]
    async fn api_index() {
        for uri in ["/api", "/api/"] {
            let (status, body) = get(uri).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert_eq!(body.unwrap()["message"], "Tower API is working");
        }
    }

    #[actix_web::test]
    async fn legacy_cell_routes() {
        for uri in ["/api/cells", "/api/cells/site/BDG001"] {
            let (status, _) = get(uri).await;
            // routed to the tower handlers, which time out on the dead pool
            assert_ne!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(status, StatusCode::GATEWAY_TIMEOUT, "{uri}");
        }
    }

    #[actix_web::test]
    async fn cors_preflight() {
        let app = app!();
        let req = TestRequest::default()
            .method(Method::OPTIONS)
            .uri("/api/towers/BDG001")
            .insert_header((header::ORIGIN, "http://localhost:5173"))
            .insert_header((header::ACCESS_CONTROL_REQUEST_METHOD, "GET"))
            .to_request();
        let resp = call_service(&app, req).await;
        assert!(resp.status().is_success(), "{}", resp.status());
        assert!(resp
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[actix_web::test]
    async fn cors_headers_on_responses() {
        let app = app!();
        let req = TestRequest::get()
            .uri("/test")
            .insert_header((header::ORIGIN, "http://localhost:5173"))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[actix_web::test]
    async fn malformed_json() {
        let app = app!();
        let req = TestRequest::post()
            .uri("/api/payload")
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["error"], "Invalid JSON body");
    }

    #[actix_web::test]
    async fn unknown_route() {
        let (status, _) = get("/api/nope/nope/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
