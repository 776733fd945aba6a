//! Main web app module containing web routings to access API etc.

use crate::flight_api::{OfferSource, SearchError};
use actix_web::{get, http::StatusCode, post, web, HttpResponse, Responder, ResponseError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use trip_planner_shared::{
    airports::AirportDirectory,
    offers::{layovers, FlightOffer, OfferSummary},
    queries::{Date, FlightSearchQuery, QueryError, TripPlan},
    selector::select_best,
};

pub struct AppState {
    pub offers: Box<dyn OfferSource>,
    pub airports: AirportDirectory,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Flight search failed")]
    SearchFailed(#[from] SearchError),
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::SearchFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ApiError::SearchFailed(err) = self {
            log::error!("Flight API error: {}", err);
        }

        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightSearchParams {
    origin: Option<String>,
    destination: Option<String>,
    departure_date: Option<String>,
    adults: Option<u32>,
    max: Option<u32>,
}

impl FlightSearchParams {
    fn to_query(&self) -> Result<FlightSearchQuery, QueryError> {
        FlightSearchQuery::from_params(
            self.origin.as_deref(),
            self.destination.as_deref(),
            self.departure_date.as_deref(),
            self.adults,
            self.max,
        )
    }
}

#[derive(Serialize)]
struct BestOfferResponse<'a> {
    data: Option<&'a FlightOffer>,
    summary: Option<OfferSummary>,
    layovers: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TripLegResponse {
    origin: String,
    destination: String,
    departure_date: Date,
    offer: Option<FlightOffer>,
    summary: Option<OfferSummary>,
}

impl<'a> BestOfferResponse<'a> {
    fn new(best: Option<&'a FlightOffer>, airports: &AirportDirectory) -> Self {
        BestOfferResponse {
            data: best,
            summary: best.map(FlightOffer::summary),
            layovers: best
                .map(|offer| {
                    offer
                        .itineraries()
                        .flat_map(|it| layovers(it, airports))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// Registers the API routes and the JSON error handling for malformed requests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::QueryConfig::default()
            .error_handler(|err, _| ApiError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::JsonConfig::default()
            .error_handler(|err, _| ApiError::BadRequest(err.to_string()).into()),
    )
    .service(health)
    .service(best_flight)
    .service(flights)
    .service(best_trip);
}

#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().body("ok")
}

/// Proxies a flight search to the offers provider and returns every offer found
#[get("/api/flights")]
pub async fn flights(
    state: web::Data<AppState>,
    params: web::Query<FlightSearchParams>,
) -> Result<HttpResponse, ApiError> {
    let query = params.to_query()?;
    let offers = state.offers.search(&query).await?;

    Ok(HttpResponse::Ok().json(json!({ "data": offers })))
}

#[get("/api/flights/best")]
pub async fn best_flight(
    state: web::Data<AppState>,
    params: web::Query<FlightSearchParams>,
) -> Result<HttpResponse, ApiError> {
    let query = params.to_query()?;
    let offers = state.offers.search(&query).await?;

    Ok(HttpResponse::Ok().json(BestOfferResponse::new(select_best(&offers), &state.airports)))
}

/// Best offer for every leg of a multi-city trip, legs searched one after another.
#[post("/api/trips/best")]
pub async fn best_trip(
    state: web::Data<AppState>,
    plan: web::Json<TripPlan>,
) -> Result<HttpResponse, ApiError> {
    let queries = plan.leg_queries()?;
    let mut legs = Vec::with_capacity(queries.len());

    for query in queries {
        let offers = state.offers.search(&query).await?;
        let best = select_best(&offers).cloned();

        legs.push(TripLegResponse {
            summary: best.as_ref().map(FlightOffer::summary),
            offer: best,
            origin: query.origin,
            destination: query.destination,
            departure_date: query.departure_date,
        });
    }

    Ok(HttpResponse::Ok().json(json!({ "data": legs })))
}

#[cfg(test)]
mod web_app_tests {
    use super::{configure, AppState};
    use crate::flight_api::{OfferSource, SearchError};
    use actix_web::{http::StatusCode, test, web, App};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};
    use trip_planner_shared::{
        airports::{Airport, AirportDirectory},
        offers::FlightOffer,
        queries::FlightSearchQuery,
    };

    struct StubSource {
        offers: Vec<FlightOffer>,
        seen: Arc<Mutex<Vec<FlightSearchQuery>>>,
    }

    struct FailingSource;

    #[async_trait::async_trait]
    impl OfferSource for StubSource {
        async fn search(&self, query: &FlightSearchQuery) -> Result<Vec<FlightOffer>, SearchError> {
            self.seen.lock().unwrap().push(query.clone());
            Ok(self.offers.clone())
        }
    }

    #[async_trait::async_trait]
    impl OfferSource for FailingSource {
        async fn search(&self, _: &FlightSearchQuery) -> Result<Vec<FlightOffer>, SearchError> {
            Err(SearchError::BadResponse(500))
        }
    }

    fn stub_offers() -> Vec<FlightOffer> {
        vec![
            FlightOffer::new(json!({
                "id": "slow",
                "price": { "currency": "EUR", "total": "600.00" },
                "itineraries": [{ "duration": "PT10H", "segments": [
                    { "departure": { "iataCode": "LIS", "at": "2024-11-03T08:00:00" },
                      "arrival": { "iataCode": "GRU", "at": "2024-11-03T18:00:00" } }
                ]}]
            })),
            FlightOffer::new(json!({
                "id": "fast",
                "price": { "currency": "EUR", "total": "650.00" },
                "itineraries": [{ "duration": "PT8H", "segments": [
                    { "departure": { "iataCode": "LIS", "at": "2024-11-03T10:00:00" },
                      "arrival": { "iataCode": "GRU", "at": "2024-11-03T18:00:00" } }
                ]}]
            })),
        ]
    }

    fn connecting_offer() -> FlightOffer {
        FlightOffer::new(json!({
            "id": "via-mad",
            "price": { "total": "700.00" },
            "itineraries": [{ "duration": "PT12H", "segments": [
                { "departure": { "iataCode": "LIS", "at": "2024-11-03T06:00:00" },
                  "arrival": { "iataCode": "MAD", "at": "2024-11-03T07:15:00" } },
                { "departure": { "iataCode": "MAD", "at": "2024-11-03T09:00:00" },
                  "arrival": { "iataCode": "LIM", "at": "2024-11-03T18:00:00" } }
            ]}]
        }))
    }

    fn state(offers: Vec<FlightOffer>) -> web::Data<AppState> {
        recording_state(offers).0
    }

    fn recording_state(
        offers: Vec<FlightOffer>,
    ) -> (web::Data<AppState>, Arc<Mutex<Vec<FlightSearchQuery>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let data = web::Data::new(AppState {
            offers: Box::new(StubSource {
                offers,
                seen: seen.clone(),
            }),
            airports: AirportDirectory::from_airports(vec![Airport {
                code: "MAD".to_string(),
                city: "Madrid".to_string(),
                name: None,
                country: None,
            }]),
        });

        (data, seen)
    }

    #[actix_web::test]
    async fn test_flights_proxy_returns_all_offers() {
        let app = test::init_service(
            App::new()
                .app_data(state(stub_offers()))
                .configure(configure),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/api/flights?origin=LIS&destination=GRU&departureDate=2024-11-03")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["id"], "slow");
        assert_eq!(data[1]["price"]["total"], "650.00");
    }

    #[actix_web::test]
    async fn test_flights_passes_defaults_to_source() {
        let (data, seen) = recording_state(vec![]);
        let app = test::init_service(App::new().app_data(data).configure(configure)).await;
        let req = test::TestRequest::get()
            .uri("/api/flights?origin=lis&destination=gru&departureDate=2024-11-03&max=5")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "data": [] }));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].origin, "LIS");
        assert_eq!(seen[0].destination, "GRU");
        assert_eq!(seen[0].adults, 1);
        assert_eq!(seen[0].max, 5);
    }

    #[actix_web::test]
    async fn test_flights_missing_params() {
        let app = test::init_service(
            App::new()
                .app_data(state(stub_offers()))
                .configure(configure),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/api/flights?origin=LIS&destination=GRU")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(
            body,
            json!({ "error": "origin, destination and departureDate are required" })
        );
    }

    #[actix_web::test]
    async fn test_flights_malformed_params() {
        let app = test::init_service(
            App::new()
                .app_data(state(stub_offers()))
                .configure(configure),
        )
        .await;

        for uri in [
            "/api/flights?origin=LIS&destination=GRU&departureDate=2024-11-03&adults=many",
            "/api/flights?origin=LIS&destination=GRU&departureDate=tomorrow",
        ] {
            let resp =
                test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

            let body: Value = test::read_body_json(resp).await;
            assert!(body["error"].is_string());
        }
    }

    #[actix_web::test]
    async fn test_flights_upstream_failure() {
        let data = web::Data::new(AppState {
            offers: Box::new(FailingSource),
            airports: AirportDirectory::new(),
        });
        let app = test::init_service(App::new().app_data(data).configure(configure)).await;
        let req = test::TestRequest::get()
            .uri("/api/flights?origin=LIS&destination=GRU&departureDate=2024-11-03")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "error": "Flight search failed" }));
    }

    #[actix_web::test]
    async fn test_best_flight() {
        let app = test::init_service(
            App::new()
                .app_data(state(stub_offers()))
                .configure(configure),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/api/flights/best?origin=LIS&destination=GRU&departureDate=2024-11-03")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["data"]["id"], "fast");
        assert_eq!(body["summary"]["priceTotal"], "650.00");
        assert_eq!(body["summary"]["departure"]["at"], "2024-11-03T10:00:00");
        assert_eq!(body["layovers"], json!([]));
    }

    #[actix_web::test]
    async fn test_best_flight_layovers() {
        let app = test::init_service(
            App::new()
                .app_data(state(vec![connecting_offer()]))
                .configure(configure),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/api/flights/best?origin=LIS&destination=LIM&departureDate=2024-11-03")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["data"]["id"], "via-mad");
        assert_eq!(body["layovers"], json!(["MAD - Madrid - 1h45m"]));
    }

    #[actix_web::test]
    async fn test_best_flight_no_offers() {
        let app = test::init_service(App::new().app_data(state(vec![])).configure(configure)).await;
        let req = test::TestRequest::get()
            .uri("/api/flights/best?origin=LIS&destination=GRU&departureDate=2024-11-03")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body, json!({ "data": null, "summary": null, "layovers": [] }));
    }

    #[actix_web::test]
    async fn test_best_trip() {
        let app = test::init_service(
            App::new()
                .app_data(state(stub_offers()))
                .configure(configure),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/api/trips/best")
            .set_json(json!({
                "startDate": "2024-11-03",
                "legs": [
                    { "origin": "LIS", "destination": "GRU", "dayOffset": 0 },
                    { "origin": "GRU", "destination": "LIS", "dayOffset": 10 }
                ]
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        let legs = body["data"].as_array().unwrap();
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0]["departureDate"], "2024-11-03");
        assert_eq!(legs[1]["departureDate"], "2024-11-13");
        assert_eq!(legs[1]["origin"], "GRU");
        assert_eq!(legs[0]["offer"]["id"], "fast");
        assert_eq!(legs[0]["summary"]["stops"], 0);
    }

    #[actix_web::test]
    async fn test_best_trip_without_legs() {
        let app = test::init_service(
            App::new()
                .app_data(state(stub_offers()))
                .configure(configure),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/api/trips/best")
            .set_json(json!({ "startDate": "2024-11-03", "legs": [] }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_health() {
        let app = test::init_service(App::new().app_data(state(vec![])).configure(configure)).await;
        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;

        assert!(resp.status().is_success());
    }
}
