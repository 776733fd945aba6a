//! Flight API module to communicate to API.
//!
//! Handles communication with the flight offers provider, right now the Amadeus Self-Service
//! flight-offers-search API. A CSV backed mock source stands in when no credentials are
//! configured.

use crate::config::AmadeusConfig;
use chrono::{Duration as ChronoDuration, NaiveDateTime, NaiveTime};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    io,
    path::Path,
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::sync::Mutex;
use trip_planner_shared::{
    offers::{parse_duration, FlightOffer},
    queries::FlightSearchQuery,
};

const AMADEUS_TOKEN_PATH: &str = "/v1/security/oauth2/token";
const AMADEUS_FLIGHT_OFFERS_PATH: &str = "/v2/shopping/flight-offers";
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

const MOCK_CURRENCY: &str = "EUR";
const MOCK_LAYOVER_MINUTES: i64 = 60;
const MOCK_MAX_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("No flight API credentials configured.")]
    NoCredentials,
    #[error("Error deserializing JSON response from API.")]
    ResponseConversionErr(serde_json::Error, String),
    #[error("Error from reqwest: {0}")]
    ReqwestErr(#[from] reqwest::Error),
    #[error("Response format is unexpected, cannot deserialize: {0}")]
    ResponseUnexpectedFormatErr(String),
    #[error("Rate limit for API exceeded")]
    RateLimitExceeded,
    #[error("Bad response from API: {0}")]
    BadResponse(u16),
    #[error("Mock offer data unavailable: {0}")]
    MockData(String),
}

/// Anything able to produce flight offers for a one-way search.
#[async_trait::async_trait]
pub trait OfferSource: Send + Sync {
    async fn search(&self, query: &FlightSearchQuery) -> Result<Vec<FlightOffer>, SearchError>;
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

pub struct AmadeusApiQuery {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    max_retries: u32,
    retry_delay: Duration,
    token: Mutex<Option<AccessToken>>,
}

/// Offers read from a CSV file, replayed for whatever route and date is asked for.
pub struct MockOfferSource {
    rows: Vec<MockOfferRow>,
}

#[derive(Debug, Clone, Deserialize)]
struct MockOfferRow {
    price: String,
    duration: String,
    carrier: String,
    flight_number: String,
    departure_time: String,
    via: Option<String>,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_EXPIRY_MARGIN < self.expires_at
    }
}

fn parse_json(text: String) -> Result<Value, SearchError> {
    serde_json::from_str(&text).map_err(|e| SearchError::ResponseConversionErr(e, text))
}

/// Pulls the offer list out of a flight-offers response. A `data` member that is not
/// an array is treated as no offers.
fn offers_from_response(response: Value) -> Result<Vec<FlightOffer>, SearchError> {
    let Value::Object(mut body) = response else {
        return Err(SearchError::ResponseUnexpectedFormatErr(
            "Flight offers response is not a JSON object".to_string(),
        ));
    };

    match body.remove("data") {
        Some(data @ Value::Array(_)) => Ok(FlightOffer::list_from_value(data)),
        _ => {
            log::warn!("Flight offers response has no data array, treating as empty");
            Ok(Vec::new())
        }
    }
}

impl AmadeusApiQuery {
    pub fn new(config: &AmadeusConfig) -> Result<Self, SearchError> {
        let (client_id, client_secret) = config.credentials().ok_or(SearchError::NoCredentials)?;

        Ok(AmadeusApiQuery {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, SearchError> {
        let mut token = self.token.lock().await;

        if let Some(t) = token.as_ref().filter(|t| t.is_fresh()) {
            return Ok(t.value.clone());
        }

        let fresh = self.request_token().await?;
        let value = fresh.value.clone();
        *token = Some(fresh);

        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn request_token(&self) -> Result<AccessToken, SearchError> {
        log::debug!("Requesting new Amadeus access token");

        let resp = self
            .client
            .post(format!("{}{}", self.base_url, AMADEUS_TOKEN_PATH))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            log::error!("Amadeus token request failed ({}): {}", status, text);
            return Err(SearchError::BadResponse(status.as_u16()));
        }

        let token: TokenResponse = serde_json::from_str(&text)
            .map_err(|e| SearchError::ResponseConversionErr(e, text.clone()))?;

        Ok(AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }

    pub async fn get_flight_offers(&self, query: &FlightSearchQuery) -> Result<Value, SearchError> {
        let token = self.access_token().await?;

        let resp = self
            .client
            .get(format!("{}{}", self.base_url, AMADEUS_FLIGHT_OFFERS_PATH))
            .bearer_auth(token)
            .query(&[
                ("originLocationCode", query.origin.clone()),
                ("destinationLocationCode", query.destination.clone()),
                ("departureDate", query.departure_date_param()),
                ("adults", query.adults.to_string()),
                ("max", query.max.to_string()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchError::RateLimitExceeded);
        }

        let text = resp.text().await?;
        if !status.is_success() {
            log::error!("Amadeus error ({}): {}", status, text);
            if status == StatusCode::UNAUTHORIZED {
                self.invalidate_token().await;
            }
            return Err(SearchError::BadResponse(status.as_u16()));
        }

        parse_json(text)
    }

    async fn get_flight_offers_retry(
        &self,
        query: &FlightSearchQuery,
    ) -> Result<Value, SearchError> {
        let mut attempt = 0;

        loop {
            let this_resp = self.get_flight_offers(query).await;

            match this_resp {
                Err(SearchError::RateLimitExceeded) if attempt < self.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "Flight API rate limit hit, retry {}/{} after {:?}",
                        attempt,
                        self.max_retries,
                        self.retry_delay
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                _ => break this_resp,
            };
        }
    }
}

#[async_trait::async_trait]
impl OfferSource for AmadeusApiQuery {
    async fn search(&self, query: &FlightSearchQuery) -> Result<Vec<FlightOffer>, SearchError> {
        let resp = self.get_flight_offers_retry(query).await?;
        let offers = offers_from_response(resp)?;

        log::info!(
            "{} offers for {} -> {} on {}",
            offers.len(),
            query.origin,
            query.destination,
            query.departure_date
        );
        Ok(offers)
    }
}

impl MockOfferSource {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SearchError> {
        let rdr = csv::Reader::from_path(path.as_ref())
            .map_err(|e| SearchError::MockData(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_csv(rdr)
    }

    pub fn from_reader(reader: impl io::Read) -> Result<Self, SearchError> {
        Self::from_csv(csv::Reader::from_reader(reader))
    }

    fn from_csv<R: io::Read>(mut rdr: csv::Reader<R>) -> Result<Self, SearchError> {
        let rows = rdr
            .deserialize()
            .collect::<Result<Vec<MockOfferRow>, _>>()
            .map_err(|e| SearchError::MockData(e.to_string()))?;

        for row in &rows {
            row.total_minutes()?;
            row.parse_departure_time()?;
        }

        Ok(MockOfferSource { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn endpoint(iata: &str, at: NaiveDateTime) -> Value {
    json!({ "iataCode": iata, "at": at.format("%Y-%m-%dT%H:%M:%S").to_string() })
}

fn mock_segment(
    carrier: &str,
    number: &str,
    (from, departure): (&str, NaiveDateTime),
    (to, arrival): (&str, NaiveDateTime),
) -> Value {
    json!({
        "departure": endpoint(from, departure),
        "arrival": endpoint(to, arrival),
        "carrierCode": carrier,
        "number": number,
        "numberOfStops": 0
    })
}

fn add_minutes(start: NaiveDateTime, minutes: i64) -> Result<NaiveDateTime, SearchError> {
    start
        .checked_add_signed(ChronoDuration::minutes(minutes))
        .ok_or_else(|| {
            SearchError::MockData(format!("{} + {} min is out of range", start, minutes))
        })
}

impl MockOfferRow {
    /// Flight time in minutes, limited to a week.
    fn total_minutes(&self) -> Result<i64, SearchError> {
        let minutes = (parse_duration(&self.duration) * 60.0).round();
        if !(0.0..=MOCK_MAX_MINUTES as f64).contains(&minutes) {
            return Err(SearchError::MockData(format!(
                "duration '{}' is out of range",
                self.duration
            )));
        }

        Ok(minutes as i64)
    }

    fn parse_departure_time(&self) -> Result<NaiveTime, SearchError> {
        NaiveTime::parse_from_str(&self.departure_time, "%H:%M").map_err(|_| {
            SearchError::MockData(format!("bad departure time '{}'", self.departure_time))
        })
    }

    fn to_offer(&self, id: usize, query: &FlightSearchQuery) -> Result<FlightOffer, SearchError> {
        let departure = query.departure_date.and_time(self.parse_departure_time()?);
        let total_minutes = self.total_minutes()?;
        let arrival = add_minutes(departure, total_minutes)?;

        let segments = match self.via.as_deref().filter(|v| !v.is_empty()) {
            Some(via) if total_minutes > MOCK_LAYOVER_MINUTES => {
                let first_leg = (total_minutes - MOCK_LAYOVER_MINUTES) / 2;
                let via_arrival = add_minutes(departure, first_leg)?;
                let via_departure = add_minutes(via_arrival, MOCK_LAYOVER_MINUTES)?;
                vec![
                    mock_segment(
                        &self.carrier,
                        &self.flight_number,
                        (query.origin.as_str(), departure),
                        (via, via_arrival),
                    ),
                    mock_segment(
                        &self.carrier,
                        &format!("{}1", self.flight_number),
                        (via, via_departure),
                        (query.destination.as_str(), arrival),
                    ),
                ]
            }
            _ => vec![mock_segment(
                &self.carrier,
                &self.flight_number,
                (query.origin.as_str(), departure),
                (query.destination.as_str(), arrival),
            )],
        };

        Ok(FlightOffer::new(json!({
            "type": "flight-offer",
            "id": id.to_string(),
            "source": "MOCK",
            "price": { "currency": MOCK_CURRENCY, "total": self.price, "grandTotal": self.price },
            "itineraries": [{ "duration": self.duration, "segments": segments }]
        })))
    }
}

#[async_trait::async_trait]
impl OfferSource for MockOfferSource {
    async fn search(&self, query: &FlightSearchQuery) -> Result<Vec<FlightOffer>, SearchError> {
        self.rows
            .iter()
            .take(query.max as usize)
            .enumerate()
            .map(|(idx, row)| row.to_offer(idx + 1, query))
            .collect()
    }
}
