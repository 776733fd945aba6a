//! Flight offers as returned by the flight-offers-search provider.
//!
//! Offers are kept as the raw JSON value so they can be handed back to the browser
//! untouched; the types here are read-only views over the handful of fields the
//! selection and display code needs.

use crate::airports::AirportDirectory;
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static HOURS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)H").unwrap());
static MINUTES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)M").unwrap());

const SEGMENT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlightOffer(Value);

#[derive(Debug, Clone, Copy)]
pub struct Itinerary<'a>(&'a Value);

#[derive(Debug, Clone, Copy)]
pub struct Segment<'a>(&'a Value);

/// Departure or arrival point of a segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub iata_code: Option<String>,
    pub at: Option<String>,
}

/// What the booking page shows for a chosen offer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferSummary {
    pub price_total: Option<String>,
    pub currency: Option<String>,
    pub departure: Option<Endpoint>,
    pub arrival: Option<Endpoint>,
    pub stops: usize,
    pub duration_hours: f64,
}

/// Hours in an ISO-8601 style duration such as `PT15H30M`. Only the hour and minute
/// components are read; anything unparsable counts as zero.
pub fn parse_duration(iso_duration: &str) -> f64 {
    let component = |re: &Regex| {
        re.captures(iso_duration)
            .and_then(|c| c[1].parse::<f64>().ok())
            .unwrap_or(0.0)
    };

    component(&HOURS_RE) + component(&MINUTES_RE) / 60.0
}

fn numeric(val: &Value) -> f64 {
    let n = match val {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };

    if n.is_finite() && n > 0.0 {
        n
    } else {
        0.0
    }
}

impl FlightOffer {
    pub fn new(value: Value) -> Self {
        FlightOffer(value)
    }

    /// Splits a provider `data` payload into offers. Anything other than an array
    /// yields no offers.
    pub fn list_from_value(value: Value) -> Vec<FlightOffer> {
        match value {
            Value::Array(items) => items.into_iter().map(FlightOffer).collect(),
            _ => Vec::new(),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// `price.total` as a number, zero when missing or malformed.
    pub fn price(&self) -> f64 {
        self.0
            .get("price")
            .and_then(|p| p.get("total"))
            .map(numeric)
            .unwrap_or(0.0)
    }

    pub fn price_text(&self) -> Option<String> {
        match self.0.get("price")?.get("total")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn currency(&self) -> Option<&str> {
        self.0.get("price")?.get("currency")?.as_str()
    }

    pub fn itineraries(&self) -> impl Iterator<Item = Itinerary<'_>> {
        self.0
            .get("itineraries")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(Itinerary)
    }

    pub fn total_duration_hours(&self) -> f64 {
        self.itineraries().map(|it| it.duration_hours()).sum()
    }

    pub fn total_stops(&self) -> usize {
        self.itineraries().map(|it| it.stops()).sum()
    }

    pub fn summary(&self) -> OfferSummary {
        let first = self.itineraries().next();

        OfferSummary {
            price_total: self.price_text(),
            currency: self.currency().map(str::to_string),
            departure: first
                .and_then(|it| it.segments().next())
                .and_then(|s| s.departure()),
            arrival: first
                .and_then(|it| it.segments().last())
                .and_then(|s| s.arrival()),
            stops: self.total_stops(),
            duration_hours: self.total_duration_hours(),
        }
    }
}

impl From<Value> for FlightOffer {
    fn from(value: Value) -> Self {
        FlightOffer(value)
    }
}

impl<'a> Itinerary<'a> {
    pub fn duration_text(&self) -> Option<&'a str> {
        let itinerary: &'a Value = self.0;
        itinerary.get("duration")?.as_str()
    }

    pub fn duration_hours(&self) -> f64 {
        self.duration_text().map(parse_duration).unwrap_or(0.0)
    }

    pub fn segments(&self) -> impl DoubleEndedIterator<Item = Segment<'a>> {
        let itinerary: &'a Value = self.0;
        itinerary
            .get("segments")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(Segment)
    }

    pub fn stops(&self) -> usize {
        self.segments().count().saturating_sub(1)
    }
}

fn endpoint(val: &Value) -> Option<Endpoint> {
    let Value::Object(map) = val else {
        return None;
    };

    let text = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);

    Some(Endpoint {
        iata_code: text("iataCode"),
        at: text("at"),
    })
}

impl<'a> Segment<'a> {
    pub fn departure(&self) -> Option<Endpoint> {
        endpoint(self.0.get("departure")?)
    }

    pub fn arrival(&self) -> Option<Endpoint> {
        endpoint(self.0.get("arrival")?)
    }
}

impl Endpoint {
    pub fn time(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(self.at.as_deref()?, SEGMENT_TIME_FORMAT).ok()
    }
}

/// Describes each connection of an itinerary as `"<airport label> - <h>h<m>m"`, the
/// time being spent on the ground between landing and the next take-off.
/// Connections with missing or inconsistent times are left out.
pub fn layovers(itinerary: Itinerary<'_>, airports: &AirportDirectory) -> Vec<String> {
    let segments: Vec<Segment<'_>> = itinerary.segments().collect();

    segments
        .windows(2)
        .filter_map(|pair| {
            let arrival = pair[0].arrival()?;
            let next_departure = pair[1].departure()?;

            let ground = next_departure.time()? - arrival.time()?;
            let minutes = ground.num_minutes();
            if minutes < 0 {
                return None;
            }

            let code = arrival.iata_code.as_deref().unwrap_or("???");
            Some(format!(
                "{} - {}h{}m",
                airports.label(code),
                minutes / 60,
                minutes % 60
            ))
        })
        .collect()
}
