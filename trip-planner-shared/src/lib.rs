pub mod airports;
pub mod offers;
pub mod selector;

pub mod queries {
    use chrono::{Days, NaiveDate};
    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    pub type Date = NaiveDate;

    pub const DEFAULT_ADULTS: u32 = 1;
    pub const DEFAULT_MAX_OFFERS: u32 = 10;
    pub const MAX_ADULTS: u32 = 9;
    pub const MAX_OFFERS_LIMIT: u32 = 250;

    #[derive(Debug, Error, PartialEq, Eq)]
    pub enum QueryError {
        #[error("origin, destination and departureDate are required")]
        MissingFields,
        #[error("'{0}' is not a valid IATA location code")]
        InvalidLocation(String),
        #[error("'{0}' is not a valid date, expected YYYY-MM-DD")]
        InvalidDate(String),
        #[error("adults must be between 1 and 9, got {0}")]
        InvalidAdults(u32),
        #[error("max must be between 1 and 250, got {0}")]
        InvalidMax(u32),
        #[error("Trip has no legs.")]
        NoLegs,
        #[error("Day offset {0} is outside the supported calendar range")]
        DateOverflow(i64),
    }

    /// A one-way flight search for a single route on a single day, as sent to the
    /// flight-offers provider.
    #[derive(Debug, Eq, PartialEq, Hash, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct FlightSearchQuery {
        pub origin: String,
        pub destination: String,
        pub departure_date: Date,
        pub adults: u32,
        pub max: u32,
    }

    fn location_code(raw: &str) -> Result<String, QueryError> {
        let code = raw.trim().to_ascii_uppercase();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(code)
        } else {
            Err(QueryError::InvalidLocation(raw.to_string()))
        }
    }

    fn present(field: Option<&str>) -> Option<&str> {
        field.map(str::trim).filter(|s| !s.is_empty())
    }

    impl FlightSearchQuery {
        pub fn new(
            origin: &str,
            destination: &str,
            departure_date: Date,
        ) -> Result<FlightSearchQuery, QueryError> {
            Ok(FlightSearchQuery {
                origin: location_code(origin)?,
                destination: location_code(destination)?,
                departure_date,
                adults: DEFAULT_ADULTS,
                max: DEFAULT_MAX_OFFERS,
            })
        }

        /// Builds a query out of loosely typed request parameters. Blank strings count as
        /// missing, and `adults`/`max` fall back to their defaults when absent.
        pub fn from_params(
            origin: Option<&str>,
            destination: Option<&str>,
            departure_date: Option<&str>,
            adults: Option<u32>,
            max: Option<u32>,
        ) -> Result<FlightSearchQuery, QueryError> {
            let (Some(origin), Some(destination), Some(date)) = (
                present(origin),
                present(destination),
                present(departure_date),
            ) else {
                return Err(QueryError::MissingFields);
            };

            let date = Date::parse_from_str(date, "%Y-%m-%d")
                .map_err(|_| QueryError::InvalidDate(date.to_string()))?;

            FlightSearchQuery::new(origin, destination, date)?
                .with_adults(adults.unwrap_or(DEFAULT_ADULTS))?
                .with_max(max.unwrap_or(DEFAULT_MAX_OFFERS))
        }

        pub fn with_adults(mut self, adults: u32) -> Result<Self, QueryError> {
            if !(1..=MAX_ADULTS).contains(&adults) {
                return Err(QueryError::InvalidAdults(adults));
            }
            self.adults = adults;
            Ok(self)
        }

        pub fn with_max(mut self, max: u32) -> Result<Self, QueryError> {
            if !(1..=MAX_OFFERS_LIMIT).contains(&max) {
                return Err(QueryError::InvalidMax(max));
            }
            self.max = max;
            Ok(self)
        }

        /// Date formatted the way the provider expects it
        pub fn departure_date_param(&self) -> String {
            self.departure_date.format("%Y-%m-%d").to_string()
        }
    }

    /// One leg of a multi-city trip, flown `day_offset` days after the trip start.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TripLeg {
        pub origin: String,
        pub destination: String,
        #[serde(default)]
        pub day_offset: i64,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TripPlan {
        pub start_date: Date,
        pub legs: Vec<TripLeg>,
        #[serde(default)]
        pub adults: Option<u32>,
        #[serde(default)]
        pub max: Option<u32>,
    }

    impl TripLeg {
        pub fn departure_date(&self, start: Date) -> Result<Date, QueryError> {
            let days = Days::new(self.day_offset.unsigned_abs());
            let date = if self.day_offset >= 0 {
                start.checked_add_days(days)
            } else {
                start.checked_sub_days(days)
            };

            date.ok_or(QueryError::DateOverflow(self.day_offset))
        }
    }

    impl TripPlan {
        /// Expands the plan into one search per leg, in leg order.
        pub fn leg_queries(&self) -> Result<Vec<FlightSearchQuery>, QueryError> {
            if self.legs.is_empty() {
                return Err(QueryError::NoLegs);
            }

            self.legs
                .iter()
                .map(|leg| {
                    FlightSearchQuery::new(
                        &leg.origin,
                        &leg.destination,
                        leg.departure_date(self.start_date)?,
                    )?
                    .with_adults(self.adults.unwrap_or(DEFAULT_ADULTS))?
                    .with_max(self.max.unwrap_or(DEFAULT_MAX_OFFERS))
                })
                .collect()
        }
    }
}
