//! Airport directory used to turn IATA codes into human readable labels.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Airport {
    pub code: String,
    pub city: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// Lookup table keyed by upper-cased IATA code. When a code appears twice the later
/// entry wins.
#[derive(Debug, Clone, Default)]
pub struct AirportDirectory {
    airports: HashMap<String, Airport>,
}

impl AirportDirectory {
    pub fn new() -> Self {
        AirportDirectory {
            airports: HashMap::new(),
        }
    }

    pub fn from_airports(airports: impl IntoIterator<Item = Airport>) -> Self {
        let airports = airports
            .into_iter()
            .map(|mut a| {
                a.code.make_ascii_uppercase();
                (a.code.clone(), a)
            })
            .collect();

        AirportDirectory { airports }
    }

    /// Parses the site's `airports.json`, a plain array of airport objects.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let airports: Vec<Airport> = serde_json::from_str(json)?;
        Ok(Self::from_airports(airports))
    }

    pub fn get(&self, code: &str) -> Option<&Airport> {
        self.airports.get(&code.to_ascii_uppercase())
    }

    pub fn label(&self, code: &str) -> String {
        let key = code.to_ascii_uppercase();
        match self.airports.get(&key) {
            Some(airport) => format!("{} - {}", airport.code, airport.city),
            None => format!("{} - Unknown", key),
        }
    }

    pub fn len(&self) -> usize {
        self.airports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.airports.is_empty()
    }
}
