//! Picks the single offer shown to the traveller for a route and date.
//!
//! The rule is a two stage filter: stay within a flat price tolerance of the cheapest
//! offer and never take more stops than it has, then prefer the shortest travel time.

use crate::offers::FlightOffer;
use serde_json::Value;

/// Extra amount, in the offers' own currency, a traveller is assumed to accept over
/// the cheapest fare.
pub const PRICE_TOLERANCE: f64 = 200.0;

/// Per-offer figures the selection works on, borrowed for the duration of one call.
#[derive(Debug, Clone, Copy)]
pub struct EnrichedOffer<'a> {
    pub offer: &'a FlightOffer,
    pub price: f64,
    pub total_duration_hours: f64,
    pub total_stops: usize,
}

impl<'a> EnrichedOffer<'a> {
    pub fn new(offer: &'a FlightOffer) -> Self {
        EnrichedOffer {
            offer,
            price: offer.price(),
            total_duration_hours: offer.total_duration_hours(),
            total_stops: offer.total_stops(),
        }
    }
}

/// Returns the best offer of `offers`, or `None` when there are none.
///
/// The cheapest offer (first one on ties) sets the baseline. Offers costing at most
/// [`PRICE_TOLERANCE`] more and having no more stops are eligible, and the eligible
/// offer with the shortest total duration wins, earlier offers winning ties.
pub fn select_best(offers: &[FlightOffer]) -> Option<&FlightOffer> {
    let enriched: Vec<EnrichedOffer<'_>> = offers.iter().map(EnrichedOffer::new).collect();

    let cheapest = enriched
        .iter()
        .copied()
        .reduce(|best, e| if e.price < best.price { e } else { best })?;

    let max_allowed_price = cheapest.price + PRICE_TOLERANCE;

    enriched
        .iter()
        .filter(|e| e.price <= max_allowed_price && e.total_stops <= cheapest.total_stops)
        .min_by(|a, b| a.total_duration_hours.total_cmp(&b.total_duration_hours))
        .map(|e| e.offer)
        .or(Some(cheapest.offer))
}

/// Same selection over an untyped JSON payload. Anything that is not an array
/// selects nothing.
pub fn select_best_value(offers: &Value) -> Option<&Value> {
    let Value::Array(items) = offers else {
        return None;
    };

    let offers: Vec<FlightOffer> = items.iter().cloned().map(FlightOffer::new).collect();
    let best = select_best(&offers)?;
    let idx = offers.iter().position(|o| std::ptr::eq(o, best))?;

    items.get(idx)
}
