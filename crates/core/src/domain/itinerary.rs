//! Itinerary legs. Each kind lives in its own collection scoped to a trip and is
//! only ever written as part of a trip write.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItineraryItemId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItineraryKind {
    Flight,
    Bus,
    Train,
    Cab,
}

impl ItineraryKind {
    pub const ALL: [ItineraryKind; 4] = [Self::Flight, Self::Bus, Self::Train, Self::Cab];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flight => "flight",
            Self::Bus => "bus",
            Self::Train => "train",
            Self::Cab => "cab",
        }
    }

    pub fn supports_return_date(&self) -> bool {
        matches!(self, Self::Flight)
    }
}

impl fmt::Display for ItineraryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One leg of travel. For cabs `origin`/`destination` are the pick-up and
/// drop-off locations and `departure_date` is the pick-up date.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItineraryLeg {
    /// Assigned by storage; ignored on write.
    pub id: Option<ItineraryItemId>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub departure_date: Option<NaiveDate>,
    pub return_date: Option<NaiveDate>,
    pub description: Option<String>,
}

impl ItineraryLeg {
    pub fn between(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            origin: Some(origin.into()),
            destination: Some(destination.into()),
            ..Self::default()
        }
    }

    pub fn on(mut self, departure_date: NaiveDate) -> Self {
        self.departure_date = Some(departure_date);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Itinerary {
    #[serde(default)]
    pub flights: Vec<ItineraryLeg>,
    #[serde(default)]
    pub buses: Vec<ItineraryLeg>,
    #[serde(default)]
    pub trains: Vec<ItineraryLeg>,
    #[serde(default)]
    pub cabs: Vec<ItineraryLeg>,
}

impl Itinerary {
    pub fn legs(&self, kind: ItineraryKind) -> &[ItineraryLeg] {
        match kind {
            ItineraryKind::Flight => &self.flights,
            ItineraryKind::Bus => &self.buses,
            ItineraryKind::Train => &self.trains,
            ItineraryKind::Cab => &self.cabs,
        }
    }

    pub fn legs_mut(&mut self, kind: ItineraryKind) -> &mut Vec<ItineraryLeg> {
        match kind {
            ItineraryKind::Flight => &mut self.flights,
            ItineraryKind::Bus => &mut self.buses,
            ItineraryKind::Train => &mut self.trains,
            ItineraryKind::Cab => &mut self.cabs,
        }
    }

    pub fn push(&mut self, kind: ItineraryKind, leg: ItineraryLeg) {
        self.legs_mut(kind).push(leg);
    }

    /// Leg counts in `ItineraryKind::ALL` order.
    pub fn counts(&self) -> [usize; 4] {
        ItineraryKind::ALL.map(|kind| self.legs(kind).len())
    }

    pub fn len(&self) -> usize {
        self.counts().iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        for kind in ItineraryKind::ALL {
            if kind.supports_return_date() {
                continue;
            }
            if self.legs(kind).iter().any(|leg| leg.return_date.is_some()) {
                return Err(DomainError::ReturnDateNotSupported { kind });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Itinerary, ItineraryKind, ItineraryLeg};

    #[test]
    fn counts_follow_kind_order() {
        let mut itinerary = Itinerary::default();
        itinerary.push(ItineraryKind::Cab, ItineraryLeg::between("Airport", "Hotel"));
        itinerary.push(ItineraryKind::Flight, ItineraryLeg::between("MAA", "BOM"));
        itinerary.push(ItineraryKind::Flight, ItineraryLeg::between("BOM", "MAA"));

        assert_eq!(itinerary.counts(), [2, 0, 0, 1]);
        assert_eq!(itinerary.len(), 3);
    }

    #[test]
    fn flights_accept_return_dates() {
        let mut itinerary = Itinerary::default();
        itinerary.push(
            ItineraryKind::Flight,
            ItineraryLeg {
                return_date: chrono::NaiveDate::from_ymd_opt(2026, 2, 12),
                ..ItineraryLeg::between("MAA", "BOM")
            },
        );
        assert!(itinerary.validate().is_ok());
    }
}
