use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::itinerary::Itinerary;
use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TripId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelCategory {
    Local,
    Domestic,
    International,
}

impl TravelCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Domestic => "domestic",
            Self::International => "international",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Some(Self::Local),
            "domestic" => Some(Self::Domestic),
            "international" => Some(Self::International),
            _ => None,
        }
    }
}

impl fmt::Display for TravelCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Pending,
    Approved,
    Rejected,
    Finished,
}

impl TripStatus {
    pub const ALL: [TripStatus; 4] = [Self::Pending, Self::Approved, Self::Rejected, Self::Finished];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Finished => "finished",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully hydrated trip: scalar fields, the associated users and the itinerary
/// grouped by kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub name: String,
    pub travel_category: TravelCategory,
    pub status: TripStatus,
    pub description: Option<String>,
    pub user_ids: Vec<UserId>,
    pub itinerary: Itinerary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTrip {
    pub name: String,
    pub travel_category: Option<TravelCategory>,
    pub description: Option<String>,
    pub user_ids: Vec<UserId>,
    pub itinerary: Option<Itinerary>,
    /// Initial status; `pending` when absent.
    pub status: Option<TripStatus>,
}

impl NewTrip {
    pub fn new(name: impl Into<String>, travel_category: TravelCategory, user_id: UserId) -> Self {
        Self {
            name: name.into(),
            travel_category: Some(travel_category),
            user_ids: vec![user_id],
            ..Self::default()
        }
    }

    pub fn with_users(mut self, user_ids: impl IntoIterator<Item = UserId>) -> Self {
        self.user_ids = user_ids.into_iter().collect();
        self
    }

    pub fn with_itinerary(mut self, itinerary: Itinerary) -> Self {
        self.itinerary = Some(itinerary);
        self
    }

    pub fn validate(self) -> Result<ValidatedTrip, DomainError> {
        let name = required_name(&self.name)?;
        let travel_category =
            self.travel_category.ok_or(DomainError::MissingField { field: "travel_category" })?;
        let user_ids = distinct_users(self.user_ids)?;
        let itinerary = self.itinerary.unwrap_or_default();
        itinerary.validate()?;

        Ok(ValidatedTrip {
            name,
            travel_category,
            description: normalize_text(self.description),
            user_ids,
            itinerary,
            status: self.status.unwrap_or(TripStatus::Pending),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedTrip {
    pub name: String,
    pub travel_category: TravelCategory,
    pub description: Option<String>,
    pub user_ids: Vec<UserId>,
    pub itinerary: Itinerary,
    pub status: TripStatus,
}

/// Partial update. Collections that are supplied replace the stored set in full.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripPatch {
    pub name: Option<String>,
    pub travel_category: Option<TravelCategory>,
    pub description: Option<String>,
    pub user_ids: Option<Vec<UserId>>,
    pub itinerary: Option<Itinerary>,
}

impl TripPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.travel_category.is_none()
            && self.description.is_none()
            && self.user_ids.is_none()
            && self.itinerary.is_none()
    }

    pub fn validate(self) -> Result<TripPatch, DomainError> {
        let name = self.name.as_deref().map(required_name).transpose()?;
        let user_ids = self.user_ids.map(distinct_users).transpose()?;
        if let Some(itinerary) = &self.itinerary {
            itinerary.validate()?;
        }

        Ok(TripPatch {
            name,
            travel_category: self.travel_category,
            description: self.description.map(|value| value.trim().to_string()),
            user_ids,
            itinerary: self.itinerary,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TripFilter {
    pub user_id: Option<UserId>,
    pub status: Option<TripStatus>,
    pub travel_category: Option<TravelCategory>,
}

fn required_name(value: &str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::MissingField { field: "name" });
    }
    Ok(trimmed.to_string())
}

fn distinct_users(user_ids: Vec<UserId>) -> Result<Vec<UserId>, DomainError> {
    let distinct: BTreeSet<UserId> = user_ids.into_iter().collect();
    if distinct.is_empty() {
        return Err(DomainError::MissingField { field: "user_ids" });
    }
    Ok(distinct.into_iter().collect())
}

pub(crate) fn normalize_text(value: Option<String>) -> Option<String> {
    value.map(|text| text.trim().to_string()).filter(|text| !text.is_empty())
}
