use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAP_LINK_BASE: &str = "https://www.google.com/maps?q=";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    /// Both coordinates must be present and finite.
    pub fn checked(lat: Option<f64>, lng: Option<f64>) -> Option<Self> {
        match (lat, lng) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => Some(Self { lat, lng }),
            _ => None,
        }
    }

    pub fn map_link(&self) -> String {
        format!("{MAP_LINK_BASE}{},{}", self.lat, self.lng)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Active,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Active => "active",
            IncidentStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(IncidentStatus::Active),
            "resolved" => Ok(IncidentStatus::Resolved),
            other => Err(format!("unknown incident status: {other}")),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

/// User-safe reasons a recipient was not notified. Provider text never ends up here.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureReason {
    InvalidFormat,
    UnverifiedRecipient,
    DeliveryFailed,
}

impl FailureReason {
    pub fn message(&self) -> &'static str {
        match self {
            FailureReason::InvalidFormat => "Invalid phone number format",
            FailureReason::UnverifiedRecipient => "Phone number not verified in Twilio",
            FailureReason::DeliveryFailed => "SMS delivery failed",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecipientOutcome {
    pub recipient_name: String,
    pub recipient_address: String,
    pub delivery_status: DeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
}

impl RecipientOutcome {
    pub fn sent(contact: &Contact) -> Self {
        Self {
            recipient_name: contact.display_name.clone(),
            recipient_address: contact.raw_phone.clone(),
            delivery_status: DeliveryStatus::Sent,
            failure_reason: None,
        }
    }

    pub fn failed(contact: &Contact, reason: FailureReason) -> Self {
        Self {
            recipient_name: contact.display_name.clone(),
            recipient_address: contact.raw_phone.clone(),
            delivery_status: DeliveryStatus::Failed,
            failure_reason: Some(reason),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    pub owner_id: String,
    pub location: Location,
    pub recipient_outcomes: Vec<RecipientOutcome>,
    pub status: IncidentStatus,
    pub created_at: DateTime<Utc>,
}

impl Incident {
    pub fn new(owner_id: &str, location: Location, recipient_outcomes: Vec<RecipientOutcome>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            location,
            recipient_outcomes,
            status: IncidentStatus::Active,
            created_at: Utc::now(),
        }
    }
}

/// A trusted contact as stored by the contacts service. Read-only here.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub owner_id: String,
    #[serde(alias = "name")]
    pub display_name: String,
    #[serde(alias = "phone")]
    pub raw_phone: String,
}

/// The caller as resolved from a session token.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
}
