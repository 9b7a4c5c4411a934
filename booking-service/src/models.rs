//! Booking models
//!
//! Domain models for event bookings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored booking: one attendee email registered for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub event_id: String,
    /// Always trimmed and lowercased
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller input for a new booking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBooking {
    pub event_id: String,
    pub email: String,
}

impl NewBooking {
    pub fn new(event_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            email: email.into(),
        }
    }
}

/// Fields to change on an existing booking. `None` keeps the current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingUpdate {
    pub event_id: Option<String>,
    pub email: Option<String>,
}

impl BookingUpdate {
    pub fn event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}
