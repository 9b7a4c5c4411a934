//! Booking validation
//!
//! Required-field checks, email normalization and the email format check.
//! Every write goes through here before anything touches storage.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::models::{Booking, BookingUpdate, NewBooking};

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

pub const EVENT_ID_REQUIRED: &str = "Event ID is required";
pub const EMAIL_REQUIRED: &str = "Email is required";
pub const EMAIL_INVALID: &str = "Please provide a valid email address";
pub const EVENT_ID_TOO_LONG: &str = "Event ID must be at most 64 characters";
pub const EMAIL_TOO_LONG: &str = "Email must be at most 320 characters";

/// Column widths of `bookings.event_id` and `bookings.email`, in characters.
pub const EVENT_ID_MAX_LEN: usize = 64;
pub const EMAIL_MAX_LEN: usize = 320;

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

/// All field failures of one write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Message for `field`, if it was rejected.
    pub fn message_for(&self, field: &str) -> Option<&'static str> {
        self.errors
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Booking validation failed: ")?;
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", error.field, error.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// A booking that passed validation, with normalized fields.
///
/// Only obtainable through [`validate_new_booking`] or [`validate_update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidBooking {
    event_id: String,
    email: String,
}

impl ValidBooking {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

/// Trim and lowercase an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic `local@domain.tld` shape check.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// Validate and normalize a new booking.
pub fn validate_new_booking(input: &NewBooking) -> Result<ValidBooking, ValidationErrors> {
    let mut errors = Vec::new();

    let event_id = input.event_id.trim();
    if event_id.is_empty() {
        errors.push(FieldError {
            field: "event_id",
            message: EVENT_ID_REQUIRED,
        });
    } else if event_id.chars().count() > EVENT_ID_MAX_LEN {
        errors.push(FieldError {
            field: "event_id",
            message: EVENT_ID_TOO_LONG,
        });
    }

    // The format check runs on the normalized value.
    let email = normalize_email(&input.email);
    if email.is_empty() {
        errors.push(FieldError {
            field: "email",
            message: EMAIL_REQUIRED,
        });
    } else if email.chars().count() > EMAIL_MAX_LEN {
        errors.push(FieldError {
            field: "email",
            message: EMAIL_TOO_LONG,
        });
    } else if !is_valid_email(&email) {
        errors.push(FieldError {
            field: "email",
            message: EMAIL_INVALID,
        });
    }

    if !errors.is_empty() {
        return Err(ValidationErrors { errors });
    }

    Ok(ValidBooking {
        event_id: event_id.to_string(),
        email,
    })
}

/// Validate an update applied on top of an existing booking.
pub fn validate_update(
    existing: &Booking,
    update: &BookingUpdate,
) -> Result<ValidBooking, ValidationErrors> {
    let merged = NewBooking {
        event_id: update
            .event_id
            .clone()
            .unwrap_or_else(|| existing.event_id.clone()),
        email: update.email.clone().unwrap_or_else(|| existing.email.clone()),
    };
    validate_new_booking(&merged)
}
