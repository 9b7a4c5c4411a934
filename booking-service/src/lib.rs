//! Booking Service
//!
//! Booking records for event registrations: validation and normalization,
//! the event existence check, and storage with one booking per
//! `(event_id, email)` pair.

pub mod cli;
pub mod events;
pub mod models;
pub mod mysql;
pub mod repository;
pub mod service;
pub mod validation;

pub use events::{EventExistenceChecker, InMemoryEventStore, MySqlEventStore};
pub use models::{Booking, BookingUpdate, NewBooking};
pub use mysql::MySqlBookingRepository;
pub use repository::{BookingRepository, InMemoryBookingRepository};
pub use service::{BookingError, BookingService};
pub use validation::{FieldError, ValidBooking, ValidationErrors};
