//! Booking repository
//!
//! Storage operations for bookings. Implementations assign ids and
//! timestamps and must reject a second booking for the same
//! `(event_id, email)` pair with [`DatabaseError::DuplicateEntry`].

use chrono::{DateTime, SubsecRound, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::Booking;
use crate::validation::ValidBooking;
use error::DatabaseError;

/// Booking repository trait for database operations
#[allow(async_fn_in_trait)]
pub trait BookingRepository: Send + Sync {
    /// Insert a new booking, assigning its id and timestamps
    async fn insert(&self, booking: &ValidBooking) -> Result<Booking, DatabaseError>;

    /// Replace the key fields of an existing booking and refresh `updated_at`
    async fn update(&self, id: Uuid, booking: &ValidBooking) -> Result<Booking, DatabaseError>;

    /// Find a booking by id
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, DatabaseError>;

    /// All bookings for an event, oldest first
    async fn find_by_event(&self, event_id: &str) -> Result<Vec<Booking>, DatabaseError>;

    /// The booking of one attendee for one event
    async fn find_by_event_and_email(
        &self,
        event_id: &str,
        email: &str,
    ) -> Result<Option<Booking>, DatabaseError>;
}

impl<T: BookingRepository> BookingRepository for Arc<T> {
    async fn insert(&self, booking: &ValidBooking) -> Result<Booking, DatabaseError> {
        (**self).insert(booking).await
    }

    async fn update(&self, id: Uuid, booking: &ValidBooking) -> Result<Booking, DatabaseError> {
        (**self).update(id, booking).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, DatabaseError> {
        (**self).find_by_id(id).await
    }

    async fn find_by_event(&self, event_id: &str) -> Result<Vec<Booking>, DatabaseError> {
        (**self).find_by_event(event_id).await
    }

    async fn find_by_event_and_email(
        &self,
        event_id: &str,
        email: &str,
    ) -> Result<Option<Booking>, DatabaseError> {
        (**self).find_by_event_and_email(event_id, email).await
    }
}

/// Current time at the precision the store keeps (`DATETIME(6)`), so a
/// returned booking equals the one read back later.
pub(crate) fn stored_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

type BookingKey = (String, String);

fn key_of(event_id: &str, email: &str) -> BookingKey {
    (event_id.to_string(), email.to_string())
}

#[derive(Default)]
struct Tables {
    bookings: HashMap<Uuid, Booking>,
    /// Unique index on (event_id, email)
    by_key: HashMap<BookingKey, Uuid>,
    /// Index on event_id, in insertion order
    by_event: HashMap<String, Vec<Uuid>>,
}

impl Tables {
    fn unlink_event(&mut self, event_id: &str, id: Uuid) {
        if let Some(ids) = self.by_event.get_mut(event_id) {
            ids.retain(|existing| *existing != id);
            if ids.is_empty() {
                self.by_event.remove(event_id);
            }
        }
    }
}

/// In-memory repository for testing and development
#[derive(Default)]
pub struct InMemoryBookingRepository {
    tables: RwLock<Tables>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored bookings
    pub async fn len(&self) -> usize {
        self.tables.read().await.bookings.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl BookingRepository for InMemoryBookingRepository {
    async fn insert(&self, booking: &ValidBooking) -> Result<Booking, DatabaseError> {
        let mut tables = self.tables.write().await;
        let key = key_of(booking.event_id(), booking.email());
        if tables.by_key.contains_key(&key) {
            return Err(DatabaseError::DuplicateEntry(format!(
                "uniq_event_email ({}, {})",
                key.0, key.1
            )));
        }

        let now = stored_now();
        let stored = Booking {
            id: Uuid::new_v4(),
            event_id: booking.event_id().to_string(),
            email: booking.email().to_string(),
            created_at: now,
            updated_at: now,
        };

        tables.by_key.insert(key, stored.id);
        tables
            .by_event
            .entry(stored.event_id.clone())
            .or_default()
            .push(stored.id);
        tables.bookings.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, id: Uuid, booking: &ValidBooking) -> Result<Booking, DatabaseError> {
        let mut tables = self.tables.write().await;
        let current = tables.bookings.get(&id).cloned().ok_or(DatabaseError::NotFound)?;

        let old_key = key_of(&current.event_id, &current.email);
        let new_key = key_of(booking.event_id(), booking.email());
        if new_key != old_key {
            if tables.by_key.contains_key(&new_key) {
                return Err(DatabaseError::DuplicateEntry(format!(
                    "uniq_event_email ({}, {})",
                    new_key.0, new_key.1
                )));
            }
            tables.by_key.remove(&old_key);
            tables.by_key.insert(new_key, id);
        }

        if current.event_id != booking.event_id() {
            tables.unlink_event(&current.event_id, id);
            tables
                .by_event
                .entry(booking.event_id().to_string())
                .or_default()
                .push(id);
        }

        let updated = Booking {
            event_id: booking.event_id().to_string(),
            email: booking.email().to_string(),
            updated_at: stored_now(),
            ..current
        };
        tables.bookings.insert(id, updated.clone());
        Ok(updated)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, DatabaseError> {
        Ok(self.tables.read().await.bookings.get(&id).cloned())
    }

    async fn find_by_event(&self, event_id: &str) -> Result<Vec<Booking>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_event
            .get(event_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| tables.bookings.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_by_event_and_email(
        &self,
        event_id: &str,
        email: &str,
    ) -> Result<Option<Booking>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_key
            .get(&key_of(event_id, email))
            .and_then(|id| tables.bookings.get(id).cloned()))
    }
}
