//! Booking service
//!
//! The write pipeline for bookings: validate and normalize, confirm the
//! referenced event exists, then persist. The storage unique index on
//! `(event_id, email)` is the last line against duplicates, so a race
//! between two identical creates still ends in exactly one booking.

use thiserror::Error;
use uuid::Uuid;

use crate::events::EventExistenceChecker;
use crate::models::{Booking, BookingUpdate, NewBooking};
use crate::repository::BookingRepository;
use crate::validation::{
    normalize_email, validate_new_booking, validate_update, ValidBooking, ValidationErrors,
};
use error::{DatabaseError, ErrorResponse};

/// Service errors
#[derive(Error, Debug)]
pub enum BookingError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("Referenced event does not exist")]
    EventNotFound { event_id: String },

    #[error("Failed to verify event existence")]
    EventCheckFailed(#[source] DatabaseError),

    #[error("A booking for {email} already exists for event {event_id}")]
    Duplicate { event_id: String, email: String },

    #[error("Booking not found: {0}")]
    NotFound(Uuid),

    #[error("Database error: {0}")]
    Database(#[source] DatabaseError),
}

impl BookingError {
    /// Whether the same request may succeed if sent again unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::EventCheckFailed(_) => true,
            Self::Database(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<&BookingError> for ErrorResponse {
    fn from(err: &BookingError) -> Self {
        match err {
            BookingError::Validation(e) => {
                ErrorResponse::new("BOOKING_VALIDATION_FAILED", e.to_string())
            }
            BookingError::EventNotFound { event_id } => {
                ErrorResponse::new("BOOKING_EVENT_NOT_FOUND", err.to_string()).with_details(event_id.clone())
            }
            BookingError::EventCheckFailed(e) => {
                ErrorResponse::new("BOOKING_EVENT_CHECK_FAILED", err.to_string()).with_details(e.to_string())
            }
            BookingError::Duplicate { .. } => ErrorResponse::new("BOOKING_DUPLICATE", err.to_string()),
            BookingError::NotFound(_) => ErrorResponse::new("BOOKING_NOT_FOUND", err.to_string()),
            BookingError::Database(e) => ErrorResponse::from(e),
        }
    }
}

/// Booking service for business operations
pub struct BookingService<R, E> {
    repository: R,
    events: E,
}

impl<R, E> BookingService<R, E>
where
    R: BookingRepository,
    E: EventExistenceChecker,
{
    pub fn new(repository: R, events: E) -> Self {
        Self { repository, events }
    }

    /// Create a booking.
    pub async fn create(&self, input: NewBooking) -> Result<Booking, BookingError> {
        let booking = validate_new_booking(&input).inspect_err(|e| {
            tracing::warn!("Rejected booking: {}", e);
        })?;

        self.ensure_event_exists(booking.event_id()).await?;

        let created = self
            .repository
            .insert(&booking)
            .await
            .map_err(|e| write_error(e, &booking, None))?;

        tracing::info!(
            booking_id = %created.id,
            event_id = %created.event_id,
            "Booking created"
        );
        Ok(created)
    }

    /// Change the event or email of a booking.
    ///
    /// The event check only runs when `event_id` actually changes. An update
    /// that changes nothing is not written.
    pub async fn update(&self, id: Uuid, changes: BookingUpdate) -> Result<Booking, BookingError> {
        let existing = self.get(id).await?;
        let booking = validate_update(&existing, &changes)?;

        if booking.event_id() == existing.event_id && booking.email() == existing.email {
            return Ok(existing);
        }

        if booking.event_id() != existing.event_id {
            self.ensure_event_exists(booking.event_id()).await?;
        }

        let updated = self
            .repository
            .update(id, &booking)
            .await
            .map_err(|e| write_error(e, &booking, Some(id)))?;

        tracing::info!(booking_id = %id, event_id = %updated.event_id, "Booking updated");
        Ok(updated)
    }

    /// Get a booking by id
    pub async fn get(&self, id: Uuid) -> Result<Booking, BookingError> {
        self.repository
            .find_by_id(id)
            .await
            .map_err(BookingError::Database)?
            .ok_or(BookingError::NotFound(id))
    }

    /// All bookings for an event
    pub async fn list_for_event(&self, event_id: &str) -> Result<Vec<Booking>, BookingError> {
        self.repository
            .find_by_event(event_id.trim())
            .await
            .map_err(BookingError::Database)
    }

    /// The booking of one attendee for one event. The email is normalized
    /// before the lookup.
    pub async fn find_for_attendee(
        &self,
        event_id: &str,
        email: &str,
    ) -> Result<Option<Booking>, BookingError> {
        self.repository
            .find_by_event_and_email(event_id.trim(), &normalize_email(email))
            .await
            .map_err(BookingError::Database)
    }

    async fn ensure_event_exists(&self, event_id: &str) -> Result<(), BookingError> {
        match self.events.exists(event_id).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!(event_id, "Rejected booking for unknown event");
                Err(BookingError::EventNotFound {
                    event_id: event_id.to_string(),
                })
            }
            Err(e) => {
                tracing::error!(event_id, "Failed to verify event existence: {}", e);
                Err(BookingError::EventCheckFailed(e))
            }
        }
    }
}

fn write_error(e: DatabaseError, booking: &ValidBooking, id: Option<Uuid>) -> BookingError {
    match (e, id) {
        (DatabaseError::DuplicateEntry(_), _) => {
            tracing::warn!(
                event_id = booking.event_id(),
                "Rejected duplicate booking"
            );
            BookingError::Duplicate {
                event_id: booking.event_id().to_string(),
                email: booking.email().to_string(),
            }
        }
        (DatabaseError::NotFound, Some(id)) => BookingError::NotFound(id),
        (e, _) => BookingError::Database(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::InMemoryEventStore;
    use crate::repository::InMemoryBookingRepository;
    use crate::validation::{EMAIL_INVALID, EVENT_ID_REQUIRED};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts existence checks before delegating.
    struct CountingEvents {
        inner: InMemoryEventStore,
        calls: AtomicUsize,
    }

    impl EventExistenceChecker for CountingEvents {
        async fn exists(&self, event_id: &str) -> Result<bool, DatabaseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.exists(event_id).await
        }
    }

    fn service() -> (
        BookingService<Arc<InMemoryBookingRepository>, Arc<CountingEvents>>,
        Arc<InMemoryBookingRepository>,
        Arc<CountingEvents>,
    ) {
        let repo = Arc::new(InMemoryBookingRepository::new());
        let events = Arc::new(CountingEvents {
            inner: InMemoryEventStore::with_events(["E1", "E2"]),
            calls: AtomicUsize::new(0),
        });
        (BookingService::new(repo.clone(), events.clone()), repo, events)
    }

    #[tokio::test]
    async fn test_create_normalizes_email() {
        let (service, _, _) = service();

        let booking = service
            .create(NewBooking::new("E1", "  USER@Example.com "))
            .await
            .unwrap();

        assert_eq!(booking.event_id, "E1");
        assert_eq!(booking.email, "user@example.com");
    }

    #[tokio::test]
    async fn test_validation_runs_before_event_check() {
        let (service, repo, events) = service();

        let err = service
            .create(NewBooking::new("E1", "not-an-email"))
            .await
            .unwrap_err();

        match err {
            BookingError::Validation(e) => assert_eq!(e.message_for("email"), Some(EMAIL_INVALID)),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert_eq!(events.calls.load(Ordering::SeqCst), 0);
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_event_is_not_persisted() {
        let (service, repo, _) = service();

        let err = service.create(NewBooking::new("E404", "a@b.com")).await.unwrap_err();

        assert!(matches!(err, BookingError::EventNotFound { ref event_id } if event_id == "E404"));
        assert_eq!(err.to_string(), "Referenced event does not exist");
        assert!(!err.is_retryable());
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn test_event_check_failure_is_retryable() {
        let (service, repo, events) = service();
        events.inner.set_available(false);

        let err = service.create(NewBooking::new("E1", "a@b.com")).await.unwrap_err();

        assert!(matches!(err, BookingError::EventCheckFailed(_)));
        assert_eq!(err.to_string(), "Failed to verify event existence");
        assert!(err.is_retryable());
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_pair() {
        let (service, _, _) = service();
        service.create(NewBooking::new("E1", "a@b.com")).await.unwrap();

        let err = service.create(NewBooking::new("E1", " A@B.com")).await.unwrap_err();
        assert!(matches!(err, BookingError::Duplicate { .. }));
        assert!(!err.is_retryable());

        service.create(NewBooking::new("E1", "c@d.com")).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_skips_check_when_event_unchanged() {
        let (service, _, events) = service();
        let created = service.create(NewBooking::new("E1", "a@b.com")).await.unwrap();
        assert_eq!(events.calls.load(Ordering::SeqCst), 1);

        let updated = service
            .update(created.id, BookingUpdate::default().email("New@B.com"))
            .await
            .unwrap();
        assert_eq!(updated.email, "new@b.com");
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(events.calls.load(Ordering::SeqCst), 1);

        service
            .update(created.id, BookingUpdate::default().event_id("E2"))
            .await
            .unwrap();
        assert_eq!(events.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_update_to_unknown_event_leaves_record() {
        let (service, _, _) = service();
        let created = service.create(NewBooking::new("E1", "a@b.com")).await.unwrap();

        let err = service
            .update(created.id, BookingUpdate::default().event_id("E404"))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::EventNotFound { .. }));

        let stored = service.get(created.id).await.unwrap();
        assert_eq!(stored, created);
    }

    #[tokio::test]
    async fn test_noop_update_is_not_written() {
        let (service, _, _) = service();
        let created = service.create(NewBooking::new("E1", "a@b.com")).await.unwrap();

        let same = service
            .update(created.id, BookingUpdate::default().email(" A@B.COM "))
            .await
            .unwrap();
        assert_eq!(same.updated_at, created.updated_at);
    }

    #[tokio::test]
    async fn test_update_validation_and_missing() {
        let (service, _, _) = service();
        let created = service.create(NewBooking::new("E1", "a@b.com")).await.unwrap();

        let err = service
            .update(created.id, BookingUpdate::default().event_id("  "))
            .await
            .unwrap_err();
        match err {
            BookingError::Validation(e) => assert_eq!(e.message_for("event_id"), Some(EVENT_ID_REQUIRED)),
            other => panic!("expected validation error, got {:?}", other),
        }

        let missing = Uuid::new_v4();
        let err = service.update(missing, BookingUpdate::default()).await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn test_reads() {
        let (service, _, _) = service();
        service.create(NewBooking::new("E1", "a@b.com")).await.unwrap();
        service.create(NewBooking::new("E1", "c@d.com")).await.unwrap();
        service.create(NewBooking::new("E2", "a@b.com")).await.unwrap();

        assert_eq!(service.list_for_event("E1").await.unwrap().len(), 2);

        let found = service.find_for_attendee("E2", " A@b.com").await.unwrap();
        assert_eq!(found.map(|b| b.event_id), Some("E2".to_string()));
        assert!(service.find_for_attendee("E2", "c@d.com").await.unwrap().is_none());
    }

    #[test]
    fn test_error_response_codes() {
        let response = ErrorResponse::from(&BookingError::EventNotFound {
            event_id: "E9".to_string(),
        });
        assert_eq!(response.code, "BOOKING_EVENT_NOT_FOUND");
        assert_eq!(response.message, "Referenced event does not exist");
        assert_eq!(response.details.as_deref(), Some("E9"));

        let response = ErrorResponse::from(&BookingError::Database(DatabaseError::ConnectionFailed(
            "refused".to_string(),
        )));
        assert_eq!(response.code, "DB_CONNECTION_FAILED");
    }
}
