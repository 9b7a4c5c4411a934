//! MySQL booking storage.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::Booking;
use crate::repository::{stored_now, BookingRepository};
use crate::validation::{ValidBooking, EMAIL_MAX_LEN, EVENT_ID_MAX_LEN};
use db::DbPool;
use error::DatabaseError;

/// `bookings` table with its two indexes: `event_id` alone for listing an
/// event, and the unique `(event_id, email)` pair. Both key columns use a
/// binary collation so ids and emails compare byte for byte.
fn create_bookings_table() -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS bookings (
    id CHAR(36) NOT NULL PRIMARY KEY,
    event_id VARCHAR({event_id_len}) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin NOT NULL,
    email VARCHAR({email_len}) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin NOT NULL,
    created_at DATETIME(6) NOT NULL,
    updated_at DATETIME(6) NOT NULL,
    INDEX idx_bookings_event_id (event_id),
    UNIQUE KEY uniq_event_email (event_id, email)
)
"#,
        event_id_len = EVENT_ID_MAX_LEN,
        email_len = EMAIL_MAX_LEN,
    )
}

const SELECT_BY_ID: &str =
    "SELECT id, event_id, email, created_at, updated_at FROM bookings WHERE id = ?";
const SELECT_BY_EVENT: &str = "SELECT id, event_id, email, created_at, updated_at FROM bookings \
     WHERE event_id = ? ORDER BY created_at";
const SELECT_BY_EVENT_AND_EMAIL: &str = "SELECT id, event_id, email, created_at, updated_at \
     FROM bookings WHERE event_id = ? AND email = ?";

#[derive(FromRow)]
struct BookingRow {
    id: String,
    event_id: String,
    email: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = DatabaseError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| DatabaseError::QueryFailed(format!("invalid booking id {}: {}", row.id, e)))?;
        Ok(Booking {
            id,
            event_id: row.event_id,
            email: row.email,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn map_sqlx_error(e: sqlx::Error) -> DatabaseError {
    match e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            DatabaseError::DuplicateEntry(db_err.message().to_string())
        }
        sqlx::Error::RowNotFound => DatabaseError::NotFound,
        e => {
            tracing::error!("Booking query failed: {}", e);
            DatabaseError::QueryFailed(e.to_string())
        }
    }
}

/// Booking repository backed by a MySQL pool.
#[derive(Debug, Clone)]
pub struct MySqlBookingRepository {
    pool: DbPool,
}

impl MySqlBookingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create the `bookings` table and its indexes if they are missing.
    pub async fn sync_schema(&self) -> Result<(), DatabaseError> {
        let ddl = create_bookings_table();
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        tracing::info!("Bookings schema is up to date");
        Ok(())
    }
}

impl BookingRepository for MySqlBookingRepository {
    async fn insert(&self, booking: &ValidBooking) -> Result<Booking, DatabaseError> {
        let id = Uuid::new_v4();
        let now = stored_now();

        sqlx::query(
            "INSERT INTO bookings (id, event_id, email, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(booking.event_id())
        .bind(booking.email())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(Booking {
            id,
            event_id: booking.event_id().to_string(),
            email: booking.email().to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn update(&self, id: Uuid, booking: &ValidBooking) -> Result<Booking, DatabaseError> {
        let result = sqlx::query("UPDATE bookings SET event_id = ?, email = ?, updated_at = ? WHERE id = ?")
            .bind(booking.event_id())
            .bind(booking.email())
            .bind(stored_now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }

        self.find_by_id(id).await?.ok_or(DatabaseError::NotFound)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, DatabaseError> {
        sqlx::query_as::<_, BookingRow>(SELECT_BY_ID)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .map(Booking::try_from)
            .transpose()
    }

    async fn find_by_event(&self, event_id: &str) -> Result<Vec<Booking>, DatabaseError> {
        sqlx::query_as::<_, BookingRow>(SELECT_BY_EVENT)
            .bind(event_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .into_iter()
            .map(Booking::try_from)
            .collect()
    }

    async fn find_by_event_and_email(
        &self,
        event_id: &str,
        email: &str,
    ) -> Result<Option<Booking>, DatabaseError> {
        sqlx::query_as::<_, BookingRow>(SELECT_BY_EVENT_AND_EMAIL)
            .bind(event_id)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .map(Booking::try_from)
            .transpose()
    }
}
