//! Command-line surface
//!
//! Parses the binary's arguments and runs one command against a shared
//! [`ConnectionManager`].

use serde_json::{json, Value};
use thiserror::Error;

use crate::events::MySqlEventStore;
use crate::models::NewBooking;
use crate::mysql::MySqlBookingRepository;
use crate::service::BookingService;
use db::{health_check, ConnectionManager, Connector, DbPool};

pub const USAGE: &str = "\
Usage: booking-service <COMMAND>

Commands:
  migrate                 Create the bookings table and its indexes
  ping                    Check the database connection
  create <EVENT_ID> <EMAIL>
                          Book EMAIL onto EVENT_ID
  list <EVENT_ID>         List the bookings of an event
  find <EVENT_ID> <EMAIL> Find one attendee's booking for an event
  --help, -h              Print this help

Environment:
  DATABASE_URL            MySQL connection string (required)
  DB_MAX_CONNECTIONS      Pool size (default 10)
  DB_MIN_CONNECTIONS      Idle connections kept open (default 1)
  DB_CONNECT_TIMEOUT_SECS Connect timeout in seconds (default 30)
  RUST_LOG                Log filter (default booking_service=info,db=info)
";

/// Argument errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum UsageError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Missing argument <{argument}> for {command}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("Unexpected argument: {0}")]
    UnexpectedArgument(String),
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Migrate,
    Ping,
    Create { event_id: String, email: String },
    List { event_id: String },
    Find { event_id: String, email: String },
}

impl Command {
    /// Parse the arguments that follow the program name.
    ///
    /// `Ok(None)` means help was asked for, or no command was given.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Option<Self>, UsageError> {
        let args: Vec<&str> = args.iter().map(|arg| arg.as_ref()).collect();
        let mut args = args.into_iter();
        let Some(name) = args.next() else {
            return Ok(None);
        };

        let mut required = |command: &'static str, argument: &'static str| {
            args.next()
                .map(str::to_string)
                .ok_or(UsageError::MissingArgument { command, argument })
        };

        let command = match name {
            "migrate" => Command::Migrate,
            "ping" => Command::Ping,
            "create" => Command::Create {
                event_id: required("create", "EVENT_ID")?,
                email: required("create", "EMAIL")?,
            },
            "list" => Command::List {
                event_id: required("list", "EVENT_ID")?,
            },
            "find" => Command::Find {
                event_id: required("find", "EVENT_ID")?,
                email: required("find", "EMAIL")?,
            },
            "--help" | "-h" | "help" => return Ok(None),
            other => return Err(UsageError::UnknownCommand(other.to_string())),
        };

        if let Some(extra) = args.next() {
            return Err(UsageError::UnexpectedArgument(extra.to_string()));
        }
        Ok(Some(command))
    }
}

/// Run a command and return its JSON output.
///
/// Commands that touch the database take their handle from `connections`,
/// which connects on first use.
pub async fn run<C>(command: Command, connections: &ConnectionManager<C>) -> anyhow::Result<Value>
where
    C: Connector<Handle = DbPool>,
{
    match command {
        Command::Migrate => {
            let pool = connections.get().await?;
            MySqlBookingRepository::new(pool).sync_schema().await?;
            Ok(json!({ "migrated": true }))
        }
        Command::Ping => {
            let pool = connections.get().await?;
            health_check(&pool).await?;
            Ok(json!({ "status": "ok" }))
        }
        Command::Create { event_id, email } => {
            let booking = service(connections.get().await?)
                .create(NewBooking::new(event_id, email))
                .await?;
            Ok(serde_json::to_value(booking)?)
        }
        Command::List { event_id } => {
            let bookings = service(connections.get().await?)
                .list_for_event(&event_id)
                .await?;
            Ok(serde_json::to_value(bookings)?)
        }
        Command::Find { event_id, email } => {
            let booking = service(connections.get().await?)
                .find_for_attendee(&event_id, &email)
                .await?;
            Ok(serde_json::to_value(booking)?)
        }
    }
}

fn service(pool: DbPool) -> BookingService<MySqlBookingRepository, MySqlEventStore> {
    BookingService::new(
        MySqlBookingRepository::new(pool.clone()),
        MySqlEventStore::new(pool),
    )
}
