//! Booking service entry point
//!
//! Loads the database configuration before doing anything else, so a
//! missing `DATABASE_URL` stops the process at startup.

use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use booking_service::cli::{self, Command, USAGE};
use booking_service::BookingError;
use db::{ConnectionManager, DbConfig, MySqlConnector};
use error::{ConfigError, DatabaseError, ErrorResponse};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "booking_service=info,db=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(Some(command)) => command,
        Ok(None) => {
            print!("{}", USAGE);
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };

    // Load configuration
    let config = match DbConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Refusing to start: {}", e);
            print_error(&ErrorResponse::from(&e));
            return ExitCode::from(78);
        }
    };
    tracing::info!("Using database {}", config.redacted_url());

    let connections = ConnectionManager::new(MySqlConnector::new(config));

    match cli::run(command, &connections).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Command failed: {:#}", e);
            print_error(&error_response(&e));
            ExitCode::FAILURE
        }
    }
}

fn error_response(err: &anyhow::Error) -> ErrorResponse {
    if let Some(e) = err.downcast_ref::<BookingError>() {
        ErrorResponse::from(e)
    } else if let Some(e) = err.downcast_ref::<DatabaseError>() {
        ErrorResponse::from(e)
    } else if let Some(e) = err.downcast_ref::<ConfigError>() {
        ErrorResponse::from(e)
    } else {
        ErrorResponse::new("INTERNAL_ERROR", "Internal error").with_details(err.to_string())
    }
}

fn print_error(response: &ErrorResponse) {
    match serde_json::to_string(response) {
        Ok(json) => eprintln!("{}", json),
        Err(_) => eprintln!("{}: {}", response.code, response.message),
    }
}
