//! Shared connection management.
//!
//! [`ConnectionManager`] owns the single database handle of the process. The
//! first caller starts a connection attempt; everyone who arrives while it
//! is in flight awaits that same attempt. A successful handle is cached for
//! all later callers. A failed attempt is dropped so the next call starts over.

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::DbConfig;
use crate::pool::{create_pool, DbPool};
use error::DatabaseError;

/// Something that can establish a database connection.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The ready-to-use handle produced by a successful connection.
    type Handle: Clone + Send + Sync + 'static;

    /// Establish a new connection.
    async fn connect(&self) -> Result<Self::Handle, DatabaseError>;
}

/// Connects to MySQL using a [`DbConfig`].
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    config: DbConfig,
}

impl MySqlConnector {
    pub fn new(config: DbConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    type Handle = DbPool;

    async fn connect(&self) -> Result<DbPool, DatabaseError> {
        create_pool(&self.config).await
    }
}

/// Observable state of a [`ConnectionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No handle and no attempt in flight
    Unconnected,
    /// An attempt is in flight
    Connecting,
    /// A handle is cached
    Connected,
}

type Attempt<H> = Shared<BoxFuture<'static, Result<H, DatabaseError>>>;

enum ConnectionState<H> {
    Unconnected,
    Connecting(Attempt<H>),
    Connected(H),
}

/// Lazily connects once and shares the resulting handle.
///
/// Construct one at process start and pass it (usually in an `Arc`) to
/// whatever needs the database.
pub struct ConnectionManager<C: Connector> {
    connector: Arc<C>,
    state: Mutex<ConnectionState<C::Handle>>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            state: Mutex::new(ConnectionState::Unconnected),
        }
    }

    /// Get the shared handle, connecting first if needed.
    pub async fn get(&self) -> Result<C::Handle, DatabaseError> {
        let attempt = {
            let mut state = self.lock_state();
            match &*state {
                ConnectionState::Connected(handle) => return Ok(handle.clone()),
                ConnectionState::Connecting(attempt) => attempt.clone(),
                ConnectionState::Unconnected => {
                    tracing::info!("Starting database connection attempt");
                    let connector = Arc::clone(&self.connector);
                    let attempt = async move { connector.connect().await }.boxed().shared();
                    *state = ConnectionState::Connecting(attempt.clone());
                    attempt
                }
            }
        };

        // Await a clone: a polled-to-completion `Shared` no longer compares equal.
        let result = attempt.clone().await;

        let mut state = self.lock_state();
        // Only the attempt that is still current may move the state machine.
        let current = matches!(&*state, ConnectionState::Connecting(a) if a.ptr_eq(&attempt));
        match result {
            Ok(handle) => {
                if current {
                    tracing::info!("Database connection established");
                    *state = ConnectionState::Connected(handle.clone());
                }
                Ok(handle)
            }
            Err(e) => {
                if current {
                    tracing::warn!("Database connection attempt failed: {}", e);
                    *state = ConnectionState::Unconnected;
                }
                Err(e)
            }
        }
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        match &*self.lock_state() {
            ConnectionState::Unconnected => ConnectionStatus::Unconnected,
            ConnectionState::Connecting(_) => ConnectionStatus::Connecting,
            ConnectionState::Connected(_) => ConnectionStatus::Connected,
        }
    }

    /// The cached handle, if a connection has been established.
    pub fn cached(&self) -> Option<C::Handle> {
        match &*self.lock_state() {
            ConnectionState::Connected(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ConnectionState<C::Handle>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    /// Hands out the attempt number as the handle; fails the first `failures` attempts.
    struct CountingConnector {
        attempts: Arc<AtomicUsize>,
        failures: usize,
        delay: Duration,
    }

    impl CountingConnector {
        fn new(attempts: Arc<AtomicUsize>) -> Self {
            Self {
                attempts,
                failures: 0,
                delay: Duration::from_millis(50),
            }
        }

        fn failing(mut self, failures: usize) -> Self {
            self.failures = failures;
            self
        }
    }

    #[async_trait]
    impl Connector for CountingConnector {
        type Handle = Arc<usize>;

        async fn connect(&self) -> Result<Arc<usize>, DatabaseError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if attempt <= self.failures {
                return Err(DatabaseError::ConnectionFailed(format!("attempt {}", attempt)));
            }
            Ok(Arc::new(attempt))
        }
    }

    #[test]
    fn test_connector_debug_hides_password() {
        let connector = MySqlConnector::new(DbConfig::new("mysql://user:secret@db:3306/bookings"));
        let debug = format!("{:?}", connector);
        assert!(!debug.contains("secret"), "{}", debug);
        assert!(debug.contains("user:***@db"), "{}", debug);
    }

    #[tokio::test]
    async fn test_starts_unconnected() {
        let manager = ConnectionManager::new(CountingConnector::new(Arc::default()));
        assert_eq!(manager.status(), ConnectionStatus::Unconnected);
        assert!(manager.cached().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_share_one_attempt() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let manager = ConnectionManager::new(CountingConnector::new(attempts.clone()));

        let (a, b) = tokio::join!(manager.get(), manager.get());
        let (a, b) = (assert_ok!(a), assert_ok!(b));

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.status(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_connected_handle_is_reused() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let manager = ConnectionManager::new(CountingConnector::new(attempts.clone()));

        let first = assert_ok!(manager.get().await);
        let second = assert_ok!(manager.get().await);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(manager.cached().is_some());
    }

    #[tokio::test]
    async fn test_failure_reaches_all_waiters_and_resets() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let manager = ConnectionManager::new(CountingConnector::new(attempts.clone()).failing(1));

        let (a, b) = tokio::join!(manager.get(), manager.get());
        assert_eq!(assert_err!(a), DatabaseError::ConnectionFailed("attempt 1".into()));
        assert_eq!(assert_err!(b), DatabaseError::ConnectionFailed("attempt 1".into()));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(manager.status(), ConnectionStatus::Unconnected);

        // The next call starts a fresh attempt.
        let handle = assert_ok!(manager.get().await);
        assert_eq!(*handle, 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_status_while_connecting() {
        let manager = Arc::new(ConnectionManager::new(CountingConnector::new(Arc::default())));

        let task = tokio::spawn({
            let manager = manager.clone();
            async move { manager.get().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(manager.status(), ConnectionStatus::Connecting);

        assert_ok!(task.await.unwrap());
        assert_eq!(manager.status(), ConnectionStatus::Connected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_tasks_one_attempt() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let manager = Arc::new(ConnectionManager::new(CountingConnector::new(attempts.clone())));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.get().await })
            })
            .collect();

        for task in tasks {
            let handle = task.await.unwrap().unwrap();
            assert_eq!(*handle, 1);
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
