//! Bounded connection pool.
//!
//! The pool caps concurrently open connections with a semaphore and keeps a small idle
//! list for reuse. Idle connections older than the max lifetime are retired on checkout
//! or checkin.
//!
//! A checked-out [`PooledConnection`] goes back to the idle list only through
//! [`PooledConnection::release`]. Dropping it without releasing (an error, or a deadline
//! cancelling the in-flight future) discards the connection. The slot is freed either way.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::debug;

use super::Connector;
use crate::error::DriverError;

/// Maximum concurrently open connections
pub const MAX_OPEN_CONNECTIONS: usize = 10;

/// Maximum idle connections retained for reuse
pub const MAX_IDLE_CONNECTIONS: usize = 5;

/// Maximum age of a connection before it is retired
pub const MAX_CONNECTION_LIFETIME: Duration = Duration::from_secs(5 * 60);

/// Pool sizing policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolPolicy {
    pub max_open: usize,
    pub max_idle: usize,
    pub max_lifetime: Duration,
}

impl Default for PoolPolicy {
    fn default() -> Self {
        Self {
            max_open: MAX_OPEN_CONNECTIONS,
            max_idle: MAX_IDLE_CONNECTIONS,
            max_lifetime: MAX_CONNECTION_LIFETIME,
        }
    }
}

struct IdleConnection<T> {
    conn: T,
    created_at: Instant,
}

/// Bounded pool of live connections produced by a [`Connector`]
pub struct ConnectionPool<C: Connector> {
    connector: C,
    policy: PoolPolicy,
    slots: Semaphore,
    idle: Mutex<Vec<IdleConnection<C::Connection>>>,
}

impl<C: Connector> ConnectionPool<C> {
    /// Create an empty pool; connections are opened lazily on first checkout
    pub fn new(connector: C, policy: PoolPolicy) -> Self {
        Self {
            connector,
            policy,
            slots: Semaphore::new(policy.max_open),
            idle: Mutex::new(Vec::with_capacity(policy.max_idle)),
        }
    }

    /// Check out a connection, waiting for a free slot if the pool is at capacity
    pub async fn acquire(&self) -> Result<PooledConnection<'_, C>, DriverError> {
        let permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| DriverError::protocol("connection pool is closed"))?;

        let (conn, created_at) = match self.take_idle() {
            Some(idle) => (idle.conn, idle.created_at),
            None => {
                debug!("Opening new pooled connection");
                (self.connector.connect().await?, Instant::now())
            }
        };

        Ok(PooledConnection { pool: self, conn: Some(conn), created_at, _permit: permit })
    }

    /// The connector this pool opens connections with
    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub const fn policy(&self) -> PoolPolicy {
        self.policy
    }

    /// Number of idle connections currently retained
    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of checkout slots not currently in use
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    fn take_idle(&self) -> Option<IdleConnection<C::Connection>> {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(entry) = idle.pop() {
            if self.is_fresh(entry.created_at) {
                return Some(entry);
            }
            debug!("Retiring expired idle connection");
        }
        None
    }

    fn put_back(&self, conn: C::Connection, created_at: Instant) {
        if !self.is_fresh(created_at) {
            debug!("Retiring connection past max lifetime");
            return;
        }

        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.policy.max_idle {
            idle.push(IdleConnection { conn, created_at });
        }
    }

    fn is_fresh(&self, created_at: Instant) -> bool {
        created_at.elapsed() < self.policy.max_lifetime
    }
}

/// A connection checked out of a [`ConnectionPool`]
pub struct PooledConnection<'a, C: Connector> {
    pool: &'a ConnectionPool<C>,
    conn: Option<C::Connection>,
    created_at: Instant,
    _permit: SemaphorePermit<'a>,
}

impl<C: Connector> PooledConnection<'_, C> {
    /// Return a healthy connection to the idle list
    pub fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put_back(conn, self.created_at);
        }
    }
}

impl<C: Connector> Deref for PooledConnection<'_, C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection already returned to pool")
    }
}

impl<C: Connector> DerefMut for PooledConnection<'_, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection already returned to pool")
    }
}

impl<C: Connector> Drop for PooledConnection<'_, C> {
    fn drop(&mut self) {
        if self.conn.take().is_some() {
            debug!("Discarding connection that was not released");
        }
    }
}
