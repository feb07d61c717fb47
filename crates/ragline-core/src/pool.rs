//! Bounded pool of shared client handles

use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{Error, PoolConfig, Result};

/// A fixed set of client handles handed out round-robin, with a semaphore
/// bounding the number of operations in flight across all of them.
pub struct ConnectionPool<C> {
    connections: Vec<Arc<C>>,
    next: AtomicUsize,
    permits: Arc<Semaphore>,
    max_in_flight: usize,
}

/// A checked-out handle. The in-flight slot is released on drop.
pub struct PooledConnection<C> {
    connection: Arc<C>,
    _permit: OwnedSemaphorePermit,
}

impl<C> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.connection
    }
}

impl<C> ConnectionPool<C> {
    pub fn new(connections: Vec<C>, max_in_flight: usize) -> Result<Self> {
        if connections.is_empty() {
            return Err(Error::InvalidArgument(
                "connection pool needs at least one connection".to_string(),
            ));
        }
        if max_in_flight == 0 || max_in_flight > Semaphore::MAX_PERMITS {
            return Err(Error::InvalidArgument(format!(
                "max in-flight must be between 1 and {}",
                Semaphore::MAX_PERMITS
            )));
        }
        Ok(Self {
            connections: connections.into_iter().map(Arc::new).collect(),
            next: AtomicUsize::new(0),
            permits: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
        })
    }

    /// Open `config.size` connections with `connect`, which receives the slot index.
    pub fn build<F>(config: &PoolConfig, mut connect: F) -> Result<Self>
    where
        F: FnMut(usize) -> Result<C>,
    {
        let connections = (0..config.size)
            .map(&mut connect)
            .collect::<Result<Vec<_>>>()?;
        Self::new(connections, config.max_in_flight)
    }

    /// One connection, one operation at a time.
    pub fn single(connection: C) -> Self {
        Self {
            connections: vec![Arc::new(connection)],
            next: AtomicUsize::new(0),
            permits: Arc::new(Semaphore::new(1)),
            max_in_flight: 1,
        }
    }

    pub fn size(&self) -> usize {
        self.connections.len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Free in-flight slots right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for an in-flight slot, then hand out the next connection.
    pub async fn acquire(&self) -> Result<PooledConnection<C>> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::ServiceUnavailable("connection pool is closed".to_string()))?;
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        Ok(PooledConnection {
            connection: Arc::clone(&self.connections[index]),
            _permit: permit,
        })
    }
}
