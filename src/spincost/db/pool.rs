//! Bounded async connection pool over tokio-postgres.
//!
//! Connections are created lazily up to `max_conns`, prewarmed to
//! `min_conns`, and replaced once they exceed `max_conn_lifetime`.
//! Acquire is cancel-aware so a cancelled job never blocks on a
//! saturated pool.

use crate::spincost::engine::cancel::CancelToken;
use crate::spincost::error::{EngineError, EngineResult};
use log::{error, warn};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{Instant, sleep};
use tokio_postgres::{Client, Config, NoTls};

/// Pool sizing and connection settings.
#[derive(Debug, Clone)]
pub struct PgPoolConfig {
    pub dsn: String,
    pub min_conns: usize,
    pub max_conns: usize,
    /// Connections older than this are discarded on release instead of
    /// returning to the idle set.
    pub max_conn_lifetime: Duration,
    pub connect_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl PgPoolConfig {
    pub fn new(dsn: String) -> Self {
        Self {
            dsn,
            min_conns: 10,
            max_conns: 50,
            max_conn_lifetime: Duration::from_secs(30 * 60),
            connect_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// One live connection with its creation instant.
pub struct PgConn {
    client: Client,
    created_at: Instant,
}

impl PgConn {
    async fn connect(config: &PgPoolConfig) -> EngineResult<Self> {
        let mut pg_config = Config::from_str(&config.dsn)
            .map_err(|err| EngineError::Pool(format!("invalid Postgres DSN: {err}")))?;
        pg_config.connect_timeout(config.connect_timeout);

        let (client, connection) = pg_config.connect(NoTls).await?;
        // the connection future drives the socket; it lives until the
        // client is dropped
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!("Postgres connection error: {err}");
            }
        });

        Ok(Self {
            client,
            created_at: Instant::now(),
        })
    }

    fn is_expired(&self, max_lifetime: Duration) -> bool {
        self.created_at.elapsed() > max_lifetime
    }
}

struct PoolState {
    idle: Vec<PgConn>,
}

/// Bounded pool of Postgres connections.
pub struct PgPool {
    config: PgPoolConfig,
    state: Mutex<PoolState>,
    available: Notify,
    in_flight: AtomicUsize,
}

impl PgPool {
    /// Create the pool and prewarm `min_conns` connections.
    pub async fn connect(config: PgPoolConfig) -> EngineResult<Arc<Self>> {
        let pool = Arc::new(Self {
            state: Mutex::new(PoolState { idle: Vec::new() }),
            available: Notify::new(),
            in_flight: AtomicUsize::new(0),
            config,
        });

        for _ in 0..pool.config.min_conns.min(pool.config.max_conns) {
            let conn = PgConn::connect(&pool.config).await?;
            pool.in_flight.fetch_add(1, Ordering::SeqCst);
            pool.release(conn);
        }

        Ok(pool)
    }

    /// Acquire a connection, waiting up to `acquire_timeout`.
    ///
    /// A tripped cancel token aborts the wait immediately.
    pub async fn acquire(
        self: &Arc<Self>,
        cancel: Option<&CancelToken>,
    ) -> EngineResult<PooledConn> {
        let deadline = Instant::now() + self.config.acquire_timeout;
        loop {
            if let Some(token) = cancel {
                if token.is_cancelled() {
                    return Err(EngineError::Pool("acquire cancelled".to_string()));
                }
            }

            let idle = {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                state.idle.pop()
            };
            if let Some(conn) = idle {
                if conn.is_expired(self.config.max_conn_lifetime) {
                    // past its replacement interval; drop and retry
                    self.discard();
                    continue;
                }
                return Ok(PooledConn {
                    pool: Arc::clone(self),
                    conn: Some(conn),
                });
            }

            if self.in_flight.load(Ordering::SeqCst) < self.config.max_conns {
                self.in_flight.fetch_add(1, Ordering::SeqCst);
                match PgConn::connect(&self.config).await {
                    Ok(conn) => {
                        return Ok(PooledConn {
                            pool: Arc::clone(self),
                            conn: Some(conn),
                        });
                    }
                    Err(err) => {
                        self.in_flight.fetch_sub(1, Ordering::SeqCst);
                        self.available.notify_one();
                        return Err(err);
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    "connection pool exhausted ({} in flight)",
                    self.in_flight.load(Ordering::SeqCst)
                );
                return Err(EngineError::Pool("acquire timed out".to_string()));
            }
            let wait = deadline - now;

            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = self.available.notified() => {}
                        _ = token.cancelled() => {
                            return Err(EngineError::Pool("acquire cancelled".to_string()));
                        }
                        _ = sleep(wait) => {
                            return Err(EngineError::Pool("acquire timed out".to_string()));
                        }
                    }
                }
                None => {
                    tokio::select! {
                        _ = self.available.notified() => {}
                        _ = sleep(wait) => {
                            return Err(EngineError::Pool("acquire timed out".to_string()));
                        }
                    }
                }
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn idle_count(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.idle.len()
    }

    fn release(&self, conn: PgConn) {
        if conn.is_expired(self.config.max_conn_lifetime) {
            self.discard();
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.idle.push(conn);
        drop(state);
        self.available.notify_one();
    }

    fn discard(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.available.notify_one();
    }
}

/// A connection checked out of the pool; returns on drop.
pub struct PooledConn {
    pool: Arc<PgPool>,
    conn: Option<PgConn>,
}

impl PooledConn {
    pub fn client(&self) -> &Client {
        &self
            .conn
            .as_ref()
            .expect("connection already released")
            .client
    }

    pub fn client_mut(&mut self) -> &mut Client {
        &mut self
            .conn
            .as_mut()
            .expect("connection already released")
            .client
    }

    /// Drop the connection instead of returning it to the idle set.
    pub fn discard(mut self) {
        if self.conn.take().is_some() {
            self.pool.discard();
        }
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
