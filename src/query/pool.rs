//! Session pool
//!
//! Keeps up to `max_idle` open sessions between statements. A session is
//! held by exactly one statement at a time through a [`PooledSession`] and
//! always comes back to the pool, whether the statement succeeded, failed,
//! or was abandoned mid-flight. Sessions that saw a failure are closed
//! instead of reused; abandoned ones are closed on the next pool call.

use std::collections::VecDeque;
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crate::config::{PoolConfig, SelectionPolicy};
use crate::driver::{Driver, Row, Session, WireMap};
use crate::error::{MapperError, Result};

struct IdleSession {
    session: Box<dyn Session>,
    since: Instant,
}

#[derive(Default)]
struct PoolState {
    // Oldest release at the front
    idle: VecDeque<IdleSession>,
    cursor: usize,
    closed: bool,
    // Dropped mid-statement; state unknown, never reused
    abandoned: Vec<Box<dyn Session>>,
}

pub struct SessionPool {
    driver: Arc<dyn Driver>,
    database: String,
    config: PoolConfig,
    state: Mutex<PoolState>,
}

impl SessionPool {
    pub fn new(driver: Arc<dyn Driver>, database: impl Into<String>, config: PoolConfig) -> Self {
        Self {
            driver,
            database: database.into(),
            config,
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Sessions currently parked in the pool
    pub fn idle_sessions(&self) -> usize {
        self.lock().idle.len()
    }

    /// Sessions given up mid-statement and not yet closed
    pub fn abandoned_sessions(&self) -> usize {
        self.lock().abandoned.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take an idle session per the selection policy, or open a new one
    pub async fn acquire(&self) -> Result<PooledSession<'_>> {
        let (reused, stale) = {
            let mut state = self.lock();
            if state.closed {
                return Err(MapperError::PoolClosed);
            }
            (self.select(&mut state), mem::take(&mut state.abandoned))
        };
        close_all(stale).await;

        let session = match reused {
            Some(idle) => {
                tracing::trace!("Reusing session idle for {:?}", idle.since.elapsed());
                idle.session
            }
            None => self.driver.open_session(&self.database).await?,
        };
        Ok(PooledSession {
            pool: self,
            session: Some(session),
        })
    }

    fn select(&self, state: &mut PoolState) -> Option<IdleSession> {
        if state.idle.is_empty() {
            return None;
        }
        match self.config.policy {
            SelectionPolicy::LeastRecentlyUsed => state.idle.pop_front(),
            SelectionPolicy::RoundRobin => {
                let idx = state.cursor % state.idle.len();
                state.cursor = state.cursor.wrapping_add(1);
                state.idle.remove(idx)
            }
        }
    }

    /// Return a session after use
    ///
    /// Healthy sessions are parked while there is room; everything else is
    /// closed. Close failures are logged, never returned.
    async fn release(&self, session: Box<dyn Session>, healthy: bool) {
        let (rejected, stale) = {
            let mut state = self.lock();
            let stale = mem::take(&mut state.abandoned);
            if healthy && !state.closed && state.idle.len() < self.config.max_idle {
                state.idle.push_back(IdleSession {
                    session,
                    since: Instant::now(),
                });
                (None, stale)
            } else {
                (Some(session), stale)
            }
        };

        close_all(stale).await;
        if let Some(session) = rejected {
            close_quietly(session).await;
        }
    }

    fn abandon(&self, session: Box<dyn Session>) {
        tracing::warn!("Session on {} dropped mid-statement; closing it later", self.database);
        self.lock().abandoned.push(session);
    }

    /// Close every idle or abandoned session and refuse further acquisitions
    pub async fn close(&self) {
        let (drained, stale) = {
            let mut state = self.lock();
            state.closed = true;
            let drained: Vec<Box<dyn Session>> = state.idle.drain(..).map(|idle| idle.session).collect();
            (drained, mem::take(&mut state.abandoned))
        };

        let count = drained.len();
        close_all(drained).await;
        close_all(stale).await;
        tracing::info!("Session pool for {} closed ({} idle sessions)", self.database, count);
    }
}

/// A session checked out of a [`SessionPool`]
///
/// [`PooledSession::release`] hands it back. Dropping it without a release
/// (for example when the statement future is cancelled) parks it for
/// closing instead.
pub struct PooledSession<'a> {
    pool: &'a SessionPool,
    session: Option<Box<dyn Session>>,
}

impl PooledSession<'_> {
    pub async fn run(&mut self, statement: &str, params: WireMap) -> Result<Vec<Row>> {
        match self.session.as_mut() {
            Some(session) => session.run(statement, params).await,
            None => Err(MapperError::PoolClosed),
        }
    }

    /// Return the session; `healthy` sessions may be reused
    pub async fn release(mut self, healthy: bool) {
        if let Some(session) = self.session.take() {
            self.pool.release(session, healthy).await;
        }
    }
}

impl Drop for PooledSession<'_> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.abandon(session);
        }
    }
}

async fn close_all(sessions: Vec<Box<dyn Session>>) {
    for session in sessions {
        close_quietly(session).await;
    }
}

async fn close_quietly(session: Box<dyn Session>) {
    if let Err(e) = session.close().await {
        tracing::warn!("Session close failed: {}", e);
    }
}
