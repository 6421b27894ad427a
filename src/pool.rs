// File: pool.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::request::{Scheme, Target};
use crate::transport::{connect_stream, PooledStream, TlsOptions};
use log::{debug, trace};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const ACQUIRE_POLL: Duration = Duration::from_millis(100);
const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    pub max_connections_per_host: usize,
    pub idle_timeout_ms: u64,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections_per_host: 6,
            idle_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PoolStats {
    pub idle: usize,
    pub in_use: usize,
    pub keys: usize,
}

#[derive(Debug)]
struct IdleEntry {
    stream: PooledStream,
    last_used: Instant,
}

#[derive(Debug, Default)]
struct KeyState {
    idle: Vec<IdleEntry>,
    in_use: usize,
}

type SharedState = Arc<Mutex<HashMap<String, KeyState>>>;

/// A connection checked out of the pool. Dropping a lease without calling
/// `release` discards the socket but still frees the slot, so completion
/// stays idempotent on every error path.
#[derive(Debug)]
pub struct PoolLease {
    state: SharedState,
    key: String,
    stream: Option<PooledStream>,
}

impl PoolLease {
    pub fn stream(&mut self) -> &mut PooledStream {
        self.stream.as_mut().expect("lease already released")
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Return the socket to the idle set for reuse.
    pub async fn release(mut self) {
        let stream = match self.stream.take() {
            Some(s) => s,
            None => return,
        };
        let mut state = self.state.lock().await;
        let ks = state.entry(self.key.clone()).or_default();
        ks.in_use = ks.in_use.saturating_sub(1);
        ks.idle.push(IdleEntry {
            stream,
            last_used: Instant::now(),
        });
        trace!("released connection to pool key {}", self.key);
    }
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        if self.stream.take().is_some() {
            let state = Arc::clone(&self.state);
            let key = self.key.clone();
            tokio::spawn(async move {
                let mut state = state.lock().await;
                if let Some(ks) = state.get_mut(&key) {
                    ks.in_use = ks.in_use.saturating_sub(1);
                }
            });
        }
    }
}

/// Keyed pool of idle sockets. One key per `proto://host:port`; capacity
/// and idle-timeout eviction per the configured options.
pub struct ConnectionPool {
    options: PoolOptions,
    state: SharedState,
    sweeper: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionPool {
    /// Must be created inside a tokio runtime; the eviction sweep starts
    /// immediately.
    pub fn new(options: PoolOptions) -> Self {
        let state: SharedState = Arc::new(Mutex::new(HashMap::new()));
        let sweep_state = Arc::clone(&state);
        let idle_timeout = Duration::from_millis(options.idle_timeout_ms);
        let sweeper = tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                let mut state = sweep_state.lock().await;
                for (key, ks) in state.iter_mut() {
                    let before = ks.idle.len();
                    ks.idle.retain(|e| e.last_used.elapsed() < idle_timeout);
                    if before != ks.idle.len() {
                        debug!("evicted {} idle connections for {}", before - ks.idle.len(), key);
                    }
                }
                state.retain(|_, ks| ks.in_use > 0 || !ks.idle.is_empty());
            }
        });

        Self {
            options,
            state,
            sweeper: std::sync::Mutex::new(Some(sweeper)),
        }
    }

    /// Check out an idle connection for the key, or open a new one while
    /// under the per-key cap, or poll until a slot frees up.
    pub async fn acquire(
        &self,
        host: &str,
        port: u16,
        scheme: Scheme,
        tls: &TlsOptions,
    ) -> Result<PoolLease, Box<dyn std::error::Error + Send + Sync>> {
        let target = Target::new(host, port, scheme);
        let key = target.key();

        loop {
            let open_new = {
                let mut state = self.state.lock().await;
                let ks = state.entry(key.clone()).or_default();
                if let Some(entry) = ks.idle.pop() {
                    ks.in_use += 1;
                    trace!("pool hit for {}", key);
                    return Ok(PoolLease {
                        state: Arc::clone(&self.state),
                        key,
                        stream: Some(entry.stream),
                    });
                }
                if ks.idle.len() + ks.in_use < self.options.max_connections_per_host {
                    // reserve the slot before the await point
                    ks.in_use += 1;
                    true
                } else {
                    false
                }
            };

            if open_new {
                match connect_stream(&target, tls, &[]).await {
                    Ok(stream) => {
                        debug!("pool opened new connection for {}", key);
                        return Ok(PoolLease {
                            state: Arc::clone(&self.state),
                            key,
                            stream: Some(stream),
                        });
                    }
                    Err(e) => {
                        let mut state = self.state.lock().await;
                        if let Some(ks) = state.get_mut(&key) {
                            ks.in_use = ks.in_use.saturating_sub(1);
                        }
                        return Err(e);
                    }
                }
            }

            tokio::time::sleep(ACQUIRE_POLL).await;
        }
    }

    pub async fn stats(&self) -> PoolStats {
        let state = self.state.lock().await;
        let mut stats = PoolStats {
            keys: state.len(),
            ..Default::default()
        };
        for ks in state.values() {
            stats.idle += ks.idle.len();
            stats.in_use += ks.in_use;
        }
        stats
    }

    /// Stop the sweep and drop every socket.
    pub async fn destroy(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
        let mut state = self.state.lock().await;
        state.clear();
        debug!("connection pool destroyed");
    }
}

static GLOBAL_POOL: Lazy<ConnectionPool> = Lazy::new(|| ConnectionPool::new(PoolOptions::default()));

/// The shared pool used by the transport for keep-alive sends.
pub fn global() -> &'static ConnectionPool {
    &GLOBAL_POOL
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn echo_listener() -> (tokio::net::TcpListener, u16) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn test_acquire_release_reuses_socket() {
        let (listener, port) = echo_listener().await;
        tokio::spawn(async move {
            loop {
                let (mut sock, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let mut buf = [0u8; 64];
                    while sock.read(&mut buf).await.unwrap_or(0) > 0 {}
                });
            }
        });

        let pool = ConnectionPool::new(PoolOptions::default());
        let lease = pool
            .acquire("127.0.0.1", port, Scheme::Http, &TlsOptions::default())
            .await
            .unwrap();
        let stats = pool.stats().await;
        assert_eq!(stats.in_use, 1);
        assert_eq!(stats.idle, 0);

        lease.release().await;
        let stats = pool.stats().await;
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.idle, 1);

        // second acquire must be a pool hit, not a new socket
        let lease = pool
            .acquire("127.0.0.1", port, Scheme::Http, &TlsOptions::default())
            .await
            .unwrap();
        let stats = pool.stats().await;
        assert_eq!(stats.in_use, 1);
        assert_eq!(stats.idle, 0);
        lease.release().await;

        pool.destroy().await;
        assert_eq!(pool.stats().await.keys, 0);
    }

    #[tokio::test]
    async fn test_dropped_lease_frees_slot() {
        let (listener, port) = echo_listener().await;
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });

        let pool = ConnectionPool::new(PoolOptions {
            max_connections_per_host: 1,
            ..Default::default()
        });
        let lease = pool
            .acquire("127.0.0.1", port, Scheme::Http, &TlsOptions::default())
            .await
            .unwrap();
        drop(lease);
        tokio::task::yield_now().await;

        // the slot must come back without a release
        let lease = tokio::time::timeout(
            Duration::from_secs(2),
            pool.acquire("127.0.0.1", port, Scheme::Http, &TlsOptions::default()),
        )
        .await
        .expect("slot was not freed by drop")
        .unwrap();
        lease.release().await;
        pool.destroy().await;
    }

    #[tokio::test]
    async fn test_acquire_fails_cleanly_when_connect_fails() {
        let pool = ConnectionPool::new(PoolOptions::default());
        // bind-then-drop to get a port nothing listens on
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let err = pool
            .acquire("127.0.0.1", port, Scheme::Http, &TlsOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Connection error:"));
        assert_eq!(pool.stats().await.in_use, 0);
        pool.destroy().await;
    }
}
