// Aerodrome - Jet.com Merchant API Client
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Connection reaper
//!
//! Background task that keeps the shared pool tidy. Every `interval` it
//! closes connections whose keep-alive has expired, then connections idle
//! for longer than `idle_timeout`.
//!
//! Shutdown is cooperative: [`ConnectionReaper::shutdown`] cancels a token the
//! loop waits on alongside its timer, so a sleeping reaper wakes at once and
//! exits. No final sweep runs on the way out.

use crate::api::config::duration_ms;
use crate::api::pool::ConnectionPool;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reaper timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    /// Time between sweeps
    #[serde(with = "duration_ms")]
    pub interval: Duration,
    /// Connections unused for longer than this are closed
    #[serde(with = "duration_ms")]
    pub idle_timeout: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(30),
        }
    }
}

/// Handle to the background sweep task
#[derive(Debug)]
pub struct ConnectionReaper {
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionReaper {
    /// Spawn the reaper on the current tokio runtime
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn start(pool: Arc<dyn ConnectionPool>, config: ReaperConfig) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            Self::run(pool, config, token).await;
        });

        Self {
            cancel,
            handle: Mutex::new(Some(handle)),
        }
    }

    async fn run(pool: Arc<dyn ConnectionPool>, config: ReaperConfig, cancel: CancellationToken) {
        info!(
            interval = ?config.interval,
            idle_timeout = ?config.idle_timeout,
            "Connection reaper started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(config.interval) => {}
            }

            let expired = pool.close_expired();
            let idle = pool.close_idle(config.idle_timeout);
            if expired + idle > 0 {
                debug!(expired, idle, "Reaped pooled connections");
            }
        }

        info!("Connection reaper stopped");
    }

    /// Request shutdown; returns immediately
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Request shutdown and wait for the task to exit
    pub async fn stop(&self) {
        self.shutdown();

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Connection reaper task failed: {}", e);
            }
        }
    }
}

impl Drop for ConnectionReaper {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    /// Pool double: named connections with a last-use time
    #[derive(Default)]
    struct MockPool {
        connections: Mutex<Vec<(&'static str, Instant)>>,
        sweeps: AtomicUsize,
    }

    impl MockPool {
        fn touch(&self, name: &'static str) {
            self.connections.lock().push((name, Instant::now()));
        }

        fn open(&self) -> Vec<&'static str> {
            self.connections.lock().iter().map(|(name, _)| *name).collect()
        }
    }

    impl ConnectionPool for MockPool {
        fn close_expired(&self) -> usize {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            0
        }

        fn close_idle(&self, idle_for: Duration) -> usize {
            let now = Instant::now();
            let mut connections = self.connections.lock();
            let before = connections.len();
            connections.retain(|(_, last_used)| now.duration_since(*last_used) <= idle_for);
            before - connections.len()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_closes_only_connections_past_idle_threshold() {
        let pool = Arc::new(MockPool::default());
        pool.touch("idle-31");
        tokio::time::advance(Duration::from_secs(2)).await;
        pool.touch("idle-29");
        tokio::time::advance(Duration::from_secs(4)).await;

        // Sweeps land at +5s steps from here: 11, 16, 21, 26, 31
        let reaper = ConnectionReaper::start(pool.clone(), ReaperConfig::default());
        tokio::time::sleep(Duration::from_millis(25_001)).await;

        assert_eq!(pool.open(), vec!["idle-29"]);
        assert_eq!(pool.sweeps.load(Ordering::SeqCst), 5);
        reaper.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_wakes_sleeping_loop() {
        let pool = Arc::new(MockPool::default());
        let reaper = ConnectionReaper::start(pool.clone(), ReaperConfig::default());

        // One sweep at 5s, then blocked waiting for 10s
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert!(reaper.is_running());

        let started = Instant::now();
        tokio::time::timeout(Duration::from_secs(5), reaper.stop())
            .await
            .expect("reaper exits within one interval");

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!reaper.is_running());
        assert_eq!(pool.sweeps.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_final_sweep_on_shutdown() {
        let pool = Arc::new(MockPool::default());
        let reaper = ConnectionReaper::start(pool.clone(), ReaperConfig::default());

        reaper.shutdown();
        reaper.stop().await;

        assert_eq!(pool.sweeps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_task() {
        let pool = Arc::new(MockPool::default());
        let reaper = ConnectionReaper::start(pool.clone(), ReaperConfig::default());
        drop(reaper);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(pool.sweeps.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_config_deserializes_millis() {
        let config: ReaperConfig = serde_json::from_str(r#"{"interval": 1000}"#).unwrap();
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
    }
}
