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


//! Shared connection pool
//!
//! Connections are grouped per origin (`scheme://host:port`). Each origin
//! gets one slot holding a `reqwest::Client`, whose sockets stay open between
//! requests; dropping the slot's client closes them.
//!
//! Requests borrow a slot through [`ClientPool::acquire`], which returns a
//! [`PoolLease`]. Dropping the lease checks the slot back in, stamping its
//! last-use time and keep-alive expiry. Maintenance ([`ConnectionPool`]) is
//! reserved for the reaper and never closes a slot with an outstanding lease.
//!
//! Times come from `tokio::time::Instant`, so paused-clock tests can drive
//! idle and keep-alive expiry.

use crate::api::config::ClientConfig;
use crate::error::Result;
use parking_lot::Mutex;
use reqwest::Client;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Maintenance operations on a connection pool
pub trait ConnectionPool: Send + Sync {
    /// Close every checked-in connection whose keep-alive has run out.
    /// Returns the number closed.
    fn close_expired(&self) -> usize;

    /// Close every checked-in connection unused for longer than `idle_for`.
    /// Returns the number closed.
    fn close_idle(&self, idle_for: Duration) -> usize;
}

/// Point-in-time pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Slots holding an open client
    pub open: usize,
    /// Slots currently checked out by at least one request
    pub leased: usize,
}

struct Slot {
    client: Client,
    leases: usize,
    last_used: Instant,
    expires_at: Option<Instant>,
}

/// Per-origin pool of HTTP clients
pub struct ClientPool {
    read_timeout: Duration,
    connect_timeout: Duration,
    allow_untrusted_ssl: bool,
    user_agent: String,
    default_keep_alive: Option<Duration>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ClientPool {
    pub fn new(config: &ClientConfig) -> Arc<Self> {
        Arc::new(Self {
            read_timeout: config.read_timeout,
            connect_timeout: config.connect_timeout,
            allow_untrusted_ssl: config.allow_untrusted_ssl,
            user_agent: config.user_agent.clone(),
            default_keep_alive: config.keep_alive,
            slots: Mutex::new(HashMap::new()),
        })
    }

    /// Check out the slot for `origin`, opening one if needed
    pub fn acquire(self: &Arc<Self>, origin: &str) -> Result<PoolLease> {
        let mut slots = self.slots.lock();

        let slot = match slots.entry(origin.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let client = self.build_client()?;
                debug!(origin, "Opened pooled connection");
                entry.insert(Slot {
                    client,
                    leases: 0,
                    last_used: Instant::now(),
                    expires_at: None,
                })
            }
        };
        slot.leases += 1;

        Ok(PoolLease {
            pool: Arc::clone(self),
            origin: origin.to_string(),
            client: slot.client.clone(),
            keep_alive: None,
        })
    }

    pub fn stats(&self) -> PoolStats {
        let slots = self.slots.lock();
        PoolStats {
            open: slots.len(),
            leased: slots.values().filter(|slot| slot.leases > 0).count(),
        }
    }

    fn build_client(&self) -> Result<Client> {
        // Idle sockets are closed by the reaper, not by reqwest's own timer
        let client = Client::builder()
            .timeout(self.read_timeout)
            .connect_timeout(self.connect_timeout)
            .danger_accept_invalid_certs(self.allow_untrusted_ssl)
            .user_agent(self.user_agent.as_str())
            .pool_idle_timeout(None)
            .build()?;
        Ok(client)
    }

    fn release(&self, origin: &str, keep_alive: Option<Duration>) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(origin) {
            let now = Instant::now();
            slot.leases = slot.leases.saturating_sub(1);
            slot.last_used = now;
            // A TTL past the clock's range means no expiry
            slot.expires_at = keep_alive
                .or(self.default_keep_alive)
                .and_then(|ttl| now.checked_add(ttl));
        }
    }

    fn close_where<F>(&self, reason: &str, mut should_close: F) -> usize
    where
        F: FnMut(&Slot, Instant) -> bool,
    {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        let before = slots.len();

        slots.retain(|origin, slot| {
            let close = slot.leases == 0 && should_close(slot, now);
            if close {
                debug!(origin = %origin, reason, "Closing pooled connection");
            }
            !close
        });

        before - slots.len()
    }
}

impl ConnectionPool for ClientPool {
    fn close_expired(&self) -> usize {
        self.close_where("expired", |slot, now| {
            slot.expires_at.is_some_and(|expires_at| expires_at <= now)
        })
    }

    fn close_idle(&self, idle_for: Duration) -> usize {
        self.close_where("idle", |slot, now| now.duration_since(slot.last_used) > idle_for)
    }
}

/// A checked-out pool slot; checked back in on drop
pub struct PoolLease {
    pool: Arc<ClientPool>,
    origin: String,
    client: Client,
    keep_alive: Option<Duration>,
}

impl PoolLease {
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Keep-alive advertised by the server for this connection
    pub fn set_keep_alive(&mut self, keep_alive: Option<Duration>) {
        self.keep_alive = keep_alive;
    }
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        self.pool.release(&self.origin, self.keep_alive);
    }
}

/// Parse the `timeout=N` parameter of a `Keep-Alive` header
pub fn parse_keep_alive(value: &str) -> Option<Duration> {
    value.split(',').find_map(|param| {
        let (key, seconds) = param.trim().split_once('=')?;
        if key.trim().eq_ignore_ascii_case("timeout") {
            seconds.trim().parse::<u64>().ok().map(Duration::from_secs)
        } else {
            None
        }
    })
}
