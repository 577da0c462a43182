//! Transport connection tracking for the lockstep server
//!
//! UDP has no connections, so the server keeps its own table of peers that
//! completed the connect handshake. The table answers two questions the room
//! logic depends on:
//! - how many transport connections exist (the room-start condition compares
//!   the distinct join count against this), and
//! - which peers have gone silent (expired peers are surfaced to the
//!   coordinator as disconnect events).
//!
//! The registry is transport bookkeeping only. Participant identity lives in
//! the room session; nothing in here knows about ticks or player ids.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Default silence window after which a peer is considered gone.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Tracks connected peer addresses and their last activity.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: HashMap<SocketAddr, Instant>,
    timeout: Duration,
}

impl ConnectionRegistry {
    /// Creates an empty registry with the given silence timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            connections: HashMap::new(),
            timeout,
        }
    }

    /// Registers a peer that completed the connect handshake.
    ///
    /// Returns true for a new peer, false if the address was already
    /// registered (its activity timestamp is refreshed either way, so a
    /// repeated hello is harmless).
    pub fn register(&mut self, addr: SocketAddr) -> bool {
        let is_new = self
            .connections
            .insert(addr, Instant::now())
            .is_none();

        if is_new {
            info!("Connection registered from {}", addr);
        }
        is_new
    }

    /// Refreshes the last-seen time for a peer. No-op for unknown addresses,
    /// so stray datagrams cannot resurrect a dropped connection.
    pub fn touch(&mut self, addr: SocketAddr) {
        if let Some(last_seen) = self.connections.get_mut(&addr) {
            *last_seen = Instant::now();
        }
    }

    /// Removes a peer. Returns true if it was present.
    pub fn remove(&mut self, addr: SocketAddr) -> bool {
        if self.connections.remove(&addr).is_some() {
            info!("Connection removed for {}", addr);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, addr: SocketAddr) -> bool {
        self.connections.contains_key(&addr)
    }

    /// Current transport connection count.
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// All registered peer addresses, for room-wide broadcasts.
    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.connections.keys().copied().collect()
    }

    /// Removes every peer that has been silent past the timeout and returns
    /// them, so the caller can synthesize exits.
    pub fn check_timeouts(&mut self) -> Vec<SocketAddr> {
        let timeout = self.timeout;
        let expired: Vec<SocketAddr> = self
            .connections
            .iter()
            .filter(|(_, last_seen)| last_seen.elapsed() > timeout)
            .map(|(addr, _)| *addr)
            .collect();

        for addr in &expired {
            info!("Connection timed out for {}", addr);
            self.connections.remove(addr);
        }

        expired
    }

    /// Drops every registered peer, used on room teardown.
    pub fn clear(&mut self) {
        self.connections.clear();
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECTION_TIMEOUT)
    }
}
