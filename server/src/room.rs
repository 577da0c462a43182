//! Room handshake state and participant roster
//!
//! A room moves through Idle -> AwaitingJoins -> Running -> ShuttingDown and
//! back to Idle. While awaiting joins it deduplicates join requests by the
//! client-supplied token and assigns participant ids monotonically in join
//! order; once running it answers roster queries for the lockstep loop and
//! handles exits. The room never touches the network: callers act on the
//! returned outcomes.

use log::info;
use rand::Rng;
use shared::{PlayerInfo, Vec3, SPAWN_RADIUS};
use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    Idle,
    AwaitingJoins,
    Running,
    ShuttingDown,
}

/// A joined player slot. The connection is referenced by address only; the
/// transport layer owns it.
#[derive(Debug, Clone)]
pub struct Participant {
    pub player_id: u32,
    pub join_token: u64,
    pub addr: SocketAddr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// New token: id assigned, success result owed to the requester.
    Accepted { player_id: u32 },
    /// Token already recorded: ignored, no second result is sent.
    Duplicate,
    /// Room is past the join phase: failure result owed to the requester.
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    NotFound,
    /// Participant removed; notify the remaining roster addresses.
    Removed { remaining: Vec<SocketAddr> },
    /// Roster drained to zero; the room is now ShuttingDown.
    Empty,
}

pub struct RoomSession {
    state: RoomState,
    roster: Vec<Participant>,
    next_player_id: u32,
}

impl RoomSession {
    pub fn new() -> Self {
        Self {
            state: RoomState::Idle,
            roster: Vec::new(),
            next_player_id: 0,
        }
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RoomState::Running
    }

    /// Opens an Idle room for joins. No-op in any other state.
    pub fn open(&mut self) {
        if self.state == RoomState::Idle {
            info!("Room open, awaiting joins");
            self.state = RoomState::AwaitingJoins;
        }
    }

    /// Registers a join request.
    ///
    /// Tokens are deduplicated, so a client retrying its join gets exactly
    /// one participant id and one success result. Requests outside the join
    /// phase are rejected non-fatally.
    pub fn request_join(&mut self, join_token: u64, addr: SocketAddr) -> JoinOutcome {
        if self.state != RoomState::AwaitingJoins {
            return JoinOutcome::Rejected;
        }

        if self.roster.iter().any(|p| p.join_token == join_token) {
            return JoinOutcome::Duplicate;
        }

        let player_id = self.next_player_id;
        self.next_player_id += 1;

        info!("Player {} joined from {}", player_id, addr);
        self.roster.push(Participant {
            player_id,
            join_token,
            addr,
        });

        JoinOutcome::Accepted { player_id }
    }

    /// Number of distinct join requests recorded so far.
    pub fn pending_count(&self) -> usize {
        self.roster.len()
    }

    /// The room starts exactly when every transport connection has joined.
    pub fn ready_to_start(&self, connection_count: usize) -> bool {
        self.state == RoomState::AwaitingJoins
            && !self.roster.is_empty()
            && self.roster.len() == connection_count
    }

    /// Transitions to Running and builds the game-start roster, one entry
    /// per participant in join order with a randomized spawn pose.
    pub fn start<R: Rng>(&mut self, rng: &mut R) -> Vec<PlayerInfo> {
        info!("Room running with {} players", self.roster.len());
        self.state = RoomState::Running;

        self.roster
            .iter()
            .map(|p| {
                let (spawn_pos, spawn_yaw) = random_spawn_pose(rng);
                PlayerInfo {
                    player_id: p.player_id,
                    join_token: p.join_token,
                    spawn_pos,
                    spawn_yaw,
                }
            })
            .collect()
    }

    /// Live participant count, the divisor for frame completeness.
    pub fn player_count(&self) -> usize {
        self.roster.len()
    }

    pub fn contains(&self, player_id: u32) -> bool {
        self.roster.iter().any(|p| p.player_id == player_id)
    }

    pub fn participant_ids(&self) -> Vec<u32> {
        self.roster.iter().map(|p| p.player_id).collect()
    }

    pub fn participant_addrs(&self) -> Vec<SocketAddr> {
        self.roster.iter().map(|p| p.addr).collect()
    }

    /// Maps a transport address back to its participant, for synthesizing an
    /// exit when a connection drops. None if the peer never joined.
    pub fn participant_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.roster
            .iter()
            .find(|p| p.addr == addr)
            .map(|p| p.player_id)
    }

    /// Removes a participant from the roster.
    ///
    /// Draining the roster to zero flips the room to ShuttingDown; the
    /// caller is expected to tear down and reopen.
    pub fn request_exit(&mut self, player_id: u32) -> ExitOutcome {
        let index = match self.roster.iter().position(|p| p.player_id == player_id) {
            Some(index) => index,
            None => return ExitOutcome::NotFound,
        };

        self.roster.remove(index);
        info!("Player {} left the room", player_id);

        if self.roster.is_empty() {
            info!("Room empty, shutting down");
            self.state = RoomState::ShuttingDown;
            return ExitOutcome::Empty;
        }

        ExitOutcome::Removed {
            remaining: self.participant_addrs(),
        }
    }

    /// Clears all session state and returns to Idle. Participant ids restart
    /// from zero in the next session.
    pub fn shutdown(&mut self) {
        self.roster.clear();
        self.next_player_id = 0;
        self.state = RoomState::Idle;
    }
}

impl Default for RoomSession {
    fn default() -> Self {
        Self::new()
    }
}

fn random_spawn_pose<R: Rng>(rng: &mut R) -> (Vec3, f32) {
    // sqrt keeps the distribution uniform over the disc area
    let radius = SPAWN_RADIUS * rng.gen::<f32>().sqrt();
    let theta = rng.gen_range(0.0..std::f32::consts::TAU);

    let pos = Vec3::new(radius * theta.cos(), 0.0, radius * theta.sin());
    let yaw = rng.gen_range(0.0..360.0);

    (pos, yaw)
}
