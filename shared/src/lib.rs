use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;

/// Seconds per lockstep tick unless overridden at startup or runtime.
pub const DEFAULT_TICK_INTERVAL: f32 = 0.033;
/// Floor for configurable tick intervals, keeps the accumulator drain finite.
pub const MIN_TICK_INTERVAL: f32 = 0.001;

/// Radius of the disc players are scattered over at game start.
pub const SPAWN_RADIUS: f32 = 5.0;
/// Cosmetic movement scale applied client-side when dispatching frame input.
pub const DEFAULT_MOVE_SPEED: f32 = 1.0;

pub const JOIN_RESULT_OK: u8 = 0;
pub const JOIN_RESULT_ROOM_RUNNING: u8 = 1;

#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn scaled(&self, factor: f32) -> Vec3 {
        Vec3 {
            x: self.x * factor,
            y: self.y * factor,
            z: self.z * factor,
        }
    }
}

/// One roster entry of the game-start broadcast. Clients recognize their own
/// slot by matching `join_token` against the nonce they joined with.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerInfo {
    pub player_id: u32,
    pub join_token: u64,
    pub spawn_pos: Vec3,
    pub spawn_yaw: f32,
}

/// A single participant's movement input for one tick. Immutable once built;
/// the server keeps the first sample it sees per (tick, participant).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InputSample {
    pub player_id: u32,
    pub move_dir: Vec3,
}

/// The complete input bundle for one tick, samples in arrival order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Frame {
    pub tick: u32,
    pub samples: Vec<InputSample>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Disconnect,
    JoinRoom {
        join_token: u64,
    },
    PlayerInput {
        tick: u32,
        sample: InputSample,
    },
    ExitRoom {
        player_id: u32,
    },

    ConnectAck,
    Disconnected {
        reason: String,
    },
    JoinRoomResult {
        result: u8,
    },
    GameStart {
        roster: Vec<PlayerInfo>,
    },
    FrameInput {
        frame: Frame,
    },
    PlayerExit {
        player_id: u32,
    },
}

/// Fixed-timestep accumulator decoupling the logical tick rate from how often
/// the host polls time.
///
/// Elapsed wall-clock time is fed into a residual; each call drains whole
/// intervals out of it and reports how many steps to run. The leftover is
/// always smaller than one interval, so ticks are neither skipped nor
/// duplicated under variable polling rates.
#[derive(Debug, Clone)]
pub struct TickScheduler {
    interval: f32,
    residual: f32,
}

impl TickScheduler {
    pub fn new(interval: f32) -> Self {
        Self {
            interval: interval.max(MIN_TICK_INTERVAL),
            residual: 0.0,
        }
    }

    pub fn interval(&self) -> f32 {
        self.interval
    }

    /// Reconfigures the tick cadence. Takes effect on the next `advance`
    /// call, not retroactively.
    pub fn set_interval(&mut self, interval: f32) {
        self.interval = interval.max(MIN_TICK_INTERVAL);
    }

    /// Accumulates `elapsed` seconds and returns the number of whole steps
    /// now due.
    pub fn advance(&mut self, elapsed: f32) -> u32 {
        self.residual += elapsed.max(0.0);

        let mut steps = 0;
        while self.residual >= self.interval {
            self.residual -= self.interval;
            steps += 1;
        }
        steps
    }

    /// Discards any accumulated residual, e.g. when a session (re)starts.
    pub fn reset(&mut self) {
        self.residual = 0.0;
    }
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_INTERVAL)
    }
}
