//! Seam to whatever presents spawned players
//!
//! The session never manipulates a player representation directly: it asks
//! the world collaborator to spawn, despawn, and move, and keeps only the
//! handle-to-participant association.

use log::debug;
use shared::{PlayerInfo, Vec3};

/// Opaque handle to a spawned player representation. Only the issuing
/// `PlayerWorld` knows what is behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerHandle(pub u64);

pub trait PlayerWorld {
    /// Creates a representation for `info` at its spawn pose.
    fn spawn(&mut self, info: &PlayerInfo) -> PlayerHandle;

    /// Destroys a previously spawned representation.
    fn despawn(&mut self, handle: PlayerHandle);

    /// Moves a representation by `delta` in world space.
    fn translate(&mut self, handle: PlayerHandle, delta: Vec3);
}

/// Headless world for the client binary: logs what a presentation layer
/// would do and hands out sequential handles.
#[derive(Debug, Default)]
pub struct LoggingWorld {
    next_handle: u64,
}

impl LoggingWorld {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlayerWorld for LoggingWorld {
    fn spawn(&mut self, info: &PlayerInfo) -> PlayerHandle {
        let handle = PlayerHandle(self.next_handle);
        self.next_handle += 1;

        debug!(
            "Spawn player {} at ({:.2}, {:.2}, {:.2}) yaw {:.1}",
            info.player_id, info.spawn_pos.x, info.spawn_pos.y, info.spawn_pos.z, info.spawn_yaw
        );
        handle
    }

    fn despawn(&mut self, handle: PlayerHandle) {
        debug!("Despawn {:?}", handle);
    }

    fn translate(&mut self, handle: PlayerHandle, delta: Vec3) {
        debug!(
            "Move {:?} by ({:.3}, {:.3}, {:.3})",
            handle, delta.x, delta.y, delta.z
        );
    }
}
