//! Client-side lockstep session
//!
//! Mirrors the server's tick cadence locally: each step emits the local
//! input sample for the current tick and applies the server's merged frame
//! for that tick once it has arrived. Frames may arrive early or out of
//! order; they are buffered by tick and consumed strictly in order, so the
//! session stalls rather than desyncs when a frame is still in flight.
//!
//! The session is pure logic. It dispatches world effects through the
//! `PlayerWorld` collaborator and returns outbound packets to the caller;
//! it never touches a socket.

use crate::input::InputSource;
use crate::world::{PlayerHandle, PlayerWorld};
use log::{debug, info, warn};
use shared::{Frame, InputSample, Packet, PlayerInfo, DEFAULT_MOVE_SPEED, JOIN_RESULT_OK};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotJoined,
    AwaitingStart,
    Running,
    Stopped,
    Replaying,
}

pub struct ClientSession<W: PlayerWorld> {
    state: SessionState,
    join_token: u64,
    player_id: Option<u32>,
    cur_tick: u32,
    move_speed: f32,

    /// Frames received from the server, keyed by tick. Doubles as the
    /// replayable history after the session stops.
    frames: HashMap<u32, Frame>,
    /// Roster as broadcast at game start; replay respawns from this even
    /// after the live roster has shrunk.
    snapshot: Vec<PlayerInfo>,
    handles: HashMap<u32, PlayerHandle>,
    /// Exits observed live, keyed by the tick they landed on, so replay can
    /// re-apply them at the same point.
    recorded_exits: HashMap<u32, Vec<u32>>,
    replay_last_tick: Option<u32>,

    world: W,
    input: Box<dyn InputSource + Send>,
}

impl<W: PlayerWorld> ClientSession<W> {
    pub fn new(world: W, input: Box<dyn InputSource + Send>, join_token: u64) -> Self {
        Self {
            state: SessionState::NotJoined,
            join_token,
            player_id: None,
            cur_tick: 0,
            move_speed: DEFAULT_MOVE_SPEED,
            frames: HashMap::new(),
            snapshot: Vec::new(),
            handles: HashMap::new(),
            recorded_exits: HashMap::new(),
            replay_last_tick: None,
            world,
            input,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cur_tick(&self) -> u32 {
        self.cur_tick
    }

    pub fn player_id(&self) -> Option<u32> {
        self.player_id
    }

    pub fn join_token(&self) -> u64 {
        self.join_token
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    /// Cosmetic movement scale; applies from the next dispatched frame on.
    pub fn set_move_speed(&mut self, speed: f32) {
        self.move_speed = speed;
    }

    /// The join request for this session's token.
    pub fn join_request(&self) -> Packet {
        Packet::JoinRoom {
            join_token: self.join_token,
        }
    }

    pub fn handle_join_result(&mut self, result: u8) {
        if self.state != SessionState::NotJoined {
            return;
        }

        if result == JOIN_RESULT_OK {
            info!("Join accepted, waiting for game start");
            self.state = SessionState::AwaitingStart;
        } else {
            // surfacing the code to the user belongs to the presentation
            // layer; the session just stays joinable
            warn!("Failed to join room, error code {}", result);
        }
    }

    /// Spawns the roster, finds the local slot by join token, and enters
    /// Running at tick 0.
    pub fn handle_game_start(&mut self, roster: Vec<PlayerInfo>) {
        if self.state != SessionState::AwaitingStart {
            warn!("Ignoring game start in state {:?}", self.state);
            return;
        }

        self.snapshot = roster;
        let roster = self.snapshot.clone();
        self.spawn_players(&roster);

        self.player_id = self
            .snapshot
            .iter()
            .find(|info| info.join_token == self.join_token)
            .map(|info| info.player_id);

        if self.player_id.is_none() {
            warn!("No roster entry matches our join token, running as spectator");
        }

        self.cur_tick = 0;
        self.state = SessionState::Running;

        info!(
            "Game started: local player {:?}, {} players",
            self.player_id,
            self.snapshot.len()
        );
    }

    /// Buffers a merged frame until the session's tick reaches it.
    pub fn handle_frame(&mut self, frame: Frame) {
        debug!(
            "Tick {} | buffered frame for tick {}",
            self.cur_tick, frame.tick
        );
        // a duplicated datagram must not clobber history: first wins
        self.frames.entry(frame.tick).or_insert(frame);
    }

    /// Removes a departed player's representation immediately and records
    /// the tick it happened on for replay.
    pub fn handle_player_exit(&mut self, player_id: u32) {
        let handle = match self.handles.remove(&player_id) {
            Some(handle) => handle,
            None => return,
        };
        self.world.despawn(handle);

        if self.state != SessionState::Replaying {
            self.recorded_exits
                .entry(self.cur_tick)
                .or_default()
                .push(player_id);
        }

        info!("Player {} exited at tick {}", player_id, self.cur_tick);
    }

    /// The server dropped this client: tear everything down, including the
    /// recorded history, and return to NotJoined.
    pub fn handle_disconnected(&mut self) {
        if matches!(self.state, SessionState::Running | SessionState::Replaying) {
            self.stop_running();
        }

        self.frames.clear();
        self.recorded_exits.clear();
        self.snapshot.clear();
        self.player_id = None;
        self.cur_tick = 0;
        self.replay_last_tick = None;
        self.state = SessionState::NotJoined;
    }

    /// Advances the session by one scheduled step.
    ///
    /// While Running this returns the local input packet to send for the
    /// current tick; the tick itself only advances once the matching frame
    /// has been applied, so an input may be re-sent for the same tick (the
    /// server deduplicates). Replay steps never send.
    pub fn step(&mut self) -> Option<Packet> {
        match self.state {
            SessionState::Running => self.step_live(),
            SessionState::Replaying => {
                self.step_replay();
                None
            }
            _ => None,
        }
    }

    fn step_live(&mut self) -> Option<Packet> {
        let outbound = self.player_id.map(|player_id| Packet::PlayerInput {
            tick: self.cur_tick,
            sample: InputSample {
                player_id,
                move_dir: self.input.sample(self.cur_tick),
            },
        });

        if let Some(frame) = self.frames.get(&self.cur_tick).cloned() {
            self.apply_frame(&frame);
            self.cur_tick += 1;
        }

        outbound
    }

    fn step_replay(&mut self) {
        if let Some(frame) = self.frames.get(&self.cur_tick).cloned() {
            self.apply_frame(&frame);
            self.replay_exits_at(self.cur_tick);
            self.cur_tick += 1;
        }

        let done = match self.replay_last_tick {
            Some(last) => self.cur_tick > last,
            None => true,
        };
        if done {
            info!("Replay finished after tick {}", self.cur_tick);
            self.stop_running();
        }
    }

    /// Leaves the room: the local world is torn down immediately, while the
    /// frame history, roster snapshot, and recorded exits survive for
    /// replay. Returns the exit request to send.
    pub fn request_exit(&mut self) -> Option<Packet> {
        if self.state != SessionState::Running {
            return None;
        }

        let outbound = self.player_id.map(|player_id| Packet::ExitRoom { player_id });
        self.stop_running();
        outbound
    }

    /// Rebuilds the original roster from the game-start snapshot and re-runs
    /// the recorded frame history from tick 0 at the live cadence. Stops
    /// automatically once the last recorded tick has been applied.
    pub fn start_replay(&mut self) -> bool {
        if self.state != SessionState::Stopped {
            return false;
        }
        if self.snapshot.is_empty() {
            warn!("No recorded session to replay");
            return false;
        }

        let roster = self.snapshot.clone();
        self.spawn_players(&roster);

        self.replay_last_tick = self.frames.keys().copied().max();
        self.cur_tick = 0;
        self.state = SessionState::Replaying;

        info!("Replay started over {} recorded frames", self.frames.len());
        true
    }

    fn spawn_players(&mut self, infos: &[PlayerInfo]) {
        for info in infos {
            let handle = self.world.spawn(info);
            self.handles.insert(info.player_id, handle);
        }
    }

    fn apply_frame(&mut self, frame: &Frame) {
        for sample in &frame.samples {
            // samples for players despawned by an earlier exit are inert
            if let Some(&handle) = self.handles.get(&sample.player_id) {
                self.world
                    .translate(handle, sample.move_dir.scaled(self.move_speed));
            }
        }
    }

    fn replay_exits_at(&mut self, tick: u32) {
        let exited = match self.recorded_exits.get(&tick) {
            Some(ids) => ids.clone(),
            None => return,
        };

        for player_id in exited {
            if let Some(handle) = self.handles.remove(&player_id) {
                self.world.despawn(handle);
            }
        }
    }

    fn stop_running(&mut self) {
        // deterministic teardown order keeps repeated replays identical
        let mut ids: Vec<u32> = self.handles.keys().copied().collect();
        ids.sort_unstable();

        for player_id in ids {
            if let Some(handle) = self.handles.remove(&player_id) {
                self.world.despawn(handle);
            }
        }

        self.state = SessionState::Stopped;
    }
}
