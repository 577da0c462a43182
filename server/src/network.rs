//! Server network layer and lockstep coordination
//!
//! Mirrors the event-loop layout of the rest of the stack: a receiver task
//! turns datagrams into typed events, a sender task drains the outbound
//! queue, a sweeper expires silent peers, and the single-writer main loop
//! owns all lockstep state. Message handlers never block: they record data
//! and return, and all waiting is expressed as "tick not yet complete",
//! resolved by the periodic poll.

use crate::connection::ConnectionRegistry;
use crate::frame_buffer::FrameBuffer;
use crate::room::{ExitOutcome, JoinOutcome, RoomSession};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    Frame, InputSample, Packet, TickScheduler, JOIN_RESULT_OK, JOIN_RESULT_ROOM_RUNNING,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// How often the main loop polls the tick scheduler. Much finer than any
/// sensible tick interval so tick timing is dominated by the accumulator.
const POLL_PERIOD: Duration = Duration::from_millis(5);

/// Messages sent from background tasks to the main server loop
#[derive(Debug)]
pub enum ServerEvent {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ConnectionExpired {
        addr: SocketAddr,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the main loop to the network sender task
#[derive(Debug)]
pub enum Outbound {
    Send { packet: Packet, addr: SocketAddr },
    Broadcast { packet: Packet },
}

/// Authoritative lockstep server for a single room.
pub struct Server {
    socket: Arc<UdpSocket>,
    connections: Arc<RwLock<ConnectionRegistry>>,
    room: RoomSession,
    frames: FrameBuffer,
    scheduler: TickScheduler,
    cur_tick: u32,
    rng: StdRng,

    server_tx: mpsc::UnboundedSender<ServerEvent>,
    server_rx: mpsc::UnboundedReceiver<ServerEvent>,
    out_tx: mpsc::UnboundedSender<Outbound>,
    out_rx: mpsc::UnboundedReceiver<Outbound>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_interval: f32,
        connection_timeout: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            connections: Arc::new(RwLock::new(ConnectionRegistry::new(connection_timeout))),
            room: RoomSession::new(),
            frames: FrameBuffer::new(),
            scheduler: TickScheduler::new(tick_interval),
            cur_tick: 0,
            rng: StdRng::from_entropy(),
            server_tx,
            server_rx,
            out_tx,
            out_rx,
        })
    }

    /// Reconfigures the lockstep cadence; effective on the next poll.
    pub fn set_tick_interval(&mut self, secs: f32) {
        self.scheduler.set_interval(secs);
    }

    pub fn cur_tick(&self) -> u32 {
        self.cur_tick
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerEvent::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes the outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let connections = Arc::clone(&self.connections);
        let mut out_rx = std::mem::replace(&mut self.out_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                match message {
                    Outbound::Send { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    Outbound::Broadcast { packet } => {
                        let addrs = {
                            let connections_guard = connections.read().await;
                            connections_guard.addrs()
                        };

                        for addr in addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to {}: {}", addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that expires silent connections
    async fn spawn_timeout_checker(&self) {
        let connections = Arc::clone(&self.connections);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut sweep_interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                sweep_interval.tick().await;

                let expired = {
                    let mut connections_guard = connections.write().await;
                    connections_guard.check_timeouts()
                };

                for addr in expired {
                    if let Err(e) = server_tx.send(ServerEvent::ConnectionExpired { addr }) {
                        error!("Failed to send expiry event: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    async fn send_packet(&self, packet: &Packet, addr: SocketAddr) {
        if let Err(e) = self.out_tx.send(Outbound::Send {
            packet: packet.clone(),
            addr,
        }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    async fn broadcast_packet(&self, packet: &Packet) {
        if let Err(e) = self.out_tx.send(Outbound::Broadcast {
            packet: packet.clone(),
        }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Dispatches one received packet into the room / frame-buffer state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        self.connections.write().await.touch(addr);

        match packet {
            Packet::Connect { client_version } => {
                debug!(
                    "Connect from {} (version: {}), room {:?}",
                    addr,
                    client_version,
                    self.room.state()
                );
                self.connections.write().await.register(addr);
                self.send_packet(&Packet::ConnectAck, addr).await;
            }

            Packet::Disconnect => {
                self.connections.write().await.remove(addr);
                self.handle_transport_disconnect(addr).await;
            }

            Packet::JoinRoom { join_token } => {
                if !self.connections.read().await.contains(addr) {
                    warn!("Join request from unregistered peer {}", addr);
                    return;
                }

                match self.room.request_join(join_token, addr) {
                    JoinOutcome::Accepted { player_id } => {
                        debug!("Tick {} | join accepted, player {}", self.cur_tick, player_id);
                        self.send_packet(
                            &Packet::JoinRoomResult {
                                result: JOIN_RESULT_OK,
                            },
                            addr,
                        )
                        .await;
                    }
                    JoinOutcome::Duplicate => {}
                    JoinOutcome::Rejected => {
                        self.send_packet(
                            &Packet::JoinRoomResult {
                                result: JOIN_RESULT_ROOM_RUNNING,
                            },
                            addr,
                        )
                        .await;
                    }
                }

                self.try_start_room().await;
            }

            Packet::PlayerInput { tick, sample } => {
                // ticks below the counter were already broadcast and their
                // storage evicted; resubmissions for them must not grow the
                // buffer again. Input from unknown or departed participants
                // is dropped the same way.
                if self.room.is_running()
                    && tick >= self.cur_tick
                    && self.room.contains(sample.player_id)
                {
                    self.frames.submit(tick, sample);
                }
            }

            Packet::ExitRoom { player_id } => {
                self.handle_exit(player_id).await;
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Starts the room once every transport connection has joined.
    async fn try_start_room(&mut self) {
        let connection_count = self.connections.read().await.count();
        if !self.room.ready_to_start(connection_count) {
            return;
        }

        let roster = self.room.start(&mut self.rng);
        self.frames.clear();
        self.cur_tick = 0;
        self.scheduler.reset();

        self.broadcast_packet(&Packet::GameStart { roster }).await;
    }

    /// A dropped connection acts as an exit request from whichever
    /// participant was mapped to it; peers that never joined just leave the
    /// connection count. Either way the start condition may newly hold.
    async fn handle_transport_disconnect(&mut self, addr: SocketAddr) {
        if let Some(player_id) = self.room.participant_by_addr(addr) {
            self.handle_exit(player_id).await;
        }

        self.try_start_room().await;
    }

    async fn handle_exit(&mut self, player_id: u32) {
        match self.room.request_exit(player_id) {
            ExitOutcome::NotFound => {}
            ExitOutcome::Removed { remaining } => {
                let packet = Packet::PlayerExit { player_id };
                for addr in remaining {
                    self.send_packet(&packet, addr).await;
                }
            }
            ExitOutcome::Empty => {
                self.teardown_room().await;
            }
        }
    }

    /// Discards all lockstep state, drops every transport peer, and reopens
    /// the room for a fresh session.
    async fn teardown_room(&mut self) {
        let peers = {
            let mut connections = self.connections.write().await;
            let addrs = connections.addrs();
            connections.clear();
            addrs
        };

        let notice = Packet::Disconnected {
            reason: "Room closed".to_string(),
        };
        for addr in peers {
            self.send_packet(&notice, addr).await;
        }

        self.frames.clear();
        self.cur_tick = 0;
        self.scheduler.reset();
        self.room.shutdown();
        self.room.open();

        info!("Room torn down and reopened");
    }

    /// One lockstep step: broadcast the current tick if it is complete,
    /// otherwise leave it for the next poll. Ticks are never force-advanced
    /// with partial data; the timeline stalls rather than desyncs.
    async fn step(&mut self) {
        if !self.room.is_running() {
            return;
        }

        let expected = self.room.player_count();
        if !self.frames.is_complete(self.cur_tick, expected) {
            return;
        }

        // The raw count can be padded by a sample whose sender exited after
        // submitting; broadcast still requires every live participant.
        let live = self.room.participant_ids();
        let covered = self.frames.samples(self.cur_tick).map_or(false, |samples| {
            live.iter()
                .all(|id| samples.iter().any(|s| s.player_id == *id))
        });
        if !covered {
            return;
        }

        let samples: Vec<InputSample> = self
            .frames
            .take(self.cur_tick)
            .unwrap_or_default()
            .into_iter()
            .filter(|s| self.room.contains(s.player_id))
            .collect();

        debug!(
            "Tick {} complete, broadcasting {} samples",
            self.cur_tick,
            samples.len()
        );

        let frame = Frame {
            tick: self.cur_tick,
            samples,
        };
        self.broadcast_packet(&Packet::FrameInput { frame }).await;

        self.cur_tick += 1;
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.room.open();

        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut poll_interval = interval(POLL_PERIOD);
        let mut last_poll = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerEvent::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerEvent::ConnectionExpired { addr }) => {
                            self.handle_transport_disconnect(addr).await;
                        },
                        Some(ServerEvent::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = poll_interval.tick() => {
                    let now = Instant::now();
                    let elapsed = now.duration_since(last_poll).as_secs_f32();
                    last_poll = now;

                    let steps = self.scheduler.advance(elapsed);
                    for _ in 0..steps {
                        self.step().await;
                    }
                },
            }
        }

        Ok(())
    }
}
