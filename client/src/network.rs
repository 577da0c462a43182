//! Client socket loop driving the lockstep session

use crate::session::{ClientSession, SessionState};
use crate::world::PlayerWorld;
use bincode::{deserialize, serialize};
use log::{error, info, warn};
use shared::{Packet, TickScheduler, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::interval;

/// How often the loop polls the tick scheduler, well under any sensible
/// tick interval.
const POLL_PERIOD: Duration = Duration::from_millis(5);

pub struct Client<W: PlayerWorld> {
    socket: UdpSocket,
    server_addr: SocketAddr,
    session: ClientSession<W>,
    scheduler: TickScheduler,
    connected: bool,
    replay_after_exit: bool,
}

impl<W: PlayerWorld> Client<W> {
    pub async fn new(
        server_addr: &str,
        session: ClientSession<W>,
        tick_interval: f32,
        replay_after_exit: bool,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            session,
            scheduler: TickScheduler::new(tick_interval),
            connected: false,
            replay_after_exit,
        })
    }

    /// Reconfigures the local tick cadence; effective on the next poll.
    pub fn set_tick_interval(&mut self, secs: f32) {
        self.scheduler.set_interval(secs);
    }

    pub fn session(&self) -> &ClientSession<W> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ClientSession<W> {
        &mut self.session
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server...");
        self.send_packet(&Packet::Connect {
            client_version: PROTOCOL_VERSION,
        })
        .await
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Dispatches one received packet. Returns false once the server has
    /// dropped us and the loop should end.
    async fn handle_packet(&mut self, packet: Packet) -> bool {
        match packet {
            Packet::ConnectAck => {
                if !self.connected {
                    self.connected = true;
                    info!("Connected, requesting to join the room");

                    let join = self.session.join_request();
                    if let Err(e) = self.send_packet(&join).await {
                        error!("Error sending join request: {}", e);
                    }
                }
            }

            Packet::JoinRoomResult { result } => {
                self.session.handle_join_result(result);
            }

            Packet::GameStart { roster } => {
                self.session.handle_game_start(roster);
            }

            Packet::FrameInput { frame } => {
                self.session.handle_frame(frame);
            }

            Packet::PlayerExit { player_id } => {
                self.session.handle_player_exit(player_id);
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.session.handle_disconnected();
                self.connected = false;
                return false;
            }

            _ => {
                warn!("Unexpected packet type from server");
            }
        }

        true
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut poll_interval = interval(POLL_PERIOD);
        let mut last_poll = Instant::now();
        let mut buffer = [0u8; 2048];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                                if !self.handle_packet(packet).await {
                                    return Ok(());
                                }
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = poll_interval.tick() => {
                    let now = Instant::now();
                    let elapsed = now.duration_since(last_poll).as_secs_f32();
                    last_poll = now;

                    let steps = self.scheduler.advance(elapsed);
                    for _ in 0..steps {
                        if let Some(packet) = self.session.step() {
                            if let Err(e) = self.send_packet(&packet).await {
                                error!("Error sending input: {}", e);
                            }
                        }
                    }
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Leaving room");
                    break;
                },
            }
        }

        if let Some(packet) = self.session.request_exit() {
            let _ = self.send_packet(&packet).await;
        }

        if self.replay_after_exit {
            self.run_replay().await;
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }

    /// Replays the recorded frame history locally at the live cadence. No
    /// server involvement; datagrams arriving meanwhile are left unread.
    async fn run_replay(&mut self) {
        if !self.session.start_replay() {
            return;
        }

        self.scheduler.reset();
        let mut poll_interval = interval(POLL_PERIOD);
        let mut last_poll = Instant::now();

        while self.session.state() == SessionState::Replaying {
            poll_interval.tick().await;

            let now = Instant::now();
            let elapsed = now.duration_since(last_poll).as_secs_f32();
            last_poll = now;

            let steps = self.scheduler.advance(elapsed);
            for _ in 0..steps {
                self.session.step();
            }
        }
    }
}
