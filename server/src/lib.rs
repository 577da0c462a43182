//! # Lockstep Server Library
//!
//! Authoritative server for deterministic-lockstep rooms. The server does
//! not simulate gameplay: it collects one input sample per participant per
//! tick, and only when a tick's bundle is complete does it broadcast the
//! merged frame, so every client simulates the same tick from the same data.
//!
//! ## Core Responsibilities
//!
//! ### Input Aggregation
//! Client inputs are buffered per tick. A tick becomes broadcastable only
//! when every live participant's sample has arrived; duplicate submissions
//! are ignored (first received wins).
//!
//! ### Room Lifecycle
//! The room deduplicates join requests by client token, assigns participant
//! ids monotonically, and starts the game exactly when every transport
//! connection has joined. Exits and dropped connections shrink the live
//! roster, and a drained room tears itself down and reopens for the next
//! session.
//!
//! ### Lockstep Pacing
//! A fixed-timestep accumulator advances the authoritative tick counter at a
//! configurable cadence. An incomplete tick stalls the timeline rather than
//! advancing with partial data; the stall resolves when the missing input
//! arrives or the missing participant departs.
//!
//! ## Architecture Design
//!
//! ### Single-Writer Event Loop
//! All lockstep state is owned by one loop that interleaves network events
//! with scheduler polls. Background tasks only shuttle packets and expiry
//! notices over channels, so no room or frame-buffer mutation ever races.
//!
//! ### UDP With a Connection Registry
//! Peers announce themselves with a connect handshake and are tracked by
//! address; silent peers are expired and treated as disconnects. The
//! registry count doubles as the "everyone has joined" denominator for the
//! room-start condition.
//!
//! ## Module Organization
//!
//! ### Frame Buffer Module (`frame_buffer`)
//! Per-tick sample storage: idempotent submission, completeness queries,
//! eviction on broadcast.
//!
//! ### Room Module (`room`)
//! Join/start handshake state machine, participant roster, exit and
//! shutdown bookkeeping.
//!
//! ### Connection Module (`connection`)
//! Transport peer table with last-seen tracking and timeout sweeps.
//!
//! ### Network Module (`network`)
//! Socket tasks, packet dispatch, and the coordinating lockstep loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         shared::DEFAULT_TICK_INTERVAL,
//!         Duration::from_secs(5),
//!     )
//!     .await?;
//!
//!     // Runs the lockstep loop: accepts joins, starts the room when all
//!     // connections have joined, aggregates per-tick input, broadcasts
//!     // complete frames, and handles exits and dropped connections.
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod frame_buffer;
pub mod network;
pub mod room;
