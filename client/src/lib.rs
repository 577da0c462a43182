//! # Lockstep Client Library
//!
//! Client-side implementation of the deterministic-lockstep protocol. The
//! client joins a room, mirrors the server's tick cadence locally, submits
//! one input sample per tick, and applies the server's merged frames in
//! strict tick order, stalling rather than guessing when a frame has not
//! arrived yet.
//!
//! ## Architecture Overview
//!
//! ### Stall, Don't Desync
//! The session only advances its tick counter after applying the complete
//! frame for that tick. Frames that arrive early or out of order are
//! buffered by tick number and consumed when the counter reaches them, so
//! every client dispatches the same samples in the same order.
//!
//! ### External Collaborators
//! Presentation is not this crate's business. Spawning, despawning, and
//! moving player representations go through the `PlayerWorld` trait, with
//! the session holding only opaque handles; local input is pulled from an
//! `InputSource` once per tick.
//!
//! ### Replay
//! The session keeps the game-start roster snapshot and every received
//! frame. After leaving a room it can rebuild the original roster and re-run
//! the recorded history at the same cadence, re-applying player exits at the
//! tick they originally landed on. Two replays of the same history produce
//! identical spawn state and apply order.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! The lockstep state machine: join flow, frame buffering and in-order
//! application, exit bookkeeping, replay.
//!
//! ### World Module (`world`)
//! The `PlayerWorld` collaborator seam and a headless logging
//! implementation.
//!
//! ### Input Module (`input`)
//! The per-tick `InputSource` seam with deterministic headless
//! implementations.
//!
//! ### Network Module (`network`)
//! UDP socket loop: connect/join handshake, packet dispatch into the
//! session, cadence-driven stepping.

pub mod input;
pub mod network;
pub mod session;
pub mod world;
