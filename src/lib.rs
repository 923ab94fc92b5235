//! Grimfell Sync Server Library
//!
//! The synchronization core of an authoritative multiplayer action
//! server: lag-compensated hit validation over per-entity position
//! history, client-side prediction with server reconciliation, and a
//! delta-compressed snapshot protocol with per-recipient baselines.

pub mod combat;
pub mod config;
pub mod game;
pub mod metrics;
pub mod net;
pub mod predict;
pub mod server;
pub mod util;
