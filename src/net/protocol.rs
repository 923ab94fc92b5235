//! Control-channel message envelope
//!
//! Everything that is not latency-critical rides this bincode-encoded
//! enum: handshake, pings, snapshot acks, combat notifications. The
//! hot-path payloads (snapshots, corrections, input records) are packed
//! by hand in [`crate::net::snapshot`] and carried here as opaque bytes.

use serde::{Deserialize, Serialize};

use crate::combat::system::HitResult;
use crate::game::constants::net::PROTOCOL_VERSION;
use crate::game::state::EntityId;

/// Messages from client to server
///
/// The transport layer owns the handshake: it checks `Hello`'s version
/// with [`version_compatible`] and answers `HelloAck` or `Rejected`
/// before admitting any other message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Handshake, must be the first message on a connection
    Hello {
        protocol_version: u32,
        player_name: String,
    },
    /// One hand-packed input record, see [`crate::net::snapshot::encode_input`]
    Input(Vec<u8>),
    /// Ping for RTT measurement
    Ping { timestamp_ms: u32 },
    /// Acknowledge receiving the snapshot for this tick
    SnapshotAck { tick: u32 },
    /// Request to leave the game
    Leave,
}

/// Messages from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Handshake accepted with the entity assigned to this connection
    HelloAck {
        entity_id: EntityId,
        server_tick: u32,
    },
    /// Handshake refused (version mismatch, full server)
    Rejected { reason: String },
    /// One hand-packed delta snapshot
    Snapshot(Vec<u8>),
    /// One hand-packed authoritative correction, owner only
    Correction(Vec<u8>),
    /// Combat outcome visible to this client
    CombatEvent(CombatNotification),
    /// Pong echoing the client timestamp for RTT measurement
    Pong {
        client_timestamp_ms: u32,
        server_timestamp_ms: u32,
    },
    /// Server is dropping the connection
    Kicked { reason: String },
}

/// Combat outcome broadcast to interested clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CombatNotification {
    /// A validated attack landed
    Hit {
        attacker: EntityId,
        target: EntityId,
        damage: i32,
        critical: bool,
    },
    /// An attack was validated but found no target
    Miss { attacker: EntityId },
    /// An entity died to a validated attack
    Death {
        attacker: EntityId,
        target: EntityId,
    },
}

/// Notifications for one attack result from the tick loop
///
/// A lethal hit produces both the hit and the death, in that order.
pub fn combat_notifications(attacker: EntityId, result: &HitResult) -> Vec<CombatNotification> {
    let mut out = Vec::with_capacity(2);
    match result.target {
        Some(target) => {
            out.push(CombatNotification::Hit {
                attacker,
                target,
                damage: result.damage,
                critical: result.is_critical,
            });
            if result.target_died {
                out.push(CombatNotification::Death { attacker, target });
            }
        }
        None => out.push(CombatNotification::Miss { attacker }),
    }
    out
}

/// True when a client handshake version is compatible with ours
///
/// Only the major half is binding, matching the check on hand-packed
/// packet headers.
pub fn version_compatible(theirs: u32) -> bool {
    theirs >> 16 == PROTOCOL_VERSION >> 16
}

/// Encode a message using bincode legacy config (fixed-size integers)
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message using bincode legacy config
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);
