//! Remote-call surface
//!
//! Transport-agnostic request/response types for the five player calls,
//! plus bincode helpers for hosts that move them as bytes.

use serde::{Deserialize, Serialize};

use crate::lobby::room::{GameRoom, Registered, ValidationError};
use crate::net::snapshot::GameStateResponse;

/// Calls from a client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Request {
    Register { secret: String, name: String },
    /// Fire-and-forget
    Unregister { secret: String },
    /// Fire-and-forget apart from delta validation
    Move { secret: String, dx: i32, dy: i32 },
    /// Fire-and-forget
    Action { secret: String },
    GetGameState { since_version: u64 },
}

/// Replies to a client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Response {
    Registered(Registered),
    /// Acknowledges a fire-and-forget call
    Ok,
    GameState(GameStateResponse),
    /// The call was rejected and changed nothing
    Invalid { reason: String },
}

impl From<ValidationError> for Response {
    fn from(err: ValidationError) -> Self {
        Response::Invalid {
            reason: err.to_string(),
        }
    }
}

/// Apply one request to the room
pub fn dispatch(room: &mut GameRoom, request: Request) -> Response {
    match request {
        Request::Register { secret, name } => match room.register(&secret, &name) {
            Ok(registered) => Response::Registered(registered),
            Err(err) => err.into(),
        },
        Request::Unregister { secret } => {
            room.unregister(&secret);
            Response::Ok
        }
        Request::Move { secret, dx, dy } => match room.move_player(&secret, dx, dy) {
            Ok(()) => Response::Ok,
            Err(err) => err.into(),
        },
        Request::Action { secret } => {
            room.action(&secret);
            Response::Ok
        }
        Request::GetGameState { since_version } => Response::GameState(room.game_state(since_version)),
    }
}

/// Encode a message using bincode
/// Uses legacy config for fixed-size integers
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message using bincode
/// Uses legacy config for fixed-size integers
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

/// Decode a request, dispatch it and encode the reply
pub fn handle_bytes(room: &mut GameRoom, data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let request: Request = decode(data)?;
    let response = dispatch(room, request);
    encode(&response).map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);
