//! JSON frames of the popsub WebSocket protocol, seen from the client side.
//!
//! A client logs in with a username/password, receives a token, authenticates
//! with it and may then subscribe and publish. Deliveries with `qos = 1` must
//! be acknowledged with their `message_id`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "auth")]
    Auth { token: String },
    #[serde(rename = "login")]
    Login { username: String, password: String },
    #[serde(rename = "subscribe")]
    Subscribe { topic: String },
    #[serde(rename = "publish")]
    Publish {
        topic: String,
        payload: String,
        message_id: Option<String>,
        qos: Option<u8>,
    },
    #[serde(rename = "ack")]
    Ack { message_id: String },
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "login_response")]
    LoginResponse { token: String },
    #[serde(rename = "authenticated")]
    Authenticated {},
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "message")]
    Message {
        topic: String,
        payload: String,
        timestamp: i64,
        message_id: String,
        qos: u8,
    },
}
