//! Events - push channel のメッセージ
//!
//! - ClientMessage: subscriber -> server
//! - ServerMessage: server -> subscriber（task_update は非同期に、それ以外は応答として）

use serde::{Deserialize, Serialize};

use super::record::TaskView;

/// Literal frame answering a ping. Not JSON.
pub const PONG: &str = "pong";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    GetTasks,
    ClearTasks,
    /// `id` stays a raw string so a malformed id is a "not found", not a
    /// protocol error.
    RemoveTask { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Pong,
    TaskList {
        queued: Vec<TaskView>,
        processed: Vec<TaskView>,
    },
    TaskUpdate { task: TaskView },
}

impl ServerMessage {
    /// Text frame for the wire. `Pong` is the bare literal.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        match self {
            ServerMessage::Pong => Ok(PONG.to_string()),
            other => serde_json::to_string(other),
        }
    }
}
