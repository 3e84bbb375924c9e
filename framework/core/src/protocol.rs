//! The messages exchanged between the coordinator and its worker processes.
//!
//! Every message is a single line of JSON. The coordinator writes [WorkerCommand]s to a worker's
//! stdin and the worker answers with [WorkerMessage]s on its stdout.

use std::fmt::{Display, Formatter};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::script::{PhaseSpec, Script};

/// Identifies a worker by its OS process id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(u32);

impl WorkerId {
    pub fn new(pid: u32) -> Self {
        Self(pid)
    }

    pub fn pid(&self) -> u32 {
        self.0
    }
}

impl Display for WorkerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A phase as announced by a worker when it starts executing it.
///
/// Only `index` is interpreted by the coordinator. Everything else the worker sends along is kept
/// as-is in `metadata` and handed on unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub index: u32,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl Phase {
    /// Describe phase `index` of a script with its spec as metadata.
    pub fn from_spec(index: u32, spec: &PhaseSpec) -> serde_json::Result<Self> {
        let metadata = match serde_json::to_value(spec)? {
            Value::Object(metadata) => metadata,
            _ => Map::new(),
        };

        Ok(Self { index, metadata })
    }

    /// The metadata read as a [PhaseSpec], if it is one.
    pub fn spec(&self) -> Option<PhaseSpec> {
        serde_json::from_value(Value::Object(self.metadata.clone())).ok()
    }

    pub fn display_name(&self) -> String {
        match self.metadata.get("name").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => format!("phase {}", self.index),
        }
    }
}

/// Options that are handed to every worker along with its script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOpts {
    pub script: Script,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub options: RunOptions,
}

/// Coordinator to worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum WorkerCommand {
    Run { opts: RunOpts },
}

impl WorkerCommand {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

/// Worker to coordinator.
///
/// The stats payload type is left to the caller so that this crate does not need to know how
/// measurements are represented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum WorkerMessage<S> {
    PhaseStarted {
        phase: Phase,
    },
    PhaseCompleted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        phase: Option<Phase>,
    },
    Stats {
        pid: WorkerId,
        stats: S,
    },
    Done {
        pid: WorkerId,
    },
}

const EVENT_KINDS: [&str; 4] = ["phaseStarted", "phaseCompleted", "stats", "done"];

/// Result of reading one line from a worker.
#[derive(Debug, PartialEq)]
pub enum Decoded<S> {
    Message(WorkerMessage<S>),
    /// Valid JSON that does not carry a known `event` kind.
    Unrecognized { event: Option<String> },
    /// Anything else the worker printed, such as stray log output.
    NotJson,
}

impl<S> WorkerMessage<S> {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerMessage::PhaseStarted { .. } => EVENT_KINDS[0],
            WorkerMessage::PhaseCompleted { .. } => EVENT_KINDS[1],
            WorkerMessage::Stats { .. } => EVENT_KINDS[2],
            WorkerMessage::Done { .. } => EVENT_KINDS[3],
        }
    }
}

impl<S: Serialize> WorkerMessage<S> {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl<S: DeserializeOwned> WorkerMessage<S> {
    /// Decode a line of worker output.
    ///
    /// Unknown event kinds are not an error so that workers can add events the coordinator does not
    /// understand yet. A known event kind with the wrong shape is a [ProtocolViolation].
    pub fn decode(line: &str) -> Result<Decoded<S>, ProtocolViolation> {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
            return Ok(Decoded::NotJson);
        };

        let kind = match value.get("event").and_then(serde_json::Value::as_str) {
            Some(kind) if EVENT_KINDS.contains(&kind) => kind.to_string(),
            other => {
                return Ok(Decoded::Unrecognized {
                    event: other.map(str::to_string),
                })
            }
        };

        serde_json::from_value(value)
            .map(Decoded::Message)
            .map_err(|e| ProtocolViolation::new(kind, e.to_string()))
    }
}

/// A worker sent a message of a known kind that cannot be trusted.
#[derive(derive_more::Error, derive_more::Display, Debug, Clone, PartialEq)]
#[display("malformed `{event}` message: {reason}")]
pub struct ProtocolViolation {
    event: String,
    reason: String,
}

impl ProtocolViolation {
    pub fn new(event: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            reason: reason.into(),
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }
}
