//! Remote host client.
//!
//! [`RemoteHost`] is the seam between the dispatcher and whatever holds the
//! authoritative graph. [`HttpHost`] talks to the sync server over HTTP;
//! [`MemoryHost`] keeps a create-or-replace model in process for dry runs and
//! tests.
//!
//! Endpoints:
//!
//! | call          | request                                                  | timeout |
//! |---------------|----------------------------------------------------------|---------|
//! | health        | `GET /health`                                            | short   |
//! | batch         | `POST /sync/batch {operations}`                          | long    |
//! | command       | `POST /sync/command {command, payload: {path, data}}`    | medium  |

use std::collections::BTreeMap;
use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use rbxtree_core::{InstanceData, InstancePath, Operation, ServiceSet, SyncConfig};

/// Command name for a single create-or-replace.
pub const UPDATE_COMMAND: &str = "sync:update";

/// Status the server uses when no plugin is attached to take the work.
pub const STATUS_NOT_ATTACHED: u16 = 504;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    pub path: InstancePath,
    pub data: InstanceData,
}

/// Body of `POST /sync/command`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub command: String,
    pub payload: CommandPayload,
}

impl Command {
    pub fn update(op: &Operation) -> Self {
        Self {
            command: UPDATE_COMMAND.to_string(),
            payload: CommandPayload {
                path: op.path.clone(),
                data: op.data.clone(),
            },
        }
    }
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    operations: &'a [Operation],
}

/// Per-operation result inside a batch reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyData {
    pub results: Vec<OpResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyBody {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ReplyData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReplyBody {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// Parse `text`, keeping unparseable text as the error message.
    fn lenient(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_else(|_| Self {
            success: false,
            data: None,
            error: (!text.trim().is_empty()).then(|| text.trim().chars().take(200).collect()),
        })
    }
}

/// An HTTP-level answer. Non-2xx statuses are replies, not errors.
#[derive(Debug, Clone, PartialEq)]
pub struct HostReply {
    pub status: u16,
    pub body: ReplyBody,
}

impl HostReply {
    pub fn is_2xx(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request never produced an HTTP answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("timed out waiting for {url}")]
    Timeout { url: String },

    #[error("cannot connect to {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("invalid reply from {url}: {reason}")]
    InvalidReply { url: String, reason: String },

    #[error("request to {url} failed: {reason}")]
    Other { url: String, reason: String },
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Something that applies operations to the authoritative graph.
pub trait RemoteHost {
    /// Human-readable location for messages.
    fn location(&self) -> String;

    fn check_health(&mut self) -> Result<HostReply, TransportError>;

    fn apply_batch(&mut self, operations: &[Operation]) -> Result<HostReply, TransportError>;

    fn run_command(&mut self, command: &Command) -> Result<HostReply, TransportError>;
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Per-endpoint request timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostTimeouts {
    pub health: Duration,
    pub batch: Duration,
    pub command: Duration,
}

impl HostTimeouts {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            health: config.health_timeout(),
            batch: config.batch_timeout(),
            command: config.command_timeout(),
        }
    }
}

/// [`RemoteHost`] over HTTP with `ureq`.
pub struct HttpHost {
    base_url: String,
    agent: ureq::Agent,
    timeouts: HostTimeouts,
}

impl HttpHost {
    pub fn new(base_url: &str, timeouts: HostTimeouts) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new().build(),
            timeouts,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(&config.server_url, HostTimeouts::from_config(config))
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    fn post<T: Serialize>(
        &self,
        endpoint: &str,
        body: &T,
        timeout: Duration,
    ) -> Result<HostReply, TransportError> {
        let url = self.url(endpoint);
        let result = self.agent.post(&url).timeout(timeout).send_json(body);
        read_reply(&url, result, true)
    }
}

impl RemoteHost for HttpHost {
    fn location(&self) -> String {
        self.base_url.clone()
    }

    fn check_health(&mut self) -> Result<HostReply, TransportError> {
        let url = self.url("/health");
        let result = self.agent.get(&url).timeout(self.timeouts.health).call();
        read_reply(&url, result, false)
    }

    fn apply_batch(&mut self, operations: &[Operation]) -> Result<HostReply, TransportError> {
        self.post("/sync/batch", &BatchRequest { operations }, self.timeouts.batch)
    }

    fn run_command(&mut self, command: &Command) -> Result<HostReply, TransportError> {
        self.post("/sync/command", command, self.timeouts.command)
    }
}

/// Turn a `ureq` result into a reply. With `strict`, a 2xx body must parse.
fn read_reply(
    url: &str,
    result: Result<ureq::Response, ureq::Error>,
    strict: bool,
) -> Result<HostReply, TransportError> {
    match result {
        Ok(response) => {
            let status = response.status();
            let text = response.into_string().map_err(|e| classify_io(url, e))?;
            let body = if strict {
                serde_json::from_str(&text).map_err(|e| TransportError::InvalidReply {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?
            } else {
                ReplyBody::lenient(&text)
            };
            Ok(HostReply { status, body })
        }
        Err(ureq::Error::Status(status, response)) => {
            let text = response.into_string().unwrap_or_default();
            Ok(HostReply {
                status,
                body: ReplyBody::lenient(&text),
            })
        }
        Err(ureq::Error::Transport(transport)) => Err(classify_transport(url, &transport)),
    }
}

fn classify_transport(url: &str, transport: &ureq::Transport) -> TransportError {
    if is_timeout(transport) {
        return TransportError::Timeout {
            url: url.to_string(),
        };
    }
    let reason = transport.to_string();
    match transport.kind() {
        ureq::ErrorKind::Dns | ureq::ErrorKind::ConnectionFailed => TransportError::Unreachable {
            url: url.to_string(),
            reason,
        },
        ureq::ErrorKind::BadStatus | ureq::ErrorKind::BadHeader => TransportError::InvalidReply {
            url: url.to_string(),
            reason,
        },
        _ => TransportError::Other {
            url: url.to_string(),
            reason,
        },
    }
}

fn classify_io(url: &str, e: io::Error) -> TransportError {
    if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) {
        TransportError::Timeout {
            url: url.to_string(),
        }
    } else {
        TransportError::Other {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Walk the source chain looking for an I/O timeout.
fn is_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<io::Error>() {
            if matches!(io.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) {
                return true;
            }
        }
        current = e.source();
    }
    false
}

// ---------------------------------------------------------------------------
// In memory
// ---------------------------------------------------------------------------

/// In-process host: a create-or-replace map from path to payload.
///
/// An operation is rejected when its parent path is neither a root service
/// nor already present. Single-segment paths are always accepted.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    services: ServiceSet,
    nodes: BTreeMap<InstancePath, InstanceData>,
    batches: usize,
    commands: usize,
}

impl MemoryHost {
    pub fn new(services: ServiceSet) -> Self {
        Self {
            services,
            ..Self::default()
        }
    }

    pub fn get(&self, path: &str) -> Option<&InstanceData> {
        self.nodes.get(&InstancePath::from(path))
    }

    pub fn nodes(&self) -> &BTreeMap<InstancePath, InstanceData> {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn batches_received(&self) -> usize {
        self.batches
    }

    pub fn commands_received(&self) -> usize {
        self.commands
    }

    fn apply(&mut self, op: &Operation) -> OpResult {
        if let Some(parent) = op.path.parent() {
            if !self.services.is_root_path(&parent) && !self.nodes.contains_key(&parent) {
                return OpResult {
                    success: false,
                    error: Some(format!("parent not found: {parent}")),
                };
            }
        }
        self.nodes.insert(op.path.clone(), op.data.clone());
        OpResult {
            success: true,
            error: None,
        }
    }
}

impl RemoteHost for MemoryHost {
    fn location(&self) -> String {
        "in-memory host".to_string()
    }

    fn check_health(&mut self) -> Result<HostReply, TransportError> {
        Ok(HostReply {
            status: 200,
            body: ReplyBody::ok(),
        })
    }

    fn apply_batch(&mut self, operations: &[Operation]) -> Result<HostReply, TransportError> {
        self.batches += 1;
        let results: Vec<OpResult> = operations.iter().map(|op| self.apply(op)).collect();
        let success = results.iter().all(|r| r.success);
        Ok(HostReply {
            status: 200,
            body: ReplyBody {
                success,
                data: Some(ReplyData { results }),
                error: None,
            },
        })
    }

    fn run_command(&mut self, command: &Command) -> Result<HostReply, TransportError> {
        self.commands += 1;
        if command.command != UPDATE_COMMAND {
            return Ok(HostReply {
                status: 400,
                body: ReplyBody {
                    error: Some(format!("unknown command: {}", command.command)),
                    ..ReplyBody::default()
                },
            });
        }
        let op = Operation::update(command.payload.path.clone(), command.payload.data.clone());
        let result = self.apply(&op);
        Ok(HostReply {
            status: 200,
            body: ReplyBody {
                success: result.success,
                data: None,
                error: result.error,
            },
        })
    }
}
