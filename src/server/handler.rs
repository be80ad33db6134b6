//! Request validation and dispatch strategies.
//!
//! The server loop owns the mailbox and the status transitions; a `Handler`
//! only decides what to answer.

use std::time::Duration;

use log::info;

use crate::core::Record;
use crate::server::session::ServerSession;

pub const PING_COMMAND: &str = "ping";
pub const PING_REJECTION: &str = "ERROR: Only 'ping' is accepted";
pub const SEQUENCED_REJECTION: &str = "ERROR: Expected '[sequence] text'";

/// What the server should do with one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Reply {
        client_id: u32,
        payload: String,
    },
    /// Reply after sleeping for `delay`.
    DelayedReply {
        client_id: u32,
        payload: String,
        delay: Duration,
    },
    /// Validation failed. The reply keeps the request's client id and is not
    /// counted as processed.
    Reject { payload: String },
    /// Leave the request unanswered; the client will time out.
    Withhold,
}

pub trait Handler {
    fn dispatch(&mut self, request: &Record, session: &mut ServerSession) -> Dispatch;
}

/// Multi-instance protocol: answers `ping` and hands out client ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct PingHandler;

impl Handler for PingHandler {
    fn dispatch(&mut self, request: &Record, session: &mut ServerSession) -> Dispatch {
        if !is_ping(&request.payload_text()) {
            return Dispatch::Reject {
                payload: PING_REJECTION.to_string(),
            };
        }
        let admission = session.admit(request.client_id);
        if admission.newly_seen {
            info!(
                "client #{} connected, total connected clients: {}",
                admission.client_id,
                session.known_clients()
            );
        }
        Dispatch::Reply {
            client_id: admission.client_id,
            payload: format!(
                "pong from server #{} to client #{}",
                session.instance(),
                admission.client_id
            ),
        }
    }
}

/// Trimmed, case-insensitive match against `ping`.
pub fn is_ping(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case(PING_COMMAND)
}

/// Splits `[n] text` into its sequence number and non-empty body.
pub fn parse_sequenced(text: &str) -> Option<(u64, &str)> {
    let rest = text.trim_start().strip_prefix('[')?;
    let (seq, body) = rest.split_once(']')?;
    if seq.is_empty() || !seq.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let seq = seq.parse().ok()?;
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    Some((seq, body))
}

/// Debug behaviours keyed on reserved request bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedFault {
    Delay,
    Empty,
    Silent,
}

impl SimulatedFault {
    pub fn from_body(body: &str) -> Option<Self> {
        match body.to_ascii_lowercase().as_str() {
            "delay" => Some(SimulatedFault::Delay),
            "empty" => Some(SimulatedFault::Empty),
            "silent" => Some(SimulatedFault::Silent),
            _ => None,
        }
    }
}

/// Single-mailbox protocol: acknowledges `[n] text` requests.
#[derive(Debug, Clone)]
pub struct SequencedHandler {
    faults: Option<Duration>,
}

impl SequencedHandler {
    pub fn new() -> Self {
        Self { faults: None }
    }

    /// Enables the reserved fault bodies; `delay` sleeps for `delay`.
    pub fn with_simulated_faults(delay: Duration) -> Self {
        Self {
            faults: Some(delay),
        }
    }
}

impl Default for SequencedHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler for SequencedHandler {
    fn dispatch(&mut self, request: &Record, _session: &mut ServerSession) -> Dispatch {
        let text = request.payload_text();
        let Some((seq, body)) = parse_sequenced(&text) else {
            return Dispatch::Reject {
                payload: SEQUENCED_REJECTION.to_string(),
            };
        };
        let client_id = request.client_id;
        let payload = format!("[{seq}] ack: {body}");
        let fault = self
            .faults
            .and_then(|delay| SimulatedFault::from_body(body).map(|fault| (fault, delay)));
        match fault {
            None => Dispatch::Reply { client_id, payload },
            Some((SimulatedFault::Delay, delay)) => Dispatch::DelayedReply {
                client_id,
                payload,
                delay,
            },
            Some((SimulatedFault::Empty, _)) => Dispatch::Reply {
                client_id,
                payload: String::new(),
            },
            Some((SimulatedFault::Silent, _)) => Dispatch::Withhold,
        }
    }
}
