//! Client role: claims a FREE slot, sends a request, waits for the response
//! and hands the slot back.
//!
//! ```text
//! WAIT_FOR_FREE ──FREE──► SEND ──► AWAIT_RESPONSE ──RESPONSE──► CONSUME ──► RESET
//!      │ budget spent               │ timeout / shutdown                    ▲
//!      ▼                            └──────────────────────────────────────┘
//!   Error::Busy                        (RESET, then Error::Timeout / Cancelled)
//! ```
//!
//! The status field is advisory. Two clients that both observe FREE can both
//! write REQUEST and the later write wins; `ClientConfig::verify_claim`
//! detects that case on the losing side, right after SEND or while awaiting
//! the response, and leaves the winner's request in place.

pub mod probe;

use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::bus::{self, Candidate, MailboxNaming};
use crate::config::ClientConfig;
use crate::core::{
    poll_until, Error, Mailbox, Polled, Record, Result, Shutdown, Status, MAX_PAYLOAD_LEN,
};

pub use probe::{probe, probe_payload, PROBE_PAYLOAD, SEQUENCED_PROBE_PAYLOAD};

/// Result of one completed request/response cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Response text; `None` when the server answered with an empty payload.
    pub payload: Option<String>,
    /// Set when this exchange gave the client its session id.
    pub assigned_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStatus {
    pub mailbox: Option<PathBuf>,
    pub client_id: u32,
    /// Outcome of a liveness probe; `None` when not bound.
    pub alive: Option<bool>,
}

enum Awaited {
    Response(Record),
    ServerGone,
    Clobbered(Record),
}

pub struct Client {
    config: ClientConfig,
    mailbox: Option<Mailbox>,
    client_id: u32,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            mailbox: None,
            client_id: 0,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn client_id(&self) -> u32 {
        self.client_id
    }

    pub fn mailbox(&self) -> Option<&Mailbox> {
        self.mailbox.as_ref()
    }

    /// Binds to `mailbox`. A new binding starts without a client id.
    pub fn bind(&mut self, mailbox: Mailbox) {
        self.mailbox = Some(mailbox);
        self.client_id = 0;
    }

    /// Discovers the newest available server in `dir` and binds to it.
    pub fn connect(&mut self, dir: &Path, naming: &MailboxNaming) -> Result<Candidate> {
        self.disconnect();
        let candidate = bus::discover(dir, naming, self.config.variant.layout())?;
        let mailbox = Mailbox::open(&candidate.path, self.config.variant.layout())?;
        info!("connected to {}", candidate.path.display());
        self.bind(mailbox);
        Ok(candidate)
    }

    /// Drops the binding and forgets the client id. Returns the old path.
    pub fn disconnect(&mut self) -> Option<PathBuf> {
        self.client_id = 0;
        self.mailbox.take().map(|mailbox| mailbox.path().to_path_buf())
    }

    pub fn status(&self, shutdown: &Shutdown) -> Result<ClientStatus> {
        let alive = match &self.mailbox {
            Some(mailbox) => Some(probe(mailbox, self.client_id, &self.config, shutdown)?),
            None => None,
        };
        Ok(ClientStatus {
            mailbox: self.mailbox.as_ref().map(|m| m.path().to_path_buf()),
            client_id: self.client_id,
            alive,
        })
    }

    /// Performs one full exchange.
    ///
    /// Storage errors are returned without touching the record. Every other
    /// path past SEND leaves the slot FREE.
    pub fn request(&mut self, payload: &str, shutdown: &Shutdown) -> Result<Exchange> {
        let mailbox = self.mailbox.as_ref().ok_or(Error::NotConnected)?;

        let free = poll_until(
            self.config.poll_interval(),
            self.config.free_wait_budget(),
            shutdown,
            || {
                let record = mailbox.read()?;
                Ok((record.status == Status::Free).then_some(record))
            },
        )?;
        match free {
            Polled::Ready(record) if record.is_shutdown_notice() => {
                return Err(Error::ServerShutdown)
            }
            Polled::Ready(_) => {}
            Polled::Exhausted => return Err(Error::Busy),
            Polled::Cancelled => return Err(Error::Cancelled),
        }

        if payload.len() > MAX_PAYLOAD_LEN {
            warn!("request truncated to {MAX_PAYLOAD_LEN} bytes");
        }
        let request = Record::request(self.client_id, payload);
        if self.config.verify_claim && mailbox.read()?.status != Status::Free {
            return Err(Error::Busy);
        }
        mailbox.write(&request)?;
        debug!("sent request as client #{}", self.client_id);
        if self.config.verify_claim {
            verify_claim(mailbox, &request)?;
        }

        let awaited = poll_until(
            self.config.poll_interval(),
            self.config.response_budget(),
            shutdown,
            || {
                let record = mailbox.read()?;
                Ok(match record.status {
                    Status::Response => Some(Awaited::Response(record)),
                    Status::Free if record.is_shutdown_notice() => Some(Awaited::ServerGone),
                    Status::Request if self.config.verify_claim && record != request => {
                        Some(Awaited::Clobbered(record))
                    }
                    _ => None,
                })
            },
        )?;
        let response = match awaited {
            Polled::Ready(Awaited::Response(record)) => record,
            Polled::Ready(Awaited::ServerGone) => return Err(Error::ServerShutdown),
            Polled::Ready(Awaited::Clobbered(record)) => {
                warn!(
                    "claim on {} lost to client #{} while awaiting response",
                    mailbox.path().display(),
                    record.client_id
                );
                return Err(Error::ClaimLost);
            }
            Polled::Exhausted => {
                mailbox.write(&Record::free(self.client_id))?;
                return Err(Error::Timeout);
            }
            Polled::Cancelled => {
                mailbox.write(&Record::free(self.client_id))?;
                return Err(Error::Cancelled);
            }
        };

        let mut assigned_id = None;
        if self.client_id == 0 && response.client_id != 0 {
            self.client_id = response.client_id;
            assigned_id = Some(response.client_id);
            info!("server assigned client id {}", self.client_id);
        }
        let text = response.payload_text();
        let exchange = Exchange {
            payload: (!text.is_empty()).then_some(text),
            assigned_id,
        };

        mailbox.write(&Record::free(self.client_id))?;
        Ok(exchange)
    }

    /// Hands the slot back on exit. No-op when unbound.
    pub fn release(&self) -> Result<()> {
        if let Some(mailbox) = &self.mailbox {
            mailbox.write(&Record::free(self.client_id))?;
        }
        Ok(())
    }
}

/// Re-reads right after SEND. Still seeing REQUEST with someone else's
/// content, or a FREE slot, means another writer clobbered the claim.
pub fn verify_claim(mailbox: &Mailbox, sent: &Record) -> Result<()> {
    let current = mailbox.read()?;
    match current.status {
        Status::Response => Ok(()),
        Status::Request if current == *sent => Ok(()),
        _ => {
            warn!(
                "claim on {} lost to client #{}",
                mailbox.path().display(),
                current.client_id
            );
            Err(Error::ClaimLost)
        }
    }
}
