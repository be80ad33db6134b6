//! Server role: waits for REQUEST, dispatches, writes RESPONSE.
//!
//! ```text
//! WAIT_FOR_REQUEST ──REQUEST──► VALIDATE ──► DISPATCH ──► RESPOND ──┐
//!        ▲                          │ invalid                 │     │
//!        │                          └──────► RESPOND(error) ──┘     │
//!        └──────────────────────────────────────────────────────────┘
//! shutdown flag ──► write FREE + SERVER_SHUTDOWN, optionally remove file
//! ```

pub mod handler;
pub mod session;

use log::{debug, info, warn};

use crate::config::ServerConfig;
use crate::core::{Mailbox, Record, Result, Shutdown, Status};

pub use handler::{
    is_ping, parse_sequenced, Dispatch, Handler, PingHandler, SequencedHandler, SimulatedFault,
};
pub use session::{Admission, ServerSession, ServerStats};

/// What one dispatch pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Served {
    Replied { client_id: u32 },
    Rejected { client_id: u32 },
    Withheld,
}

pub struct Server<H> {
    mailbox: Mailbox,
    handler: H,
    session: ServerSession,
    config: ServerConfig,
    remove_on_shutdown: bool,
    withheld: Option<Record>,
}

impl<H: Handler> Server<H> {
    pub fn new(mailbox: Mailbox, handler: H, session: ServerSession, config: ServerConfig) -> Self {
        Self {
            mailbox,
            handler,
            session,
            config,
            remove_on_shutdown: false,
            withheld: None,
        }
    }

    /// Delete the mailbox file after writing the shutdown notice. Used by
    /// discoverable instances so clients stop finding them.
    pub fn remove_on_shutdown(mut self, remove: bool) -> Self {
        self.remove_on_shutdown = remove;
        self
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub fn session(&self) -> &ServerSession {
        &self.session
    }

    /// Clears a shutdown notice left by a previous server on this mailbox.
    pub fn prepare(&self) -> Result<()> {
        let record = self.mailbox.read()?;
        if record.is_shutdown_notice() {
            debug!("clearing stale shutdown notice in {}", self.mailbox.path().display());
            self.mailbox.write(&Record::free(0))?;
        }
        Ok(())
    }

    /// One WAIT_FOR_REQUEST observation, followed by a full dispatch pass if a
    /// request is pending.
    pub fn poll_once(&mut self) -> Result<Option<Served>> {
        let record = self.mailbox.read()?;
        if record.status != Status::Request {
            self.withheld = None;
            return Ok(None);
        }
        if self.withheld.as_ref() == Some(&record) {
            return Ok(None);
        }
        self.withheld = None;
        self.serve(record).map(Some)
    }

    /// Runs until `shutdown` is triggered, then writes the shutdown notice.
    ///
    /// Storage errors never end the loop; they are logged and retried after
    /// the configured backoff.
    pub fn run(&mut self, shutdown: &Shutdown) -> Result<ServerStats> {
        if let Err(err) = self.prepare() {
            warn!("mailbox {}: startup check failed: {err}", self.mailbox.path().display());
        }
        info!(
            "server #{} started on {}",
            self.session.instance(),
            self.mailbox.path().display()
        );

        while !shutdown.is_triggered() {
            match self.poll_once() {
                Ok(Some(Served::Withheld)) | Ok(None) => {
                    std::thread::sleep(self.config.poll_interval());
                }
                Ok(Some(_)) => std::thread::sleep(self.config.courtesy_delay()),
                Err(err) => {
                    self.session.stats_mut().io_errors += 1;
                    warn!("mailbox {}: {err}", self.mailbox.path().display());
                    std::thread::sleep(self.config.error_backoff());
                }
            }
        }

        self.close();
        let stats = self.session.stats();
        info!(
            "server #{} stopped: processed={} rejected={} unique_clients={}",
            self.session.instance(),
            stats.processed,
            stats.rejected,
            stats.unique_clients
        );
        Ok(stats)
    }

    /// Writes the shutdown notice and, if configured, removes the file.
    pub fn close(&self) {
        info!("server #{} shutting down", self.session.instance());
        if let Err(err) = self.mailbox.write(&Record::shutdown_notice()) {
            warn!("failed to write shutdown notice: {err}");
        }
        if self.remove_on_shutdown {
            match self.mailbox.remove() {
                Ok(()) => info!("removed mailbox {}", self.mailbox.path().display()),
                Err(err) => warn!("failed to remove {}: {err}", self.mailbox.path().display()),
            }
        }
    }

    fn serve(&mut self, request: Record) -> Result<Served> {
        debug!(
            "request from client #{}: {:?}",
            request.client_id,
            request.payload_text()
        );
        match self.handler.dispatch(&request, &mut self.session) {
            Dispatch::Reply { client_id, payload } => {
                self.respond(client_id, &payload)?;
                self.session.stats_mut().processed += 1;
                Ok(Served::Replied { client_id })
            }
            Dispatch::DelayedReply {
                client_id,
                payload,
                delay,
            } => {
                std::thread::sleep(delay);
                self.respond(client_id, &payload)?;
                self.session.stats_mut().processed += 1;
                Ok(Served::Replied { client_id })
            }
            Dispatch::Reject { payload } => {
                warn!(
                    "invalid request from client #{}: {:?}",
                    request.client_id,
                    request.payload_text()
                );
                self.respond(request.client_id, &payload)?;
                self.session.stats_mut().rejected += 1;
                Ok(Served::Rejected {
                    client_id: request.client_id,
                })
            }
            Dispatch::Withhold => {
                debug!("withholding reply to client #{}", request.client_id);
                self.session.stats_mut().withheld += 1;
                self.withheld = Some(request);
                Ok(Served::Withheld)
            }
        }
    }

    fn respond(&self, client_id: u32, payload: &str) -> Result<()> {
        self.mailbox.write(&Record::response(client_id, payload))?;
        debug!("response to client #{client_id}: {payload:?}");
        Ok(())
    }
}
