use log::debug;

use crate::config::ClientConfig;
use crate::core::{poll_until, Mailbox, Polled, Record, RecordLayout, Result, Shutdown, Status};

/// Synthetic request sent by the liveness probe.
pub const PROBE_PAYLOAD: &str = "ping";
/// Probe request for sequenced mailboxes, which reject a bare `ping`.
pub const SEQUENCED_PROBE_PAYLOAD: &str = "[0] ping";

/// The synthetic request body that `layout`'s server accepts.
pub fn probe_payload(layout: RecordLayout) -> &'static str {
    match layout {
        RecordLayout::Simple => SEQUENCED_PROBE_PAYLOAD,
        RecordLayout::MultiClient => PROBE_PAYLOAD,
    }
}

/// Checks whether an owner is actively answering on `mailbox`.
///
/// Only a FREE slot is probed. The slot is handed back FREE whether or not
/// an answer arrived.
pub fn probe(
    mailbox: &Mailbox,
    client_id: u32,
    config: &ClientConfig,
    shutdown: &Shutdown,
) -> Result<bool> {
    let current = mailbox.read()?;
    if current.status != Status::Free || current.is_shutdown_notice() {
        return Ok(false);
    }
    let payload = probe_payload(mailbox.layout());
    mailbox.write(&Record::request(client_id, payload))?;
    let polled = poll_until(
        config.probe_interval(),
        config.probe_budget(),
        shutdown,
        || Ok((mailbox.read()?.status == Status::Response).then_some(())),
    )?;
    mailbox.write(&Record::free(client_id))?;
    match polled {
        Polled::Ready(()) => Ok(true),
        Polled::Exhausted | Polled::Cancelled => {
            debug!("probe of {} got no response", mailbox.path().display());
            Ok(false)
        }
    }
}
