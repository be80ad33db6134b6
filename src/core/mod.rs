//! Mailbox record, its storage handle and the polling primitives shared by
//! both roles.

pub mod error;
pub mod mailbox;
pub mod record;
pub mod wait;

pub use error::{Error, Result};
pub use mailbox::Mailbox;
pub use record::{Record, RecordLayout, Status, MAX_PAYLOAD_LEN, SHUTDOWN_SENTINEL};
pub use wait::{poll_until, Polled, Shutdown, WaitBudget};
