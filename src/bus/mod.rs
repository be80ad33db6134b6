//! Multi-instance coordination: instance numbering and mailbox discovery.

pub mod discovery;
pub mod instance;

pub use discovery::{
    available, discover, is_available, scan, Candidate, MailboxNaming, DEFAULT_EXTENSION,
    DEFAULT_PREFIX,
};
pub use instance::{next_instance_number, ServerInstance};
