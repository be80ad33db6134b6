//! File-backed single-slot mailbox for inter-process request/response.
//!
//! A server owns one fixed-size record on shared storage; clients claim it
//! when its status is FREE, write a REQUEST, and poll until the server has
//! written a RESPONSE. The status field is the only synchronization.

pub mod bus;
pub mod client;
pub mod config;
pub mod core;
pub mod server;

pub use crate::core::{Error, Mailbox, Record, RecordLayout, Result, Shutdown, Status};
pub use client::{Client, Exchange};
pub use config::{ClientConfig, ServerConfig, Variant};
pub use server::{Server, ServerSession};
