//! Role configuration.
//!
//! Both roles ship presets for the two protocol variants and can be loaded
//! from a JSON file. Durations are stored in milliseconds.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Error, RecordLayout, Result, WaitBudget};

/// Protocol variant: which record layout and request grammar are in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Multi-instance servers, discovered by file name, answering `ping`.
    Ping,
    /// One fixed mailbox answering `[sequence] text` requests.
    Sequenced,
}

impl Variant {
    pub fn layout(self) -> RecordLayout {
        match self {
            Variant::Ping => RecordLayout::MultiClient,
            Variant::Sequenced => RecordLayout::Simple,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub variant: Variant,

    /// Pause between observations while waiting for a request.
    /// Default: 100 ms
    pub poll_interval_ms: u64,

    /// Pause after a failed read before retrying.
    /// Default: 1000 ms
    pub error_backoff_ms: u64,

    /// Pacing delay after each response.
    /// Default: 50 ms
    pub courtesy_delay_ms: u64,

    /// Enables the reserved fault bodies of the sequenced protocol.
    /// Default: false
    #[serde(default)]
    pub simulate_faults: bool,

    /// Delay used by the simulated `delay` body.
    /// Default: 3000 ms
    pub fault_delay_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::for_variant(Variant::Ping)
    }
}

impl ServerConfig {
    pub fn for_variant(variant: Variant) -> Self {
        Self {
            variant,
            poll_interval_ms: 100,
            error_backoff_ms: 1000,
            courtesy_delay_ms: 50,
            simulate_faults: false,
            fault_delay_ms: 3000,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn courtesy_delay(&self) -> Duration {
        Duration::from_millis(self.courtesy_delay_ms)
    }

    pub fn fault_delay(&self) -> Duration {
        Duration::from_millis(self.fault_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub variant: Variant,

    /// Pause between observations in both wait phases.
    /// Default: 100 ms
    pub poll_interval_ms: u64,

    /// Observations of a non-FREE slot before reporting "busy".
    /// Default: 5 (ping), 50 (sequenced)
    pub free_wait_attempts: u32,

    /// How long to wait for RESPONSE after sending.
    /// Default: 5000 ms (ping), 10000 ms (sequenced)
    pub response_timeout_ms: u64,

    /// Liveness probe pacing.
    /// Default: 50 ms
    pub probe_interval_ms: u64,

    /// Liveness probe deadline.
    /// Default: 500 ms
    pub probe_timeout_ms: u64,

    /// Re-read around the REQUEST write to detect a clobbered claim.
    /// Default: false
    #[serde(default)]
    pub verify_claim: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::for_variant(Variant::Ping)
    }
}

impl ClientConfig {
    pub fn for_variant(variant: Variant) -> Self {
        let (free_wait_attempts, response_timeout_ms) = match variant {
            Variant::Ping => (5, 5_000),
            Variant::Sequenced => (50, 10_000),
        };
        Self {
            variant,
            poll_interval_ms: 100,
            free_wait_attempts,
            response_timeout_ms,
            probe_interval_ms: 50,
            probe_timeout_ms: 500,
            verify_claim: false,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn free_wait_budget(&self) -> WaitBudget {
        WaitBudget::Attempts(self.free_wait_attempts)
    }

    pub fn response_budget(&self) -> WaitBudget {
        WaitBudget::Timeout(Duration::from_millis(self.response_timeout_ms))
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn probe_budget(&self) -> WaitBudget {
        WaitBudget::Timeout(Duration::from_millis(self.probe_timeout_ms))
    }
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let data = std::fs::read(path)?;
    serde_json::from_slice(&data).map_err(|err| Error::Config(format!("{}: {err}", path.display())))
}
