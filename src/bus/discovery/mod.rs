//! Finds a live server mailbox by scanning a shared directory.
//!
//! Mailboxes are named `<prefix><instance><extension>`, e.g.
//! `ipc_server_7.bin`. Higher instance numbers are newer servers.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::{Error, Mailbox, RecordLayout, Result, Status};

pub const DEFAULT_PREFIX: &str = "ipc_server_";
pub const DEFAULT_EXTENSION: &str = ".bin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxNaming {
    pub prefix: String,
    pub extension: String,
}

impl Default for MailboxNaming {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

impl MailboxNaming {
    pub fn file_name(&self, instance: u32) -> String {
        format!("{}{instance}{}", self.prefix, self.extension)
    }

    /// Extracts the instance number. Names with a non-decimal middle part are
    /// foreign files and yield `None`.
    pub fn parse(&self, file_name: &str) -> Option<u32> {
        let digits = file_name
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.extension.as_str())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub instance: u32,
    pub path: PathBuf,
}

/// Lists mailbox files in `dir`, newest (highest instance) first.
pub fn scan(dir: &Path, naming: &MailboxNaming) -> std::io::Result<Vec<Candidate>> {
    let mut found = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(found),
        Err(err) => return Err(err),
    };
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(err),
        };
        let name = entry.file_name();
        let Some(instance) = name.to_str().and_then(|name| naming.parse(name)) else {
            continue;
        };
        found.push(Candidate {
            instance,
            path: entry.path(),
        });
    }
    found.sort_by(|a, b| b.instance.cmp(&a.instance));
    Ok(found)
}

/// A mailbox is available when it opens and its owner is cycling the slot
/// (FREE or RESPONSE). A pending REQUEST or a shutdown notice is not.
pub fn is_available(path: &Path, layout: RecordLayout) -> bool {
    let record = match Mailbox::open(path, layout).and_then(|mailbox| mailbox.read()) {
        Ok(record) => record,
        Err(err) => {
            debug!("skipping {}: {err}", path.display());
            return false;
        }
    };
    match record.status {
        Status::Free => !record.is_shutdown_notice(),
        Status::Response => true,
        Status::Request => false,
    }
}

/// Available candidates, newest first.
pub fn available(
    dir: &Path,
    naming: &MailboxNaming,
    layout: RecordLayout,
) -> Result<Vec<Candidate>> {
    Ok(scan(dir, naming)?
        .into_iter()
        .filter(|candidate| is_available(&candidate.path, layout))
        .collect())
}

/// Picks the newest available mailbox.
pub fn discover(dir: &Path, naming: &MailboxNaming, layout: RecordLayout) -> Result<Candidate> {
    available(dir, naming, layout)?
        .into_iter()
        .next()
        .ok_or(Error::NoServer)
}
