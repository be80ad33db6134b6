use std::path::{Path, PathBuf};

use log::info;

use crate::bus::discovery::{scan, MailboxNaming};
use crate::core::{Mailbox, RecordLayout, Result};

/// One greater than the highest instance number present in `dir`, live or
/// not. Starts at 1.
pub fn next_instance_number(dir: &Path, naming: &MailboxNaming) -> std::io::Result<u32> {
    let max = scan(dir, naming)?
        .first()
        .map_or(0, |candidate| candidate.instance);
    Ok(max.saturating_add(1))
}

/// A freshly numbered, discoverable server mailbox.
#[derive(Debug)]
pub struct ServerInstance {
    pub instance: u32,
    pub mailbox: Mailbox,
}

impl ServerInstance {
    /// Numbers a new instance and creates its mailbox exclusively, reusing the
    /// file if a racing creator got there first.
    pub fn create(dir: &Path, naming: &MailboxNaming, layout: RecordLayout) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let instance = next_instance_number(dir, naming)?;
        let path: PathBuf = dir.join(naming.file_name(instance));
        let (mailbox, created) = Mailbox::create_exclusive(&path, layout)?;
        if created {
            info!("server #{instance} created {}", path.display());
        } else {
            info!("server #{instance} reusing existing {}", path.display());
        }
        Ok(Self { instance, mailbox })
    }
}
