use std::collections::BTreeSet;

/// Counters reported when a server stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Requests answered with a normal reply.
    pub processed: u64,
    /// Requests that failed validation.
    pub rejected: u64,
    /// Requests deliberately left unanswered.
    pub withheld: u64,
    /// Failed reads or response writes.
    pub io_errors: u64,
    pub unique_clients: usize,
}

/// Outcome of registering the id carried by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub client_id: u32,
    /// First time this server has seen the id (fresh or reconnecting client).
    pub newly_seen: bool,
}

/// In-memory state of one server process. Nothing here is persisted.
#[derive(Debug)]
pub struct ServerSession {
    instance: u32,
    next_client_id: u32,
    known_clients: BTreeSet<u32>,
    stats: ServerStats,
}

impl ServerSession {
    pub fn new(instance: u32) -> Self {
        Self {
            instance,
            next_client_id: 1,
            known_clients: BTreeSet::new(),
            stats: ServerStats::default(),
        }
    }

    pub fn instance(&self) -> u32 {
        self.instance
    }

    /// Assigns an id to a new client (`client_id == 0`) or records a nonzero
    /// id that has not been seen before.
    pub fn admit(&mut self, client_id: u32) -> Admission {
        if client_id != 0 {
            let newly_seen = self.known_clients.insert(client_id);
            return Admission {
                client_id,
                newly_seen,
            };
        }
        // Skip ids already claimed by reconnecting clients.
        while self.known_clients.contains(&self.next_client_id) {
            self.next_client_id += 1;
        }
        let assigned = self.next_client_id;
        self.next_client_id += 1;
        self.known_clients.insert(assigned);
        Admission {
            client_id: assigned,
            newly_seen: true,
        }
    }

    pub fn known_clients(&self) -> usize {
        self.known_clients.len()
    }

    pub fn is_known(&self, client_id: u32) -> bool {
        self.known_clients.contains(&client_id)
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            unique_clients: self.known_clients.len(),
            ..self.stats.clone()
        }
    }

    pub(crate) fn stats_mut(&mut self) -> &mut ServerStats {
        &mut self.stats
    }
}
