use std::collections::HashMap;

use relay_core::SessionId;

/// Whether a session may submit commands or receives dispatched ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Submitter,
    Executor,
}

#[derive(Clone, Debug)]
pub struct SessionRecord {
    pub id: SessionId,
    pub role: Role,
    /// Unix millis.
    pub connected_at: i64,
    /// Accepted commands; only counted for submitters.
    pub command_count: u64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    Promoted,
    AlreadyExecutor,
    Unknown,
}

/// Live sessions, partitioned by role. A session id is in at most one map.
#[derive(Default)]
pub struct SessionRegistry {
    submitters: HashMap<SessionId, SessionRecord>,
    executors: HashMap<SessionId, SessionRecord>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a submitter session and return its fresh id.
    pub fn connect(&mut self, now: i64) -> SessionId {
        let id = SessionId::new();
        self.submitters.insert(
            id.clone(),
            SessionRecord {
                id: id.clone(),
                role: Role::Submitter,
                connected_at: now,
                command_count: 0,
            },
        );
        id
    }

    /// Reclassify a session as executor. There is no way back.
    pub fn register_executor(&mut self, id: &SessionId) -> RegisterOutcome {
        if self.executors.contains_key(id) {
            return RegisterOutcome::AlreadyExecutor;
        }
        match self.submitters.remove(id) {
            Some(mut record) => {
                record.role = Role::Executor;
                record.command_count = 0;
                self.executors.insert(id.clone(), record);
                RegisterOutcome::Promoted
            }
            None => RegisterOutcome::Unknown,
        }
    }

    /// Drop the session, returning the role it had.
    pub fn disconnect(&mut self, id: &SessionId) -> Option<Role> {
        if self.submitters.remove(id).is_some() {
            Some(Role::Submitter)
        } else if self.executors.remove(id).is_some() {
            Some(Role::Executor)
        } else {
            None
        }
    }

    /// Current role of a live session, `None` once it is gone.
    pub fn role(&self, id: &SessionId) -> Option<Role> {
        if self.submitters.contains_key(id) {
            Some(Role::Submitter)
        } else if self.executors.contains_key(id) {
            Some(Role::Executor)
        } else {
            None
        }
    }

    /// Look up a live session regardless of role.
    pub fn get(&self, id: &SessionId) -> Option<&SessionRecord> {
        self.submitters.get(id).or_else(|| self.executors.get(id))
    }

    /// Connected sessions that have not registered as executors.
    pub fn submitter_count(&self) -> usize {
        self.submitters.len()
    }

    /// Registered executors.
    pub fn executor_count(&self) -> usize {
        self.executors.len()
    }

    /// Count one accepted command. Ignored unless `id` is a live submitter.
    pub fn increment_command_count(&mut self, id: &SessionId) {
        if let Some(record) = self.submitters.get_mut(id) {
            record.command_count += 1;
        }
    }

    /// Accepted commands across all currently connected submitters.
    pub fn total_commands(&self) -> u64 {
        self.submitters.values().map(|r| r.command_count).sum()
    }

    /// Ids of all executors at this instant, in stable order.
    pub fn executor_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.executors.keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }
}
