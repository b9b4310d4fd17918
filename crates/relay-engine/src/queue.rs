use std::collections::VecDeque;

use relay_core::{Command, CommandSummary};

/// Bounded FIFO of accepted commands awaiting dispatch.
pub struct CommandQueue {
    items: VecDeque<Command>,
    capacity: usize,
}

impl CommandQueue {
    /// Create an empty queue holding at most `capacity` commands.
    /// Storage grows on demand, never up front.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity,
        }
    }

    /// Append to the tail. Returns `false` and discards the command when full.
    pub fn try_enqueue(&mut self, command: Command) -> bool {
        if self.is_full() {
            return false;
        }
        self.items.push_back(command);
        true
    }

    /// Pop the oldest command, if any. Never waits.
    pub fn dequeue_one(&mut self) -> Option<Command> {
        self.items.pop_front()
    }

    /// Number of pending commands.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the next `try_enqueue` would be rejected.
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Configured bound, not the allocated size.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Point-in-time copy, oldest first.
    pub fn snapshot(&self) -> Vec<Command> {
        self.items.iter().cloned().collect()
    }

    /// Public projection of the pending commands, oldest first.
    pub fn summaries(&self) -> Vec<CommandSummary> {
        self.items.iter().map(CommandSummary::from).collect()
    }
}
