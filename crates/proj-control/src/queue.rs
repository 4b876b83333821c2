//! Single-flight send queue
//!
//! The projector link is half-duplex and replies carry no command identity,
//! so at most one command may be awaiting a reply at any time. Everything
//! else waits here in FIFO order.
//!
//! The queue never transmits by itself. Every operation that may start a new
//! command returns it, and the caller frames and writes it.

use std::collections::VecDeque;

use proj_protocol::Command;
use tracing::debug;

use crate::error::ControlError;

/// Default capacity, matching the projector controller's historical bound
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

/// FIFO of outbound commands plus the one command in flight
#[derive(Debug)]
pub struct SendQueue {
    queue: VecDeque<Command>,
    pending: Option<Command>,
    capacity: usize,
}

impl SendQueue {
    /// Create an empty queue holding at most `capacity` waiting commands
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity.min(DEFAULT_QUEUE_CAPACITY)),
            pending: None,
            capacity,
        }
    }

    /// Append a command, then dispatch the head if the link is idle and open
    ///
    /// A full queue rejects the new command and leaves existing ones untouched.
    pub fn enqueue(
        &mut self,
        command: Command,
        gate_open: bool,
    ) -> Result<Option<Command>, ControlError> {
        if self.queue.len() >= self.capacity {
            return Err(ControlError::QueueFull {
                capacity: self.capacity,
            });
        }
        debug!("Queued {} ({} waiting)", command, self.queue.len() + 1);
        self.queue.push_back(command);
        Ok(self.dispatch_next(gate_open))
    }

    /// The transport became usable (connected and, for IP, authenticated)
    pub fn on_transport_ready(&mut self, gate_open: bool) -> Option<Command> {
        self.dispatch_next(gate_open)
    }

    /// The in-flight command got its reply (or an auth marker was handled)
    pub fn on_reply_resolved(&mut self, gate_open: bool) -> Option<Command> {
        if let Some(done) = self.pending.take() {
            debug!("Resolved {}", done);
        }
        self.dispatch_next(gate_open)
    }

    /// Drop the in-flight command after a disconnect; queued commands survive
    pub fn abandon_pending(&mut self) -> Option<Command> {
        self.pending.take()
    }

    /// The command awaiting a reply
    pub fn pending(&self) -> Option<&Command> {
        self.pending.as_ref()
    }

    /// Commands waiting behind the in-flight one
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate the waiting commands in dispatch order
    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.queue.iter()
    }

    fn dispatch_next(&mut self, gate_open: bool) -> Option<Command> {
        if self.pending.is_some() || !gate_open {
            return None;
        }
        let next = self.queue.pop_front()?;
        self.pending = Some(next.clone());
        Some(next)
    }
}

impl Default for SendQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(queue: &SendQueue) -> Vec<String> {
        queue.iter().map(|c| c.name().to_string()).collect()
    }

    #[test]
    fn test_enqueue_dispatches_when_idle() {
        let mut queue = SendQueue::default();
        let sent = queue.enqueue(Command::power_query(), true).unwrap();
        assert_eq!(sent, Some(Command::power_query()));
        assert_eq!(queue.pending(), Some(&Command::power_query()));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_gate_closed_holds_commands() {
        let mut queue = SendQueue::default();
        assert_eq!(queue.enqueue(Command::power_on(), false).unwrap(), None);
        assert!(queue.pending().is_none());
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.on_transport_ready(true), Some(Command::power_on()));
    }

    #[test]
    fn test_one_in_flight_fifo_drain() {
        let mut queue = SendQueue::default();
        queue.enqueue(Command::power_query(), true).unwrap();

        for cmd in [Command::new("AAA"), Command::new("BBB"), Command::new("CCC")] {
            assert_eq!(queue.enqueue(cmd, true).unwrap(), None);
        }
        assert_eq!(queue.pending(), Some(&Command::power_query()));
        assert_eq!(names(&queue), ["AAA", "BBB", "CCC"]);

        assert_eq!(queue.on_reply_resolved(true), Some(Command::new("AAA")));
        assert_eq!(queue.on_reply_resolved(true), Some(Command::new("BBB")));
        assert_eq!(queue.on_reply_resolved(true), Some(Command::new("CCC")));
        assert_eq!(queue.on_reply_resolved(true), None);
        assert!(queue.pending().is_none());
    }

    #[test]
    fn test_transport_ready_does_not_double_dispatch() {
        let mut queue = SendQueue::default();
        queue.enqueue(Command::power_on(), true).unwrap();
        queue.enqueue(Command::power_query(), true).unwrap();
        assert_eq!(queue.on_transport_ready(true), None);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_overflow_rejects_new_command() {
        let mut queue = SendQueue::new(2);
        queue.enqueue(Command::new("AAA"), false).unwrap();
        queue.enqueue(Command::new("BBB"), false).unwrap();

        let err = queue.enqueue(Command::new("CCC"), false).unwrap_err();
        assert!(matches!(err, ControlError::QueueFull { capacity: 2 }));
        assert_eq!(names(&queue), ["AAA", "BBB"]);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn dispatch_is_fifo_and_single_flight(
                names in proptest::collection::vec("[A-Z]{3}", 1..40),
                gate_opens_at in 0usize..40,
            ) {
                let mut queue = SendQueue::default();
                let mut sent = Vec::new();

                for (i, name) in names.iter().enumerate() {
                    let gate = i >= gate_opens_at;
                    if let Some(cmd) = queue.enqueue(Command::new(name.clone()), gate).unwrap() {
                        sent.push(cmd);
                    }
                    prop_assert!(sent.len() <= 1);
                }
                if let Some(cmd) = queue.on_transport_ready(true) {
                    sent.push(cmd);
                }
                while let Some(cmd) = queue.on_reply_resolved(true) {
                    sent.push(cmd);
                }

                let sent: Vec<&str> = sent.iter().map(|c| c.name()).collect();
                let expected: Vec<&str> = names.iter().map(String::as_str).collect();
                prop_assert_eq!(sent, expected);
            }
        }
    }

    #[test]
    fn test_abandon_keeps_queue() {
        let mut queue = SendQueue::default();
        queue.enqueue(Command::power_on(), true).unwrap();
        queue.enqueue(Command::power_query(), true).unwrap();

        assert_eq!(queue.abandon_pending(), Some(Command::power_on()));
        assert!(queue.pending().is_none());
        assert_eq!(names(&queue), ["QPW"]);
    }
}
