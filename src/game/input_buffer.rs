//! Lock-free command buffer for fire-and-forget player calls
//!
//! Uses crossbeam-channel so request handlers on any thread can queue
//! Move/Action/Unregister without taking the room lock. The room drains the
//! buffer between ticks.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::game::constants::input::BUFFER_CAPACITY;

/// A queued fire-and-forget call
///
/// Moves carry the raw delta; it is validated when the room applies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Move { secret: String, dx: i32, dy: i32 },
    Action { secret: String },
    Unregister { secret: String },
}

impl Command {
    pub fn secret(&self) -> &str {
        match self {
            Command::Move { secret, .. } | Command::Action { secret } | Command::Unregister { secret } => secret,
        }
    }
}

/// Bounded command buffer
///
/// Multiple handlers can submit without blocking; the room drains all pending
/// commands before running catch-up ticks.
pub struct CommandBuffer {
    sender: Sender<Command>,
    receiver: Receiver<Command>,
    capacity: usize,
}

impl CommandBuffer {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Create a new sender handle for a request handler
    pub fn sender(&self) -> CommandSender {
        CommandSender {
            sender: self.sender.clone(),
        }
    }

    /// Drain all pending commands, in submission order
    pub fn drain(&self) -> Vec<Command> {
        self.receiver.try_iter().collect()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new(BUFFER_CAPACITY)
    }
}

/// Clonable sender handle
#[derive(Clone)]
pub struct CommandSender {
    sender: Sender<Command>,
}

impl CommandSender {
    /// Queue a command (non-blocking)
    #[inline]
    pub fn try_send(&self, command: Command) -> Result<(), CommandBufferError> {
        self.sender.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => CommandBufferError::Full,
            TrySendError::Disconnected(_) => CommandBufferError::Disconnected,
        })
    }
}

/// Command buffer errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandBufferError {
    /// Buffer is full (backpressure)
    #[error("Command buffer is full")]
    Full,
    /// The room holding the buffer is gone
    #[error("Command buffer is closed")]
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(secret: &str) -> Command {
        Command::Action {
            secret: secret.to_string(),
        }
    }

    #[test]
    fn test_submit_and_drain_in_order() {
        let buffer = CommandBuffer::new(10);
        let sender = buffer.sender();

        sender
            .try_send(Command::Move {
                secret: "s1".into(),
                dx: 0,
                dy: -1,
            })
            .unwrap();
        sender.try_send(action("s2")).unwrap();
        sender
            .try_send(Command::Unregister { secret: "s1".into() })
            .unwrap();
        assert_eq!(buffer.pending_count(), 3);

        let commands = buffer.drain();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0].secret(), "s1");
        assert_eq!(commands[1], action("s2"));
        assert!(matches!(commands[2], Command::Unregister { .. }));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_backpressure() {
        let buffer = CommandBuffer::new(2);
        let sender = buffer.sender();

        assert!(sender.try_send(action("a")).is_ok());
        assert!(sender.try_send(action("b")).is_ok());
        assert_eq!(sender.try_send(action("c")), Err(CommandBufferError::Full));

        buffer.drain();
        assert!(sender.try_send(action("c")).is_ok());
    }

    #[test]
    fn test_sender_clones_share_buffer() {
        let buffer = CommandBuffer::new(10);
        let sender1 = buffer.sender();
        let sender2 = sender1.clone();

        let handle = std::thread::spawn(move || sender2.try_send(action("thread")));
        sender1.try_send(action("main")).unwrap();
        handle.join().unwrap().unwrap();

        assert_eq!(buffer.drain().len(), 2);
    }

    #[test]
    fn test_disconnected_after_buffer_dropped() {
        let buffer = CommandBuffer::new(4);
        let sender = buffer.sender();
        drop(buffer);
        assert_eq!(sender.try_send(action("late")), Err(CommandBufferError::Disconnected));
    }

    #[test]
    fn test_default_capacity() {
        assert_eq!(CommandBuffer::default().capacity(), BUFFER_CAPACITY);
    }
}
